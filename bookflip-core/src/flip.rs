//! Timed spread-flip state machine.
//!
//! A flip runs in two phases: `Committing` while the turning page lifts, then
//! `Settling` once the spread index has moved and the page is landing. The phases are
//! driven by deadlines that the host checks through [`FlipController::advance`], so the
//! whole machine lives on the caller's event loop and never spawns anything.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, Span};

use crate::config::FlipConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Prev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavigationState {
    pub current_index: usize,
    pub total_spreads: usize,
}

impl NavigationState {
    pub fn new(total_spreads: usize, current_index: usize) -> Self {
        Self {
            current_index: clamp_index(current_index, total_spreads),
            total_spreads,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_spreads == 0
    }

    pub fn can_flip(&self, direction: Direction) -> bool {
        match direction {
            Direction::Next => self.current_index + 1 < self.total_spreads,
            Direction::Prev => self.current_index > 0,
        }
    }
}

fn clamp_index(index: usize, total: usize) -> usize {
    index.min(total.saturating_sub(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionState {
    #[default]
    Idle,
    Committing(Direction),
    Settling(Direction),
}

impl TransitionState {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            TransitionState::Idle => None,
            TransitionState::Committing(direction) | TransitionState::Settling(direction) => {
                Some(*direction)
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TransitionState::Idle)
    }

    pub fn in_flight(&self) -> bool {
        !self.is_idle()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipEvent {
    PageChanged(usize),
    Settled,
    Invalidated,
}

/// Why a flip request was ignored. None of these are failures; the host is expected to
/// log them and carry on, the way a disabled button swallows a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlipRejection {
    #[error("no {direction:?} spread from {index} of {total}")]
    IllegalTransition {
        direction: Direction,
        index: usize,
        total: usize,
    },
    #[error("a flip is already in flight ({0:?})")]
    Busy(TransitionState),
    #[error("flip controller was torn down")]
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Commit,
    Settle,
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    kind: TimerKind,
    armed_at: Instant,
    due: Instant,
}

pub struct FlipController {
    config: FlipConfig,
    navigation: NavigationState,
    state: TransitionState,
    timer: Option<PendingTimer>,
    destroyed: bool,
    span: Span,
}

impl FlipController {
    pub fn new(config: FlipConfig, total_spreads: usize) -> Self {
        Self {
            config,
            navigation: NavigationState::new(total_spreads, 0),
            state: TransitionState::Idle,
            timer: None,
            destroyed: false,
            span: tracing::debug_span!("flip"),
        }
    }

    /// Routes the controller's diagnostics through `span` instead of its own.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &FlipConfig {
        &self.config
    }

    pub fn navigation(&self) -> NavigationState {
        self.navigation
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.map(|timer| timer.due)
    }

    pub fn request_flip(
        &mut self,
        direction: Direction,
        now: Instant,
    ) -> Result<(), FlipRejection> {
        let _entered = self.span.enter();
        if self.destroyed {
            return Err(FlipRejection::Destroyed);
        }
        if self.state.in_flight() {
            debug!(?direction, state = ?self.state, "flip rejected while busy");
            return Err(FlipRejection::Busy(self.state));
        }
        if !self.navigation.can_flip(direction) {
            debug!(
                ?direction,
                index = self.navigation.current_index,
                total = self.navigation.total_spreads,
                "flip rejected at book edge"
            );
            return Err(FlipRejection::IllegalTransition {
                direction,
                index: self.navigation.current_index,
                total: self.navigation.total_spreads,
            });
        }

        self.state = TransitionState::Committing(direction);
        self.timer = Some(PendingTimer {
            kind: TimerKind::Commit,
            armed_at: now,
            due: now + self.config.commit_duration,
        });
        debug!(?direction, from = self.navigation.current_index, "flip committing");
        Ok(())
    }

    /// Fires every timer that is due at `now`, in order. A late call can complete a
    /// whole flip at once because the settle deadline is measured from the commit
    /// deadline rather than from the moment it was observed.
    pub fn advance(&mut self, now: Instant) -> Vec<FlipEvent> {
        let mut events = Vec::new();
        if self.destroyed {
            return events;
        }
        let _entered = self.span.enter();

        while let Some(timer) = self.timer {
            if timer.due > now {
                break;
            }
            match (timer.kind, self.state) {
                (TimerKind::Commit, TransitionState::Committing(direction)) => {
                    let index = match direction {
                        Direction::Next => self.navigation.current_index + 1,
                        Direction::Prev => self.navigation.current_index.saturating_sub(1),
                    };
                    self.navigation.current_index =
                        clamp_index(index, self.navigation.total_spreads);
                    self.state = TransitionState::Settling(direction);
                    self.timer = Some(PendingTimer {
                        kind: TimerKind::Settle,
                        armed_at: timer.due,
                        due: timer.due + self.config.settle_duration,
                    });
                    info!(index = self.navigation.current_index, "page changed");
                    events.push(FlipEvent::PageChanged(self.navigation.current_index));
                }
                (TimerKind::Settle, TransitionState::Settling(_)) => {
                    self.state = TransitionState::Idle;
                    self.timer = None;
                    debug!("flip settled");
                    events.push(FlipEvent::Settled);
                }
                (kind, state) => {
                    debug!(?kind, ?state, "dropping timer that no longer matches state");
                    self.timer = None;
                }
            }
        }

        events
    }

    /// Moves straight to `index` without animating. Only allowed while idle.
    pub fn jump_to(&mut self, index: usize) -> Result<Option<FlipEvent>, FlipRejection> {
        if self.destroyed {
            return Err(FlipRejection::Destroyed);
        }
        if self.state.in_flight() {
            return Err(FlipRejection::Busy(self.state));
        }
        let target = clamp_index(index, self.navigation.total_spreads);
        if target == self.navigation.current_index {
            return Ok(None);
        }
        self.navigation.current_index = target;
        let _entered = self.span.enter();
        info!(index = target, "page changed by jump");
        Ok(Some(FlipEvent::PageChanged(target)))
    }

    /// Applies a change to the underlying page list. A flip in flight is abandoned
    /// without a page change, since the spread it was heading to may no longer exist.
    pub fn set_total_spreads(&mut self, total_spreads: usize) -> Option<FlipEvent> {
        let _entered = self.span.enter();
        let invalidated = if self.state.in_flight() && !self.destroyed {
            debug!(state = ?self.state, total_spreads, "page list changed mid-flip");
            self.state = TransitionState::Idle;
            self.timer = None;
            Some(FlipEvent::Invalidated)
        } else {
            None
        };
        self.navigation = NavigationState::new(total_spreads, self.navigation.current_index);
        invalidated
    }

    /// Fraction of the current phase that has elapsed, `0.0` while idle.
    pub fn progress(&self, now: Instant) -> f32 {
        match self.timer {
            Some(timer) => {
                let span = timer.due.saturating_duration_since(timer.armed_at);
                if span.is_zero() {
                    return 1.0;
                }
                let elapsed = now.saturating_duration_since(timer.armed_at);
                (elapsed.as_secs_f32() / span.as_secs_f32()).clamp(0.0, 1.0)
            }
            None => 0.0,
        }
    }

    /// Cancels any pending timer. Nothing fires after this, and further requests are
    /// rejected.
    pub fn destroy(&mut self) {
        if self.timer.take().is_some() {
            let _entered = self.span.enter();
            debug!(state = ?self.state, "cancelled pending flip timer");
        }
        self.destroyed = true;
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.timer.map(|timer| timer.due.saturating_duration_since(now))
    }
}
