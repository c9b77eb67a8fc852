//! Pointer-drag tracking for drag-to-turn.

use crate::config::GestureConfig;
use crate::flip::{Direction, TransitionState};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DragState {
    pub origin_x: f32,
    pub current_offset: f32,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragResult {
    Commit(Direction),
    Cancel,
}

impl DragResult {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            DragResult::Commit(direction) => Some(*direction),
            DragResult::Cancel => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GestureTracker {
    config: GestureConfig,
    drag: DragState,
}

impl GestureTracker {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            drag: DragState::default(),
        }
    }

    pub fn state(&self) -> DragState {
        self.drag
    }

    pub fn is_active(&self) -> bool {
        self.drag.active
    }

    pub fn begin(&mut self, pointer_x: f32, transition: TransitionState) {
        if transition.in_flight() {
            return;
        }
        self.drag = DragState {
            origin_x: pointer_x,
            current_offset: 0.0,
            active: true,
        };
    }

    pub fn update(&mut self, pointer_x: f32, transition: TransitionState) -> f32 {
        if !self.drag.active || transition.in_flight() {
            return self.drag.current_offset;
        }
        let max = self.max_drag();
        let offset = pointer_x - self.drag.origin_x;
        self.drag.current_offset = if offset.is_nan() {
            0.0
        } else {
            offset.clamp(-max, max)
        };
        self.drag.current_offset
    }

    /// Pointer release. The drag state is cleared before returning whatever the
    /// outcome, so a stuck drag can never block the next gesture.
    pub fn end(&mut self) -> DragResult {
        let drag = std::mem::take(&mut self.drag);
        if !drag.active {
            return DragResult::Cancel;
        }
        if drag.current_offset.abs() > self.config.commit_threshold_pixels {
            if drag.current_offset > 0.0 {
                DragResult::Commit(Direction::Next)
            } else {
                DragResult::Commit(Direction::Prev)
            }
        } else {
            DragResult::Cancel
        }
    }

    fn max_drag(&self) -> f32 {
        let max = self.config.max_drag_pixels.abs();
        if max.is_nan() {
            0.0
        } else {
            max
        }
    }

    pub fn cancel(&mut self) {
        self.drag = DragState::default();
    }

    /// Signed drag progress in `[-1, 1]`, positive towards the next spread.
    pub fn progress(&self) -> f32 {
        let max = self.max_drag();
        if !self.drag.active || max == 0.0 {
            return 0.0;
        }
        (self.drag.current_offset / max).clamp(-1.0, 1.0)
    }
}
