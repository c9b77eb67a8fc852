use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

pub mod config;
pub mod flip;
pub mod gesture;
pub mod library;
pub mod spread;
pub mod store;

pub use config::{Config, FlipConfig, GestureConfig, LibraryConfig, LoggingConfig};
pub use flip::{
    Direction, FlipController, FlipEvent, FlipRejection, NavigationState, TransitionState,
};
pub use gesture::{DragResult, DragState, GestureTracker};
pub use library::{demo_project, Library};
pub use spread::{resolve, resolve_window, Spread, SpreadWindow};
pub use store::{FileProjectStore, MemoryProjectStore, ProjectStore, StoreError};

pub type SlotContent = serde_json::Map<String, serde_json::Value>;

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaLink {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IconPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EyeIcon {
    pub id: String,
    pub position: IconPosition,
    pub media_link: MediaLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotSide {
    Left,
    Right,
}

/// A template placed on one side of a page. The content bag is opaque here; only the
/// template registry knows what its keys mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: String,
    pub template: String,
    #[serde(default)]
    pub content: SlotContent,
    pub position: SlotSide,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub media_links: BTreeMap<String, MediaLink>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub eye_icons: Vec<EyeIcon>,
}

impl Slot {
    pub fn new(
        id: impl Into<String>,
        template: impl Into<String>,
        content: SlotContent,
        position: SlotSide,
    ) -> Self {
        Self {
            id: id.into(),
            template: template.into(),
            content,
            position,
            media_links: BTreeMap::new(),
            eye_icons: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Slot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Slot>,
}

impl Page {
    pub fn empty() -> Self {
        Self {
            id: fresh_id(),
            left: None,
            right: None,
        }
    }

    pub fn slot(&self, side: SlotSide) -> Option<&Slot> {
        match side {
            SlotSide::Left => self.left.as_ref(),
            SlotSide::Right => self.right.as_ref(),
        }
    }

    fn slot_mut(&mut self, side: SlotSide) -> &mut Option<Slot> {
        match side {
            SlotSide::Left => &mut self.left,
            SlotSide::Right => &mut self.right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookProject {
    pub id: String,
    pub title: String,
    pub pages: Vec<Page>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookProject {
    /// A new project always starts with one blank spread.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: fresh_id(),
            title: title.into(),
            pages: vec![Page::empty()],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn spread_count(&self) -> usize {
        self.pages.len()
    }

    /// Printed page count; every spread has two sides.
    pub fn page_count(&self) -> usize {
        self.pages.len() * 2
    }

    pub fn content_count(&self) -> usize {
        self.pages
            .iter()
            .map(|page| usize::from(page.left.is_some()) + usize::from(page.right.is_some()))
            .sum()
    }

    pub fn is_demo(&self) -> bool {
        self.title.contains("Demo") || self.id.starts_with("demo-")
    }

    pub fn add_page(&mut self) -> usize {
        self.pages.push(Page::empty());
        self.pages.len() - 1
    }

    pub fn apply_template(
        &mut self,
        page_index: usize,
        side: SlotSide,
        template: impl Into<String>,
        defaults: SlotContent,
    ) -> Result<&Slot> {
        let page_count = self.pages.len();
        let page = self
            .pages
            .get_mut(page_index)
            .ok_or_else(|| anyhow!("page {} out of range ({} pages)", page_index, page_count))?;
        let slot = page
            .slot_mut(side)
            .insert(Slot::new(fresh_id(), template, defaults, side));
        Ok(&*slot)
    }

    /// Stores `slot` on the side recorded in its own `position`.
    pub fn update_slot(&mut self, page_index: usize, slot: Slot) -> Result<()> {
        let page_count = self.pages.len();
        let page = self
            .pages
            .get_mut(page_index)
            .ok_or_else(|| anyhow!("page {} out of range ({} pages)", page_index, page_count))?;
        let side = slot.position;
        *page.slot_mut(side) = Some(slot);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    NextSpread,
    PrevSpread,
    GotoSpread { index: usize },
    PointerDown { x: f32 },
    PointerMove { x: f32 },
    PointerUp,
    PointerCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerEvent {
    PageChanged(usize),
    TransitionStarted(Direction),
    TransitionSettled,
    TransitionInvalidated,
    RedrawNeeded,
}

#[async_trait::async_trait]
pub trait ProjectProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<BookProject>;
}

/// Loads a single exported project document.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonProjectProvider;

#[async_trait::async_trait]
impl ProjectProvider for JsonProjectProvider {
    async fn open(&self, path: &Path) -> Result<BookProject> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read project file {:?}", path))?;
        let project = serde_json::from_str(&raw)
            .with_context(|| format!("failed to decode project file {:?}", path))?;
        Ok(project)
    }
}

/// The hosting view for one open project: owns the navigation and transition state
/// and turns input commands into flips.
pub struct Viewer {
    project: BookProject,
    flip: FlipController,
    gesture: GestureTracker,
    events: Arc<Mutex<Vec<ViewerEvent>>>,
}

impl Viewer {
    pub fn new(project: BookProject, config: &Config) -> Self {
        let span = tracing::info_span!("viewer", project = %project.id);
        let flip = FlipController::new(config.flip, project.spread_count()).with_span(span);
        Self {
            project,
            flip,
            gesture: GestureTracker::new(config.gesture),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<ViewerEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn project(&self) -> &BookProject {
        &self.project
    }

    pub fn navigation(&self) -> NavigationState {
        self.flip.navigation()
    }

    pub fn transition(&self) -> TransitionState {
        self.flip.state()
    }

    pub fn transition_progress(&self, now: Instant) -> f32 {
        self.flip.progress(now)
    }

    pub fn drag_progress(&self) -> f32 {
        self.gesture.progress()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.flip.next_deadline()
    }

    pub fn window(&self) -> SpreadWindow<'_> {
        resolve_window(&self.project.pages, self.flip.navigation().current_index)
    }

    #[instrument(skip(self, now), fields(project = %self.project.id))]
    pub fn apply(&mut self, command: Command, now: Instant) -> Result<()> {
        if self.flip.is_destroyed() {
            bail!("viewer for project {} was already torn down", self.project.id);
        }
        match command {
            Command::NextSpread => self.request(Direction::Next, now),
            Command::PrevSpread => self.request(Direction::Prev, now),
            Command::GotoSpread { index } => match self.flip.jump_to(index) {
                Ok(Some(event)) => self.record(event),
                Ok(None) => {}
                Err(rejection) => debug!(%rejection, "jump ignored"),
            },
            Command::PointerDown { x } => {
                self.gesture.begin(x, self.flip.state());
            }
            Command::PointerMove { x } => {
                if self.gesture.is_active() {
                    self.gesture.update(x, self.flip.state());
                    self.events.lock().push(ViewerEvent::RedrawNeeded);
                }
            }
            Command::PointerUp => {
                let was_active = self.gesture.is_active();
                if let DragResult::Commit(direction) = self.gesture.end() {
                    self.request(direction, now);
                } else if was_active {
                    self.events.lock().push(ViewerEvent::RedrawNeeded);
                }
            }
            Command::PointerCancel => {
                if self.gesture.is_active() {
                    self.gesture.cancel();
                    self.events.lock().push(ViewerEvent::RedrawNeeded);
                }
            }
        }
        Ok(())
    }

    /// Fires due flip timers. Call once per turn of the host event loop.
    pub fn tick(&mut self, now: Instant) {
        for event in self.flip.advance(now) {
            self.record(event);
        }
    }

    /// Swaps in a new revision of the open project, e.g. after the file changed on disk.
    pub fn replace_project(&mut self, project: BookProject) {
        let total = project.spread_count();
        self.project = project;
        if let Some(event) = self.flip.set_total_spreads(total) {
            self.record(event);
        }
        self.events.lock().push(ViewerEvent::RedrawNeeded);
    }

    pub fn destroy(&mut self) {
        self.gesture.cancel();
        self.flip.destroy();
    }

    fn request(&mut self, direction: Direction, now: Instant) {
        match self.flip.request_flip(direction, now) {
            Ok(()) => {
                self.gesture.cancel();
                let mut events = self.events.lock();
                events.push(ViewerEvent::TransitionStarted(direction));
                events.push(ViewerEvent::RedrawNeeded);
            }
            Err(rejection) => debug!(%rejection, "flip ignored"),
        }
    }

    fn record(&mut self, event: FlipEvent) {
        let mut events = self.events.lock();
        match event {
            FlipEvent::PageChanged(index) => events.push(ViewerEvent::PageChanged(index)),
            FlipEvent::Settled => events.push(ViewerEvent::TransitionSettled),
            FlipEvent::Invalidated => events.push(ViewerEvent::TransitionInvalidated),
        }
        events.push(ViewerEvent::RedrawNeeded);
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.flip.destroy();
    }
}
