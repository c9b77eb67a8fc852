use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument};

use crate::store::ProjectStore;
use crate::{BookProject, Page, Slot, SlotContent, SlotSide};

/// Project-level operations over a [`ProjectStore`].
pub struct Library {
    store: Arc<dyn ProjectStore>,
}

impl Library {
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        Self { store }
    }

    /// Most recently updated first. Demo books are hidden unless asked for.
    pub fn projects(&self, include_demos: bool) -> Result<Vec<BookProject>> {
        let mut projects = self.store.list()?;
        if !include_demos {
            projects.retain(|project| !project.is_demo());
        }
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    pub fn get(&self, id: &str) -> Result<BookProject> {
        self.store
            .get(id)?
            .ok_or_else(|| anyhow!("no project with id {}", id))
    }

    #[instrument(skip(self))]
    pub fn create(&self, title: &str) -> Result<BookProject> {
        let title = title.trim();
        if title.is_empty() {
            bail!("a book needs a title");
        }
        let project = BookProject::new(title);
        self.store.save(&project)?;
        info!(id = %project.id, "created project");
        Ok(project)
    }

    pub fn most_recent(&self) -> Result<Option<BookProject>> {
        Ok(self.projects(true)?.into_iter().next())
    }

    /// Opens the most recent project, seeding the library with the demo book when it is
    /// empty.
    pub fn open_or_demo(&self) -> Result<BookProject> {
        if let Some(project) = self.most_recent()? {
            return Ok(project);
        }
        let demo = demo_project();
        self.store.save(&demo)?;
        info!(id = %demo.id, "seeded library with demo project");
        Ok(demo)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        if !self.store.delete(id)? {
            bail!("no project with id {}", id);
        }
        info!(id, "deleted project");
        Ok(())
    }

    pub fn add_page(&self, id: &str) -> Result<usize> {
        let mut project = self.get(id)?;
        let index = project.add_page();
        self.store.save(&project)?;
        Ok(index)
    }

    pub fn apply_template(
        &self,
        id: &str,
        page_index: usize,
        side: SlotSide,
        template: &str,
        content: SlotContent,
    ) -> Result<Slot> {
        let mut project = self.get(id)?;
        let slot = project
            .apply_template(page_index, side, template, content)?
            .clone();
        self.store.save(&project)?;
        info!(id, page_index, ?side, template, "applied template");
        Ok(slot)
    }

    /// Merges `content` into the slot already on `side`. The slot keeps its id and
    /// template; keys present in `content` overwrite the stored ones.
    pub fn update_content(
        &self,
        id: &str,
        page_index: usize,
        side: SlotSide,
        content: SlotContent,
    ) -> Result<Slot> {
        let mut project = self.get(id)?;
        let page = project.pages.get(page_index).ok_or_else(|| {
            anyhow!(
                "page {} out of range ({} pages)",
                page_index,
                project.pages.len()
            )
        })?;
        let mut slot = page
            .slot(side)
            .cloned()
            .ok_or_else(|| anyhow!("page {} has nothing on its {:?} side", page_index, side))?;
        slot.content.extend(content);
        project.update_slot(page_index, slot.clone())?;
        self.store.save(&project)?;
        info!(id, page_index, slot = %slot.id, "updated slot content");
        Ok(slot)
    }
}

fn demo_slot(id: &str, template: &str, side: SlotSide, content: serde_json::Value) -> Slot {
    let content = match content {
        serde_json::Value::Object(map) => map,
        _ => SlotContent::new(),
    };
    Slot::new(id, template, content, side)
}

fn demo_page(id: &str, left: Slot, right: Slot) -> Page {
    Page {
        id: id.to_string(),
        left: Some(left),
        right: Some(right),
    }
}

/// The sample book shown to first-time users.
pub fn demo_project() -> BookProject {
    let now = Utc::now();
    BookProject {
        id: "demo-project".to_string(),
        title: "Demo Showcase".to_string(),
        created_at: now,
        updated_at: now,
        pages: vec![
            demo_page(
                "demo-page-1",
                demo_slot(
                    "demo-left-1",
                    "text-article",
                    SlotSide::Left,
                    json!({
                        "title": "Welcome",
                        "content": "Drag templates onto a spread, fill them in, then flip through the result like a printed book."
                    }),
                ),
                demo_slot(
                    "demo-right-1",
                    "hero-image",
                    SlotSide::Right,
                    json!({ "title": "Professional & Beautiful", "image": null }),
                ),
            ),
            demo_page(
                "demo-page-2",
                demo_slot(
                    "demo-left-2",
                    "quote-block",
                    SlotSide::Left,
                    json!({
                        "quote": "Design is not just what it looks like and feels like. Design is how it works.",
                        "author": "Steve Jobs"
                    }),
                ),
                demo_slot(
                    "demo-right-2",
                    "mixed-media",
                    SlotSide::Right,
                    json!({
                        "title": "Interactive Features",
                        "content": "Combine text, images and video links on the same spread.",
                        "image": null
                    }),
                ),
            ),
            demo_page(
                "demo-page-3",
                demo_slot(
                    "demo-left-3",
                    "photo-grid",
                    SlotSide::Left,
                    json!({ "images": [] }),
                ),
                demo_slot(
                    "demo-right-3",
                    "text-article",
                    SlotSide::Right,
                    json!({
                        "title": "Getting Started is Easy",
                        "content": "Choose a template, add your content, preview the book, share it."
                    }),
                ),
            ),
            demo_page(
                "demo-page-4",
                demo_slot(
                    "demo-left-4",
                    "text-article",
                    SlotSide::Left,
                    json!({
                        "title": "Ready to Begin?",
                        "content": "Create a new book from the library and start with a blank spread."
                    }),
                ),
                demo_slot(
                    "demo-right-4",
                    "hero-image",
                    SlotSide::Right,
                    json!({ "title": "Start Creating Today", "image": null }),
                ),
            ),
        ],
    }
}
