use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LibraryConfig;
use crate::BookProject;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("library needs {needed} bytes but the quota is {quota}")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("library I/O failed for {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode library")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub trait ProjectStore: Send + Sync {
    fn list(&self) -> Result<Vec<BookProject>, StoreError>;
    fn get(&self, id: &str) -> Result<Option<BookProject>, StoreError>;
    /// Inserts or replaces by id. Replacing refreshes `updated_at`.
    fn save(&self, project: &BookProject) -> Result<(), StoreError>;
    fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Every project in one JSON document, the layout a browser key-value slot would hold.
pub struct FileProjectStore {
    path: PathBuf,
    config: LibraryConfig,
}

impl FileProjectStore {
    pub fn new(path: PathBuf, config: LibraryConfig) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
        }
        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<BookProject>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(&self.path, err)),
        };
        match serde_json::from_str(&raw) {
            Ok(projects) => Ok(projects),
            Err(err) => {
                warn!(?err, path = ?self.path, "unreadable library, starting empty");
                Ok(Vec::new())
            }
        }
    }

    fn write_all(&self, projects: Vec<BookProject>, keep: Option<&str>) -> Result<(), StoreError> {
        let payload = fit_to_quota(projects, keep, &self.config)?;
        let tmp = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp).map_err(|err| StoreError::io(&tmp, err))?;
        file.write_all(&payload)
            .and_then(|_| file.flush())
            .map_err(|err| StoreError::io(&tmp, err))?;
        fs::rename(&tmp, &self.path).map_err(|err| StoreError::io(&self.path, err))?;
        Ok(())
    }
}

impl ProjectStore for FileProjectStore {
    fn list(&self) -> Result<Vec<BookProject>, StoreError> {
        self.read_all()
    }

    fn get(&self, id: &str) -> Result<Option<BookProject>, StoreError> {
        Ok(self.read_all()?.into_iter().find(|project| project.id == id))
    }

    fn save(&self, project: &BookProject) -> Result<(), StoreError> {
        let mut projects = self.read_all()?;
        match projects.iter_mut().find(|existing| existing.id == project.id) {
            Some(existing) => {
                *existing = project.clone();
                existing.updated_at = Utc::now();
            }
            None => projects.push(project.clone()),
        }
        self.write_all(projects, Some(&project.id))
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut projects = self.read_all()?;
        let before = projects.len();
        projects.retain(|project| project.id != id);
        if projects.len() == before {
            return Ok(false);
        }
        self.write_all(projects, None)?;
        Ok(true)
    }
}

/// Serializes the library, shedding projects until it fits the quota: first demo
/// books, then everything but the `keep_recent` most recently updated. The project
/// named by `keep` is never dropped.
fn fit_to_quota(
    mut projects: Vec<BookProject>,
    keep: Option<&str>,
    config: &LibraryConfig,
) -> Result<Vec<u8>, StoreError> {
    let payload = serde_json::to_vec(&projects)?;
    if payload.len() <= config.quota_bytes {
        return Ok(payload);
    }

    let is_kept = |project: &BookProject| keep == Some(project.id.as_str());
    let before = projects.len();
    projects.retain(|project| is_kept(project) || !project.is_demo());
    warn!(
        size = payload.len(),
        quota = config.quota_bytes,
        dropped = before - projects.len(),
        "library over quota, dropped demo projects"
    );
    let payload = serde_json::to_vec(&projects)?;
    if payload.len() <= config.quota_bytes {
        return Ok(payload);
    }

    projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    let mut trimmed = Vec::with_capacity(config.keep_recent.max(1));
    if let Some(position) = projects.iter().position(|project| is_kept(project)) {
        trimmed.push(projects.remove(position));
    }
    let room = config.keep_recent.saturating_sub(trimmed.len());
    trimmed.extend(projects.into_iter().take(room));
    trimmed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    warn!(
        kept = trimmed.len(),
        keep_recent = config.keep_recent,
        "library still over quota, trimmed to most recent projects"
    );

    let payload = serde_json::to_vec(&trimmed)?;
    if payload.len() <= config.quota_bytes {
        Ok(payload)
    } else {
        Err(StoreError::QuotaExceeded {
            needed: payload.len(),
            quota: config.quota_bytes,
        })
    }
}

/// Process-local store with no quota, used for tests and throwaway sessions.
pub struct MemoryProjectStore {
    inner: Mutex<HashMap<String, BookProject>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectStore for MemoryProjectStore {
    fn list(&self) -> Result<Vec<BookProject>, StoreError> {
        Ok(self.inner.lock().values().cloned().collect())
    }

    fn get(&self, id: &str) -> Result<Option<BookProject>, StoreError> {
        Ok(self.inner.lock().get(id).cloned())
    }

    fn save(&self, project: &BookProject) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let mut stored = project.clone();
        if inner.contains_key(&project.id) {
            stored.updated_at = Utc::now();
        }
        debug!(id = %project.id, "saved project in memory");
        inner.insert(project.id.clone(), stored);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().remove(id).is_some())
    }
}
