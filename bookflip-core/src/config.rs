use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gesture: GestureConfig,
    pub flip: FlipConfig,
    pub library: LibraryConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&raw).with_context(|| format!("failed to parse config file {:?}", path))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.gesture.validate()?;
        Ok(config)
    }
}

/// Drag-to-turn thresholds, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub max_drag_pixels: f32,
    pub commit_threshold_pixels: f32,
}

impl GestureConfig {
    /// Both distances must be finite and not negative.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("max_drag_pixels", self.max_drag_pixels),
            ("commit_threshold_pixels", self.commit_threshold_pixels),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("gesture.{} must be a non-negative number, got {}", name, value);
            }
        }
        Ok(())
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            max_drag_pixels: 300.0,
            commit_threshold_pixels: 80.0,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlipConfig {
    #[serde(rename = "commit_duration_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub commit_duration: Duration,
    #[serde(rename = "settle_duration_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub settle_duration: Duration,
}

impl Default for FlipConfig {
    fn default() -> Self {
        Self {
            commit_duration: Duration::from_millis(800),
            settle_duration: Duration::from_millis(400),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Upper bound for the serialized library, mirroring a browser storage quota.
    pub quota_bytes: usize,
    /// How many projects survive the last-resort trim when the quota is hit.
    pub keep_recent: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            quota_bytes: 5 * 1024 * 1024,
            keep_recent: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
