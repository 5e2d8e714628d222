//! Configuration for the file handler and the demo server

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::cache::DEFAULT_CACHE_TTL;
use crate::fs::DEFAULT_MAX_IDLE_READERS;

/// Default listen address of the demo server
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// Handler construction parameters
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory served as `/`
    pub root: PathBuf,
    /// Leading request path segments removed before lookup
    pub strip_slashes: i64,
    /// Lifetime of a cached resource in seconds
    pub cache_ttl_secs: u64,
    /// Idle reader cursors kept for reuse
    pub max_idle_readers: usize,
    /// Demo server listen address
    pub listen: String,
}

impl Config {
    pub fn new(root: impl Into<PathBuf>, strip_slashes: i64) -> Self {
        Self {
            root: root.into(),
            strip_slashes,
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!("config: {path:?} does not exist"));
        }
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_json::from_str(&s).with_context(|| format!("Invalid config: {:?}", path))
    }

    /// Served root with trailing slashes trimmed, `.` when empty
    ///
    /// A lone `/` is kept as the filesystem root.
    pub fn root_dir(&self) -> PathBuf {
        match self.root.to_str() {
            Some("") => PathBuf::from("."),
            Some(root) => {
                let trimmed = root.trim_end_matches('/');
                if trimmed.is_empty() {
                    PathBuf::from("/")
                } else {
                    PathBuf::from(trimmed)
                }
            }
            None => self.root.clone(),
        }
    }

    /// Strip count with negative values clamped to zero
    pub fn strip_count(&self) -> usize {
        usize::try_from(self.strip_slashes.max(0)).unwrap_or(usize::MAX)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            strip_slashes: 0,
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            max_idle_readers: DEFAULT_MAX_IDLE_READERS,
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}
