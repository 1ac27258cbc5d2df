use crate::matcher::DEFAULT_MATCH_THRESHOLD;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("match_threshold must be a finite, non-negative distance (got {0})")]
    InvalidThreshold(f32),
    #[error("queue_depth must be at least 1")]
    InvalidQueueDepth,
}

/// Runtime configuration shared by the daemon and the CLI.
///
/// Layered: built-in defaults, then an optional TOML file, then
/// `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory of labeled reference encodings.
    pub gallery_dir: PathBuf,
    /// Attendance ledger file.
    pub ledger_path: PathBuf,
    /// Maximum Euclidean distance accepted as a match.
    pub match_threshold: f32,
    /// Frames buffered between the frame reader and the engine thread.
    pub queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gallery_dir: PathBuf::from("known_faces"),
            ledger_path: PathBuf::from("attendance.csv"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            queue_depth: 4,
        }
    }
}

impl Config {
    /// Load configuration from `path` (or `ROLLCALL_CONFIG`) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("ROLLCALL_CONFIG").map(PathBuf::from));

        let config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.with_env_overrides().validated()
    }

    /// Parse a TOML config file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn with_env_overrides(self) -> Self {
        Self {
            gallery_dir: env_path("ROLLCALL_GALLERY_DIR").unwrap_or(self.gallery_dir),
            ledger_path: env_path("ROLLCALL_LEDGER_PATH").unwrap_or(self.ledger_path),
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", self.match_threshold),
            queue_depth: env_usize("ROLLCALL_QUEUE_DEPTH", self.queue_depth),
        }
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        if !self.match_threshold.is_finite() || self.match_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.match_threshold));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::InvalidQueueDepth);
        }
        Ok(self)
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
