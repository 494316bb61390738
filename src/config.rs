//! Configuration types for Netreplay

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codec::VolatileHeaders;
use crate::fingerprint::{Fingerprinter, DEFAULT_FINGERPRINT_BYTES};
use crate::{ReplayError, Result};

/// Operating mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Serve from fixtures only; a missing fixture is an error
    #[default]
    Replay,
    /// Perform live calls and persist them as fixtures
    Record,
}

impl Mode {
    /// Mode for a recording flag
    #[must_use]
    pub fn from_recording(recording_enabled: bool) -> Self {
        if recording_enabled {
            Self::Record
        } else {
            Self::Replay
        }
    }

    /// Whether live calls are recorded
    pub fn is_record(self) -> bool {
        self == Self::Record
    }

    /// Whether only fixtures are served
    pub fn is_replay(self) -> bool {
        self == Self::Replay
    }
}

/// Configuration of one record/replay session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// File whose parent directory holds `__fixtures__/`
    pub directory_hint: PathBuf,
    /// Session folder name, also the fingerprint caller context
    pub session_name: String,
    /// Operating mode
    #[serde(default)]
    pub mode: Mode,
    /// URL keywords to intercept; empty intercepts everything
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    /// Exact header names never persisted; `None` drops names containing "date"
    #[serde(default)]
    pub volatile_headers: Option<Vec<String>>,
    /// Digest bytes kept in each fingerprint
    #[serde(default = "default_fingerprint_bytes")]
    pub fingerprint_bytes: usize,
}

fn default_fingerprint_bytes() -> usize {
    DEFAULT_FINGERPRINT_BYTES
}

impl SessionConfig {
    /// Build a session configuration with default tunables
    #[must_use]
    pub fn new(
        directory_hint: impl Into<PathBuf>,
        session_name: &str,
        recording_enabled: bool,
        allowed_domains: Vec<String>,
    ) -> Self {
        Self {
            directory_hint: directory_hint.into(),
            session_name: session_name.to_string(),
            mode: Mode::from_recording(recording_enabled),
            allowed_domains,
            volatile_headers: None,
            fingerprint_bytes: DEFAULT_FINGERPRINT_BYTES,
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReplayError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ReplayError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.session_name.trim().is_empty() {
            return Err(ReplayError::ConfigError(
                "session_name cannot be empty".to_string(),
            ));
        }

        self.fingerprinter()?;

        if let Some(i) = self.allowed_domains.iter().position(String::is_empty) {
            return Err(ReplayError::ConfigError(format!(
                "allowed_domains[{i}] cannot be empty"
            )));
        }

        Ok(())
    }

    /// Whether live calls are recorded
    pub fn recording_enabled(&self) -> bool {
        self.mode.is_record()
    }

    /// Header rule used by the fixture codec
    #[must_use]
    pub fn volatile_rule(&self) -> VolatileHeaders {
        self.volatile_headers
            .clone()
            .map_or_else(VolatileHeaders::default, VolatileHeaders::Denylist)
    }

    /// Fingerprinter for this session
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `fingerprint_bytes` is out of range
    pub fn fingerprinter(&self) -> Result<Fingerprinter> {
        Fingerprinter::try_new(self.fingerprint_bytes)
    }
}
