//! Harness configuration.
//!
//! Run parameters come from three layers: built-in defaults, the optional
//! `~/.wdl-conformance` TOML file, and command-line flags (flags win).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::HarnessError;

/// Run-level configuration for the harness scheduler.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Maximum number of engine invocations in flight at once
    pub concurrency: usize,

    /// Per-test-case deadline (never global)
    pub timeout: Duration,

    /// Optional test-name filter; only matching cases are dispatched
    pub pattern: Option<Regex>,

    /// Emit per-case progress on stderr
    pub debug: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            timeout: Duration::from_secs(60),
            pattern: None,
            debug: false,
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validate configuration before a run starts.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.concurrency == 0 {
            return Err(HarnessError::config("concurrency must be greater than 0"));
        }
        if self.timeout.is_zero() {
            return Err(HarnessError::config("timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// Defaults loaded from the user's `~/.wdl-conformance` file.
#[derive(Default, Serialize, Deserialize, Clone)]
pub struct FileDefaults {
    #[serde(rename = "ENGINE", skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(rename = "CONCURRENCY", skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(rename = "TIMEOUT_SECS", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(rename = "DEBUG", skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
}

pub fn defaults_file_path() -> Result<PathBuf, String> {
    if let Some(home) = env::var_os("HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home).join(".wdl-conformance"));
        }
    }

    if cfg!(windows) {
        if let Some(profile) = env::var_os("USERPROFILE") {
            if !profile.is_empty() {
                return Ok(PathBuf::from(profile).join(".wdl-conformance"));
            }
        }
    }

    Err("Unable to determine home directory; pass all options as flags".to_string())
}

pub fn load_defaults(path: &PathBuf) -> Result<FileDefaults, String> {
    match fs::read_to_string(path) {
        Ok(contents) => toml::from_str::<FileDefaults>(&contents)
            .map_err(|e| format!("Failed to parse {} as TOML: {}", path.display(), e)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(FileDefaults::default()),
        Err(err) => Err(format!("Failed to read {}: {}", path.display(), err)),
    }
}
