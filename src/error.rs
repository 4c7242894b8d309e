//! Error types for the conformance harness.
//!
//! These cover failures of the harness itself: malformed expectation
//! configuration, fixture layout problems, and engine invocation failures.
//! A test case that fails is never an error; it is an outcome.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for harness operations.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Malformed or contradictory expectation/configuration data.
    /// Fatal: aborts the run before any test case executes.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        /// Configuration file the error originated from, if known
        path: Option<PathBuf>,
    },

    /// Fixture/sidecar mismatch or unreadable fixture data.
    /// Fatal for the affected spec version; other versions continue.
    #[error("Discovery error [{spec_version}]: {message}")]
    Discovery {
        spec_version: String,
        message: String,
    },

    /// The engine executable cannot be invoked at all.
    #[error("Engine invocation error: {message}")]
    EngineInvocation { message: String },

    /// Filesystem access failure outside the categories above.
    #[error("File system error: {message}")]
    FileSystem {
        message: String,
        path: Option<PathBuf>,
        #[source]
        cause: std::io::Error,
    },
}

impl HarnessError {
    /// Create a configuration error with no file association.
    pub fn config<S: Into<String>>(message: S) -> Self {
        HarnessError::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error tied to a configuration file.
    pub fn config_in<S: Into<String>>(path: &Path, message: S) -> Self {
        HarnessError::Config {
            message: message.into(),
            path: Some(path.to_path_buf()),
        }
    }

    /// Create a discovery error for one spec version.
    pub fn discovery<V: Into<String>, S: Into<String>>(spec_version: V, message: S) -> Self {
        HarnessError::Discovery {
            spec_version: spec_version.into(),
            message: message.into(),
        }
    }

    /// Create an engine invocation error.
    pub fn engine_invocation<S: Into<String>>(message: S) -> Self {
        HarnessError::EngineInvocation {
            message: message.into(),
        }
    }

    /// Create a filesystem error with an optional path.
    pub fn filesystem<S: Into<String>>(
        message: S,
        path: Option<PathBuf>,
        cause: std::io::Error,
    ) -> Self {
        HarnessError::FileSystem {
            message: message.into(),
            path,
            cause,
        }
    }

    /// The spec version this error is scoped to, if any.
    pub fn spec_version(&self) -> Option<&str> {
        match self {
            HarnessError::Discovery { spec_version, .. } => Some(spec_version),
            _ => None,
        }
    }
}
