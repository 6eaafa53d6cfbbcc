//! Error handling module for wpprovision
//!
//! Provides the single error type returned by every provisioning step, built
//! with thiserror. Each variant knows the process exit code it maps to.

use std::time::Duration;

use thiserror::Error;

use crate::stage::StageTransitionError;

/// Main error type for provisioning runs
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The secret store could not be queried or returned nothing usable
    #[error("Secret retrieval failed: {0}")]
    SecretRetrieval(String),

    /// The secret payload was fetched but does not satisfy the bundle schema
    #[error("Secret validation failed: {0}")]
    SecretValidation(String),

    /// A command ran and exited unsuccessfully
    #[error("Command `{program}` failed (exit code {}): {stderr}", describe_code(code))]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A command could not be started at all
    #[error("Failed to spawn `{program}`: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A service never became ready within its timeout
    #[error("{probe} not ready after {:?}", timeout)]
    Readiness { probe: String, timeout: Duration },

    /// Instance metadata service errors
    #[error("Instance metadata error: {0}")]
    Metadata(String),

    /// Download and HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// A generated configuration file still contains template tokens
    #[error("Placeholder `{token}` still present in {path}")]
    Placeholder { token: String, path: String },

    /// A step needed context that an earlier stage should have produced
    #[error("{0} is not available yet (earlier stage did not run)")]
    NotLoaded(&'static str),

    /// Database credential verification errors
    #[error("Database verification failed: {0}")]
    Verification(String),

    /// Stage machine transition errors
    #[error("Stage transition error: {0}")]
    StageTransition(#[from] StageTransitionError),

    /// IO errors (file operations, archive extraction)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

impl ProvisionError {
    /// Create a secret retrieval error
    pub fn secret_retrieval(msg: impl Into<String>) -> Self {
        Self::SecretRetrieval(msg.into())
    }

    /// Create a secret validation error
    pub fn secret_validation(msg: impl Into<String>) -> Self {
        Self::SecretValidation(msg.into())
    }

    /// Create a metadata error
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a verification error
    pub fn verification(msg: impl Into<String>) -> Self {
        Self::Verification(msg.into())
    }

    /// Process exit code for this error.
    ///
    /// A failed command propagates its own non-zero code; everything else,
    /// including secret retrieval and validation, exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandFailed {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl From<reqwest::Error> for ProvisionError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
