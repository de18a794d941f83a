/*!
Error types for the Podsnap core.
*/

use std::time::Duration;
use thiserror::Error;

/// Result type used throughout the Podsnap core.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Errors that can occur during snapshot lifecycle operations.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// I/O errors while talking to the orchestration API tooling
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A named resource does not exist
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    /// Invalid arguments or configuration
    #[error("Validation error: {0}")]
    Validation(String),

    /// A resource with the same name already exists
    #[error("{kind} '{name}' already exists in namespace '{namespace}'")]
    Conflict {
        kind: String,
        name: String,
        namespace: String,
    },

    /// A checkpoint did not reach a terminal state before its deadline
    #[error("Checkpoint '{trigger}' did not complete within {deadline:?}")]
    Timeout { trigger: String, deadline: Duration },

    /// The controller reported the checkpoint as failed
    #[error("Checkpoint '{trigger}' failed: {message}")]
    ControllerFailure {
        trigger: String,
        reason: Option<String>,
        message: String,
    },

    /// The snapshot controller is not installed or not healthy
    #[error("Snapshot controller is not ready: {0}")]
    ControllerUnavailable(String),

    /// Batch deletion finished with some failures
    #[error("Deleted {deleted} snapshot(s), {} deletion(s) failed: {}", .failures.len(), format_failures(.failures))]
    PartialDeletion {
        deleted: usize,
        failures: Vec<(String, String)>,
    },

    /// Orchestration API call failed
    #[error("API error: {0}")]
    Api(String),

    /// The sandbox is not in a usable state
    #[error("Sandbox error: {0}")]
    Sandbox(String),
}

impl SnapshotError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(msg: S) -> Self {
        Self::Api(msg.into())
    }

    /// Create a new sandbox error
    pub fn sandbox<S: Into<String>>(msg: S) -> Self {
        Self::Sandbox(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// True for errors that mean "the resource is not there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(name, error)| format!("{name}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}
