// ── Core error types ──
//
// Errors surfaced by the engine. Transport and store failures are
// translated into the run-level taxonomy: configuration problems fail
// closed, IO failures are scoped to a batch, resource-state problems skip
// the affected torrent or group, and fatal errors abort the run.

use thiserror::Error;

use crate::client::{ClientError, StoreError};
use crate::model::CollectionId;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ── Scoped failures ──────────────────────────────────────────────
    #[error("Transient IO error: {message}")]
    TransientIo {
        message: String,
        /// Whether an immediate retry could plausibly succeed.
        retryable: bool,
    },

    #[error("Resource state error: {message}")]
    ResourceState { message: String },

    // ── Run-level failures ───────────────────────────────────────────
    #[error("Run for collection {collection} aborted: {message}")]
    FatalRun {
        collection: CollectionId,
        message: String,
    },

    #[error("Run timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Run cancelled")]
    Cancelled,
}

impl CoreError {
    /// Wrap any error as a fatal failure of one collection's run.
    pub(crate) fn fatal(collection: CollectionId, err: impl std::fmt::Display) -> Self {
        Self::FatalRun {
            collection,
            message: err.to_string(),
        }
    }

    /// Returns `true` if the run as a whole must be abandoned.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalRun { .. } | Self::Cancelled)
    }
}

// ── Conversion from collaborator errors ──────────────────────────────

impl From<ClientError> for CoreError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::MissingData { message } => CoreError::ResourceState { message },
            other => CoreError::TransientIo {
                retryable: other.is_transient(),
                message: other.to_string(),
            },
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::TransientIo {
            message: err.to_string(),
            retryable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_maps_to_resource_state() {
        let err: CoreError = ClientError::MissingData {
            message: "no files".into(),
        }
        .into();
        assert!(matches!(err, CoreError::ResourceState { .. }));
    }

    #[test]
    fn timeouts_map_to_retryable_io() {
        let err: CoreError = ClientError::Timeout { timeout_secs: 5 }.into();
        assert!(matches!(
            err,
            CoreError::TransientIo {
                retryable: true,
                ..
            }
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn fatal_helper_carries_collection() {
        let err = CoreError::fatal(CollectionId(9), "boom");
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Run for collection 9 aborted: boom");
    }
}
