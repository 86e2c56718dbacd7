//! Error types and classification.
//!
//! Gracekeeper distinguishes four kinds of failure: transient version
//! conflicts (absorbed by the engine's retry loops and never surfaced),
//! precondition failures (bad nodeid, missing object, exclusive create on an
//! existing object), transport errors from the object store, and corruption
//! of the grace object itself. Callers branch on the classification helpers
//! rather than on individual variants.

use crate::store::client::StoreError;
use thiserror::Error;

/// Grace-database error conditions.
#[derive(Debug, Error)]
pub enum GraceError {
    /// The epoch payload read back with the wrong length.
    ///
    /// The payload is exactly two little-endian u64 values; anything else
    /// means the object was damaged out of band.
    #[error("epoch payload is {len} bytes, expected 16")]
    BadPayload { len: usize },

    /// The node map holds more entries than the configured cap.
    #[error("node map scan exceeded the {cap}-entry cap")]
    MapOverflow { cap: usize },

    /// No grace period is in force but the node map is not empty.
    #[error("no grace period in force but the node map is not empty")]
    ResidualEntries,

    /// Nodeid failed validation.
    #[error("invalid nodeid: {nodeid}")]
    InvalidNodeId { nodeid: String },

    /// Takeover recovery was requested but the clustered backend cannot
    /// serve another node's recovery database.
    #[error("takeover recovery is not supported by the clustered backend")]
    TakeoverUnsupported,

    /// Object-store failure, surfaced unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GraceError {
    /// Create a bad-payload error for a short or long read.
    pub fn bad_payload(len: usize) -> Self {
        Self::BadPayload { len }
    }

    /// Create an invalid-nodeid error.
    pub fn invalid_nodeid(nodeid: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            nodeid: nodeid.into(),
        }
    }

    /// Check if this error means the grace object itself is damaged.
    ///
    /// Corruption aborts the current call; the host typically logs it and
    /// refuses to advance state.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::BadPayload { .. } | Self::MapOverflow { .. } | Self::ResidualEntries
        )
    }

    /// Check if the operation may be retried against the same store.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_transport())
    }
}

/// Result type using GraceError.
pub type GraceResult<T> = Result<T, GraceError>;
