//! Grace-period protocol.
//!
//! The epoch payload codec ([`payload`]), the per-node flag field
//! ([`flags`]), and the protocol engine itself ([`engine`]).

pub mod engine;
pub mod flags;
pub mod payload;

pub use engine::{
    GraceDb, GraceDump, DEFAULT_CONFLICT_BACKOFF, DEFAULT_MAX_ENTRIES, DEFAULT_NOTIFY_TIMEOUT,
};
pub use flags::NodeFlags;
pub use payload::{Epochs, PAYLOAD_SIZE};
