//! Host integration.
//!
//! The seam the host NFS server implements ([`backend`]) and the adapter
//! that drives the grace protocol from host lifecycle events
//! ([`recovery`]).

pub mod backend;
pub mod recovery;

pub use backend::{recovery_oid, ClientRecord, HostServer};
pub use recovery::ClusterRecovery;
