//! Gracekeeper - coordinated NFSv4 grace-period database.
//!
//! Gracekeeper coordinates the NFSv4 grace period across a cluster of
//! stateless NFS server instances sharing a distributed object store. All
//! cluster state lives in a single shared *grace object*: a 16-byte epoch
//! payload (current epoch and reclaim epoch) plus a key-value map holding a
//! flag byte per node that needs or is recovering within a grace period.
//! Writers race through optimistic concurrency: every mutation asserts the
//! object version captured at read time and retries on conflict, and every
//! visible change broadcasts a payload-free notify so peers re-read.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Host NFS Server / Admin CLI                 │
//! │        lifecycle hooks, reaper thread  │  start / lift / dump   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Cluster Adapter (cluster::recovery)             │
//! │     join at boot │ enforcement │ lift │ recovery databases      │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Grace Protocol Engine (grace::engine)           │
//! │        read → decide → version-asserted write → notify          │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Object Store (store::ObjectStore)              │
//! │      atomic compound ops │ omap │ versions │ watch/notify       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error taxonomy and classification
//!
//! ## Object store
//! - [`store::op`] - Atomic read/write op builders and versions
//! - [`store::client`] - Backend trait and watch/notify surface
//! - [`store::memory`] - In-process reference backend
//!
//! ## Grace protocol
//! - [`grace::payload`] - Epoch payload codec
//! - [`grace::flags`] - Per-node flag field
//! - [`grace::engine`] - The protocol state machine
//!
//! ## Host integration
//! - [`cluster::backend`] - Host-server seam and recovery-db naming
//! - [`cluster::recovery`] - Lifecycle adapter
//!
//! ## CLI
//! - [`cli::commands`] - Admin tool implementation
//!
//! # Key Invariants
//!
//! - The current epoch is always at least 1; a reclaim epoch of 0 means no
//!   grace period is in force, and a non-zero reclaim epoch is always below
//!   the current epoch.
//! - Opening a grace period moves the current epoch into the reclaim slot
//!   and establishes a fresh epoch; only the write clearing the last
//!   recovering node closes it.
//! - Writers never hold locks: each successful call is exactly one
//!   version-asserted commit, and losers re-read fresh state.
//! - Notifies are pure wake-ups; correctness never depends on delivery.

// Core infrastructure
pub mod core;

// Object-store primitives
pub mod store;

// Grace protocol engine
pub mod grace;

// Host integration adapter
pub mod cluster;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error};
pub use cluster::{recovery_oid, ClientRecord, ClusterRecovery, HostServer};
pub use grace::{Epochs, GraceDb, GraceDump, NodeFlags};
pub use store::{MemoryStore, ObjectStore, StoreError};
