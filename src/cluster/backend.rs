//! Host-server seam and recovery-database naming.
//!
//! The NFS server proper is an external collaborator. [`HostServer`] is the
//! narrow surface the cluster adapter needs from it: enter a local grace
//! period, snapshot the confirmed client records, and wake the reaper
//! thread that re-examines grace state.

use bytes::Bytes;

/// A stable client record from the host's recovery database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    /// Record key, e.g. a client owner string.
    pub key: String,
    /// Opaque record payload.
    pub value: Bytes,
}

impl ClientRecord {
    /// Create a record from its parts.
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Callbacks the host NFS server provides to the cluster adapter.
///
/// Implementations must be re-entrant: `wake_reaper` runs on the object
/// client's watch-dispatch thread while engine calls may be in flight.
pub trait HostServer: Send + Sync {
    /// Transition the host into its local grace period for `epoch`.
    fn enter_grace(&self, epoch: u64);

    /// Snapshot of the currently confirmed client records, copied into the
    /// fresh recovery database when a cluster grace begins.
    fn confirmed_clients(&self) -> Vec<ClientRecord>;

    /// Wake the host's reaper so it re-reads grace state.
    fn wake_reaper(&self);
}

/// Name of the per-node recovery database for `epoch`.
///
/// The epoch renders as 16 lowercase hex digits so names sort by epoch
/// within a node.
pub fn recovery_oid(epoch: u64, nodeid: &str) -> String {
    format!("rec-{epoch:016x}:{nodeid}")
}
