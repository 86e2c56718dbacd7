//! Grace-database protocol engine.
//!
//! Every operation follows the same template: read the epoch payload and the
//! node-map entries of interest in one atomic snapshot, capture the commit
//! version, decide the target state, then issue an atomic write conditioned
//! on that version. A version conflict restarts the whole decision against
//! fresh state; nothing is carried forward between attempts. Successful
//! state changes broadcast a best-effort notify so peers re-read.
//!
//! The engine is synchronous and thread-agnostic: it spawns no threads,
//! holds no locks, and caches no epoch state between calls.

use super::flags::NodeFlags;
use super::payload::{Epochs, PAYLOAD_SIZE};
use crate::core::error::{GraceError, GraceResult};
use crate::store::{CreateMode, ObjectStore, ReadOp, ReadReply, WriteOp};
use bytes::Bytes;
use std::time::Duration;

/// Default cap on node-map entries per scan.
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Default notify broadcast timeout.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default base pause between version-conflict retries.
pub const DEFAULT_CONFLICT_BACKOFF: Duration = Duration::from_millis(1);

/// A snapshot of the grace object for display.
#[derive(Debug, Clone)]
pub struct GraceDump {
    /// The epoch payload.
    pub epochs: Epochs,
    /// Node-map entries in key order.
    pub nodes: Vec<(String, NodeFlags)>,
}

/// Handle to the shared grace object.
///
/// Generic over the backing [`ObjectStore`]; cheap to construct, so callers
/// may build one per call site or hold one long-term.
#[derive(Debug, Clone)]
pub struct GraceDb<S> {
    store: S,
    oid: String,
    max_entries: usize,
    notify_timeout: Duration,
    conflict_backoff: Duration,
}

impl<S: ObjectStore> GraceDb<S> {
    /// Create a handle to the grace object named `oid`.
    pub fn new(store: S, oid: impl Into<String>) -> Self {
        Self {
            store,
            oid: oid.into(),
            max_entries: DEFAULT_MAX_ENTRIES,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            conflict_backoff: DEFAULT_CONFLICT_BACKOFF,
        }
    }

    /// Override the node-map entry cap.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Override the notify broadcast timeout.
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Override the base pause between conflict retries. Zero disables the
    /// pause entirely.
    pub fn with_conflict_backoff(mut self, backoff: Duration) -> Self {
        self.conflict_backoff = backoff;
        self
    }

    /// Object name this handle operates on.
    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// Create the grace object with `cur=1, rec=0` and an empty node map.
    ///
    /// Returns `true` if this call created the object and `false` if it
    /// already existed; both are success for host-side callers.
    pub fn create(&self) -> GraceResult<bool> {
        let op = WriteOp::new()
            .create(CreateMode::Exclusive)
            .write_full(Epochs::initial().encode());
        match self.store.write(&self.oid, op) {
            Ok(_) => Ok(true),
            Err(crate::store::StoreError::AlreadyExists { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Read the current epoch payload.
    pub fn epochs(&self) -> GraceResult<Epochs> {
        let reply = self
            .store
            .read(&self.oid, ReadOp::new().read(0, PAYLOAD_SIZE))?;
        Epochs::decode(&reply.data)
    }

    /// Read the epoch payload and every node-map entry.
    pub fn dump(&self) -> GraceResult<GraceDump> {
        let reply = self.read_full()?;
        let epochs = Epochs::decode(&reply.data)?;
        let nodes = reply
            .vals
            .iter()
            .map(|(k, v)| (k.clone(), NodeFlags::decode(v)))
            .collect();
        Ok(GraceDump { epochs, nodes })
    }

    /// Begin (or re-enter) a grace period on behalf of `nodeids`.
    ///
    /// Opens a new epoch when no grace period is in force; otherwise the
    /// payload is left alone and the call degrades to a membership update.
    /// Listed nodes are stamped as roster members needing a grace period.
    pub fn start(&self, nodeids: &[&str]) -> GraceResult<Epochs> {
        self.start_inner(nodeids, true, NodeFlags::MEMBER | NodeFlags::NEED_GRACE)
    }

    /// Join an already-active grace period.
    ///
    /// When no grace period is in force the object is left untouched and
    /// the returned `rec` of 0 tells the caller reclaim is not allowed.
    pub fn join(&self, nodeid: &str) -> GraceResult<Epochs> {
        self.start_inner(&[nodeid], false, NodeFlags::NEED_GRACE)
    }

    /// Join, starting a fresh grace period if none is in force.
    ///
    /// Used at boot and on clean shutdown: the node announces that it needs
    /// a grace period and is enforcing locally.
    pub fn force_join(&self, nodeid: &str) -> GraceResult<Epochs> {
        self.start_inner(
            &[nodeid],
            true,
            NodeFlags::NEED_GRACE | NodeFlags::ENFORCING,
        )
    }

    /// Complete the grace period on behalf of `nodeids`.
    ///
    /// Matched entries are removed from the node map; the write that clears
    /// the last entries also sets `rec` to 0, fully lifting the grace
    /// period. Nodeids absent from the map are ignored.
    pub fn lift(&self, nodeids: &[&str]) -> GraceResult<Epochs> {
        self.lift_inner(nodeids)
    }

    /// Single-node [`lift`](Self::lift). A nodeid absent from the map is a
    /// no-op returning the current epochs.
    pub fn done(&self, nodeid: &str) -> GraceResult<Epochs> {
        self.lift_inner(&[nodeid])
    }

    /// True iff the node's entry is present with the member flag set.
    pub fn member(&self, nodeid: &str) -> GraceResult<bool> {
        self.check_flag(nodeid, NodeFlags::MEMBER)
    }

    /// Announce that this node is enforcing the grace period locally.
    pub fn enforcing_on(&self, nodeid: &str) -> GraceResult<Epochs> {
        self.set_enforcing(nodeid, true)
    }

    /// Announce that this node has returned to normal operation.
    pub fn enforcing_off(&self, nodeid: &str) -> GraceResult<Epochs> {
        self.set_enforcing(nodeid, false)
    }

    /// True iff the node's entry is present with the enforcing flag set.
    pub fn enforcing_check(&self, nodeid: &str) -> GraceResult<bool> {
        self.check_flag(nodeid, NodeFlags::ENFORCING)
    }

    fn start_inner(
        &self,
        nodeids: &[&str],
        force: bool,
        or_flags: NodeFlags,
    ) -> GraceResult<Epochs> {
        for nodeid in nodeids {
            validate_nodeid(nodeid)?;
        }

        let mut attempt = 0u32;
        loop {
            let reply = self.read_full()?;
            let mut epochs = Epochs::decode(&reply.data)?;

            // A plain join of a quiescent cluster changes nothing; rec=0
            // in the result tells the caller reclaim is not allowed.
            if !epochs.in_grace() && !force {
                return Ok(epochs);
            }

            let mut op = WriteOp::new().assert_version(reply.version);
            if !epochs.in_grace() {
                epochs = epochs.open_grace();
                op = op.write_full(epochs.encode());
            }

            let sets: Vec<(String, Bytes)> = nodeids
                .iter()
                .map(|nodeid| {
                    let existing = reply
                        .val(nodeid)
                        .map(|blob| NodeFlags::decode(blob))
                        .unwrap_or_default();
                    ((*nodeid).to_string(), (existing | or_flags).encode())
                })
                .collect();
            op = op.omap_set(sets);

            match self.store.write(&self.oid, op) {
                Ok(_) => {
                    self.notify_changed();
                    return Ok(epochs);
                }
                Err(err) if err.is_version_mismatch() => self.conflict_pause(&mut attempt),
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn lift_inner(&self, nodeids: &[&str]) -> GraceResult<Epochs> {
        for nodeid in nodeids {
            validate_nodeid(nodeid)?;
        }

        let mut attempt = 0u32;
        loop {
            let reply = self.read_full()?;
            let epochs = Epochs::decode(&reply.data)?;

            // Outside a grace period the map must be empty; any leftover
            // entry means the object is damaged.
            if !epochs.in_grace() {
                if !reply.vals.is_empty() {
                    return Err(GraceError::ResidualEntries);
                }
                return Ok(epochs);
            }

            let matched: Vec<String> = reply
                .vals
                .iter()
                .filter(|(key, _)| nodeids.contains(&key.as_str()))
                .map(|(key, _)| key.clone())
                .collect();
            if matched.is_empty() {
                return Ok(epochs);
            }

            // The write that clears the last entry still needing a grace
            // period also ends it.
            let lifts_fully = reply
                .vals
                .iter()
                .filter(|(key, _)| !matched.contains(key))
                .all(|(_, blob)| !NodeFlags::decode(blob).contains(NodeFlags::NEED_GRACE));
            let mut op = WriteOp::new()
                .assert_version(reply.version)
                .omap_rm_keys(matched);
            let mut next = epochs;
            if lifts_fully {
                next = epochs.close_grace();
                op = op.write_full(next.encode());
            }

            match self.store.write(&self.oid, op) {
                Ok(_) => {
                    self.notify_changed();
                    return Ok(next);
                }
                Err(err) if err.is_version_mismatch() => self.conflict_pause(&mut attempt),
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn set_enforcing(&self, nodeid: &str, on: bool) -> GraceResult<Epochs> {
        validate_nodeid(nodeid)?;

        let mut attempt = 0u32;
        loop {
            let reply = self.store.read(
                &self.oid,
                ReadOp::new()
                    .read(0, PAYLOAD_SIZE)
                    .omap_get_vals(nodeid, None, 1),
            )?;
            let epochs = Epochs::decode(&reply.data)?;
            let current = reply.val(nodeid).map(|blob| NodeFlags::decode(blob));

            let op = if on {
                let flags = current.unwrap_or_default();
                if flags.contains(NodeFlags::ENFORCING) {
                    return Ok(epochs);
                }
                WriteOp::new().assert_version(reply.version).omap_set([(
                    nodeid.to_string(),
                    (flags | NodeFlags::ENFORCING).encode(),
                )])
            } else {
                let Some(flags) = current else {
                    return Ok(epochs);
                };
                if !flags.contains(NodeFlags::ENFORCING) {
                    return Ok(epochs);
                }
                let next = flags.difference(NodeFlags::ENFORCING);
                if next.is_empty() {
                    // All flags clear reads the same as no entry at all.
                    WriteOp::new()
                        .assert_version(reply.version)
                        .omap_rm_keys([nodeid.to_string()])
                } else {
                    WriteOp::new()
                        .assert_version(reply.version)
                        .omap_set([(nodeid.to_string(), next.encode())])
                }
            };

            match self.store.write(&self.oid, op) {
                Ok(_) => {
                    self.notify_changed();
                    return Ok(epochs);
                }
                Err(err) if err.is_version_mismatch() => self.conflict_pause(&mut attempt),
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn check_flag(&self, nodeid: &str, flag: NodeFlags) -> GraceResult<bool> {
        validate_nodeid(nodeid)?;
        // The exact key sorts first among keys sharing its prefix, so one
        // entry is enough to decide presence.
        let reply = self
            .store
            .read(&self.oid, ReadOp::new().omap_get_vals(nodeid, None, 1))?;
        Ok(reply
            .vals
            .first()
            .is_some_and(|(key, blob)| key == nodeid && NodeFlags::decode(blob).contains(flag)))
    }

    fn read_full(&self) -> GraceResult<ReadReply> {
        let reply = self.store.read(
            &self.oid,
            ReadOp::new()
                .read(0, PAYLOAD_SIZE)
                .omap_get_vals("", None, self.max_entries),
        )?;
        if reply.more {
            return Err(GraceError::MapOverflow {
                cap: self.max_entries,
            });
        }
        Ok(reply)
    }

    fn notify_changed(&self) {
        if let Err(err) = self.store.notify(&self.oid, self.notify_timeout) {
            tracing::warn!(oid = %self.oid, error = %err, "grace change notify failed");
        }
    }

    fn conflict_pause(&self, attempt: &mut u32) {
        *attempt += 1;
        tracing::debug!(oid = %self.oid, attempt = *attempt, "version conflict, retrying");
        if !self.conflict_backoff.is_zero() {
            let shift = (*attempt - 1).min(6);
            std::thread::sleep(self.conflict_backoff * (1u32 << shift));
        }
    }
}

fn validate_nodeid(nodeid: &str) -> GraceResult<()> {
    if nodeid.is_empty()
        || nodeid
            .chars()
            .any(|c| c.is_control() || c.is_whitespace())
    {
        return Err(GraceError::invalid_nodeid(nodeid));
    }
    Ok(())
}
