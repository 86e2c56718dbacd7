//! Clustered recovery adapter.
//!
//! `ClusterRecovery` binds the grace protocol to the host NFS server's
//! lifecycle: join at startup, per-request enforcement announcements,
//! completion and lift, clean shutdown, and reaction to notifies from
//! peers. It also owns the per-node recovery-database objects, which live
//! in the same object store and are named from the epoch payload.

use super::backend::{recovery_oid, ClientRecord, HostServer};
use crate::core::config::Config;
use crate::core::error::{GraceError, GraceResult};
use crate::grace::{Epochs, GraceDb};
use crate::store::{
    CreateMode, NotifyEvent, ObjectStore, ReadOp, StoreError, WatchCallback, WatchCookie, WriteOp,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Batch size for recovery-database traversal.
const RECOVERY_SCAN_BATCH: usize = 256;

#[derive(Debug, Default)]
struct AdapterState {
    watch: Option<WatchCookie>,
    recov_oid: Option<String>,
    recov_old_oid: Option<String>,
    local_grace_epoch: Option<u64>,
}

/// Host-side adapter around the grace protocol engine.
pub struct ClusterRecovery<S, H> {
    store: S,
    host: Arc<H>,
    nodeid: String,
    grace_oid: String,
    max_entries: usize,
    notify_timeout: Duration,
    conflict_backoff: Duration,
    state: Mutex<AdapterState>,
}

impl<S: ObjectStore, H: HostServer> ClusterRecovery<S, H> {
    /// Create an adapter for `nodeid` against the given store and host.
    pub fn new(store: S, host: Arc<H>, nodeid: impl Into<String>) -> Self {
        Self {
            store,
            host,
            nodeid: nodeid.into(),
            grace_oid: "grace".to_string(),
            max_entries: crate::grace::DEFAULT_MAX_ENTRIES,
            notify_timeout: crate::grace::DEFAULT_NOTIFY_TIMEOUT,
            conflict_backoff: crate::grace::DEFAULT_CONFLICT_BACKOFF,
            state: Mutex::new(AdapterState::default()),
        }
    }

    /// Create an adapter wired from configuration (grace object name,
    /// node-map cap, notify timeout, nodeid with hostname fallback).
    pub fn from_config(store: S, host: Arc<H>, config: &Config) -> anyhow::Result<Self> {
        let nodeid = config.node.resolve_nodeid()?;
        let mut adapter = Self::new(store, host, nodeid);
        adapter.grace_oid = config.store.object.clone();
        adapter.max_entries = config.grace.max_entries;
        adapter.notify_timeout = Duration::from_millis(config.grace.notify_timeout_ms);
        adapter.conflict_backoff = Duration::from_millis(config.grace.conflict_backoff_ms);
        Ok(adapter)
    }

    /// Override the grace object name.
    pub fn with_grace_oid(mut self, oid: impl Into<String>) -> Self {
        self.grace_oid = oid.into();
        self
    }

    /// This node's identifier.
    pub fn nodeid(&self) -> &str {
        &self.nodeid
    }

    /// Current and old recovery-database names, when known.
    pub fn recovery_oids(&self) -> (Option<String>, Option<String>) {
        let state = self.state.lock();
        (state.recov_oid.clone(), state.recov_old_oid.clone())
    }

    /// Connect-time initialization.
    ///
    /// Ensures the grace object exists, installs a watch whose callback
    /// acknowledges the notify and wakes the host reaper, and checks
    /// cluster membership. A failed membership check is a signal to the
    /// host, not a protocol action, so it logs a warning rather than
    /// failing init.
    pub fn init(&self) -> GraceResult<()>
    where
        S: Clone + Send + Sync + 'static,
        H: 'static,
    {
        if self.grace().create()? {
            tracing::info!(oid = %self.grace_oid, "created grace database");
        } else {
            tracing::debug!(oid = %self.grace_oid, "grace database already present");
        }

        let store = self.store.clone();
        let host = Arc::clone(&self.host);
        let callback: WatchCallback = Arc::new(move |event: NotifyEvent| {
            // Ack first so the notifier is not kept waiting on us.
            if let Err(err) = store.notify_ack(&event.oid, event.notify_id, event.cookie) {
                tracing::warn!(oid = %event.oid, error = %err, "notify ack failed");
            }
            host.wake_reaper();
        });
        let cookie = self.store.watch(&self.grace_oid, callback)?;
        self.state.lock().watch = Some(cookie);

        if !self.grace().member(&self.nodeid)? {
            tracing::warn!(nodeid = %self.nodeid, "node is not on the cluster membership roster");
        }
        Ok(())
    }

    /// Startup join and recovery-database handover.
    ///
    /// Joins the active grace period, creates (or clears) the new recovery
    /// database for the current epoch, and, when reclaim is allowed, feeds
    /// each record of the old epoch's database to `add_client`. With no
    /// grace period in force the returned `rec` of 0 means no reclaim and
    /// no old database.
    ///
    /// Takeover of another node's state is not supported by this backend.
    pub fn read_clids(
        &self,
        takeover_node: Option<&str>,
        mut add_client: impl FnMut(ClientRecord),
    ) -> GraceResult<Epochs> {
        if let Some(node) = takeover_node {
            tracing::warn!(node, "takeover requested but unsupported by clustered backend");
            return Err(GraceError::TakeoverUnsupported);
        }

        let epochs = self.grace().join(&self.nodeid)?;

        let recov = recovery_oid(epochs.cur, &self.nodeid);
        self.store.write(
            &recov,
            WriteOp::new().create(CreateMode::Idempotent).omap_clear(),
        )?;

        {
            let mut state = self.state.lock();
            state.recov_oid = Some(recov);
            if epochs.in_grace() {
                state.recov_old_oid = Some(recovery_oid(epochs.rec, &self.nodeid));
                state.local_grace_epoch = Some(epochs.cur);
            }
        }

        if !epochs.in_grace() {
            tracing::info!(nodeid = %self.nodeid, "no grace period in force, reclaim not allowed");
            return Ok(epochs);
        }

        let old = recovery_oid(epochs.rec, &self.nodeid);
        self.traverse_recovery(&old, &mut add_client)?;
        Ok(epochs)
    }

    /// Enter a grace period started elsewhere in the cluster.
    ///
    /// Called on reaper wake. Reads fresh epochs; if a grace period is in
    /// force and this node has not yet entered it, transitions the host
    /// into local grace and snapshots the confirmed client records into
    /// the new epoch's recovery database.
    pub fn maybe_start_grace(&self) -> GraceResult<()> {
        let epochs = self.grace().epochs()?;
        if !epochs.in_grace() {
            return Ok(());
        }
        if self.state.lock().local_grace_epoch == Some(epochs.cur) {
            return Ok(());
        }

        tracing::info!(
            epoch = epochs.cur,
            reclaim = epochs.rec,
            "entering grace period started elsewhere in the cluster"
        );
        self.host.enter_grace(epochs.cur);

        let recov = recovery_oid(epochs.cur, &self.nodeid);
        let records: Vec<(String, Bytes)> = self
            .host
            .confirmed_clients()
            .into_iter()
            .map(|record| (record.key, record.value))
            .collect();
        self.store.write(
            &recov,
            WriteOp::new()
                .create(CreateMode::Idempotent)
                .omap_clear()
                .omap_set(records),
        )?;

        let mut state = self.state.lock();
        state.recov_oid = Some(recov);
        state.recov_old_oid = Some(recovery_oid(epochs.rec, &self.nodeid));
        state.local_grace_epoch = Some(epochs.cur);
        Ok(())
    }

    /// Ask for a new cluster-wide grace period on this node's behalf.
    pub fn request_grace(&self) -> GraceResult<Epochs> {
        self.grace().start(&[self.nodeid.as_str()])
    }

    /// Announce local enforcement of the grace period.
    pub fn set_enforcing(&self) -> GraceResult<Epochs> {
        self.grace().enforcing_on(&self.nodeid)
    }

    /// Check whether this node is recorded as enforcing.
    pub fn grace_enforcing(&self) -> GraceResult<bool> {
        self.grace().enforcing_check(&self.nodeid)
    }

    /// Report this node's recovery as complete.
    ///
    /// Returns `true` when the grace period is lifted cluster-wide, i.e.
    /// this node cleared the last remaining entry.
    pub fn try_lift_grace(&self) -> GraceResult<bool> {
        let epochs = self.grace().done(&self.nodeid)?;
        Ok(!epochs.in_grace())
    }

    /// Leave local grace: stop enforcing and drop the old recovery
    /// database. Removal failures are logged, never fatal.
    pub fn end_grace(&self) -> GraceResult<()> {
        self.grace().enforcing_off(&self.nodeid)?;

        let old = {
            let mut state = self.state.lock();
            state.local_grace_epoch = None;
            state.recov_old_oid.take()
        };
        if let Some(old) = old {
            if let Err(err) = self.store.write(&old, WriteOp::new().remove()) {
                tracing::warn!(oid = %old, error = %err, "failed to remove old recovery database");
            }
        }
        Ok(())
    }

    /// Clean shutdown: mark intent to rejoin on restart and drop the
    /// watch. Both steps are best-effort.
    pub fn shutdown(&self) {
        if let Err(err) = self.grace().force_join(&self.nodeid) {
            tracing::warn!(
                nodeid = %self.nodeid,
                error = %err,
                "failed to request grace for the next incarnation"
            );
        }

        let cookie = self.state.lock().watch.take();
        if let Some(cookie) = cookie {
            if let Err(err) = self.store.unwatch(cookie) {
                tracing::warn!(%cookie, error = %err, "failed to remove grace watch");
            }
        }
    }

    /// Check this node against the cluster membership roster.
    pub fn is_member(&self) -> GraceResult<bool> {
        self.grace().member(&self.nodeid)
    }

    fn grace(&self) -> GraceDb<&S> {
        GraceDb::new(&self.store, self.grace_oid.clone())
            .with_max_entries(self.max_entries)
            .with_notify_timeout(self.notify_timeout)
            .with_conflict_backoff(self.conflict_backoff)
    }

    fn traverse_recovery(
        &self,
        oid: &str,
        add_client: &mut impl FnMut(ClientRecord),
    ) -> GraceResult<()> {
        let mut after: Option<String> = None;
        loop {
            let reply = match self.store.read(
                oid,
                ReadOp::new().omap_get_vals("", after.as_deref(), RECOVERY_SCAN_BATCH),
            ) {
                Ok(reply) => reply,
                Err(StoreError::NoSuchObject { .. }) => {
                    // Nothing was recorded for the reclaim epoch.
                    tracing::debug!(%oid, "old recovery database absent");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };
            for (key, value) in &reply.vals {
                add_client(ClientRecord::new(key.clone(), value.clone()));
            }
            if !reply.more {
                return Ok(());
            }
            after = reply.vals.last().map(|(key, _)| key.clone());
        }
    }
}
