//! Object-store client trait and watch surface.
//!
//! [`ObjectStore`] is the seam between the grace protocol and whatever
//! object store backs the cluster. The engine only ever needs atomic
//! compound reads and writes against single named objects, a best-effort
//! notify broadcast, and watch registration; real backends implement this
//! trait out of tree, and [`MemoryStore`](super::memory::MemoryStore) is the
//! in-process reference implementation.

use super::op::{ReadOp, ReadReply, Version, WriteOp};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Object-store failure conditions.
///
/// The four conditions the protocol branches on are distinguishable
/// variants; everything else travels as `Transport`.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Exclusive create against an existing object.
    #[error("object already exists: {oid}")]
    AlreadyExists { oid: String },

    /// Operation against an absent object.
    #[error("no such object: {oid}")]
    NoSuchObject { oid: String },

    /// A version assertion did not hold; the whole write was discarded.
    #[error("version mismatch on {oid}: asserted {asserted}, committed {committed}")]
    VersionMismatch {
        oid: String,
        asserted: Version,
        committed: Version,
    },

    /// The op was malformed for the target backend.
    #[error("invalid op: {message}")]
    InvalidOp { message: String },

    /// Watch cookie does not name a registered watch.
    #[error("no such watch: {0}")]
    NoSuchWatch(WatchCookie),

    /// Transport-level failure; the caller may retry or tear down.
    #[error("transport error: {message}")]
    Transport { message: String },
}

impl StoreError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an invalid-op error.
    pub fn invalid_op(message: impl Into<String>) -> Self {
        Self::InvalidOp {
            message: message.into(),
        }
    }

    /// True for the version-conflict condition the engine retries on.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Self::VersionMismatch { .. })
    }

    /// True for transport-level failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Result type using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Handle naming a registered watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchCookie(pub u64);

impl std::fmt::Display for WatchCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "w:{}", self.0)
    }
}

/// A notify delivered to a watcher.
///
/// Notifies carry no payload: they are pure wake-ups, and consumers must
/// re-read state. Delivery is neither guaranteed nor ordered.
#[derive(Debug, Clone)]
pub struct NotifyEvent {
    /// Object the notify was broadcast on.
    pub oid: String,
    /// Identifier to acknowledge with [`ObjectStore::notify_ack`].
    pub notify_id: u64,
    /// The receiving watch's cookie.
    pub cookie: WatchCookie,
}

/// Callback invoked on notify delivery.
///
/// Runs on whatever thread the store dispatches from and must be re-entrant
/// with store and engine calls.
pub type WatchCallback = Arc<dyn Fn(NotifyEvent) + Send + Sync>;

/// Atomic object-store operations against named objects.
pub trait ObjectStore {
    /// Execute a compound read atomically against `oid`.
    fn read(&self, oid: &str, op: ReadOp) -> StoreResult<ReadReply>;

    /// Execute a compound write atomically against `oid`, returning the
    /// commit version the write produced.
    fn write(&self, oid: &str, op: WriteOp) -> StoreResult<Version>;

    /// Broadcast a best-effort notify to watchers of `oid`.
    fn notify(&self, oid: &str, timeout: Duration) -> StoreResult<()>;

    /// Register a watch on `oid`; `callback` fires on every notify.
    fn watch(&self, oid: &str, callback: WatchCallback) -> StoreResult<WatchCookie>;

    /// Acknowledge a delivered notify so the broadcaster can stop waiting.
    fn notify_ack(&self, oid: &str, notify_id: u64, cookie: WatchCookie) -> StoreResult<()>;

    /// Remove a previously registered watch.
    fn unwatch(&self, cookie: WatchCookie) -> StoreResult<()>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn read(&self, oid: &str, op: ReadOp) -> StoreResult<ReadReply> {
        (**self).read(oid, op)
    }

    fn write(&self, oid: &str, op: WriteOp) -> StoreResult<Version> {
        (**self).write(oid, op)
    }

    fn notify(&self, oid: &str, timeout: Duration) -> StoreResult<()> {
        (**self).notify(oid, timeout)
    }

    fn watch(&self, oid: &str, callback: WatchCallback) -> StoreResult<WatchCookie> {
        (**self).watch(oid, callback)
    }

    fn notify_ack(&self, oid: &str, notify_id: u64, cookie: WatchCookie) -> StoreResult<()> {
        (**self).notify_ack(oid, notify_id, cookie)
    }

    fn unwatch(&self, cookie: WatchCookie) -> StoreResult<()> {
        (**self).unwatch(cookie)
    }
}

impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn read(&self, oid: &str, op: ReadOp) -> StoreResult<ReadReply> {
        (**self).read(oid, op)
    }

    fn write(&self, oid: &str, op: WriteOp) -> StoreResult<Version> {
        (**self).write(oid, op)
    }

    fn notify(&self, oid: &str, timeout: Duration) -> StoreResult<()> {
        (**self).notify(oid, timeout)
    }

    fn watch(&self, oid: &str, callback: WatchCallback) -> StoreResult<WatchCookie> {
        (**self).watch(oid, callback)
    }

    fn notify_ack(&self, oid: &str, notify_id: u64, cookie: WatchCookie) -> StoreResult<()> {
        (**self).notify_ack(oid, notify_id, cookie)
    }

    fn unwatch(&self, cookie: WatchCookie) -> StoreResult<()> {
        (**self).unwatch(cookie)
    }
}
