//! In-process reference object store.
//!
//! `MemoryStore` implements the full [`ObjectStore`] contract against
//! process-local state: versioned objects with key-value map sidecars,
//! atomic compound ops, and synchronous watch/notify dispatch. It backs the
//! test suite and the CLI's `memory` backend; production deployments
//! implement [`ObjectStore`] against a real distributed store.
//!
//! Versions come from a store-global commit sequence, so a version observed
//! before an object was removed and recreated can never match again.

use super::client::{
    NotifyEvent, ObjectStore, StoreError, StoreResult, WatchCallback, WatchCookie,
};
use super::op::{CreateMode, OmapScan, ReadOp, ReadReply, Version, WriteOp};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct Object {
    data: Bytes,
    omap: BTreeMap<String, Bytes>,
    version: u64,
}

#[derive(Default)]
struct Objects {
    map: HashMap<String, Object>,
    commit_seq: u64,
}

struct WatchEntry {
    cookie: WatchCookie,
    oid: String,
    callback: WatchCallback,
}

#[derive(Default)]
struct Watches {
    entries: Vec<WatchEntry>,
    next_cookie: u64,
    next_notify_id: u64,
}

/// In-process object store with CAS semantics and watch dispatch.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<Objects>,
    watches: Mutex<Watches>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently present.
    pub fn object_count(&self) -> usize {
        self.objects.lock().map.len()
    }

    fn scan(
        omap: &BTreeMap<String, Bytes>,
        scan: &OmapScan,
        with_vals: bool,
    ) -> (Vec<String>, Vec<(String, Bytes)>, bool) {
        let mut keys = Vec::new();
        let mut vals = Vec::new();
        let mut more = false;

        let matches = omap
            .iter()
            .filter(|(k, _)| k.starts_with(&scan.prefix))
            .filter(|(k, _)| scan.after.as_deref().is_none_or(|after| k.as_str() > after));
        for (k, v) in matches {
            if keys.len() + vals.len() >= scan.limit {
                more = true;
                break;
            }
            if with_vals {
                vals.push((k.clone(), v.clone()));
            } else {
                keys.push(k.clone());
            }
        }
        (keys, vals, more)
    }
}

impl ObjectStore for MemoryStore {
    fn read(&self, oid: &str, op: ReadOp) -> StoreResult<ReadReply> {
        let objects = self.objects.lock();
        let obj = objects.map.get(oid).ok_or_else(|| StoreError::NoSuchObject {
            oid: oid.to_string(),
        })?;

        let data = match op.read {
            Some((offset, len)) => {
                // Short objects yield short reads, never an error.
                let start = (offset as usize).min(obj.data.len());
                let end = (start + len).min(obj.data.len());
                obj.data.slice(start..end)
            }
            None => Bytes::new(),
        };

        let mut keys = Vec::new();
        let mut vals = Vec::new();
        let mut more = false;
        if let Some(scan) = &op.get_keys {
            let (k, _, m) = Self::scan(&obj.omap, scan, false);
            keys = k;
            more |= m;
        }
        if let Some(scan) = &op.get_vals {
            let (_, v, m) = Self::scan(&obj.omap, scan, true);
            vals = v;
            more |= m;
        }

        Ok(ReadReply {
            data,
            keys,
            vals,
            more,
            version: Version::new(obj.version),
        })
    }

    fn write(&self, oid: &str, op: WriteOp) -> StoreResult<Version> {
        if op.is_empty() {
            return Err(StoreError::invalid_op("write op carries no steps"));
        }

        let mut objects = self.objects.lock();

        let exists = objects.map.contains_key(oid);
        match (op.create, exists) {
            (Some(CreateMode::Exclusive), true) => {
                return Err(StoreError::AlreadyExists {
                    oid: oid.to_string(),
                })
            }
            (None, false) => {
                return Err(StoreError::NoSuchObject {
                    oid: oid.to_string(),
                })
            }
            _ => {}
        }

        if let Some(asserted) = op.assert_version {
            if !exists {
                return Err(StoreError::invalid_op(
                    "version assertion on an object being created",
                ));
            }
            let committed = Version::new(objects.map[oid].version);
            if asserted != committed {
                return Err(StoreError::VersionMismatch {
                    oid: oid.to_string(),
                    asserted,
                    committed,
                });
            }
        }

        objects.commit_seq += 1;
        let seq = objects.commit_seq;

        if op.remove {
            objects.map.remove(oid);
            return Ok(Version::new(seq));
        }

        let obj = objects.map.entry(oid.to_string()).or_default();
        if op.omap_clear {
            obj.omap.clear();
        }
        for (k, v) in op.omap_set {
            obj.omap.insert(k, v);
        }
        for k in &op.omap_rm_keys {
            obj.omap.remove(k);
        }
        if let Some(data) = op.write_full {
            obj.data = data;
        }
        obj.version = seq;

        Ok(Version::new(seq))
    }

    fn notify(&self, oid: &str, _timeout: Duration) -> StoreResult<()> {
        // Snapshot the recipients, then dispatch outside both locks so a
        // callback may re-enter the store.
        let recipients: Vec<(WatchCookie, u64, WatchCallback)> = {
            let mut watches = self.watches.lock();
            watches.next_notify_id += 1;
            let notify_id = watches.next_notify_id;
            watches
                .entries
                .iter()
                .filter(|w| w.oid == oid)
                .map(|w| (w.cookie, notify_id, w.callback.clone()))
                .collect()
        };

        for (cookie, notify_id, callback) in recipients {
            callback(NotifyEvent {
                oid: oid.to_string(),
                notify_id,
                cookie,
            });
        }
        Ok(())
    }

    fn watch(&self, oid: &str, callback: WatchCallback) -> StoreResult<WatchCookie> {
        if !self.objects.lock().map.contains_key(oid) {
            return Err(StoreError::NoSuchObject {
                oid: oid.to_string(),
            });
        }
        let mut watches = self.watches.lock();
        watches.next_cookie += 1;
        let cookie = WatchCookie(watches.next_cookie);
        watches.entries.push(WatchEntry {
            cookie,
            oid: oid.to_string(),
            callback,
        });
        Ok(cookie)
    }

    fn notify_ack(&self, _oid: &str, _notify_id: u64, cookie: WatchCookie) -> StoreResult<()> {
        let watches = self.watches.lock();
        if watches.entries.iter().any(|w| w.cookie == cookie) {
            Ok(())
        } else {
            Err(StoreError::NoSuchWatch(cookie))
        }
    }

    fn unwatch(&self, cookie: WatchCookie) -> StoreResult<()> {
        let mut watches = self.watches.lock();
        let before = watches.entries.len();
        watches.entries.retain(|w| w.cookie != cookie);
        if watches.entries.len() == before {
            return Err(StoreError::NoSuchWatch(cookie));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(store: &MemoryStore, oid: &str) -> Version {
        store
            .write(
                oid,
                WriteOp::new()
                    .create(CreateMode::Exclusive)
                    .write_full(Bytes::from_static(b"payload")),
            )
            .unwrap()
    }

    #[test]
    fn exclusive_create_twice_fails() {
        let store = MemoryStore::new();
        created(&store, "o");
        let err = store
            .write(
                "o",
                WriteOp::new()
                    .create(CreateMode::Exclusive)
                    .write_full(Bytes::new()),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[test]
    fn idempotent_create_tolerates_existing() {
        let store = MemoryStore::new();
        created(&store, "o");
        store
            .write("o", WriteOp::new().create(CreateMode::Idempotent).omap_clear())
            .unwrap();
    }

    #[test]
    fn write_without_create_needs_object() {
        let store = MemoryStore::new();
        let err = store
            .write("absent", WriteOp::new().write_full(Bytes::new()))
            .unwrap_err();
        assert!(matches!(err, StoreError::NoSuchObject { .. }));
    }

    #[test]
    fn version_advances_per_commit() {
        let store = MemoryStore::new();
        let v1 = created(&store, "o");
        let v2 = store
            .write("o", WriteOp::new().write_full(Bytes::from_static(b"x")))
            .unwrap();
        assert!(v2 > v1);

        let reply = store.read("o", ReadOp::new().read(0, 16)).unwrap();
        assert_eq!(reply.version, v2);
    }

    #[test]
    fn stale_assertion_is_rejected() {
        let store = MemoryStore::new();
        let v1 = created(&store, "o");
        store
            .write("o", WriteOp::new().write_full(Bytes::from_static(b"x")))
            .unwrap();

        let err = store
            .write(
                "o",
                WriteOp::new()
                    .assert_version(v1)
                    .write_full(Bytes::from_static(b"y")),
            )
            .unwrap_err();
        assert!(err.is_version_mismatch());
    }

    #[test]
    fn short_read_returns_available_bytes() {
        let store = MemoryStore::new();
        created(&store, "o");
        let reply = store.read("o", ReadOp::new().read(0, 64)).unwrap();
        assert_eq!(&reply.data[..], b"payload");
    }

    #[test]
    fn scan_honors_prefix_after_and_limit() {
        let store = MemoryStore::new();
        created(&store, "o");
        store
            .write(
                "o",
                WriteOp::new().omap_set([
                    ("n1".to_string(), Bytes::from_static(b"\x01")),
                    ("n2".to_string(), Bytes::from_static(b"\x02")),
                    ("n3".to_string(), Bytes::from_static(b"\x03")),
                    ("x9".to_string(), Bytes::from_static(b"\x09")),
                ]),
            )
            .unwrap();

        let reply = store
            .read("o", ReadOp::new().omap_get_vals("n", None, 2))
            .unwrap();
        assert_eq!(reply.vals.len(), 2);
        assert!(reply.more);

        let reply = store
            .read("o", ReadOp::new().omap_get_vals("n", Some("n2"), 2))
            .unwrap();
        assert_eq!(reply.vals.len(), 1);
        assert_eq!(reply.vals[0].0, "n3");
        assert!(!reply.more);

        let reply = store
            .read("o", ReadOp::new().omap_get_keys("", 16))
            .unwrap();
        assert_eq!(reply.keys.len(), 4);
    }

    #[test]
    fn remove_then_recreate_never_reuses_versions() {
        let store = MemoryStore::new();
        let v1 = created(&store, "o");
        store.write("o", WriteOp::new().remove()).unwrap();
        let v2 = created(&store, "o");
        assert!(v2 > v1);
    }

    #[test]
    fn unwatch_unknown_cookie_fails() {
        let store = MemoryStore::new();
        let err = store.unwatch(WatchCookie(99)).unwrap_err();
        assert!(matches!(err, StoreError::NoSuchWatch(_)));
    }
}
