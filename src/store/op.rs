//! Atomic read/write operation builders.
//!
//! The object store executes compound operations: a [`ReadOp`] or [`WriteOp`]
//! is assembled step by step and then applied against a single named object
//! in one atomic unit. Either every step of a write takes effect or none
//! does, and a read observes one consistent snapshot of the object together
//! with the commit version of that snapshot.

use bytes::Bytes;

/// Opaque commit version of an object.
///
/// The store assigns a new version on every successful write. A version
/// captured at read time can be asserted as a write precondition; a mismatch
/// fails the whole write with [`StoreError::VersionMismatch`], which is the
/// engine's sole concurrency-control mechanism.
///
/// [`StoreError::VersionMismatch`]: super::client::StoreError::VersionMismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    /// Create a version from its raw value.
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    /// Get the raw version value.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v:{}", self.0)
    }
}

/// Create behavior for a write op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Fail with already-exists if the object is present.
    Exclusive,
    /// Create the object if absent, otherwise proceed against it.
    Idempotent,
}

/// A key-value map scan within a read op.
#[derive(Debug, Clone)]
pub struct OmapScan {
    /// Only keys starting with this prefix are returned.
    pub prefix: String,
    /// Resume after this key (exclusive); None starts from the beginning.
    pub after: Option<String>,
    /// Maximum entries returned; the reply's `more` flag reports truncation.
    pub limit: usize,
}

/// Compound read against a single object.
///
/// Steps compose: a byte-range read of the data payload, a key scan, and a
/// key/value scan of the object's map may all execute in one atomic read.
#[derive(Debug, Clone, Default)]
pub struct ReadOp {
    pub(crate) read: Option<(u64, usize)>,
    pub(crate) get_keys: Option<OmapScan>,
    pub(crate) get_vals: Option<OmapScan>,
}

impl ReadOp {
    /// Create an empty read op.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read up to `len` bytes of the data payload starting at `offset`.
    ///
    /// A short object yields fewer bytes than requested rather than an
    /// error; callers detect truncation from the reply length.
    pub fn read(mut self, offset: u64, len: usize) -> Self {
        self.read = Some((offset, len));
        self
    }

    /// Scan map keys with the given prefix, up to `limit` entries.
    pub fn omap_get_keys(mut self, prefix: impl Into<String>, limit: usize) -> Self {
        self.get_keys = Some(OmapScan {
            prefix: prefix.into(),
            after: None,
            limit,
        });
        self
    }

    /// Scan map keys and values with the given prefix, up to `limit`
    /// entries, resuming after `after` when set.
    pub fn omap_get_vals(
        mut self,
        prefix: impl Into<String>,
        after: Option<&str>,
        limit: usize,
    ) -> Self {
        self.get_vals = Some(OmapScan {
            prefix: prefix.into(),
            after: after.map(str::to_string),
            limit,
        });
        self
    }
}

/// Result of a [`ReadOp`].
#[derive(Debug, Clone)]
pub struct ReadReply {
    /// Data payload bytes, possibly shorter than requested.
    pub data: Bytes,
    /// Keys from the key scan, in lexicographic order.
    pub keys: Vec<String>,
    /// Key/value pairs from the value scan, in lexicographic key order.
    pub vals: Vec<(String, Bytes)>,
    /// True when either scan stopped at its limit with entries remaining.
    pub more: bool,
    /// Commit version of the snapshot this reply observed.
    pub version: Version,
}

impl ReadReply {
    /// Look up a scanned value by exact key.
    pub fn val(&self, key: &str) -> Option<&Bytes> {
        self.vals
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }
}

/// Compound write against a single object.
///
/// Steps are applied atomically in a fixed order: create, version assertion,
/// map clear, map set, map key removal, full payload write, object removal.
#[derive(Debug, Clone, Default)]
pub struct WriteOp {
    pub(crate) create: Option<CreateMode>,
    pub(crate) assert_version: Option<Version>,
    pub(crate) omap_clear: bool,
    pub(crate) omap_set: Vec<(String, Bytes)>,
    pub(crate) omap_rm_keys: Vec<String>,
    pub(crate) write_full: Option<Bytes>,
    pub(crate) remove: bool,
}

impl WriteOp {
    /// Create an empty write op.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the object with the given mode.
    pub fn create(mut self, mode: CreateMode) -> Self {
        self.create = Some(mode);
        self
    }

    /// Require the object's commit version to equal `version`.
    pub fn assert_version(mut self, version: Version) -> Self {
        self.assert_version = Some(version);
        self
    }

    /// Remove every entry from the object's map.
    pub fn omap_clear(mut self) -> Self {
        self.omap_clear = true;
        self
    }

    /// Set the given map entries, replacing existing values.
    pub fn omap_set(mut self, pairs: impl IntoIterator<Item = (String, Bytes)>) -> Self {
        self.omap_set.extend(pairs);
        self
    }

    /// Remove the given map keys. Absent keys are ignored.
    pub fn omap_rm_keys(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.omap_rm_keys.extend(keys);
        self
    }

    /// Replace the entire data payload.
    pub fn write_full(mut self, data: Bytes) -> Self {
        self.write_full = Some(data);
        self
    }

    /// Remove the object and its map.
    pub fn remove(mut self) -> Self {
        self.remove = true;
        self
    }

    /// True when the op carries no steps at all.
    pub fn is_empty(&self) -> bool {
        self.create.is_none()
            && self.assert_version.is_none()
            && !self.omap_clear
            && self.omap_set.is_empty()
            && self.omap_rm_keys.is_empty()
            && self.write_full.is_none()
            && !self.remove
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        assert!(Version::new(1) < Version::new(2));
        assert_eq!(Version::new(7).get(), 7);
        assert_eq!(Version::new(7).to_string(), "v:7");
    }

    #[test]
    fn write_op_accumulates_steps() {
        let op = WriteOp::new()
            .create(CreateMode::Exclusive)
            .assert_version(Version::new(3))
            .omap_set([("a".to_string(), Bytes::from_static(b"\x01"))])
            .omap_rm_keys(["b".to_string()])
            .write_full(Bytes::from_static(b"payload"));

        assert!(!op.is_empty());
        assert_eq!(op.create, Some(CreateMode::Exclusive));
        assert_eq!(op.assert_version, Some(Version::new(3)));
        assert_eq!(op.omap_set.len(), 1);
        assert_eq!(op.omap_rm_keys, vec!["b".to_string()]);
    }

    #[test]
    fn empty_op_is_empty() {
        assert!(WriteOp::new().is_empty());
        assert!(!WriteOp::new().remove().is_empty());
    }

    #[test]
    fn read_reply_val_lookup() {
        let reply = ReadReply {
            data: Bytes::new(),
            keys: Vec::new(),
            vals: vec![
                ("a".to_string(), Bytes::from_static(b"\x01")),
                ("b".to_string(), Bytes::from_static(b"\x02")),
            ],
            more: false,
            version: Version::new(1),
        };
        assert_eq!(reply.val("b"), Some(&Bytes::from_static(b"\x02")));
        assert_eq!(reply.val("c"), None);
    }
}
