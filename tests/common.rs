//! Common test utilities.
//!
//! Shared fixtures for integration tests. Import with `mod common;` in
//! test files.

use gracekeeper::grace::GraceDb;
use gracekeeper::store::MemoryStore;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Fresh empty store, shareable across threads.
pub fn fresh_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// A grace handle over `store` with the object freshly created
/// (`cur=1, rec=0`, empty node map).
pub fn created_grace(store: &Arc<MemoryStore>) -> GraceDb<Arc<MemoryStore>> {
    let grace = GraceDb::new(Arc::clone(store), "grace");
    assert!(grace.create().expect("create grace object"));
    grace
}

/// Write a config file with the given TOML content.
#[allow(dead_code)]
pub fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}
