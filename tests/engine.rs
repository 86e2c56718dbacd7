//! Tests for the grace protocol engine.

mod common;

use bytes::Bytes;
use common::{created_grace, fresh_store};
use gracekeeper::core::error::GraceError;
use gracekeeper::grace::{Epochs, GraceDb, NodeFlags};
use gracekeeper::store::{ObjectStore, WriteOp};
use std::sync::Arc;

fn flags_of(grace: &GraceDb<Arc<gracekeeper::store::MemoryStore>>, nodeid: &str) -> Option<NodeFlags> {
    grace
        .dump()
        .unwrap()
        .nodes
        .into_iter()
        .find_map(|(id, flags)| (id == nodeid).then_some(flags))
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn create_initializes_epochs() {
    let store = fresh_store();
    let grace = created_grace(&store);

    assert_eq!(grace.epochs().unwrap(), Epochs { cur: 1, rec: 0 });
    let dump = grace.dump().unwrap();
    assert_eq!(dump.epochs, Epochs { cur: 1, rec: 0 });
    assert!(dump.nodes.is_empty());
}

#[test]
fn create_twice_reports_existing_and_leaves_state() {
    let store = fresh_store();
    let grace = created_grace(&store);
    grace.start(&["1"]).unwrap();

    assert!(!grace.create().unwrap());
    assert_eq!(grace.epochs().unwrap(), Epochs { cur: 2, rec: 1 });
    assert_eq!(grace.dump().unwrap().nodes.len(), 1);
}

#[test]
fn epochs_on_missing_object_is_no_such_object() {
    let store = fresh_store();
    let grace = GraceDb::new(Arc::clone(&store), "grace");
    let err = grace.epochs().unwrap_err();
    assert!(matches!(
        err,
        GraceError::Store(gracekeeper::store::StoreError::NoSuchObject { .. })
    ));
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn single_node_boot_without_grace() {
    let store = fresh_store();
    let grace = created_grace(&store);

    // Nothing to reclaim from: the object must be left untouched.
    assert_eq!(grace.join("a").unwrap(), Epochs { cur: 1, rec: 0 });
    let dump = grace.dump().unwrap();
    assert_eq!(dump.epochs, Epochs { cur: 1, rec: 0 });
    assert!(dump.nodes.is_empty());

    assert_eq!(grace.done("a").unwrap(), Epochs { cur: 1, rec: 0 });
    assert!(grace.dump().unwrap().nodes.is_empty());
}

#[test]
fn admin_start_and_single_node_complete() {
    let store = fresh_store();
    let grace = created_grace(&store);

    assert_eq!(grace.start(&["a"]).unwrap(), Epochs { cur: 2, rec: 1 });
    let flags = flags_of(&grace, "a").unwrap();
    assert!(flags.contains(NodeFlags::NEED_GRACE));
    assert!(flags.contains(NodeFlags::MEMBER));

    assert_eq!(grace.done("a").unwrap(), Epochs { cur: 2, rec: 0 });
    let dump = grace.dump().unwrap();
    assert_eq!(dump.epochs, Epochs { cur: 2, rec: 0 });
    assert!(dump.nodes.is_empty());
}

#[test]
fn two_node_grace_staggered_completion() {
    let store = fresh_store();
    let grace = created_grace(&store);

    assert_eq!(grace.start(&["a", "b"]).unwrap(), Epochs { cur: 2, rec: 1 });
    assert_eq!(grace.dump().unwrap().nodes.len(), 2);

    // First completion leaves the grace period in force.
    assert_eq!(grace.done("a").unwrap(), Epochs { cur: 2, rec: 1 });
    let dump = grace.dump().unwrap();
    assert_eq!(dump.epochs, Epochs { cur: 2, rec: 1 });
    assert_eq!(dump.nodes.len(), 1);
    assert_eq!(dump.nodes[0].0, "b");

    // The last node out closes it.
    assert_eq!(grace.done("b").unwrap(), Epochs { cur: 2, rec: 0 });
    let dump = grace.dump().unwrap();
    assert_eq!(dump.epochs, Epochs { cur: 2, rec: 0 });
    assert!(dump.nodes.is_empty());
}

#[test]
fn join_during_active_grace() {
    let store = fresh_store();
    let grace = created_grace(&store);

    grace.start(&["a"]).unwrap();
    assert_eq!(grace.join("b").unwrap(), Epochs { cur: 2, rec: 1 });
    let flags = flags_of(&grace, "b").unwrap();
    assert!(flags.contains(NodeFlags::NEED_GRACE));
    assert!(!flags.contains(NodeFlags::MEMBER));

    // "b" is still recovering, so "a" finishing does not lift.
    assert_eq!(grace.done("a").unwrap(), Epochs { cur: 2, rec: 1 });
    assert_eq!(grace.done("b").unwrap(), Epochs { cur: 2, rec: 0 });
    assert!(grace.dump().unwrap().nodes.is_empty());
}

#[test]
fn concurrent_starts_converge_on_one_epoch_bump() {
    let store = fresh_store();
    created_grace(&store);

    let handles: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|nodeid| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                GraceDb::new(store, "grace").start(&[nodeid]).unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Epochs { cur: 2, rec: 1 });
    }

    let grace = GraceDb::new(store, "grace");
    let dump = grace.dump().unwrap();
    assert_eq!(dump.epochs, Epochs { cur: 2, rec: 1 });
    let mut nodes: Vec<String> = dump.nodes.into_iter().map(|(id, _)| id).collect();
    nodes.sort();
    assert_eq!(nodes, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn many_concurrent_starts_merge_every_node() {
    let store = fresh_store();
    created_grace(&store);

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let nodeid = n.to_string();
                GraceDb::new(store, "grace").start(&[nodeid.as_str()]).unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Epochs { cur: 2, rec: 1 });
    }

    let dump = GraceDb::new(store, "grace").dump().unwrap();
    assert_eq!(dump.epochs, Epochs { cur: 2, rec: 1 });
    assert_eq!(dump.nodes.len(), 8);
}

#[test]
fn truncated_payload_is_reported_as_corruption() {
    let store = fresh_store();
    let grace = created_grace(&store);

    // Damage the payload out of band.
    store
        .write("grace", WriteOp::new().write_full(Bytes::from_static(&[0u8; 8])))
        .unwrap();

    let err = grace.epochs().unwrap_err();
    assert!(matches!(err, GraceError::BadPayload { len: 8 }));
    assert!(err.is_corruption());
    assert!(grace.dump().unwrap_err().is_corruption());
}

// ============================================================================
// Idempotence laws
// ============================================================================

#[test]
fn start_is_idempotent_after_the_epoch_bump() {
    let store = fresh_store();
    let grace = created_grace(&store);

    let first = grace.start(&["a"]).unwrap();
    let second = grace.start(&["a"]).unwrap();
    assert_eq!(first, second);
    assert_eq!(grace.epochs().unwrap(), Epochs { cur: 2, rec: 1 });
    assert_eq!(grace.dump().unwrap().nodes.len(), 1);
}

#[test]
fn lift_is_idempotent() {
    let store = fresh_store();
    let grace = created_grace(&store);

    grace.start(&["a", "b"]).unwrap();
    assert_eq!(grace.lift(&["a"]).unwrap(), Epochs { cur: 2, rec: 1 });
    assert_eq!(grace.lift(&["a"]).unwrap(), Epochs { cur: 2, rec: 1 });
    assert_eq!(grace.dump().unwrap().nodes.len(), 1);

    assert_eq!(grace.lift(&["a", "b"]).unwrap(), Epochs { cur: 2, rec: 0 });
    assert_eq!(grace.lift(&["a", "b"]).unwrap(), Epochs { cur: 2, rec: 0 });
}

#[test]
fn done_for_absent_nodeid_is_a_noop() {
    let store = fresh_store();
    let grace = created_grace(&store);

    grace.start(&["a"]).unwrap();
    assert_eq!(grace.done("ghost").unwrap(), Epochs { cur: 2, rec: 1 });
    assert_eq!(grace.dump().unwrap().nodes.len(), 1);
}

// ============================================================================
// Join flavors and flags
// ============================================================================

#[test]
fn force_join_opens_a_grace_period() {
    let store = fresh_store();
    let grace = created_grace(&store);

    assert_eq!(grace.force_join("a").unwrap(), Epochs { cur: 2, rec: 1 });
    let flags = flags_of(&grace, "a").unwrap();
    assert!(flags.contains(NodeFlags::NEED_GRACE));
    assert!(flags.contains(NodeFlags::ENFORCING));
}

#[test]
fn join_preserves_existing_flags() {
    let store = fresh_store();
    let grace = created_grace(&store);

    grace.start(&["a"]).unwrap();
    grace.join("a").unwrap();
    let flags = flags_of(&grace, "a").unwrap();
    assert!(flags.contains(NodeFlags::MEMBER));
    assert!(flags.contains(NodeFlags::NEED_GRACE));
}

#[test]
fn member_reflects_roster_flag() {
    let store = fresh_store();
    let grace = created_grace(&store);

    grace.start(&["a"]).unwrap();
    grace.join("b").unwrap();

    assert!(grace.member("a").unwrap());
    assert!(!grace.member("b").unwrap());
    assert!(!grace.member("ghost").unwrap());
}

#[test]
fn member_is_exact_even_with_prefixed_neighbors() {
    let store = fresh_store();
    let grace = created_grace(&store);

    grace.start(&["10", "100"]).unwrap();
    grace.done("10").unwrap();

    assert!(!grace.member("10").unwrap());
    assert!(grace.member("100").unwrap());
}

#[test]
fn enforcing_flag_lifecycle() {
    let store = fresh_store();
    let grace = created_grace(&store);

    grace.start(&["a"]).unwrap();
    assert!(!grace.enforcing_check("a").unwrap());

    assert_eq!(grace.enforcing_on("a").unwrap(), Epochs { cur: 2, rec: 1 });
    assert!(grace.enforcing_check("a").unwrap());

    assert_eq!(grace.enforcing_off("a").unwrap(), Epochs { cur: 2, rec: 1 });
    assert!(!grace.enforcing_check("a").unwrap());

    // The other flags survived the toggling.
    let flags = flags_of(&grace, "a").unwrap();
    assert!(flags.contains(NodeFlags::MEMBER));
    assert!(flags.contains(NodeFlags::NEED_GRACE));
}

#[test]
fn enforcing_off_drops_an_entry_with_no_other_flags() {
    let store = fresh_store();
    let grace = created_grace(&store);

    grace.start(&["a"]).unwrap();
    grace.enforcing_on("b").unwrap();
    assert!(flags_of(&grace, "b").is_some());

    grace.enforcing_off("b").unwrap();
    assert!(flags_of(&grace, "b").is_none());
}

#[test]
fn enforcing_off_for_absent_nodeid_is_a_noop() {
    let store = fresh_store();
    let grace = created_grace(&store);
    assert_eq!(grace.enforcing_off("a").unwrap(), Epochs { cur: 1, rec: 0 });
}

#[test]
fn stray_enforcing_entry_does_not_block_the_lift() {
    let store = fresh_store();
    let grace = created_grace(&store);

    grace.start(&["a"]).unwrap();
    grace.enforcing_on("b").unwrap();

    // "b" never needed a grace period, so "a" finishing ends it.
    assert_eq!(grace.done("a").unwrap(), Epochs { cur: 2, rec: 0 });
}

// ============================================================================
// Boundary behaviors
// ============================================================================

#[test]
fn empty_nodeid_rejected() {
    let store = fresh_store();
    let grace = created_grace(&store);
    assert!(matches!(
        grace.join("").unwrap_err(),
        GraceError::InvalidNodeId { .. }
    ));
    assert!(matches!(
        grace.start(&["a", ""]).unwrap_err(),
        GraceError::InvalidNodeId { .. }
    ));
}

#[test]
fn map_overflow_is_corruption() {
    let store = fresh_store();
    let grace = GraceDb::new(Arc::clone(&store), "grace").with_max_entries(4);
    assert!(grace.create().unwrap());

    grace.start(&["1", "2", "3", "4"]).unwrap();
    // Landing exactly on the cap still scans cleanly.
    grace.join("5").unwrap();

    let err = grace.join("6").unwrap_err();
    assert!(matches!(err, GraceError::MapOverflow { cap: 4 }));
    assert!(err.is_corruption());
}

#[test]
fn residual_entries_outside_grace_are_corruption() {
    let store = fresh_store();
    let grace = created_grace(&store);

    // Forge a leftover entry while rec == 0.
    store
        .write(
            "grace",
            WriteOp::new().omap_set([("zombie".to_string(), Bytes::from_static(b"\x04"))]),
        )
        .unwrap();

    let err = grace.lift(&["zombie"]).unwrap_err();
    assert!(matches!(err, GraceError::ResidualEntries));
}
