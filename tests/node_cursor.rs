mod common;

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use penumbra::cursor::{CursorState, LockType, NoLockService, TableLockService};
use penumbra::storage::CounterMetrics;
use penumbra::{
    FetchProgression, LabelId, LabelSet, MemNodeStore, Mode, NodeCursor, NodeId, NodeRecord,
    NodeStore, NodeView, PenumbraError, ReadableTxState, RecordPtr, Result, ScanProgression,
    TxState,
};
use proptest::prelude::*;

const NON_EXISTING_LABEL: LabelId = LabelId(u32::MAX);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Operation {
    OnDisk,
    Added,
    Deleted,
    Modified,
}

const OPERATIONS: [Operation; 4] = [
    Operation::OnDisk,
    Operation::Added,
    Operation::Deleted,
    Operation::Modified,
];

fn label(value: u64) -> LabelId {
    LabelId(value as u32)
}

fn disk_record(id: u64) -> NodeRecord {
    let mut record = NodeRecord::new(NodeId(id));
    let labels = LabelSet::from_slice(&[label(4 + id), label(5 + id)]);
    record.initialize(
        true,
        RecordPtr(42 + id),
        id % 2 == 0,
        RecordPtr(43 + id),
        &labels,
    );
    record
}

impl Operation {
    fn from_disk(self) -> bool {
        self != Operation::Added
    }

    fn is_visible(self) -> bool {
        self != Operation::Deleted
    }

    fn prepare(self, id: u64, store: &MemNodeStore, tx: &mut TxState) -> Result<()> {
        let node = NodeId(id);
        match self {
            Operation::OnDisk => store.put_record(&disk_record(id))?,
            Operation::Added => {
                tx.node_do_create(node)?;
                tx.node_do_add_label(label(20 + id), node);
            }
            Operation::Deleted => {
                store.put_record(&disk_record(id))?;
                tx.node_do_delete(node);
            }
            Operation::Modified => {
                store.put_record(&disk_record(id))?;
                tx.node_do_add_label(label(6 + id), node);
                tx.node_do_remove_label(label(5 + id), node);
            }
        }
        Ok(())
    }

    fn check(self, id: u64, view: &NodeView<'_>) -> Result<()> {
        assert_eq!(view.id(), NodeId(id), "{self:?}");
        assert!(!view.has_label(NON_EXISTING_LABEL));
        match self {
            Operation::OnDisk => {
                assert_eq!(view.labels().as_slice(), &[label(4 + id), label(5 + id)]);
                assert!(view.has_label(label(4 + id)));
                assert!(view.has_label(label(5 + id)));
                check_disk_pointers(id, view)?;
            }
            Operation::Modified => {
                assert_eq!(view.labels().as_slice(), &[label(4 + id), label(6 + id)]);
                assert!(view.has_label(label(4 + id)));
                assert!(!view.has_label(label(5 + id)));
                assert!(view.has_label(label(6 + id)));
                check_disk_pointers(id, view)?;
            }
            Operation::Added => {
                assert_eq!(view.labels().as_slice(), &[label(20 + id)]);
                assert!(view.has_label(label(20 + id)));
                assert!(view.is_created());
                assert!(view.next_property_pointer().is_none());
                assert!(!view.is_dense());
                assert_eq!(view.next_relationship_pointer()?, RecordPtr::NONE);
            }
            Operation::Deleted => panic!("deleted node {id} surfaced"),
        }
        Ok(())
    }
}

fn check_disk_pointers(id: u64, view: &NodeView<'_>) -> Result<()> {
    assert!(!view.is_created());
    assert_eq!(view.next_property_pointer(), RecordPtr(42 + id));
    assert_eq!(view.is_dense(), id % 2 == 0);
    if view.is_dense() {
        assert_eq!(view.next_group_pointer()?, RecordPtr(43 + id));
        assert!(view.next_relationship_pointer().is_err());
    } else {
        assert_eq!(view.next_relationship_pointer()?, RecordPtr(43 + id));
        assert!(view.next_group_pointer().is_err());
    }
    Ok(())
}

fn sequences(max_len: usize) -> Vec<Vec<Operation>> {
    let mut all = vec![Vec::new()];
    let mut frontier = vec![Vec::new()];
    for _ in 0..max_len {
        let mut next = Vec::new();
        for prefix in &frontier {
            for op in OPERATIONS {
                let mut seq: Vec<Operation> = prefix.clone();
                seq.push(op);
                next.push(seq);
            }
        }
        all.extend(next.iter().cloned());
        frontier = next;
    }
    all
}

/// Ids in the order a cursor must surface them.
fn expected_order(ops: &[Operation], mode: Mode) -> Vec<(u64, Operation)> {
    let visible = ops
        .iter()
        .enumerate()
        .map(|(id, op)| (id as u64, *op))
        .filter(|(_, op)| op.is_visible());
    match mode {
        Mode::Fetch => visible.collect(),
        Mode::Append => {
            let (disk, added): (Vec<_>, Vec<_>) = visible.partition(|(_, op)| op.from_disk());
            disk.into_iter().chain(added).collect()
        }
    }
}

fn run_sequence(ops: &[Operation], mode: Mode) -> Result<()> {
    let store = Arc::new(MemNodeStore::new());
    let mut tx = TxState::new();
    for (id, op) in ops.iter().enumerate() {
        op.prepare(id as u64, &store, &mut tx)?;
    }
    let releases = Rc::new(Cell::new(0));
    let counter = Rc::clone(&releases);
    let metrics = Arc::new(CounterMetrics::default());
    let mut cursor = NodeCursor::new(
        store.clone(),
        Arc::new(NoLockService),
        metrics.clone(),
        Box::new(move |_| counter.set(counter.get() + 1)),
    );
    let expected = expected_order(ops, mode);

    for round in 1..=2 {
        match mode {
            Mode::Fetch => {
                let ids = (0..ops.len() as u64).map(NodeId);
                cursor.init(FetchProgression::new(ids), &tx);
            }
            Mode::Append => cursor.init(ScanProgression::new(store.as_ref())?, &tx),
        }
        for (id, op) in &expected {
            assert!(cursor.advance()?, "{ops:?} {mode:?}: expected node {id}");
            op.check(*id, &cursor.current_view()?)?;
        }
        assert!(!cursor.advance()?, "{ops:?} {mode:?}: expected exhaustion");
        assert!(matches!(
            cursor.current_view(),
            Err(PenumbraError::InvalidCursorState(_))
        ));
        assert!(!cursor.advance()?);

        cursor.close();
        cursor.close();
        assert_eq!(cursor.state(), CursorState::Closed);
        assert!(!cursor.advance()?);
        assert!(cursor.current_view().is_err());
        assert_eq!(releases.get(), round);
    }

    let deleted = ops.iter().filter(|op| **op == Operation::Deleted).count() as u64;
    assert_eq!(metrics.deleted_skipped.load(Ordering::Relaxed), 2 * deleted);
    assert_eq!(metrics.cursors_released.load(Ordering::Relaxed), 2);
    Ok(())
}

#[test]
fn every_operation_sequence_in_fetch_mode() -> Result<()> {
    common::init_tracing();
    for ops in sequences(4) {
        run_sequence(&ops, Mode::Fetch)?;
    }
    Ok(())
}

#[test]
fn every_operation_sequence_in_append_mode() -> Result<()> {
    common::init_tracing();
    for ops in sequences(4) {
        run_sequence(&ops, Mode::Append)?;
    }
    Ok(())
}

#[test]
fn append_surfaces_created_nodes_last() -> Result<()> {
    let ops = [
        Operation::Added,
        Operation::OnDisk,
        Operation::Added,
        Operation::Modified,
    ];
    let order: Vec<u64> = expected_order(&ops, Mode::Append)
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(order, vec![1, 3, 0, 2]);
    run_sequence(&ops, Mode::Append)
}

#[test]
fn label_membership_uses_the_effective_set() -> Result<()> {
    let store = Arc::new(MemNodeStore::new());
    let mut record = NodeRecord::new(NodeId(0));
    record.initialize(
        true,
        RecordPtr::NONE,
        false,
        RecordPtr::NONE,
        &LabelSet::from_slice(&[LabelId(4), LabelId(5)]),
    );
    store.put_record(&record)?;
    let mut tx = TxState::new();
    tx.node_do_add_label(LabelId(6), NodeId(0));
    tx.node_do_remove_label(LabelId(5), NodeId(0));

    let mut cursor = NodeCursor::unpooled(store);
    cursor.init(FetchProgression::single(NodeId(0)), &tx);
    assert!(cursor.advance()?);
    let view = cursor.current_view()?;
    assert_eq!(view.labels().as_slice(), &[LabelId(4), LabelId(6)]);
    assert!(!view.has_label(LabelId(5)));
    assert!(view.has_label(LabelId(6)));
    assert!(!view.has_label(NON_EXISTING_LABEL));
    Ok(())
}

#[test]
fn deleted_node_with_stale_label_diff_is_never_surfaced() -> Result<()> {
    let store = Arc::new(MemNodeStore::new());
    store.put_record(&disk_record(0))?;
    store.put_record(&disk_record(1))?;
    let mut tx = TxState::new();
    tx.node_do_add_label(LabelId(99), NodeId(0));
    tx.node_do_delete(NodeId(0));
    assert!(tx.is_deleted(NodeId(0)));
    assert!(tx.label_diff(NodeId(0)).is_some());

    let mut cursor = NodeCursor::unpooled(store.clone());
    cursor.init(FetchProgression::new([NodeId(0), NodeId(1)]), &tx);
    assert!(cursor.advance()?);
    assert_eq!(cursor.current_view()?.id(), NodeId(1));
    assert!(!cursor.advance()?);

    cursor.init(ScanProgression::new(store.as_ref())?, &tx);
    assert!(cursor.advance()?);
    assert_eq!(cursor.current_view()?.id(), NodeId(1));
    assert!(!cursor.advance()?);
    Ok(())
}

#[test]
fn created_node_with_durable_record_is_inconsistent() -> Result<()> {
    common::init_tracing();
    let store = Arc::new(MemNodeStore::new());
    store.put_record(&disk_record(0))?;
    let mut tx = TxState::new();
    tx.node_do_create(NodeId(0))?;

    let mut cursor = NodeCursor::unpooled(store.clone());
    cursor.init(FetchProgression::single(NodeId(0)), &tx);
    assert!(matches!(
        cursor.advance(),
        Err(PenumbraError::Inconsistent { node: NodeId(0), .. })
    ));
    assert!(cursor.current_view().is_err());

    cursor.init(ScanProgression::new(store.as_ref())?, &tx);
    assert!(matches!(
        cursor.advance(),
        Err(PenumbraError::Inconsistent { node: NodeId(0), .. })
    ));
    Ok(())
}

#[test]
fn absent_record_for_existing_node_is_inconsistent() -> Result<()> {
    let store = Arc::new(MemNodeStore::new());
    store.put_record(&disk_record(0))?;
    let tx = TxState::new();
    let mut cursor = NodeCursor::unpooled(store.clone());
    cursor.init(ScanProgression::new(store.as_ref())?, &tx);
    store.remove_record(NodeId(0));
    assert!(matches!(
        cursor.advance(),
        Err(PenumbraError::Inconsistent { node: NodeId(0), .. })
    ));
    Ok(())
}

#[test]
fn cursor_can_be_reinitialized_after_close_without_leaking_state() -> Result<()> {
    let store = Arc::new(MemNodeStore::new());
    store.put_record(&disk_record(0))?;
    store.put_record(&disk_record(1))?;
    let mut modified = TxState::new();
    modified.node_do_add_label(LabelId(6), NodeId(0));
    let untouched = TxState::new();

    let mut cursor = NodeCursor::unpooled(store);
    cursor.init(FetchProgression::single(NodeId(0)), &modified);
    assert!(cursor.advance()?);
    assert!(cursor.current_view()?.has_label(LabelId(6)));
    cursor.close();

    cursor.init(FetchProgression::new([NodeId(1), NodeId(0)]), &untouched);
    assert!(cursor.current_view().is_err());
    assert!(cursor.advance()?);
    assert_eq!(cursor.current_view()?.id(), NodeId(1));
    assert!(cursor.advance()?);
    assert!(!cursor.current_view()?.has_label(LabelId(6)));
    assert!(!cursor.advance()?);
    Ok(())
}

#[test]
fn view_lock_goes_through_the_lock_service() -> Result<()> {
    let store = Arc::new(MemNodeStore::new());
    store.put_record(&disk_record(1))?;
    let locks = Arc::new(TableLockService::new());
    let tx = TxState::new();
    let mut cursor = NodeCursor::new(
        store,
        locks.clone(),
        Arc::new(CounterMetrics::default()),
        Box::new(|_| {}),
    );
    cursor.init(FetchProgression::single(NodeId(1)), &tx);
    assert!(cursor.advance()?);
    assert_eq!(locks.acquired(), 0);
    {
        let view = cursor.current_view()?;
        let lock = view.lock(LockType::Write)?;
        assert_eq!(lock.node(), NodeId(1));
        assert!(view.lock(LockType::Read).is_err());
    }
    assert_eq!(locks.held(), 0);
    assert_eq!(locks.acquired(), 1);
    Ok(())
}

fn store_strategy() -> impl Strategy<Value = (BTreeSet<u64>, BTreeSet<u64>, BTreeSet<u64>)> {
    (
        proptest::collection::btree_set(0u64..16, 0..12),
        proptest::collection::btree_set(16u64..24, 0..6),
    )
        .prop_flat_map(|(disk, created)| {
            let disk_vec: Vec<u64> = disk.iter().copied().collect();
            let deleted = proptest::sample::subsequence(disk_vec.clone(), 0..=disk_vec.len())
                .prop_map(|ids| ids.into_iter().collect::<BTreeSet<u64>>());
            (Just(disk), Just(created), deleted)
        })
}

proptest! {
    #[test]
    fn append_scan_matches_model((disk, created, deleted) in store_strategy()) {
        let store = Arc::new(MemNodeStore::new());
        for id in &disk {
            store.put_record(&disk_record(*id)).unwrap();
        }
        let mut tx = TxState::new();
        for id in created.iter().rev() {
            tx.node_do_create(NodeId(*id)).unwrap();
        }
        for id in &deleted {
            tx.node_do_delete(NodeId(*id));
        }

        let mut cursor = NodeCursor::unpooled(store.clone());
        cursor.init(ScanProgression::new(store.as_ref()).unwrap(), &tx);
        let mut seen = Vec::new();
        while cursor.advance().unwrap() {
            seen.push(cursor.current_view().unwrap().id().0);
        }
        let expected: Vec<u64> = disk
            .difference(&deleted)
            .copied()
            .chain(created.iter().copied())
            .collect();
        prop_assert_eq!(seen, expected);
        prop_assert!(store.high_id() >= NodeId(disk.iter().max().map_or(0, |m| m + 1)));
    }
}
