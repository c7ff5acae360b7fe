//! View Tree Tests
//!
//! Cascading behavior of live views, listener registration, filter
//! transitions on in-place changes and distinct-value aggregation attached
//! to a view.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use assert_matches::assert_matches;
use cascade_core::{CascadeError, ChangeEvent, ChangeKind, ViewListener};
use cascade_testkit::{
    init_test_tracing, ListenerCall, ObservedCall, RecordingListener, RecordingObserver, Row,
};
use cascade_view::{
    accept_all, filter_fn, DeriveMode, DistinctChoice, DistinctOptions, DistinctValues, ListenerId,
    ViewNode, WeakViewNode,
};
use parking_lot::Mutex;

fn at_least(min: i64) -> cascade_view::Filter<Row> {
    filter_fn(move |row: &Row| row.value() >= min)
}

// ============================================================================
// Listener registration
// ============================================================================

#[test]
fn listener_registration_replays_exact_sequence() {
    init_test_tracing();
    let root = ViewNode::root("letters");
    for letter in ["a", "b", "c"] {
        root.push(letter).unwrap();
    }
    let view = root.derive(accept_all(), DeriveMode::Live);

    let existing = Arc::new(RecordingListener::<&str>::new());
    view.add_listener(existing.clone());
    existing.take();

    let late = Arc::new(RecordingListener::<&str>::new());
    view.add_listener(late.clone());

    assert_eq!(
        late.take(),
        vec![
            ListenerCall::Begin,
            ListenerCall::Reset,
            ListenerCall::Add("a"),
            ListenerCall::Add("b"),
            ListenerCall::Add("c"),
            ListenerCall::End,
        ]
    );
    assert!(existing.take().is_empty());
}

struct SelfRemoving {
    view: WeakViewNode<u32>,
    id: Mutex<Option<ListenerId>>,
    adds: Mutex<Vec<u32>>,
}

impl ViewListener<u32> for SelfRemoving {
    fn begin_update(&self) {}
    fn end_update(&self) {}
    fn reset(&self) {}
    fn add(&self, item: &u32) {
        self.adds.lock().push(*item);
        if *item == 2 {
            let id = self.id.lock().take();
            if let (Some(view), Some(id)) = (self.view.upgrade(), id) {
                assert!(view.remove_listener(id));
            }
        }
    }
    fn change(&self, _item: &u32) {}
    fn remove(&self, _item: &u32) {}
}

#[test]
fn listener_can_remove_itself_during_callback() {
    let root: ViewNode<u32> = ViewNode::root("numbers");
    let listener = Arc::new(SelfRemoving {
        view: root.downgrade(),
        id: Mutex::new(None),
        adds: Mutex::new(Vec::new()),
    });
    let other = Arc::new(RecordingListener::<u32>::new());

    let id = root.add_listener(listener.clone());
    *listener.id.lock() = Some(id);
    root.add_listener(other.clone());
    other.take();

    for n in 1..=3 {
        root.push(n).unwrap();
    }

    assert_eq!(*listener.adds.lock(), vec![1, 2]);
    assert_eq!(root.listener_count(), 1);
    let added: Vec<_> = other
        .take()
        .into_iter()
        .filter(|call| matches!(call, ListenerCall::Add(_)))
        .collect();
    assert_eq!(added.len(), 3);
}

// ============================================================================
// Filter transitions
// ============================================================================

#[test]
fn in_place_changes_move_rows_across_the_filter() {
    init_test_tracing();
    let root = ViewNode::root("rows");
    let big = root.derive(at_least(10), DeriveMode::Live);
    let listener = Arc::new(RecordingListener::<Row>::new());
    big.add_listener(listener.clone());
    let (observer, _) = RecordingObserver::attach(&big);

    let r1 = Row::new(1, 5);
    let r2 = Row::new(2, 20);
    root.push(r1.clone()).unwrap();
    root.push(r2.clone()).unwrap();
    assert_eq!(big.snapshot(), vec![r2.clone()]);
    listener.take();
    observer.take();

    // excluded -> included
    r1.set_value(15);
    root.notify_changed(0).unwrap();
    assert_eq!(big.snapshot(), vec![r2.clone(), r1.clone()]);
    assert_eq!(
        listener.take(),
        vec![ListenerCall::Begin, ListenerCall::Add(r1.clone()), ListenerCall::End]
    );

    // included -> excluded
    r2.set_value(0);
    root.notify_changed(1).unwrap();
    assert_eq!(big.snapshot(), vec![r1.clone()]);
    assert_eq!(
        listener.take(),
        vec![ListenerCall::Begin, ListenerCall::Remove(r2.clone()), ListenerCall::End]
    );

    // included -> included
    observer.take();
    r1.set_value(30);
    root.notify_changed(0).unwrap();
    assert_eq!(big.snapshot(), vec![r1.clone()]);
    assert_eq!(
        listener.take(),
        vec![ListenerCall::Begin, ListenerCall::Change(r1.clone()), ListenerCall::End]
    );
    assert_eq!(observer.events(), vec![ChangeEvent::Changed { index: 0 }]);

    // excluded -> excluded
    root.notify_changed(1).unwrap();
    assert!(listener.take().is_empty());
}

#[test]
fn stale_change_index_is_reported() {
    let root = ViewNode::root("rows");
    let view = root.derive(accept_all(), DeriveMode::Live);
    root.push(Row::new(1, 1)).unwrap();

    let err = view.receive(&ChangeEvent::Changed { index: 7 }).unwrap_err();
    assert_matches!(err, CascadeError::IndexOutOfRange { index: 7, .. });
    assert_eq!(view.len(), 1);
}

#[test]
fn chained_views_cascade() {
    let root = ViewNode::root("numbers");
    let even = root.derive(filter_fn(|n: &u32| n % 2 == 0), DeriveMode::Live);
    let big_even = even.derive(filter_fn(|n: &u32| *n > 10), DeriveMode::Live);

    for n in [4, 12, 13, 20, 7] {
        root.push(n).unwrap();
    }
    assert_eq!(even.snapshot(), vec![4, 12, 20]);
    assert_eq!(big_even.snapshot(), vec![12, 20]);

    root.remove_item(&12).unwrap();
    assert_eq!(big_even.snapshot(), vec![20]);

    root.replace_all(vec![30, 31, 2]).unwrap();
    assert_eq!(even.snapshot(), vec![30, 2]);
    assert_eq!(big_even.snapshot(), vec![30]);
}

#[test]
fn set_replaces_membership() {
    let root = ViewNode::root("numbers");
    let even = root.derive(filter_fn(|n: &u32| n % 2 == 0), DeriveMode::Live);
    root.push(2).unwrap();
    root.push(3).unwrap();

    let old = root.set(0, 5).unwrap();
    assert_eq!(old, 2);
    assert!(even.is_empty());

    root.set(1, 8).unwrap();
    assert_eq!(root.snapshot(), vec![5, 8]);
    assert_eq!(even.snapshot(), vec![8]);
}

#[test]
fn schema_change_resynchronizes_children() {
    let root = ViewNode::root("rows");
    let big = root.derive(at_least(10), DeriveMode::Live);
    let r1 = Row::new(1, 1);
    root.push(r1.clone()).unwrap();
    let (observer, _) = RecordingObserver::attach(&big);

    // Mutated without a change notification, then the whole shape is re-read.
    r1.set_value(50);
    root.notify_schema_changed().unwrap();

    assert_eq!(big.snapshot(), vec![r1]);
    assert_eq!(observer.events(), vec![ChangeEvent::Reset]);
}

// ============================================================================
// Deletes and unsupported events
// ============================================================================

#[test]
fn positional_removal_never_mutates() {
    let root: ViewNode<u32> = ViewNode::root("numbers");
    let view = root.derive(accept_all(), DeriveMode::Live);
    root.push(1).unwrap();
    let listener = Arc::new(RecordingListener::<u32>::new());
    view.add_listener(listener.clone());
    listener.take();
    let (observer, _) = RecordingObserver::attach(&view);

    view.receive(&ChangeEvent::Removed { index: 0 }).unwrap();

    assert_eq!(view.snapshot(), vec![1]);
    assert!(listener.take().is_empty());
    assert!(observer.calls().is_empty());
}

#[test]
fn delete_of_absent_item_is_a_no_op() {
    let root: ViewNode<u32> = ViewNode::root("numbers");
    let odd = root.derive(filter_fn(|n: &u32| n % 2 == 1), DeriveMode::Live);
    root.push(2).unwrap();
    let (observer, _) = RecordingObserver::attach(&odd);

    root.remove_item(&2).unwrap();
    assert!(observer.calls().is_empty());
}

#[test]
fn moves_fail_everywhere() {
    let root = ViewNode::root("numbers");
    let view = root.derive(accept_all(), DeriveMode::Live);
    root.push(1u32).unwrap();
    root.push(2).unwrap();

    let err = root.move_item(0, 1).unwrap_err();
    assert_matches!(err, CascadeError::Unsupported { .. });
    assert!(err.is_fatal());

    let err = view
        .receive(&ChangeEvent::Moved {
            old_index: 1,
            new_index: 0,
        })
        .unwrap_err();
    assert_eq!(err.code(), CascadeError::unsupported("x").code());
    assert_eq!(view.snapshot(), vec![1, 2]);
}

#[test]
fn failing_observer_does_not_block_others() {
    init_test_tracing();
    let root: ViewNode<u32> = ViewNode::root("numbers");
    let (failing, _) = RecordingObserver::attach(&root);
    let (healthy, _) = RecordingObserver::attach(&root);
    failing.reject(ChangeKind::Added);

    let err = root.push(1).unwrap_err();
    assert_matches!(err, CascadeError::Internal { .. });
    assert_eq!(root.snapshot(), vec![1]);
    assert_eq!(
        healthy.calls(),
        vec![ObservedCall::Change(ChangeEvent::Added { item: 1, index: 0 })]
    );
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn snapshot_views_do_not_follow_upstream() {
    let root = ViewNode::root("numbers");
    root.push(1u32).unwrap();
    let copy = root.derive(accept_all(), DeriveMode::Snapshot);
    root.push(2).unwrap();

    assert_eq!(copy.snapshot(), vec![1]);
    copy.set_filter(filter_fn(|n: &u32| *n > 1)).unwrap();
    assert!(copy.is_empty());
}

#[test]
fn dispose_detaches_from_upstream() {
    let root: ViewNode<u32> = ViewNode::root("numbers");
    let view = root.derive(accept_all(), DeriveMode::Live);
    let listener = Arc::new(RecordingListener::<u32>::new());
    view.add_listener(listener.clone());
    root.push(1).unwrap();

    view.dispose();
    listener.take();
    root.push(2).unwrap();

    assert_eq!(root.observer_count(), 0);
    assert_eq!(view.listener_count(), 0);
    assert!(listener.take().is_empty());
}

#[test]
fn update_scopes_reach_observers_once() {
    let root: ViewNode<u32> = ViewNode::root("numbers");
    let (observer, _) = RecordingObserver::attach(&root);
    {
        let _scope = root.update_scope();
        root.push(1).unwrap();
    }
    assert_eq!(
        observer.calls(),
        vec![
            ObservedCall::Begin,
            ObservedCall::Change(ChangeEvent::Added { item: 1, index: 0 }),
            ObservedCall::End,
        ]
    );
}

#[test]
fn unsubscribe_stops_notifications() {
    let root: ViewNode<u32> = ViewNode::root("numbers");
    let (observer, id) = RecordingObserver::attach(&root);
    assert!(root.unsubscribe(id));
    root.push(1).unwrap();
    assert!(observer.calls().is_empty());
}

// ============================================================================
// Distinct values on a view
// ============================================================================

#[test]
fn distinct_values_count_through_a_view() {
    let root: ViewNode<Option<i32>> = ViewNode::root("values");
    let distinct = Arc::new(DistinctValues::new(|item: &Option<i32>| *item));
    root.add_listener(distinct.clone());

    for item in [Some(1), None, Some(1), Some(2)] {
        root.push(item).unwrap();
    }
    root.remove_item(&Some(2)).unwrap();

    let one = distinct.entry(&1).unwrap();
    assert_eq!(one.ref_count, 2);
    assert_eq!(distinct.entry(&2), None);
    assert_eq!(distinct.null_count(), 1);
}

#[test]
fn distinct_values_follow_filter_changes() {
    let root = ViewNode::root("rows");
    let view = root.derive(at_least(10), DeriveMode::Live);
    let categories = Arc::new(
        DistinctValues::new(|row: &Row| row.category().map(str::to_string)).with_options(
            DistinctOptions {
                include_all: true,
                include_none: true,
            },
        ),
    );
    view.add_listener(categories.clone());

    root.push(Row::with_category(1, 10, "beta")).unwrap();
    root.push(Row::with_category(2, 50, "Alpha")).unwrap();
    root.push(Row::new(3, 99)).unwrap();
    root.push(Row::with_category(4, 1, "gamma")).unwrap();

    assert_eq!(
        categories.published(),
        vec![
            DistinctChoice::All,
            DistinctChoice::None,
            DistinctChoice::Value {
                value: "Alpha".to_string(),
                caption: "Alpha".to_string()
            },
            DistinctChoice::Value {
                value: "beta".to_string(),
                caption: "beta".to_string()
            },
        ]
    );

    view.set_filter(at_least(60)).unwrap();
    assert_eq!(
        categories.published(),
        vec![DistinctChoice::All, DistinctChoice::None]
    );
}
