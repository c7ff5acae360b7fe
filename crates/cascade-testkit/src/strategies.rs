//! Property test strategies for mirror mutations.

use proptest::prelude::*;

// Re-export proptest for convenience
pub use proptest;

use cascade_view::ViewNode;

/// One mutation of a root mirror holding small integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOp {
    /// Append a value
    Push(u32),
    /// Remove the item at `index % len`
    RemoveAt(usize),
    /// Replace the item at `index % len`
    Set(usize, u32),
    /// Announce an in-place change at `index % len`
    Touch(usize),
    /// Remove everything
    Clear,
}

/// Strategy for a single [`MirrorOp`], weighted toward pushes.
pub fn arb_mirror_op() -> impl Strategy<Value = MirrorOp> {
    prop_oneof![
        6 => (0u32..50).prop_map(MirrorOp::Push),
        3 => any::<usize>().prop_map(MirrorOp::RemoveAt),
        2 => (any::<usize>(), 0u32..50).prop_map(|(i, v)| MirrorOp::Set(i, v)),
        2 => any::<usize>().prop_map(MirrorOp::Touch),
        1 => Just(MirrorOp::Clear),
    ]
}

/// Strategy for up to `max_len` mirror operations.
///
/// # Example
///
/// ```rust
/// use cascade_testkit::{apply_op, arb_mirror_ops};
/// use cascade_view::ViewNode;
/// use proptest::prelude::*;
///
/// proptest! {
///     #[test]
///     fn test_ops_never_panic(ops in arb_mirror_ops(20)) {
///         let mirror = ViewNode::root("mirror");
///         for op in &ops {
///             apply_op(&mirror, op);
///         }
///     }
/// }
/// ```
pub fn arb_mirror_ops(max_len: usize) -> impl Strategy<Value = Vec<MirrorOp>> {
    prop::collection::vec(arb_mirror_op(), 0..=max_len)
}

/// Apply `op` to `mirror`. Index-based operations on an empty mirror are skipped.
pub fn apply_op(mirror: &ViewNode<u32>, op: &MirrorOp) {
    let len = mirror.len();
    match *op {
        MirrorOp::Push(value) => mirror.push(value).unwrap(),
        MirrorOp::RemoveAt(index) if len > 0 => {
            mirror.remove_at(index % len).unwrap();
        }
        MirrorOp::Set(index, value) if len > 0 => {
            mirror.set(index % len, value).unwrap();
        }
        MirrorOp::Touch(index) if len > 0 => mirror.notify_changed(index % len).unwrap(),
        MirrorOp::Clear => mirror.clear().unwrap(),
        _ => {}
    }
}
