//! Ordered two-pointer merge-diff
//!
//! Reconciles a previously published sorted list against a freshly computed
//! one and yields the minimal insert/remove operations. Both inputs must be
//! sorted by the same comparator; the result is undefined otherwise.
//!
//! Operation indices refer to the list *as it is being edited*: applying the
//! operations in order to `old` produces `new`.

use std::cmp::Ordering;

/// One edit produced by [`merge_diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOp<T> {
    /// Insert `item` at `index`.
    Insert {
        /// Position in the edited sequence
        index: usize,
        /// Entry to insert
        item: T,
    },
    /// Remove `item`, currently at `index`.
    Remove {
        /// Position in the edited sequence
        index: usize,
        /// Entry being removed
        item: T,
    },
}

impl<T> DiffOp<T> {
    /// The position the edit applies to.
    pub fn index(&self) -> usize {
        match self {
            Self::Insert { index, .. } | Self::Remove { index, .. } => *index,
        }
    }

    /// The inserted or removed entry.
    pub fn item(&self) -> &T {
        match self {
            Self::Insert { item, .. } | Self::Remove { item, .. } => item,
        }
    }
}

/// Compute the edits that turn `old` into `new`.
///
/// Single pass, O(old + new). Entries comparing equal are left untouched.
///
/// # Example
///
/// ```rust
/// use cascade_view::{merge_diff, DiffOp};
///
/// let old = [("A", 1), ("B", 2)];
/// let new = [("A", 1), ("C", 3)];
/// let ops = merge_diff(&old, &new, |a, b| a.0.cmp(b.0));
///
/// assert_eq!(
///     ops,
///     vec![
///         DiffOp::Remove { index: 1, item: ("B", 2) },
///         DiffOp::Insert { index: 1, item: ("C", 3) },
///     ]
/// );
/// ```
pub fn merge_diff<T, F>(old: &[T], new: &[T], mut cmp: F) -> Vec<DiffOp<T>>
where
    T: Clone,
    F: FnMut(&T, &T) -> Ordering,
{
    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    // Position in the list being edited.
    let mut at = 0;

    while i < old.len() && j < new.len() {
        match cmp(&new[j], &old[i]) {
            Ordering::Equal => {
                i += 1;
                j += 1;
                at += 1;
            }
            Ordering::Less => {
                ops.push(DiffOp::Insert {
                    index: at,
                    item: new[j].clone(),
                });
                j += 1;
                at += 1;
            }
            Ordering::Greater => {
                ops.push(DiffOp::Remove {
                    index: at,
                    item: old[i].clone(),
                });
                i += 1;
            }
        }
    }

    for item in &old[i..] {
        ops.push(DiffOp::Remove {
            index: at,
            item: item.clone(),
        });
    }
    for item in &new[j..] {
        ops.push(DiffOp::Insert {
            index: at,
            item: item.clone(),
        });
        at += 1;
    }

    ops
}

/// Apply edits produced by [`merge_diff`] to `target`.
///
/// Out-of-range indices are clamped; they only occur when the inputs were
/// not sorted by the diff comparator.
pub fn apply_diff<T>(target: &mut Vec<T>, ops: impl IntoIterator<Item = DiffOp<T>>) {
    for op in ops {
        match op {
            DiffOp::Insert { index, item } => {
                let at = index.min(target.len());
                target.insert(at, item);
            }
            DiffOp::Remove { index, .. } => {
                debug_assert!(index < target.len(), "diff removal past end");
                if index < target.len() {
                    target.remove(index);
                }
            }
        }
    }
}
