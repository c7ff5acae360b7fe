//! Distinct-value aggregation
//!
//! [`DistinctValues`] is a [`ViewListener`] that projects one field out of
//! every item in a view, reference-counts the projected values and publishes
//! a sorted list of choices. At the end of every outermost update scope the
//! freshly computed list is reconciled against the previously published one
//! with [`merge_diff`], so consumers only ever see the minimal edits.
//!
//! ## Limitations
//!
//! `change(item)` is ignored: the projected field is assumed immutable for
//! the lifetime of an item. Mutating it in place leaves stale counts behind
//! until the next reset.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use cascade_core::ViewListener;
use parking_lot::Mutex;

use crate::diff::{apply_diff, merge_diff, DiffOp};

// =============================================================================
// Ordering of projected values
// =============================================================================

/// A projected value that can be counted and sorted for display.
pub trait DistinctKey: Clone + Eq + Hash + Send + Sync + 'static {
    /// Display order of two values.
    fn key_cmp(&self, other: &Self) -> Ordering;
}

fn caseless_cmp(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}

impl DistinctKey for String {
    fn key_cmp(&self, other: &Self) -> Ordering {
        caseless_cmp(self, other)
    }
}

impl DistinctKey for &'static str {
    fn key_cmp(&self, other: &Self) -> Ordering {
        caseless_cmp(self, other)
    }
}

impl DistinctKey for Arc<str> {
    fn key_cmp(&self, other: &Self) -> Ordering {
        caseless_cmp(self, other)
    }
}

macro_rules! natural_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl DistinctKey for $ty {
                fn key_cmp(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }
            }
        )*
    };
}

natural_key!(bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

// =============================================================================
// Published choices
// =============================================================================

/// One entry of the published list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistinctChoice<V> {
    /// "Any value" sentinel.
    All,
    /// "No value" sentinel, present while some items project to nothing.
    None,
    /// A distinct projected value.
    Value {
        /// The value itself
        value: V,
        /// Display text from the caption formatter
        caption: String,
    },
}

impl<V: DistinctKey> DistinctChoice<V> {
    fn rank(&self) -> u8 {
        match self {
            Self::All => 0,
            Self::None => 1,
            Self::Value { .. } => 2,
        }
    }

    /// Published order: `All`, then `None`, then values by [`DistinctKey`].
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Value { value: a, .. }, Self::Value { value: b, .. }) => a.key_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// The projected value, if this is not a sentinel.
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Value { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// A counted distinct value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinctEntry<V> {
    /// The distinct value
    pub value: V,
    /// Display text computed when the value was first seen
    pub caption: String,
    /// Number of items currently projecting to `value`; at least 1
    pub ref_count: usize,
}

/// Which sentinels to publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistinctOptions {
    /// Always publish [`DistinctChoice::All`] first.
    pub include_all: bool,
    /// Publish [`DistinctChoice::None`] while the null count is non-zero.
    pub include_none: bool,
}

/// Receives the edits applied to the published list.
pub trait DistinctSink<V>: Send + Sync {
    /// Called once per reconciliation that changed anything, after the
    /// published list has been updated.
    fn apply(&self, ops: &[DiffOp<DistinctChoice<V>>]);
}

type Extract<T, V> = Box<dyn Fn(&T) -> Option<V> + Send + Sync>;
type Caption<V> = Box<dyn Fn(&V) -> String + Send + Sync>;

struct DistinctState<V> {
    entries: HashMap<V, DistinctEntry<V>>,
    null_count: usize,
    published: Vec<DistinctChoice<V>>,
    depth: usize,
}

/// Reference-counting distinct-value listener.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use cascade_view::{DistinctChoice, DistinctValues, ViewNode};
///
/// let view = ViewNode::root("cities");
/// let cities = Arc::new(DistinctValues::new(|city: &&'static str| Some(*city)));
/// view.add_listener(cities.clone());
///
/// view.push("Oslo").unwrap();
/// view.push("bergen").unwrap();
/// view.push("Oslo").unwrap();
///
/// let values: Vec<_> = cities.published().iter().filter_map(|c| c.value().copied()).collect();
/// assert_eq!(values, vec!["bergen", "Oslo"]);
/// assert_eq!(cities.entry(&"Oslo").map(|e| e.ref_count), Some(2));
/// ```
pub struct DistinctValues<T, V> {
    extract: Extract<T, V>,
    caption: Caption<V>,
    options: DistinctOptions,
    sink: Option<Arc<dyn DistinctSink<V>>>,
    state: Mutex<DistinctState<V>>,
}

impl<T, V> DistinctValues<T, V>
where
    V: DistinctKey + fmt::Display,
{
    /// Aggregate the field returned by `extract`, captioned by its `Display`.
    pub fn new<F>(extract: F) -> Self
    where
        F: Fn(&T) -> Option<V> + Send + Sync + 'static,
    {
        Self::with_caption(extract, |value: &V| value.to_string())
    }
}

impl<T, V: DistinctKey> DistinctValues<T, V> {
    /// Aggregate the field returned by `extract` with a custom caption formatter.
    pub fn with_caption<F, C>(extract: F, caption: C) -> Self
    where
        F: Fn(&T) -> Option<V> + Send + Sync + 'static,
        C: Fn(&V) -> String + Send + Sync + 'static,
    {
        Self {
            extract: Box::new(extract),
            caption: Box::new(caption),
            options: DistinctOptions::default(),
            sink: None,
            state: Mutex::new(DistinctState {
                entries: HashMap::new(),
                null_count: 0,
                published: Vec::new(),
                depth: 0,
            }),
        }
    }

    /// Set which sentinels are published.
    pub fn with_options(mut self, options: DistinctOptions) -> Self {
        self.options = options;
        self
    }

    /// Forward every reconciliation to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn DistinctSink<V>>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The published, sorted list of choices.
    pub fn published(&self) -> Vec<DistinctChoice<V>> {
        self.state.lock().published.clone()
    }

    /// The counted entry for `value`, if any item projects to it.
    pub fn entry(&self, value: &V) -> Option<DistinctEntry<V>> {
        self.state.lock().entries.get(value).cloned()
    }

    /// All counted entries in display order.
    pub fn entries(&self) -> Vec<DistinctEntry<V>> {
        let mut entries: Vec<_> = self.state.lock().entries.values().cloned().collect();
        entries.sort_by(|a, b| a.value.key_cmp(&b.value));
        entries
    }

    /// Number of items projecting to no value.
    pub fn null_count(&self) -> usize {
        self.state.lock().null_count
    }

    fn compute(&self, state: &DistinctState<V>) -> Vec<DistinctChoice<V>> {
        let mut values: Vec<&DistinctEntry<V>> = state.entries.values().collect();
        values.sort_by(|a, b| a.value.key_cmp(&b.value));

        let mut choices = Vec::with_capacity(values.len() + 2);
        if self.options.include_all {
            choices.push(DistinctChoice::All);
        }
        if self.options.include_none && state.null_count > 0 {
            choices.push(DistinctChoice::None);
        }
        choices.extend(values.into_iter().map(|entry| DistinctChoice::Value {
            value: entry.value.clone(),
            caption: entry.caption.clone(),
        }));
        choices
    }

    fn reconcile(&self) {
        let ops = {
            let mut state = self.state.lock();
            let fresh = self.compute(&state);
            let ops = merge_diff(&state.published, &fresh, |a, b| a.display_cmp(b));
            apply_diff(&mut state.published, ops.iter().cloned());
            debug_assert!(state.published == fresh, "published list diverged");
            ops
        };
        if ops.is_empty() {
            return;
        }
        tracing::trace!(edits = ops.len(), "distinct values reconciled");
        if let Some(sink) = &self.sink {
            sink.apply(&ops);
        }
    }
}

impl<T, V> ViewListener<T> for DistinctValues<T, V>
where
    T: Send + Sync,
    V: DistinctKey,
{
    fn begin_update(&self) {
        self.state.lock().depth += 1;
    }

    fn end_update(&self) {
        let outermost = {
            let mut state = self.state.lock();
            debug_assert!(state.depth > 0, "end_update without matching begin_update");
            state.depth = state.depth.saturating_sub(1);
            state.depth == 0
        };
        if outermost {
            self.reconcile();
        }
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.null_count = 0;
    }

    fn add(&self, item: &T) {
        let Some(value) = (self.extract)(item) else {
            self.state.lock().null_count += 1;
            return;
        };
        if let Some(entry) = self.state.lock().entries.get_mut(&value) {
            entry.ref_count += 1;
            return;
        }
        let caption = (self.caption)(&value);
        self.state
            .lock()
            .entries
            .entry(value.clone())
            .or_insert_with(|| DistinctEntry {
                value,
                caption,
                ref_count: 0,
            })
            .ref_count += 1;
    }

    fn change(&self, _item: &T) {}

    fn remove(&self, item: &T) {
        let value = (self.extract)(item);
        let mut state = self.state.lock();
        let Some(value) = value else {
            debug_assert!(state.null_count > 0, "negative null count");
            state.null_count = state.null_count.saturating_sub(1);
            return;
        };
        let drop_entry = match state.entries.get_mut(&value) {
            Some(entry) => {
                entry.ref_count -= 1;
                entry.ref_count == 0
            }
            None => {
                debug_assert!(false, "negative reference count");
                false
            }
        };
        if drop_entry {
            state.entries.remove(&value);
        }
    }
}

impl<T, V: fmt::Debug> fmt::Debug for DistinctValues<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DistinctValues")
            .field("options", &self.options)
            .field("entries", &state.entries.len())
            .field("null_count", &state.null_count)
            .field("published", &state.published)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints() -> DistinctValues<Option<i32>, i32> {
        DistinctValues::new(|item: &Option<i32>| *item)
    }

    fn scoped(agg: &DistinctValues<Option<i32>, i32>, op: impl FnOnce()) {
        agg.begin_update();
        op();
        agg.end_update();
    }

    #[test]
    fn test_reference_counting() {
        let agg = ints();
        scoped(&agg, || {
            for item in [Some(1), None, Some(1), Some(2)] {
                agg.add(&item);
            }
            agg.remove(&Some(2));
        });

        assert_eq!(agg.entry(&1).map(|e| e.ref_count), Some(2));
        assert_eq!(agg.entry(&2), None);
        assert_eq!(agg.null_count(), 1);
    }

    #[test]
    fn test_change_is_ignored() {
        let agg = ints();
        scoped(&agg, || agg.add(&Some(5)));
        scoped(&agg, || agg.change(&Some(6)));
        assert_eq!(agg.entries().len(), 1);
        assert_eq!(agg.entry(&5).map(|e| e.ref_count), Some(1));
    }

    #[test]
    fn test_published_only_after_outermost_end() {
        let agg = ints();
        agg.begin_update();
        agg.begin_update();
        agg.add(&Some(3));
        agg.end_update();
        assert!(agg.published().is_empty());
        agg.end_update();
        assert_eq!(agg.published().len(), 1);
    }

    #[test]
    fn test_sentinels() {
        let agg = ints().with_options(DistinctOptions {
            include_all: true,
            include_none: true,
        });
        scoped(&agg, || {
            agg.add(&Some(2));
            agg.add(&None);
        });
        assert_eq!(
            agg.published(),
            vec![
                DistinctChoice::All,
                DistinctChoice::None,
                DistinctChoice::Value {
                    value: 2,
                    caption: "2".into()
                },
            ]
        );

        scoped(&agg, || agg.remove(&None));
        assert_eq!(agg.published().len(), 2);
    }

    #[test]
    fn test_strings_sort_case_insensitively() {
        let agg: DistinctValues<String, String> = DistinctValues::new(|s: &String| Some(s.clone()));
        agg.begin_update();
        for name in ["beta", "Alpha", "alpha", "Gamma"] {
            agg.add(&name.to_string());
        }
        agg.end_update();

        let values: Vec<String> = agg
            .published()
            .iter()
            .filter_map(|c| c.value().cloned())
            .collect();
        assert_eq!(values, vec!["Alpha", "alpha", "beta", "Gamma"]);
    }

    #[test]
    fn test_custom_caption() {
        let agg = DistinctValues::with_caption(|n: &u8| Some(*n), |n: &u8| format!("#{n}"));
        agg.begin_update();
        agg.add(&7);
        agg.end_update();
        assert_eq!(agg.entry(&7).map(|e| e.caption), Some("#7".to_string()));
    }

    struct CountingSink(Mutex<Vec<usize>>);

    impl DistinctSink<i32> for CountingSink {
        fn apply(&self, ops: &[DiffOp<DistinctChoice<i32>>]) {
            self.0.lock().push(ops.len());
        }
    }

    #[test]
    fn test_sink_sees_minimal_edits() {
        let sink = Arc::new(CountingSink(Mutex::new(Vec::new())));
        let agg = ints().with_sink(sink.clone());

        scoped(&agg, || {
            agg.add(&Some(1));
            agg.add(&Some(2));
        });
        // Re-adding an existing value publishes nothing.
        scoped(&agg, || agg.add(&Some(1)));
        scoped(&agg, || agg.remove(&Some(2)));

        assert_eq!(*sink.0.lock(), vec![2, 1]);
    }

    #[test]
    fn test_reset_rebuilds_from_scratch() {
        let agg = ints();
        scoped(&agg, || {
            agg.add(&Some(1));
            agg.add(&Some(2));
        });
        scoped(&agg, || {
            agg.reset();
            agg.add(&Some(2));
        });
        let values: Vec<i32> = agg.published().iter().filter_map(|c| c.value().copied()).collect();
        assert_eq!(values, vec![2]);
    }
}
