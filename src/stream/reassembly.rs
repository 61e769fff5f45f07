//! Out-of-order fragment reassembly
//!
//! When the backend switches a stream into out-of-order mode, every text delta
//! carries a sequence tag. [`ReassemblyBuffer`] records fragments by sequence
//! and materializes the visible text independent of arrival order.

use std::collections::BTreeMap;

/// A text fragment carrying an explicit ordering key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedFragment {
    pub sequence: i64,
    pub data: String,
}

impl OrderedFragment {
    pub fn new(sequence: i64, data: impl Into<String>) -> Self {
        Self {
            sequence,
            data: data.into(),
        }
    }
}

/// Fragments keyed by sequence number
///
/// # Materialization
///
/// [`get_text`](Self::get_text) returns, in ascending order:
/// 1. every fragment with a negative sequence, then
/// 2. the maximal contiguous run starting at sequence 0.
///
/// Fragments after the first gap are retained and appear once the gap fills.
/// Inserting a fragment never changes the materialized text of any sequence
/// lower than its own.
///
/// # Duplicates
///
/// The first payload recorded for a sequence wins. A retried or duplicated
/// fragment is ignored, so text that has already been shown never changes.
#[derive(Debug, Clone, Default)]
pub struct ReassemblyBuffer {
    fragments: BTreeMap<i64, String>,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fragment at its declared sequence
    ///
    /// Returns `false` if the sequence was already present (the existing
    /// payload is kept).
    pub fn add_event(&mut self, fragment: OrderedFragment) -> bool {
        use std::collections::btree_map::Entry;

        match self.fragments.entry(fragment.sequence) {
            Entry::Vacant(slot) => {
                slot.insert(fragment.data);
                true
            }
            Entry::Occupied(existing) => {
                if existing.get() != &fragment.data {
                    tracing::debug!(
                        sequence = fragment.sequence,
                        kept_len = existing.get().len(),
                        dropped_len = fragment.data.len(),
                        "Duplicate fragment with different payload ignored"
                    );
                }
                false
            }
        }
    }

    /// Materialize the visible text
    pub fn get_text(&self) -> String {
        let mut text = String::new();

        for (_, data) in self.fragments.range(..0) {
            text.push_str(data);
        }

        let mut expected = 0i64;
        for (&sequence, data) in self.fragments.range(0..) {
            if sequence != expected {
                break;
            }
            text.push_str(data);
            expected += 1;
        }

        text
    }

    /// Number of sequences materialized from 0 without a gap
    pub fn contiguous_len(&self) -> usize {
        self.fragments
            .range(0..)
            .zip(0i64..)
            .take_while(|((sequence, _), expected)| **sequence == *expected)
            .count()
    }

    /// Number of non-negative fragments retained behind a gap
    pub fn pending(&self) -> usize {
        self.fragments.range(0..).count() - self.contiguous_len()
    }

    /// Number of fragments `get_text` currently renders
    pub fn visible_len(&self) -> usize {
        self.fragments.range(..0).count() + self.contiguous_len()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn buffer_from(fragments: &[(i64, &str)]) -> ReassemblyBuffer {
        let mut buffer = ReassemblyBuffer::new();
        for (sequence, data) in fragments {
            buffer.add_event(OrderedFragment::new(*sequence, *data));
        }
        buffer
    }

    #[test]
    fn test_empty_buffer_materializes_empty_text() {
        let buffer = ReassemblyBuffer::new();
        assert_eq!(buffer.get_text(), "");
        assert!(buffer.is_empty());
        assert_eq!(buffer.visible_len(), 0);
    }

    #[test]
    fn test_reverse_arrival_is_reordered() {
        let buffer = buffer_from(&[(1, "World"), (0, "Hello ")]);
        assert_eq!(buffer.get_text(), "Hello World");
    }

    #[test]
    fn test_gap_blocks_later_fragments() {
        let mut buffer = buffer_from(&[(0, "a"), (2, "c"), (3, "d")]);
        assert_eq!(buffer.get_text(), "a");
        assert_eq!(buffer.contiguous_len(), 1);
        assert_eq!(buffer.pending(), 2);

        buffer.add_event(OrderedFragment::new(1, "b"));
        assert_eq!(buffer.get_text(), "abcd");
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_missing_zero_materializes_nothing() {
        let buffer = buffer_from(&[(1, "b"), (2, "c")]);
        assert_eq!(buffer.get_text(), "");
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_duplicate_sequence_keeps_first_payload() {
        let mut buffer = ReassemblyBuffer::new();
        assert!(buffer.add_event(OrderedFragment::new(0, "first")));
        assert!(!buffer.add_event(OrderedFragment::new(0, "second")));
        assert_eq!(buffer.get_text(), "first");
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_negative_sequences_precede_zero() {
        let buffer = buffer_from(&[(0, "c"), (-1, "b"), (-5, "a")]);
        assert_eq!(buffer.get_text(), "abc");
    }

    #[test]
    fn test_visible_len_ignores_fragments_behind_gap() {
        let buffer = buffer_from(&[(-2, "x"), (0, "a"), (1, "b"), (7, "h")]);
        assert_eq!(buffer.visible_len(), 3);
        assert_eq!(buffer.pending(), 1);

        let without_zero = buffer_from(&[(-3, "x"), (4, "e")]);
        assert_eq!(without_zero.visible_len(), 1);
    }

    fn fragments_strategy() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-z ]{0,6}", 1..24)
    }

    proptest! {
        #[test]
        fn prop_arrival_order_does_not_matter(
            (payloads, order) in fragments_strategy().prop_flat_map(|payloads| {
                let indices: Vec<usize> = (0..payloads.len()).collect();
                (Just(payloads), Just(indices).prop_shuffle())
            })
        ) {
            let mut buffer = ReassemblyBuffer::new();
            for index in order {
                buffer.add_event(OrderedFragment::new(index as i64, payloads[index].clone()));
            }
            prop_assert_eq!(buffer.get_text(), payloads.concat());
        }

        #[test]
        fn prop_prefix_visible_despite_later_arrivals(
            payloads in fragments_strategy(),
            cut in 0usize..24,
        ) {
            let cut = cut.min(payloads.len());
            let mut buffer = ReassemblyBuffer::new();
            // Everything after the cut arrives first, sequence `cut` stays missing.
            for (index, data) in payloads.iter().enumerate().skip(cut + 1) {
                buffer.add_event(OrderedFragment::new(index as i64, data.clone()));
            }
            for (index, data) in payloads.iter().enumerate().take(cut) {
                buffer.add_event(OrderedFragment::new(index as i64, data.clone()));
            }
            prop_assert_eq!(buffer.get_text(), payloads[..cut].concat());
        }

        #[test]
        fn prop_duplicate_insertion_is_idempotent(
            payloads in fragments_strategy(),
            repeat in 0usize..24,
        ) {
            let mut once = ReassemblyBuffer::new();
            let mut twice = ReassemblyBuffer::new();
            for (index, data) in payloads.iter().enumerate() {
                once.add_event(OrderedFragment::new(index as i64, data.clone()));
                twice.add_event(OrderedFragment::new(index as i64, data.clone()));
            }
            let repeat = repeat % payloads.len();
            twice.add_event(OrderedFragment::new(repeat as i64, payloads[repeat].clone()));
            prop_assert_eq!(once.get_text(), twice.get_text());
        }

        #[test]
        fn prop_insertion_never_rewrites_lower_sequences(
            payloads in fragments_strategy(),
        ) {
            let mut buffer = ReassemblyBuffer::new();
            let mut previous = String::new();
            for (index, data) in payloads.iter().enumerate() {
                buffer.add_event(OrderedFragment::new(index as i64, data.clone()));
                let current = buffer.get_text();
                prop_assert!(current.starts_with(&previous));
                previous = current;
            }
        }
    }
}
