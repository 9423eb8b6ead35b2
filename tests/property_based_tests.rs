//! Property-based coverage of the pure reconciliation primitives: document
//! diffing and rank interpolation.

use proptest::prelude::*;

use rundown_core::constants::ranks::{MINIMUM_RANK, UNSYNCED_RANK_EPSILON};
use rundown_core::ingest::{diff_documents, ranks};
use rundown_core::models::{RundownId, Segment, SegmentId};

fn segment(id: &str, rank: f64) -> Segment {
    Segment {
        id: SegmentId::new(id),
        rundown_id: RundownId::new("rd0"),
        external_id: id.to_string(),
        name: format!("Segment {id}"),
        rank,
        unsynced: None,
        notes: Vec::new(),
    }
}

fn segment_set_strategy() -> impl Strategy<Value = Vec<Segment>> {
    proptest::collection::btree_map("[a-z]{1,8}", 0.0f64..1000.0, 0..12)
        .prop_map(|m| m.into_iter().map(|(id, rank)| segment(&id, rank)).collect())
}

proptest! {
    /// Property: diffing a document set against itself is empty
    #[test]
    fn diff_of_identical_sets_is_empty(segments in segment_set_strategy()) {
        let changes = diff_documents(&segments, &segments.clone());
        prop_assert!(changes.is_empty());
        prop_assert_eq!(changes.unchanged.len(), segments.len());
    }

    /// Property: every incoming document lands in exactly one bucket, and
    /// removals only name documents that existed
    #[test]
    fn diff_partitions_incoming_documents(
        existing in segment_set_strategy(),
        incoming in segment_set_strategy(),
    ) {
        let changes = diff_documents(&existing, &incoming);
        prop_assert_eq!(
            changes.inserted.len() + changes.changed.len() + changes.unchanged.len(),
            incoming.len()
        );
        for removed in &changes.removed {
            prop_assert!(existing.iter().any(|s| s.id == *removed));
            prop_assert!(!incoming.iter().any(|s| s.id == *removed));
        }
    }

    /// Property: an interpolated rank with a preceding survivor lies
    /// strictly between its neighbors
    #[test]
    fn interpolated_rank_stays_between_neighbors(
        prev in -1.0e6f64..1.0e6,
        gap in 1.0e-3f64..1.0e6,
    ) {
        let next = prev + gap;
        let rank = ranks::interpolate_unsynced_rank(Some(prev), Some(next));
        prop_assert!(rank > prev);
        prop_assert!(rank < next);
    }

    /// Property: with no preceding survivor the rank is pinned to the
    /// minimum representable value, regardless of what follows
    #[test]
    fn interpolated_rank_without_predecessor_is_minimum(next in proptest::option::of(-1.0e6f64..1.0e6)) {
        prop_assert_eq!(ranks::interpolate_unsynced_rank(None, next), MINIMUM_RANK);
    }

    /// Property: after the last survivor the rank steps past it by the
    /// fixed epsilon
    #[test]
    fn interpolated_rank_after_last_survivor_steps_by_epsilon(prev in -1.0e6f64..1.0e6) {
        let rank = ranks::interpolate_unsynced_rank(Some(prev), None);
        prop_assert!(rank > prev);
        prop_assert!((rank - prev) <= UNSYNCED_RANK_EPSILON * 2.0);
    }
}
