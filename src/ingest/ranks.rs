//! Rank arithmetic: sparse float ordering with epsilon interpolation.
//!
//! Ranks are floats and not necessarily contiguous. Reordering assigns new
//! ranks outright; an unsynced segment instead keeps a rank interpolated
//! strictly between its surviving neighbors so it renders in a stable
//! relative position while siblings move around it.

use std::cmp::Ordering;

use crate::cache::PlaylistCache;
use crate::constants::ranks::{MINIMUM_RANK, QUEUED_PART_RANK_STEP, UNSYNCED_RANK_EPSILON};
use crate::models::{Part, RundownId, SegmentId};

/// Rank for an unsynced segment given its surviving neighbors' ranks.
///
/// With a preceding survivor the rank steps `UNSYNCED_RANK_EPSILON` past it,
/// falling back to the midpoint when the epsilon step would collide with the
/// following survivor. With no preceding survivor the rank is driven to the
/// minimum representable value.
pub fn interpolate_unsynced_rank(prev: Option<f64>, next: Option<f64>) -> f64 {
    match (prev, next) {
        (Some(prev_rank), Some(next_rank)) => {
            let stepped = prev_rank + UNSYNCED_RANK_EPSILON;
            if stepped < next_rank {
                stepped
            } else {
                prev_rank + (next_rank - prev_rank) / 2.0
            }
        }
        (Some(prev_rank), None) => prev_rank + UNSYNCED_RANK_EPSILON,
        (None, _) => MINIMUM_RANK,
    }
}

/// Segment ids of one rundown in their current rank order. Captured at the
/// start of a reconciliation, before any rank mutation, so unsynced
/// segments can be re-slotted against the order they actually held.
pub fn capture_segment_order(cache: &PlaylistCache, rundown_id: &RundownId) -> Vec<SegmentId> {
    let mut segments = cache.segments.find(|s| s.rundown_id == *rundown_id);
    segments.sort_by(|a, b| a.rank.partial_cmp(&b.rank).unwrap_or(Ordering::Equal));
    segments.into_iter().map(|s| s.id).collect()
}

/// Re-interpolate every unsynced segment of `rundown_id` between its
/// rank-surviving neighbors from `previous_order`, using the neighbors' NEW
/// ranks. Runs after each reconciliation that touched the rundown, so the
/// frozen segment keeps rendering in a stable relative position while
/// siblings are reordered, removed, or renormalized around it.
pub fn update_unsynced_segment_ranks(
    cache: &mut PlaylistCache,
    rundown_id: &RundownId,
    previous_order: &[SegmentId],
) {
    let unsynced: Vec<(SegmentId, f64)> = cache
        .segments
        .find(|s| s.rundown_id == *rundown_id && s.is_unsynced())
        .into_iter()
        .map(|s| (s.id, s.rank))
        .collect();
    // Post-apply ranks of the synced survivors; only they can be neighbors
    let synced_ranks: std::collections::HashMap<SegmentId, f64> = cache
        .segments
        .find(|s| s.rundown_id == *rundown_id && !s.is_unsynced())
        .into_iter()
        .map(|s| (s.id, s.rank))
        .collect();

    for (segment_id, own_rank) in unsynced {
        let (prev, next) = match previous_order.iter().position(|id| *id == segment_id) {
            Some(idx) => {
                let prev = previous_order[..idx]
                    .iter()
                    .rev()
                    .find_map(|id| synced_ranks.get(id).copied());
                let next = previous_order[idx + 1..]
                    .iter()
                    .find_map(|id| synced_ranks.get(id).copied());
                (prev, next)
            }
            // Not in the captured order (unsynced before this rundown's
            // first capture): fall back to the current neighbors by rank
            None => {
                let prev = synced_ranks
                    .values()
                    .copied()
                    .filter(|r| *r < own_rank)
                    .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.max(r))));
                let next = synced_ranks
                    .values()
                    .copied()
                    .filter(|r| *r > own_rank)
                    .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.min(r))));
                (prev, next)
            }
        };
        let rank = interpolate_unsynced_rank(prev, next);
        cache.segments.update(&segment_id, |s| s.rank = rank);
    }
}

/// Renormalize part ranks within one segment: ingest-sourced parts take
/// sequential integer ranks in their current order, and dynamically inserted
/// parts are re-slotted strictly between their anchor and the following part.
pub fn renormalize_part_ranks(cache: &mut PlaylistCache, segment_id: &SegmentId) {
    let mut parts = cache.parts.find(|p| p.segment_id == *segment_id);
    parts.sort_by(|a, b| a.rank.partial_cmp(&b.rank).unwrap_or(Ordering::Equal));

    let ingest_parts: Vec<&Part> = parts
        .iter()
        .filter(|p| !p.is_dynamically_inserted())
        .collect();
    let mut new_ranks: Vec<(crate::models::PartId, f64)> = ingest_parts
        .iter()
        .enumerate()
        .map(|(idx, part)| (part.id.clone(), idx as f64))
        .collect();

    // Dynamically inserted parts stack after their anchor in insertion order
    for anchor in &ingest_parts {
        let anchor_rank = new_ranks
            .iter()
            .find(|(id, _)| *id == anchor.id)
            .map(|(_, rank)| *rank)
            .unwrap_or(0.0);
        let mut inserted: Vec<&Part> = parts
            .iter()
            .filter(|p| p.dynamically_inserted_after_part_id.as_ref() == Some(&anchor.id))
            .collect();
        inserted.sort_by(|a, b| a.rank.partial_cmp(&b.rank).unwrap_or(Ordering::Equal));
        let count = inserted.len() as f64;
        for (idx, part) in inserted.iter().enumerate() {
            let offset = QUEUED_PART_RANK_STEP * ((idx + 1) as f64) / (count + 1.0);
            new_ranks.push((part.id.clone(), anchor_rank + offset));
        }
    }

    for (part_id, rank) in new_ranks {
        cache.parts.update(&part_id, |p| p.rank = rank);
    }
}
