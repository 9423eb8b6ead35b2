//! Next-part selection and revalidation. Shared by playout (take, set-next)
//! and ingest (next-pointer repair after applied changes).

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::cache::PlaylistCache;
use crate::error::{not_found, Result};
use crate::models::{Part, PartId};

use super::instances;

/// Playback-order key of a part within its playlist
fn order_key(cache: &PlaylistCache, part: &Part) -> (usize, f64, f64) {
    let rundown_idx = cache
        .ordered_rundown_ids()
        .iter()
        .position(|id| *id == part.rundown_id)
        .unwrap_or(usize::MAX);
    let segment_rank = cache
        .segments
        .find_one(&part.segment_id)
        .map(|s| s.rank)
        .unwrap_or(f64::MAX);
    (rundown_idx, segment_rank, part.rank)
}

fn key_cmp(a: &(usize, f64, f64), b: &(usize, f64, f64)) -> Ordering {
    a.0.cmp(&b.0)
        .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .then(a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal))
}

/// First playable part strictly after `after` in playback order, or the
/// first playable part of the playlist when `after` is `None`. Works even
/// when `after` itself no longer exists in the cache.
pub fn select_next_part(cache: &PlaylistCache, after: Option<&Part>) -> Option<Part> {
    let parts = cache.all_ordered_parts();
    match after {
        None => parts.into_iter().find(Part::is_playable),
        Some(after) => {
            let after_key = order_key(cache, after);
            parts
                .into_iter()
                .filter(|p| p.id != after.id)
                .find(|p| {
                    p.is_playable() && key_cmp(&order_key(cache, p), &after_key) == Ordering::Greater
                })
        }
    }
}

/// Point `next` at `part`, instantiating it. A stale untaken next instance
/// is reset first; an existing untaken instance of the same part is reused
/// so repeated revalidation does not churn instances.
pub fn set_next_part(
    cache: &mut PlaylistCache,
    part: Option<&Part>,
    next_time_offset: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(part) = part else {
        if let Some(stale_id) = cache.playlist.next_part_instance_id.clone() {
            let stale_untaken = cache
                .part_instances
                .find_one(&stale_id)
                .map(|pi| !pi.is_taken)
                .unwrap_or(false);
            if stale_untaken {
                instances::reset_part_instance(cache, &stale_id);
            }
        }
        cache.playlist.next_part_instance_id = None;
        cache.playlist.next_time_offset = None;
        return Ok(());
    };

    if !part.is_playable() {
        return Err(crate::error::precondition(format!(
            "part {} is not playable",
            part.id
        )));
    }

    // Reuse a matching untaken next instance as-is
    let reusable = cache
        .next_part_instance()
        .map(|existing| !existing.is_taken && !existing.reset && existing.part.id == part.id)
        .unwrap_or(false);
    if reusable {
        cache.playlist.next_time_offset = next_time_offset;
        return Ok(());
    }

    if let Some(stale_id) = cache.playlist.next_part_instance_id.clone() {
        let stale_untaken = cache
            .part_instances
            .find_one(&stale_id)
            .map(|pi| !pi.is_taken)
            .unwrap_or(false);
        if stale_untaken {
            instances::reset_part_instance(cache, &stale_id);
        }
    }

    let take_count = cache
        .current_part_instance()
        .map(|pi| pi.take_count + 1)
        .unwrap_or(1);
    let continue_from = cache.playlist.current_part_instance_id.clone();
    let instance_id =
        instances::create_part_instance(cache, part, take_count, continue_from.as_ref(), now);

    cache.playlist.next_part_instance_id = Some(instance_id);
    cache.playlist.next_time_offset = next_time_offset;
    instances::clean_up_orphaned_dynamic_parts(cache);
    Ok(())
}

/// Operator set-next by part id
pub fn set_next_part_by_id(
    cache: &mut PlaylistCache,
    part_id: &PartId,
    next_time_offset: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    let part = cache
        .parts
        .find_one(part_id)
        .cloned()
        .ok_or_else(|| not_found(format!("part {part_id}")))?;
    set_next_part(cache, Some(&part), next_time_offset, now)
}

/// Repair the next pointer after ingest or playout changed the part pool.
/// A valid existing selection is kept (it may be a manual choice); anything
/// missing, reset, or pointing at a vanished/unplayable part is re-selected
/// relative to the current part.
pub fn ensure_next_part_is_valid(cache: &mut PlaylistCache, now: DateTime<Utc>) -> Result<()> {
    if !cache.playlist.active {
        return Ok(());
    }

    let next_is_valid = cache.next_part_instance().is_some_and(|next| {
        if next.reset || next.is_taken {
            return false;
        }
        cache
            .parts
            .find_one(&next.part.id)
            .map(Part::is_playable)
            .unwrap_or(false)
    });
    if next_is_valid {
        return Ok(());
    }

    let after = cache.current_part_instance().map(|pi| pi.part.clone());
    let candidate = select_next_part(cache, after.as_ref());
    set_next_part(cache, candidate.as_ref(), None, now)
}
