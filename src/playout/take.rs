//! The take choreography: advance `current` to `next` while preserving
//! continuity of infinite pieces and the hold contract.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::cache::PlaylistCache;
use crate::config::RundownConfig;
use crate::error::Result;
use crate::ingest::blueprint::ShowStyle;
use crate::models::{HoldState, PartInstance};

use super::{guards, hold, infinites, selection};

/// Outcome of a committed take, handed to the post-take hooks
#[derive(Debug, Clone)]
pub struct TakeResult {
    pub taken_part_instance: PartInstance,
    pub is_first_take: bool,
}

/// Perform a take. Guards run before any mutation; a failure leaves the
/// cache untouched for discard.
pub async fn take(
    cache: &mut PlaylistCache,
    blueprint: &Arc<dyn ShowStyle>,
    config: &RundownConfig,
    now: DateTime<Utc>,
) -> Result<TakeResult> {
    guards::check_active(cache)?;
    let incoming = guards::check_next_exists(cache)?.clone();
    guards::check_no_transition_in_progress(cache, now)?;
    guards::check_not_close_to_autonext(cache, now, config.autonext_guard_ms)?;

    // A still-active hold is completed before this take proceeds
    if cache.playlist.hold_state == HoldState::Active {
        hold::complete_hold(cache, now);
    }

    // Best-effort: a failing pre-take hook never blocks the take
    if let Err(e) = blueprint.on_pre_take(&incoming).await {
        tracing::warn!(error = %e, "pre-take hook failed; continuing");
    }

    let outgoing = cache.current_part_instance().cloned();

    // Capture the outgoing part's end state for continuity decisions
    if let Some(outgoing) = &outgoing {
        let resolved = cache.piece_instances_of(&outgoing.id);
        let end_state = blueprint.get_part_end_state(outgoing, &resolved);
        cache.part_instances.update(&incoming.id, |pi| {
            pi.previous_part_end_state = Some(end_state);
        });
    }

    // Entering an armed hold: extend flagged pieces across the boundary
    if cache.playlist.hold_state == HoldState::Pending {
        if let Some(outgoing) = &outgoing {
            hold::extend_pieces_for_hold(cache, &outgoing.id, &incoming.id, now);
        }
        cache.playlist.hold_state = HoldState::Active;
    }

    // Shift the playhead pointers
    cache.playlist.previous_part_instance_id = cache.playlist.current_part_instance_id.take();
    cache.playlist.current_part_instance_id = Some(incoming.id.clone());
    cache.playlist.next_part_instance_id = None;

    let play_offset_ms = cache.playlist.next_time_offset.take().unwrap_or(0);
    cache.part_instances.update(&incoming.id, |pi| {
        pi.is_taken = true;
        pi.timings.take = Some(now);
        pi.timings.play_offset_ms = play_offset_ms;
    });

    // Re-derive cross-part continuations now that the boundary is real
    if let Some(outgoing) = &outgoing {
        refresh_infinite_continuations(cache, outgoing, &incoming, now);
        cache.part_instances.update(&outgoing.id, |pi| {
            if pi.timings.stopped_playback.is_none() && config.self_reporting_playback {
                pi.timings.stopped_playback = Some(now);
            }
        });
    }

    // Cue the subsequent part
    let taken_part = incoming.part.clone();
    let candidate = selection::select_next_part(cache, Some(&taken_part));
    selection::set_next_part(cache, candidate.as_ref(), None, now)?;

    // Without a gateway attached the engine reports started playback itself
    if config.self_reporting_playback {
        cache.part_instances.update(&incoming.id, |pi| {
            pi.timings.started_playback = Some(now);
        });
        cache.piece_instances.update_where(
            |pi| pi.part_instance_id == incoming.id && pi.started_playback.is_none(),
            |pi| {
                pi.started_playback =
                    Some(now + chrono::Duration::milliseconds(pi.piece.enable.start_ms as i64));
            },
        );
    }

    cache.part_instances.update(&incoming.id, |pi| {
        pi.timings.take_done = Some(now);
    });
    cache.playlist.modified = now;

    let taken_part_instance = cache
        .part_instances
        .find_one(&incoming.id)
        .cloned()
        .unwrap_or(incoming);

    tracing::info!(
        playlist_id = %cache.playlist.id,
        part_instance_id = %taken_part_instance.id,
        part = %taken_part_instance.part.name,
        take_count = taken_part_instance.take_count,
        "▶️ PLAYOUT: take"
    );

    Ok(TakeResult {
        is_first_take: taken_part_instance.take_count == 1,
        taken_part_instance,
    })
}

/// Drop stale previous-part continuations on the incoming instance and
/// rebuild them from the outgoing part's final state. Hold-extended
/// continuations are left alone.
fn refresh_infinite_continuations(
    cache: &mut PlaylistCache,
    outgoing: &PartInstance,
    incoming: &PartInstance,
    now: DateTime<Utc>,
) {
    cache.piece_instances.remove_where(|pi| {
        pi.part_instance_id == incoming.id
            && pi
                .infinite
                .as_ref()
                .map(|i| i.from_previous_part && !i.from_hold)
                .unwrap_or(false)
    });
    let incoming_part = incoming.part.clone();
    infinites::continue_infinites_into(cache, &outgoing.id, &incoming_part, &incoming.id, now);
}

/// Post-take hooks, run after the committed flush. Failures are logged and
/// swallowed; they never roll back the take.
pub async fn post_take_hooks(blueprint: Arc<dyn ShowStyle>, result: TakeResult) {
    if result.is_first_take {
        if let Err(e) = blueprint.on_first_take(&result.taken_part_instance).await {
            tracing::warn!(error = %e, "first-take hook failed");
        }
    }
    if let Err(e) = blueprint.on_take(&result.taken_part_instance).await {
        tracing::warn!(error = %e, "take hook failed");
    }
}
