//! Hold choreography: a brief overlap extending selected pieces of the
//! outgoing part across a take. Arming (`Pending`) is a user action; the
//! extension itself happens inside the take that enters `Active`.

use chrono::{DateTime, Utc};

use crate::cache::PlaylistCache;
use crate::error::{precondition, Result};
use crate::models::{
    HoldState, InfiniteId, PartInstanceId, PieceInstance, PieceInstanceInfinite,
};

use super::{guards, stop};

/// Arm a hold over the current→next boundary
pub fn activate_hold(cache: &mut PlaylistCache, now: DateTime<Utc>) -> Result<()> {
    guards::check_active(cache)?;
    guards::check_hold_can_activate(cache)?;
    cache.playlist.hold_state = HoldState::Pending;
    cache.playlist.modified = now;
    tracing::info!(playlist_id = %cache.playlist.id, "▶️ PLAYOUT: hold armed");
    Ok(())
}

/// Undo a pending hold, or complete an active one
pub fn deactivate_hold(cache: &mut PlaylistCache, now: DateTime<Utc>) -> Result<()> {
    match cache.playlist.hold_state {
        HoldState::Pending => {
            cache.playlist.hold_state = HoldState::None;
            Ok(())
        }
        HoldState::Active => {
            complete_hold(cache, now);
            Ok(())
        }
        _ => Err(precondition("no hold in progress to deactivate")),
    }
}

/// Extend every `extend_on_hold` piece of the outgoing part into the
/// incoming one: the original is tagged with a fresh shared infinite id and
/// the continuation preserves the original's playback start; file-backed
/// content gets a resume offset.
pub fn extend_pieces_for_hold(
    cache: &mut PlaylistCache,
    outgoing_id: &PartInstanceId,
    incoming_id: &PartInstanceId,
    now: DateTime<Utc>,
) -> usize {
    let outgoing_started = cache
        .part_instances
        .find_one(outgoing_id)
        .and_then(|pi| pi.timings.started_playback)
        .unwrap_or(now);

    let to_extend: Vec<PieceInstance> = cache
        .piece_instances
        .find(|pi| {
            pi.part_instance_id == *outgoing_id
                && !pi.reset
                && !pi.piece.is_virtual
                && pi.piece.extend_on_hold
                && pi.is_unresolved_at(now)
        })
        .into_iter()
        .collect();

    let mut extended = 0;
    for original in to_extend {
        let infinite_instance_id = InfiniteId::random();
        let piece_id = original.piece.id.clone();

        let tag = PieceInstanceInfinite {
            infinite_instance_id: infinite_instance_id.clone(),
            infinite_piece_id: piece_id.clone(),
            from_previous_part: false,
            from_hold: false,
        };
        cache.piece_instances.update(&original.id, |pi| {
            pi.infinite = Some(tag);
        });

        let mut continuation =
            PieceInstance::from_piece(original.piece.clone(), incoming_id.clone());
        continuation.started_playback = original.started_playback;
        continuation.infinite = Some(PieceInstanceInfinite {
            infinite_instance_id,
            infinite_piece_id: piece_id,
            from_previous_part: true,
            from_hold: true,
        });

        // Resume file-backed content where the original already played to
        if continuation.piece.content.get("fileName").is_some() {
            let elapsed = (now - original.resolved_start(outgoing_started))
                .num_milliseconds()
                .max(0);
            if let Some(content) = continuation.piece.content.as_object_mut() {
                content.insert("seek".into(), serde_json::json!(elapsed));
            }
        }

        cache.piece_instances.insert(continuation);
        extended += 1;
    }
    extended
}

/// Crop every hold-extended continuation, leaving unrelated pieces alone,
/// and mark the hold complete
pub fn complete_hold(cache: &mut PlaylistCache, now: DateTime<Utc>) {
    let extended: Vec<crate::models::PieceInstanceId> = cache
        .piece_instances
        .find(|pi| {
            pi.infinite
                .as_ref()
                .map(|i| i.from_hold)
                .unwrap_or(false)
                && !pi.reset
        })
        .into_iter()
        .map(|pi| pi.id)
        .collect();

    for id in &extended {
        stop::truncate_piece_instance(cache, id, now);
    }

    cache.playlist.hold_state = HoldState::Complete;
    cache.playlist.modified = now;
    tracing::info!(
        playlist_id = %cache.playlist.id,
        cropped = extended.len(),
        "▶️ PLAYOUT: hold completed"
    );
}
