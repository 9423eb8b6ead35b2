//! Piece truncation: manual stops, source-layer clears, and the crop
//! primitive shared with hold completion.
//!
//! Lifespans ending on part/segment/rundown *change* are cropped with a user
//! end duration; segment/rundown *end* lifespans instead get a zero-content
//! virtual continuation piece carrying a fresh infinite id, so that
//! later-evaluated continuation logic still finds a terminator on the layer.

use chrono::{DateTime, Utc};

use crate::cache::PlaylistCache;
use crate::models::{
    InfiniteId, PartInstanceId, Piece, PieceInstance, PieceInstanceId, PieceInstanceInfinite,
    PieceUserDuration,
};

/// Crop one piece instance at `now` using its lifespan's strategy.
/// Returns whether the instance existed and was cropped.
pub fn truncate_piece_instance(
    cache: &mut PlaylistCache,
    instance_id: &PieceInstanceId,
    now: DateTime<Utc>,
) -> bool {
    let Some(instance) = cache.piece_instances.find_one(instance_id).cloned() else {
        return false;
    };

    if instance.piece.lifespan.stopped_by_user_duration() {
        cache.piece_instances.update(instance_id, |pi| {
            pi.user_duration = Some(PieceUserDuration { end: now });
        });
        return true;
    }

    // Segment/rundown-end lifespan: terminate the layer with a virtual piece
    let part_started = cache
        .part_instances
        .find_one(&instance.part_instance_id)
        .and_then(|pi| pi.timings.started_playback)
        .unwrap_or(now);
    let start_ms = (now - part_started).num_milliseconds().max(0) as u64;

    let virtual_piece = Piece::virtual_terminator(
        instance.rundown_id.clone(),
        instance.piece.start_part_id.clone(),
        &instance.piece.source_layer_id,
        &instance.piece.output_layer_id,
        start_ms,
        instance.piece.lifespan,
    );
    let mut terminator =
        PieceInstance::from_piece(virtual_piece, instance.part_instance_id.clone());
    terminator.dynamically_inserted = true;
    terminator.started_playback = Some(now);
    terminator.infinite = Some(PieceInstanceInfinite {
        infinite_instance_id: InfiniteId::random(),
        infinite_piece_id: terminator.piece.id.clone(),
        from_previous_part: false,
        from_hold: false,
    });
    cache.piece_instances.insert(terminator);
    true
}

/// Stop every matching piece on the given source layers of one part
/// instance: currently unresolved, already started, and not itself a
/// virtual terminator. Returns the cropped instance ids.
pub fn stop_pieces_on_source_layers(
    cache: &mut PlaylistCache,
    part_instance_id: &PartInstanceId,
    source_layer_ids: &[String],
    now: DateTime<Utc>,
) -> Vec<PieceInstanceId> {
    let part_started = cache
        .part_instances
        .find_one(part_instance_id)
        .and_then(|pi| pi.timings.started_playback)
        .unwrap_or(now);

    let targets: Vec<PieceInstanceId> = cache
        .piece_instances
        .find(|pi| {
            pi.part_instance_id == *part_instance_id
                && !pi.reset
                && !pi.piece.is_virtual
                && source_layer_ids.contains(&pi.piece.source_layer_id)
                && pi.is_unresolved_at(now)
                && pi.resolved_start(part_started) <= now
        })
        .into_iter()
        .map(|pi| pi.id)
        .collect();

    let mut cropped = Vec::with_capacity(targets.len());
    for id in targets {
        if truncate_piece_instance(cache, &id, now) {
            cropped.push(id);
        }
    }
    cropped
}
