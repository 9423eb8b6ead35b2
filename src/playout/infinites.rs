//! Infinite-piece continuation across part boundaries. Every continuation
//! of one infinite shares a single `infinite_instance_id`, minted when the
//! infinite first leaves its starting part.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::cache::PlaylistCache;
use crate::models::{
    InfiniteId, Part, PartInstanceId, PieceInstance, PieceInstanceInfinite, PieceLifespan,
};

/// Whether a piece of `lifespan` started in `from` scope continues into `to_part`
fn lifespan_reaches(
    lifespan: PieceLifespan,
    from: &PieceInstance,
    from_segment: &crate::models::SegmentId,
    to_part: &Part,
) -> bool {
    match lifespan {
        PieceLifespan::WithinPart => false,
        PieceLifespan::OutOnSegmentChange | PieceLifespan::OutOnSegmentEnd => {
            *from_segment == to_part.segment_id && from.rundown_id == to_part.rundown_id
        }
        PieceLifespan::OutOnRundownChange | PieceLifespan::OutOnRundownEnd => {
            from.rundown_id == to_part.rundown_id
        }
    }
}

/// Carry unresolved infinites from `from_instance` into a freshly created
/// instance of `to_part`. Pieces already extended by a hold are skipped; a
/// layer whose newest infinite is a virtual terminator carries nothing.
/// Returns how many continuations were created.
pub fn continue_infinites_into(
    cache: &mut PlaylistCache,
    from_instance_id: &PartInstanceId,
    to_part: &Part,
    to_instance_id: &PartInstanceId,
    now: DateTime<Utc>,
) -> usize {
    let Some(from_instance) = cache.part_instances.find_one(from_instance_id).cloned() else {
        return 0;
    };
    let from_started = from_instance
        .timings
        .started_playback
        .unwrap_or(now);

    let candidates: Vec<PieceInstance> = cache
        .piece_instances
        .find(|pi| pi.part_instance_id == *from_instance_id && !pi.reset)
        .into_iter()
        .filter(|pi| pi.piece.lifespan.is_infinite())
        .filter(|pi| pi.is_unresolved_at(now))
        .filter(|pi| !pi.infinite.as_ref().map(|i| i.from_hold).unwrap_or(false))
        .filter(|pi| {
            lifespan_reaches(
                pi.piece.lifespan,
                pi,
                &from_instance.segment_id,
                to_part,
            )
        })
        .collect();

    // Only the newest unresolved infinite per source layer survives
    let mut newest_per_layer: HashMap<String, PieceInstance> = HashMap::new();
    for candidate in candidates {
        let layer = candidate.piece.source_layer_id.clone();
        let start = candidate.resolved_start(from_started);
        let newer = newest_per_layer
            .get(&layer)
            .map(|existing| start > existing.resolved_start(from_started))
            .unwrap_or(true);
        if newer {
            newest_per_layer.insert(layer, candidate);
        }
    }

    let mut created = 0;
    for (_, original) in newest_per_layer {
        if original.piece.is_virtual {
            // Terminator found; the layer stays empty in the new part
            continue;
        }

        // Mint the shared continuation id on first crossing
        let infinite_instance_id = match &original.infinite {
            Some(infinite) => infinite.infinite_instance_id.clone(),
            None => {
                let minted = InfiniteId::random();
                let minted_for_update = minted.clone();
                let piece_id = original.piece.id.clone();
                cache.piece_instances.update(&original.id, |pi| {
                    pi.infinite = Some(PieceInstanceInfinite {
                        infinite_instance_id: minted_for_update,
                        infinite_piece_id: piece_id,
                        from_previous_part: false,
                        from_hold: false,
                    });
                });
                minted
            }
        };

        let mut continuation = PieceInstance::from_piece(original.piece.clone(), to_instance_id.clone());
        continuation.started_playback = original.started_playback;
        continuation.infinite = Some(PieceInstanceInfinite {
            infinite_instance_id,
            infinite_piece_id: original.piece.id.clone(),
            from_previous_part: true,
            from_hold: false,
        });
        cache.piece_instances.insert(continuation);
        created += 1;
    }
    created
}
