//! Instantiation and reset of part/piece instances. Instances are history:
//! superseded ones are marked `reset`, never deleted.

use chrono::{DateTime, Utc};

use crate::cache::PlaylistCache;
use crate::models::{Part, PartInstance, PartInstanceId, PieceInstance};

use super::infinites;

/// Create a part instance for `part` with piece instances for every piece
/// starting in it, continuing infinites from `continue_from` when given.
pub fn create_part_instance(
    cache: &mut PlaylistCache,
    part: &Part,
    take_count: u32,
    continue_from: Option<&PartInstanceId>,
    now: DateTime<Utc>,
) -> PartInstanceId {
    let rehearsal = cache.playlist.rehearsal;
    let instance = PartInstance::new(
        part.rundown_id.clone(),
        part.segment_id.clone(),
        part.clone(),
        take_count,
        rehearsal,
    );
    let instance_id = instance.id.clone();
    cache.part_instances.insert(instance);

    for piece in cache.pieces.find(|p| p.start_part_id == part.id) {
        cache
            .piece_instances
            .insert(PieceInstance::from_piece(piece, instance_id.clone()));
    }

    if let Some(from_id) = continue_from {
        infinites::continue_infinites_into(cache, from_id, part, &instance_id, now);
    }

    instance_id
}

/// Mark one part instance and all its piece instances as reset
pub fn reset_part_instance(cache: &mut PlaylistCache, instance_id: &PartInstanceId) {
    cache.part_instances.update(instance_id, |pi| pi.reset = true);
    cache.piece_instances.update_where(
        |pi| pi.part_instance_id == *instance_id,
        |pi| pi.reset = true,
    );
}

/// Mark every instance of the playlist as reset (playlist reset/activation)
pub fn reset_all_instances(cache: &mut PlaylistCache) {
    cache.part_instances.update_where(|_| true, |pi| pi.reset = true);
    cache.piece_instances.update_where(|_| true, |pi| pi.reset = true);
}

/// Drop ad-libbed parts that no longer have a live (non-reset) instance;
/// their pieces go with them
pub fn clean_up_orphaned_dynamic_parts(cache: &mut PlaylistCache) {
    let dynamic_parts = cache.parts.find(|p| p.is_dynamically_inserted());
    for part in dynamic_parts {
        let has_live_instance = !cache
            .part_instances
            .find(|pi| pi.part.id == part.id && !pi.reset)
            .is_empty();
        if !has_live_instance {
            cache.parts.remove(&part.id);
            cache.pieces.remove_where(|p| p.start_part_id == part.id);
        }
    }
}
