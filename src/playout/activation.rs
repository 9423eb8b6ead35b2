//! Activation lifecycle: activate (with studio conflict detection),
//! deactivate, and playlist reset.

use chrono::{DateTime, Utc};

use crate::cache::PlaylistCache;
use crate::error::{precondition, Result, RundownError};
use crate::models::HoldState;

use super::{instances, selection};

/// Activate the playlist for broadcast (or rehearsal).
///
/// Exactly one playlist may consume a studio at a time; activating while
/// another is on air raises a structured conflict carrying the active
/// playlist's rundown names so the caller can offer a forced override.
pub async fn activate(
    cache: &mut PlaylistCache,
    rehearsal: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    if cache.playlist.active && cache.playlist.rehearsal == rehearsal {
        return Ok(());
    }

    let store = cache.store().clone();
    let studio_id = cache.playlist.studio_id.clone();
    let own_id = cache.playlist.id.clone();
    let conflicting = store
        .playlists
        .find(|p| p.studio_id == studio_id && p.active && p.id != own_id)
        .await?;
    if !conflicting.is_empty() {
        let mut active_rundowns = Vec::new();
        for playlist in &conflicting {
            let names = store
                .rundowns
                .find(|r| r.playlist_id == playlist.id)
                .await?
                .into_iter()
                .map(|r| r.name);
            active_rundowns.extend(names);
        }
        return Err(RundownError::Conflict {
            studio_id: studio_id.to_string(),
            active_rundowns,
        });
    }

    let was_inactive = !cache.playlist.active;
    cache.playlist.active = true;
    cache.playlist.rehearsal = rehearsal;
    cache.playlist.hold_state = HoldState::None;
    cache.playlist.modified = now;

    if was_inactive {
        // Fresh activation: wipe instance history and cue the first part
        instances::reset_all_instances(cache);
        cache.playlist.current_part_instance_id = None;
        cache.playlist.previous_part_instance_id = None;
        cache.playlist.next_part_instance_id = None;

        let first = selection::select_next_part(cache, None);
        selection::set_next_part(cache, first.as_ref(), None, now)?;
    }

    tracing::info!(
        playlist_id = %cache.playlist.id,
        rehearsal = rehearsal,
        "▶️ PLAYOUT: activated"
    );
    Ok(())
}

/// Take the playlist off air, stopping whatever is playing
pub fn deactivate(cache: &mut PlaylistCache, now: DateTime<Utc>) -> Result<()> {
    if let Some(current_id) = cache.playlist.current_part_instance_id.clone() {
        cache.part_instances.update(&current_id, |pi| {
            if pi.timings.stopped_playback.is_none() {
                pi.timings.stopped_playback = Some(now);
            }
        });
        cache.piece_instances.update_where(
            |pi| pi.part_instance_id == current_id && pi.stopped_playback.is_none(),
            |pi| pi.stopped_playback = Some(now),
        );
    }
    if let Some(next_id) = cache.playlist.next_part_instance_id.clone() {
        instances::reset_part_instance(cache, &next_id);
    }

    cache.playlist.active = false;
    cache.playlist.rehearsal = false;
    cache.playlist.hold_state = HoldState::None;
    cache.playlist.current_part_instance_id = None;
    cache.playlist.next_part_instance_id = None;
    cache.playlist.previous_part_instance_id = None;
    cache.playlist.next_time_offset = None;
    cache.playlist.modified = now;

    tracing::info!(playlist_id = %cache.playlist.id, "▶️ PLAYOUT: deactivated");
    Ok(())
}

/// Reset playback history and re-cue the first part. On-air playlists may
/// only be reset in rehearsal.
pub fn reset_rundown_playlist(cache: &mut PlaylistCache, now: DateTime<Utc>) -> Result<()> {
    if cache.playlist.active && !cache.playlist.rehearsal {
        return Err(precondition(
            "cannot reset a rundown playlist that is active outside rehearsal",
        ));
    }

    instances::reset_all_instances(cache);
    instances::clean_up_orphaned_dynamic_parts(cache);
    cache.playlist.hold_state = HoldState::None;
    cache.playlist.current_part_instance_id = None;
    cache.playlist.previous_part_instance_id = None;
    cache.playlist.next_part_instance_id = None;
    cache.playlist.next_time_offset = None;
    cache.playlist.modified = now;

    if cache.playlist.active {
        let first = selection::select_next_part(cache, None);
        selection::set_next_part(cache, first.as_ref(), None, now)?;
    }
    Ok(())
}
