//! Precondition guards for playout transitions. Each guard checks one
//! domain rule against the loaded cache and raises a typed error naming the
//! rule it enforces; operations abort before any mutation.

use chrono::{DateTime, Utc};

use crate::cache::PlaylistCache;
use crate::error::{precondition, Result};
use crate::models::{HoldState, PartInstance};

/// The playlist must be active (rehearsal counts)
pub fn check_active(cache: &PlaylistCache) -> Result<()> {
    if !cache.playlist.active {
        return Err(precondition(format!(
            "rundown playlist {} is not active",
            cache.playlist.id
        )));
    }
    Ok(())
}

/// The playlist must not be active
pub fn check_inactive(cache: &PlaylistCache) -> Result<()> {
    if cache.playlist.active {
        return Err(precondition(format!(
            "rundown playlist {} is active",
            cache.playlist.id
        )));
    }
    Ok(())
}

/// A next part instance must be selected
pub fn check_next_exists<'a>(cache: &'a PlaylistCache) -> Result<&'a PartInstance> {
    cache
        .next_part_instance()
        .ok_or_else(|| precondition("no next part selected"))
}

/// Reject a take while the current part's in-transition is still running
pub fn check_no_transition_in_progress(
    cache: &PlaylistCache,
    now: DateTime<Utc>,
) -> Result<()> {
    if let Some(current) = cache.current_part_instance() {
        if let (Some(taken_at), Some(transition_ms)) = (
            current.timings.take,
            current.part.in_transition_duration_ms,
        ) {
            let elapsed = (now - taken_at).num_milliseconds();
            if elapsed >= 0 && (elapsed as u64) < transition_ms {
                return Err(precondition(
                    "take rejected: transition from previous part still in progress",
                ));
            }
        }
    }
    Ok(())
}

/// Reject a take inside the guard window before an auto-next fires
pub fn check_not_close_to_autonext(
    cache: &PlaylistCache,
    now: DateTime<Utc>,
    guard_window_ms: u64,
) -> Result<()> {
    if let Some(current) = cache.current_part_instance() {
        if current.part.autonext {
            if let (Some(expected_ms), Some(elapsed_ms)) =
                (current.part.expected_duration_ms, current.elapsed_ms(now))
            {
                let remaining = expected_ms as i64 - elapsed_ms;
                if remaining > 0 && (remaining as u64) < guard_window_ms {
                    return Err(precondition(
                        "take rejected: too close to the upcoming auto-next",
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Hold may only be armed over a straight current→next boundary within one
/// segment, with both parts ingest-sourced
pub fn check_hold_can_activate(cache: &PlaylistCache) -> Result<()> {
    if cache.playlist.hold_state != HoldState::None
        && cache.playlist.hold_state != HoldState::Complete
    {
        return Err(precondition("hold is already in progress"));
    }
    let current = cache
        .current_part_instance()
        .ok_or_else(|| precondition("hold requires a part on air"))?;
    let next = check_next_exists(cache)?;

    if current.segment_id != next.segment_id {
        return Err(precondition("hold cannot span a segment boundary"));
    }
    if current.part.is_dynamically_inserted() || next.part.is_dynamically_inserted() {
        return Err(precondition("hold cannot involve ad-libbed parts"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlaylistId;
    use crate::store::DocumentStore;

    async fn inactive_cache() -> PlaylistCache {
        let store = DocumentStore::new();
        let playlist = crate::models::RundownPlaylist {
            id: PlaylistId::new("p0"),
            external_id: "p0".into(),
            studio_id: crate::models::StudioId::new("studio0"),
            name: "Test".into(),
            active: false,
            rehearsal: false,
            hold_state: HoldState::None,
            current_part_instance_id: None,
            next_part_instance_id: None,
            previous_part_instance_id: None,
            next_time_offset: None,
            rundown_ids_in_order: Vec::new(),
            created: Utc::now(),
            modified: Utc::now(),
        };
        store.playlists.insert(playlist).await.unwrap();
        PlaylistCache::load(&store, &PlaylistId::new("p0"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_check_active_rejects_inactive() {
        let cache = inactive_cache().await;
        assert_eq!(check_active(&cache).unwrap_err().code(), 412);
        assert!(check_inactive(&cache).is_ok());
    }

    #[tokio::test]
    async fn test_check_next_exists_rejects_null_next() {
        let cache = inactive_cache().await;
        assert_eq!(check_next_exists(&cache).unwrap_err().code(), 412);
    }
}
