//! Playout/user-action API, invoked by operator clients. Every operation is
//! queued at user-playout priority on the playlist's lane, loads a fresh
//! cache, mutates, requests a timeline recompute, and flushes. Device
//! playback callbacks arrive on the same lane at callback priority.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::cache::PlaylistCache;
use crate::constants::{events, QueuePriority};
use crate::context::CoreContext;
use crate::error::Result;
use crate::models::{
    AdLibPieceId, BucketAdLibId, PartId, PartInstanceId, PlaylistId,
};
use crate::playout::{activation, adlib, guards, hold, selection, stop, take};

use super::response::ClientResponse;

pub struct PlayoutService {
    ctx: CoreContext,
}

impl PlayoutService {
    pub fn new(ctx: CoreContext) -> Self {
        Self { ctx }
    }

    /// Advance current to next
    pub async fn take(&self, playlist_id: &PlaylistId) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(playlist_id, QueuePriority::UserPlayout, "take", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                let take_result =
                    take::take(&mut cache, &self.ctx.blueprint, &self.ctx.config, Utc::now())
                        .await?;
                self.ctx.timeline.request_recompute(&cache).await?;
                cache.save_all_to_store().await?;

                let _ = self.ctx.events.publish(
                    events::PLAYOUT_TAKE,
                    json!({
                        "playlistId": playlist_id.as_str(),
                        "partInstanceId": take_result.taken_part_instance.id.as_str(),
                    }),
                );

                // Best-effort hooks run detached from the committed take
                tokio::spawn(take::post_take_hooks(
                    self.ctx.blueprint.clone(),
                    take_result,
                ));
                Ok(())
            })
            .await;
        ClientResponse::from_result(result)
    }

    /// Point the next-part pointer at a specific part
    pub async fn set_next(
        &self,
        playlist_id: &PlaylistId,
        part_id: &PartId,
        next_time_offset: Option<i64>,
    ) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(playlist_id, QueuePriority::UserPlayout, "set_next", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                guards::check_active(&cache)?;
                selection::set_next_part_by_id(&mut cache, part_id, next_time_offset, Utc::now())?;
                self.ctx.timeline.request_recompute(&cache).await?;
                cache.save_all_to_store().await?;
                let _ = self.ctx.events.publish(
                    events::PLAYOUT_NEXT_CHANGED,
                    json!({
                        "playlistId": playlist_id.as_str(),
                        "partId": part_id.as_str(),
                    }),
                );
                Ok(())
            })
            .await;
        ClientResponse::from_result(result)
    }

    /// Put the playlist on air (or into rehearsal)
    pub async fn activate(
        &self,
        playlist_id: &PlaylistId,
        rehearsal: bool,
    ) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(playlist_id, QueuePriority::UserPlayout, "activate", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                activation::activate(&mut cache, rehearsal, Utc::now()).await?;
                self.ctx.timeline.request_recompute(&cache).await?;
                cache.save_all_to_store().await?;
                let _ = self.ctx.events.publish(
                    events::PLAYOUT_ACTIVATED,
                    json!({ "playlistId": playlist_id.as_str(), "rehearsal": rehearsal }),
                );
                Ok(())
            })
            .await;
        ClientResponse::from_result(result)
    }

    /// Take the playlist off air
    pub async fn deactivate(&self, playlist_id: &PlaylistId) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(playlist_id, QueuePriority::UserPlayout, "deactivate", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                activation::deactivate(&mut cache, Utc::now())?;
                self.ctx.timeline.request_recompute(&cache).await?;
                cache.save_all_to_store().await?;
                let _ = self.ctx.events.publish(
                    events::PLAYOUT_DEACTIVATED,
                    json!({ "playlistId": playlist_id.as_str() }),
                );
                Ok(())
            })
            .await;
        ClientResponse::from_result(result)
    }

    /// Wipe playback history and re-cue the first part
    pub async fn reset_rundown_playlist(&self, playlist_id: &PlaylistId) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(playlist_id, QueuePriority::UserPlayout, "reset", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                activation::reset_rundown_playlist(&mut cache, Utc::now())?;
                if cache.playlist.active {
                    self.ctx.timeline.request_recompute(&cache).await?;
                }
                cache.save_all_to_store().await?;
                Ok(())
            })
            .await;
        ClientResponse::from_result(result)
    }

    /// Arm a hold over the current→next boundary
    pub async fn activate_hold(&self, playlist_id: &PlaylistId) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(playlist_id, QueuePriority::UserPlayout, "activate_hold", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                hold::activate_hold(&mut cache, Utc::now())?;
                self.ctx.timeline.request_recompute(&cache).await?;
                cache.save_all_to_store().await?;
                let _ = self.ctx.events.publish(
                    events::PLAYOUT_HOLD_CHANGED,
                    json!({ "playlistId": playlist_id.as_str(), "state": "pending" }),
                );
                Ok(())
            })
            .await;
        ClientResponse::from_result(result)
    }

    /// Undo a pending hold or complete an active one
    pub async fn deactivate_hold(&self, playlist_id: &PlaylistId) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(playlist_id, QueuePriority::UserPlayout, "deactivate_hold", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                hold::deactivate_hold(&mut cache, Utc::now())?;
                self.ctx.timeline.request_recompute(&cache).await?;
                cache.save_all_to_store().await?;
                let _ = self.ctx.events.publish(
                    events::PLAYOUT_HOLD_CHANGED,
                    json!({ "playlistId": playlist_id.as_str(), "state": "released" }),
                );
                Ok(())
            })
            .await;
        ClientResponse::from_result(result)
    }

    /// Start a segment or baseline ad-lib piece on the current part
    pub async fn segment_adlib_piece_start(
        &self,
        playlist_id: &PlaylistId,
        part_instance_id: &PartInstanceId,
        adlib_id: &AdLibPieceId,
        queue: bool,
    ) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(playlist_id, QueuePriority::UserPlayout, "adlib_start", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                adlib::adlib_piece_start(&mut cache, part_instance_id, adlib_id, queue, Utc::now())?;
                self.ctx.timeline.request_recompute(&cache).await?;
                cache.save_all_to_store().await?;
                Ok(())
            })
            .await;
        ClientResponse::from_result(result)
    }

    /// Start a rundown baseline ad-lib (same resolution path; baseline
    /// templates carry no part id)
    pub async fn baseline_adlib_piece_start(
        &self,
        playlist_id: &PlaylistId,
        part_instance_id: &PartInstanceId,
        adlib_id: &AdLibPieceId,
        queue: bool,
    ) -> ClientResponse<()> {
        self.segment_adlib_piece_start(playlist_id, part_instance_id, adlib_id, queue)
            .await
    }

    /// Start an ad-lib from an operator bucket
    pub async fn bucket_adlib_piece_start(
        &self,
        playlist_id: &PlaylistId,
        part_instance_id: &PartInstanceId,
        bucket_adlib_id: &BucketAdLibId,
        queue: bool,
    ) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(playlist_id, QueuePriority::UserPlayout, "bucket_adlib", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                adlib::bucket_adlib_piece_start(
                    &mut cache,
                    part_instance_id,
                    bucket_adlib_id,
                    queue,
                    Utc::now(),
                )
                .await?;
                self.ctx.timeline.request_recompute(&cache).await?;
                cache.save_all_to_store().await?;
                Ok(())
            })
            .await;
        ClientResponse::from_result(result)
    }

    /// Replay the last piece played on a sticky source layer
    pub async fn source_layer_sticky_piece_start(
        &self,
        playlist_id: &PlaylistId,
        source_layer_id: &str,
        original_only: bool,
    ) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(playlist_id, QueuePriority::UserPlayout, "sticky_start", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                adlib::sticky_piece_start(&mut cache, source_layer_id, original_only, Utc::now())?;
                self.ctx.timeline.request_recompute(&cache).await?;
                cache.save_all_to_store().await?;
                Ok(())
            })
            .await;
        ClientResponse::from_result(result)
    }

    /// Stop every running piece on the given source layers of a part instance
    pub async fn source_layer_on_part_stop(
        &self,
        playlist_id: &PlaylistId,
        part_instance_id: &PartInstanceId,
        source_layer_ids: Vec<String>,
    ) -> ClientResponse<usize> {
        let result = self
            .ctx
            .queue
            .run_exclusive(playlist_id, QueuePriority::UserPlayout, "layer_stop", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                guards::check_active(&cache)?;
                let cropped = stop::stop_pieces_on_source_layers(
                    &mut cache,
                    part_instance_id,
                    &source_layer_ids,
                    Utc::now(),
                );
                self.ctx.timeline.request_recompute(&cache).await?;
                cache.save_all_to_store().await?;
                Ok(cropped.len())
            })
            .await;
        ClientResponse::from_result(result)
    }

    /// Promote a piece onto the current part immediately
    pub async fn piece_take_now(
        &self,
        playlist_id: &PlaylistId,
        part_instance_id: &PartInstanceId,
        piece_or_instance_id: &str,
    ) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(playlist_id, QueuePriority::UserPlayout, "piece_take_now", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                adlib::piece_take_now(&mut cache, part_instance_id, piece_or_instance_id, Utc::now())?;
                self.ctx.timeline.request_recompute(&cache).await?;
                cache.save_all_to_store().await?;
                Ok(())
            })
            .await;
        ClientResponse::from_result(result)
    }

    /// Gateway-reported playback start for a part instance
    pub async fn on_part_playback_started(
        &self,
        playlist_id: &PlaylistId,
        part_instance_id: &PartInstanceId,
        time: DateTime<Utc>,
    ) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(
                playlist_id,
                QueuePriority::DeviceCallback,
                "playback_started",
                || async {
                    let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                    self.record_playback(&mut cache, part_instance_id, Some(time), None)?;
                    cache.save_all_to_store().await?;
                    Ok(())
                },
            )
            .await;
        ClientResponse::from_result(result)
    }

    /// Gateway-reported playback stop for a part instance
    pub async fn on_part_playback_stopped(
        &self,
        playlist_id: &PlaylistId,
        part_instance_id: &PartInstanceId,
        time: DateTime<Utc>,
    ) -> ClientResponse<()> {
        let result = self
            .ctx
            .queue
            .run_exclusive(
                playlist_id,
                QueuePriority::DeviceCallback,
                "playback_stopped",
                || async {
                    let mut cache = PlaylistCache::load(&self.ctx.store, playlist_id).await?;
                    self.record_playback(&mut cache, part_instance_id, None, Some(time))?;
                    cache.save_all_to_store().await?;
                    Ok(())
                },
            )
            .await;
        ClientResponse::from_result(result)
    }

    fn record_playback(
        &self,
        cache: &mut PlaylistCache,
        part_instance_id: &PartInstanceId,
        started: Option<DateTime<Utc>>,
        stopped: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let updated = cache.part_instances.update(part_instance_id, |pi| {
            if let Some(started) = started {
                if pi.timings.started_playback.is_none() {
                    pi.timings.started_playback = Some(started);
                }
            }
            if let Some(stopped) = stopped {
                if pi.timings.stopped_playback.is_none() {
                    pi.timings.stopped_playback = Some(stopped);
                }
            }
        });
        if !updated {
            return Err(crate::error::not_found(format!(
                "part instance {part_instance_id}"
            )));
        }
        Ok(())
    }
}
