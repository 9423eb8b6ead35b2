//! # Timeline Publisher Seam
//!
//! The timeline-to-device compilation lives outside this crate. Playout
//! operations (and ingest applies against an active playlist) finish by
//! requesting a recompute through this trait; the publisher consumes the
//! post-mutation cache state.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::cache::PlaylistCache;
use crate::error::Result;
use crate::models::PlaylistId;

#[async_trait]
pub trait TimelinePublisher: Send + Sync {
    /// Compile and push a device timeline from the committed cache state
    async fn request_recompute(&self, cache: &PlaylistCache) -> Result<()>;
}

/// Publisher for deployments without a device gateway attached
#[derive(Debug, Default)]
pub struct NoopTimelinePublisher;

#[async_trait]
impl TimelinePublisher for NoopTimelinePublisher {
    async fn request_recompute(&self, cache: &PlaylistCache) -> Result<()> {
        tracing::debug!(playlist_id = %cache.playlist.id, "timeline recompute requested (noop)");
        Ok(())
    }
}

/// Test publisher recording which playlists requested a recompute
#[derive(Debug, Default)]
pub struct RecordingTimelinePublisher {
    requests: Mutex<Vec<PlaylistId>>,
}

impl RecordingTimelinePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<PlaylistId> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TimelinePublisher for RecordingTimelinePublisher {
    async fn request_recompute(&self, cache: &PlaylistCache) -> Result<()> {
        self.requests.lock().push(cache.playlist.id.clone());
        Ok(())
    }
}
