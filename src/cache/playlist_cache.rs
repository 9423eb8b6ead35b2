use futures::future::BoxFuture;
use std::cmp::Ordering;

use super::table::CacheTable;
use crate::error::{not_found, Result};
use crate::models::{
    AdLibAction, AdLibPiece, Part, PartInstance, PartInstanceId, Piece, PieceInstance, PlaylistId,
    Rundown, RundownId, RundownPlaylist, Segment, SegmentId,
};
use crate::store::DocumentStore;

type DeferredFn =
    Box<dyn for<'a> FnOnce(&'a DocumentStore) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static>;

/// Unit of work over one rundown playlist and everything it owns.
///
/// Collections flush in a fixed dependency order (pieces first, the playlist
/// last) so that removal side effects always run against a consistent state.
/// The flush is not atomic across collections; each collection's writes are
/// idempotent replays of this cache's final state, and the next `load`
/// observes whatever committed.
pub struct PlaylistCache {
    store: DocumentStore,

    pub playlist: RundownPlaylist,
    playlist_original: RundownPlaylist,
    playlist_removed: bool,

    pub rundowns: CacheTable<Rundown>,
    pub segments: CacheTable<Segment>,
    pub parts: CacheTable<Part>,
    pub pieces: CacheTable<Piece>,
    pub adlib_pieces: CacheTable<AdLibPiece>,
    pub adlib_actions: CacheTable<AdLibAction>,
    pub part_instances: CacheTable<PartInstance>,
    pub piece_instances: CacheTable<PieceInstance>,

    deferred: Vec<DeferredFn>,
}

impl std::fmt::Debug for PlaylistCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistCache")
            .field("playlist", &self.playlist)
            .field("playlist_removed", &self.playlist_removed)
            .field("rundowns", &self.rundowns)
            .field("segments", &self.segments)
            .field("parts", &self.parts)
            .field("pieces", &self.pieces)
            .field("adlib_pieces", &self.adlib_pieces)
            .field("adlib_actions", &self.adlib_actions)
            .field("part_instances", &self.part_instances)
            .field("piece_instances", &self.piece_instances)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

impl PlaylistCache {
    /// Load a consistent snapshot of the playlist and all owned documents
    pub async fn load(store: &DocumentStore, playlist_id: &PlaylistId) -> Result<Self> {
        let playlist = store
            .playlists
            .find_one(playlist_id)
            .await?
            .ok_or_else(|| not_found(format!("rundown playlist {playlist_id}")))?;

        let rundowns = store
            .rundowns
            .find(|r| r.playlist_id == *playlist_id)
            .await?;
        let rundown_ids: Vec<RundownId> = rundowns.iter().map(|r| r.id.clone()).collect();
        let owned = |rundown_id: &RundownId| rundown_ids.contains(rundown_id);

        let segments = store.segments.find(|s| owned(&s.rundown_id)).await?;
        let parts = store.parts.find(|p| owned(&p.rundown_id)).await?;
        let pieces = store.pieces.find(|p| owned(&p.rundown_id)).await?;
        let adlib_pieces = store.adlib_pieces.find(|a| owned(&a.rundown_id)).await?;
        let adlib_actions = store.adlib_actions.find(|a| owned(&a.rundown_id)).await?;
        let part_instances = store.part_instances.find(|i| owned(&i.rundown_id)).await?;
        let piece_instances = store
            .piece_instances
            .find(|i| owned(&i.rundown_id))
            .await?;

        Ok(Self {
            store: store.clone(),
            playlist_original: playlist.clone(),
            playlist,
            playlist_removed: false,
            rundowns: CacheTable::from_docs(rundowns),
            segments: CacheTable::from_docs(segments),
            parts: CacheTable::from_docs(parts),
            pieces: CacheTable::from_docs(pieces),
            adlib_pieces: CacheTable::from_docs(adlib_pieces),
            adlib_actions: CacheTable::from_docs(adlib_actions),
            part_instances: CacheTable::from_docs(part_instances),
            piece_instances: CacheTable::from_docs(piece_instances),
            deferred: Vec::new(),
        })
    }

    /// Build a fresh cache around a playlist that does not exist in the
    /// store yet (rundown create)
    pub fn create(store: &DocumentStore, playlist: RundownPlaylist) -> Self {
        let mut playlist_original = playlist.clone();
        // Force a first-flush write by differing from the working copy
        playlist_original.modified =
            playlist_original.modified - chrono::Duration::milliseconds(1);
        Self {
            store: store.clone(),
            playlist_original,
            playlist,
            playlist_removed: false,
            rundowns: CacheTable::default(),
            segments: CacheTable::default(),
            parts: CacheTable::default(),
            pieces: CacheTable::default(),
            adlib_pieces: CacheTable::default(),
            adlib_actions: CacheTable::default(),
            part_instances: CacheTable::default(),
            piece_instances: CacheTable::default(),
            deferred: Vec::new(),
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Drop the playlist document itself at flush time (last-rundown removal)
    pub fn mark_playlist_removed(&mut self) {
        self.playlist_removed = true;
    }

    /// Register a side effect to run only after a fully successful flush
    pub fn defer_after_save<F>(&mut self, f: F)
    where
        F: for<'a> FnOnce(&'a DocumentStore) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.deferred.push(Box::new(f));
    }

    /// Rundown ids in playlist display order; unlisted rundowns sort last
    pub fn ordered_rundown_ids(&self) -> Vec<RundownId> {
        let mut ids: Vec<RundownId> = self.rundowns.find(|_| true).iter().map(|r| r.id.clone()).collect();
        let order = &self.playlist.rundown_ids_in_order;
        ids.sort_by_key(|id| order.iter().position(|o| o == id).unwrap_or(usize::MAX));
        ids
    }

    /// Segments across all rundowns, in (rundown order, rank) order
    pub fn ordered_segments(&self) -> Vec<Segment> {
        let rundown_order = self.ordered_rundown_ids();
        let mut segments = self.segments.find(|_| true);
        segments.sort_by(|a, b| {
            let ra = rundown_order.iter().position(|id| *id == a.rundown_id);
            let rb = rundown_order.iter().position(|id| *id == b.rundown_id);
            ra.cmp(&rb)
                .then(a.rank.partial_cmp(&b.rank).unwrap_or(Ordering::Equal))
        });
        segments
    }

    /// Parts of one segment in rank order
    pub fn ordered_parts_of_segment(&self, segment_id: &SegmentId) -> Vec<Part> {
        let mut parts = self.parts.find(|p| p.segment_id == *segment_id);
        parts.sort_by(|a, b| a.rank.partial_cmp(&b.rank).unwrap_or(Ordering::Equal));
        parts
    }

    /// Every part of the playlist in playback order
    pub fn all_ordered_parts(&self) -> Vec<Part> {
        let mut parts = Vec::new();
        for segment in self.ordered_segments() {
            parts.extend(self.ordered_parts_of_segment(&segment.id));
        }
        parts
    }

    pub fn current_part_instance(&self) -> Option<&PartInstance> {
        self.playlist
            .current_part_instance_id
            .as_ref()
            .and_then(|id| self.part_instances.find_one(id))
    }

    pub fn next_part_instance(&self) -> Option<&PartInstance> {
        self.playlist
            .next_part_instance_id
            .as_ref()
            .and_then(|id| self.part_instances.find_one(id))
    }

    pub fn previous_part_instance(&self) -> Option<&PartInstance> {
        self.playlist
            .previous_part_instance_id
            .as_ref()
            .and_then(|id| self.part_instances.find_one(id))
    }

    /// Piece instances belonging to one part instance
    pub fn piece_instances_of(&self, part_instance_id: &PartInstanceId) -> Vec<PieceInstance> {
        self.piece_instances
            .find(|pi| pi.part_instance_id == *part_instance_id)
    }

    /// Flush all buffered mutations, collection by collection, then run
    /// deferred side effects in registration order
    pub async fn save_all_to_store(mut self) -> Result<()> {
        let playlist_id = self.playlist.id.clone();

        let piece_delta = self.pieces.flush(&self.store.pieces).await?;
        let adlib_delta = self.adlib_pieces.flush(&self.store.adlib_pieces).await?;
        let action_delta = self.adlib_actions.flush(&self.store.adlib_actions).await?;
        let part_delta = self.parts.flush(&self.store.parts).await?;
        let part_instance_delta = self
            .part_instances
            .flush(&self.store.part_instances)
            .await?;
        let piece_instance_delta = self
            .piece_instances
            .flush(&self.store.piece_instances)
            .await?;
        let segment_delta = self.segments.flush(&self.store.segments).await?;
        let rundown_delta = self.rundowns.flush(&self.store.rundowns).await?;

        if self.playlist_removed {
            self.store.playlists.remove(&playlist_id).await?;
        } else if self.playlist != self.playlist_original {
            self.store.playlists.insert(self.playlist.clone()).await?;
        }

        tracing::debug!(
            playlist_id = %playlist_id,
            pieces = piece_delta.upserts.len() + piece_delta.removed.len(),
            adlib_pieces = adlib_delta.upserts.len() + adlib_delta.removed.len(),
            adlib_actions = action_delta.upserts.len() + action_delta.removed.len(),
            parts = part_delta.upserts.len() + part_delta.removed.len(),
            part_instances = part_instance_delta.upserts.len() + part_instance_delta.removed.len(),
            piece_instances =
                piece_instance_delta.upserts.len() + piece_instance_delta.removed.len(),
            segments = segment_delta.upserts.len() + segment_delta.removed.len(),
            rundowns = rundown_delta.upserts.len() + rundown_delta.removed.len(),
            "💾 CACHE_FLUSH"
        );

        for deferred in self.deferred.drain(..) {
            deferred(&self.store).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HoldState, StudioId};
    use chrono::Utc;

    fn playlist(id: &str) -> RundownPlaylist {
        RundownPlaylist {
            id: PlaylistId::new(id),
            external_id: id.to_string(),
            studio_id: StudioId::new("studio0"),
            name: format!("playlist {id}"),
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
        }
    }

    #[tokio::test]
    async fn test_load_missing_playlist_is_not_found() {
        let store = DocumentStore::new();
        let err = PlaylistCache::load(&store, &PlaylistId::new("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), 404);
    }

    #[tokio::test]
    async fn test_unchanged_cache_saves_nothing_new() {
        let store = DocumentStore::new();
        store.playlists.insert(playlist("p0")).await.unwrap();

        let cache = PlaylistCache::load(&store, &PlaylistId::new("p0"))
            .await
            .unwrap();
        let before = store
            .playlists
            .find_one(&PlaylistId::new("p0"))
            .await
            .unwrap();
        cache.save_all_to_store().await.unwrap();
        let after = store
            .playlists
            .find_one(&PlaylistId::new("p0"))
            .await
            .unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_playlist_mutation_is_flushed() {
        let store = DocumentStore::new();
        store.playlists.insert(playlist("p0")).await.unwrap();

        let mut cache = PlaylistCache::load(&store, &PlaylistId::new("p0"))
            .await
            .unwrap();
        cache.playlist.active = true;
        cache.save_all_to_store().await.unwrap();

        let saved = store
            .playlists
            .find_one(&PlaylistId::new("p0"))
            .await
            .unwrap()
            .unwrap();
        assert!(saved.active);
    }

    #[tokio::test]
    async fn test_discarded_cache_leaves_store_untouched() {
        let store = DocumentStore::new();
        store.playlists.insert(playlist("p0")).await.unwrap();

        {
            let mut cache = PlaylistCache::load(&store, &PlaylistId::new("p0"))
                .await
                .unwrap();
            cache.playlist.active = true;
            // dropped without save
        }

        let saved = store
            .playlists
            .find_one(&PlaylistId::new("p0"))
            .await
            .unwrap()
            .unwrap();
        assert!(!saved.active);
    }

    #[tokio::test]
    async fn test_deferred_runs_after_save() {
        let store = DocumentStore::new();
        store.playlists.insert(playlist("p0")).await.unwrap();

        let mut cache = PlaylistCache::load(&store, &PlaylistId::new("p0"))
            .await
            .unwrap();
        cache.playlist.rehearsal = true;
        cache.defer_after_save(|store| {
            Box::pin(async move {
                // Observes the committed flush
                let saved = store
                    .playlists
                    .find_one(&PlaylistId::new("p0"))
                    .await?
                    .expect("playlist saved");
                assert!(saved.rehearsal);
                Ok(())
            })
        });
        cache.save_all_to_store().await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_playlist_removed() {
        let store = DocumentStore::new();
        store.playlists.insert(playlist("p0")).await.unwrap();

        let mut cache = PlaylistCache::load(&store, &PlaylistId::new("p0"))
            .await
            .unwrap();
        cache.mark_playlist_removed();
        cache.save_all_to_store().await.unwrap();

        assert!(store
            .playlists
            .find_one(&PlaylistId::new("p0"))
            .await
            .unwrap()
            .is_none());
    }
}
