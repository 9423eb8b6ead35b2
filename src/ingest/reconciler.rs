//! # Ingest Reconciler
//!
//! Applies pushed story trees to the cached playlist state. Each operation
//! runs exclusively on the playlist's queue lane: resolve ids, materialize
//! through the installed show style, diff into prepared changes, degrade
//! anything unsafe-while-on-air into unsync markings, apply, recompute
//! derived state, repair the next pointer, and flush.

use chrono::Utc;
use std::collections::{HashMap, HashSet};

use crate::cache::PlaylistCache;
use crate::constants::{events, QueuePriority};
use crate::context::CoreContext;
use crate::error::{not_found, Result};
use crate::models::{
    AdLibAction, AdLibActionId, AdLibPiece, AdLibPieceId, ExpectedPlayoutItem, Note, NoteOrigin,
    Part, PartId, Piece, PieceId, PlaylistId, Rundown, RundownId, RundownPlaylist, Segment,
    SegmentId, SegmentUnsyncedReason, StudioId,
};
use crate::playout::selection;

use super::diff::{diff_documents, PreparedChanges};
use super::ranks;
use super::types::{IngestPart, IngestRundown, IngestSegment};
use super::IngestMaterializeContext;

/// Prepared changes across every ingest-owned collection of one rundown
#[derive(Debug, Default)]
struct RundownChangeSet {
    segments: PreparedChanges<Segment>,
    parts: PreparedChanges<Part>,
    pieces: PreparedChanges<Piece>,
    adlib_pieces: PreparedChanges<AdLibPiece>,
    adlib_actions: PreparedChanges<AdLibAction>,
}

impl RundownChangeSet {
    fn is_empty(&self) -> bool {
        self.segments.is_empty()
            && self.parts.is_empty()
            && self.pieces.is_empty()
            && self.adlib_pieces.is_empty()
            && self.adlib_actions.is_empty()
    }
}

/// Documents materialized for one segment
struct MaterializedSegment {
    segment: Segment,
    parts: Vec<Part>,
    pieces: Vec<Piece>,
    adlib_pieces: Vec<AdLibPiece>,
    adlib_actions: Vec<AdLibAction>,
}

pub struct IngestReconciler {
    ctx: CoreContext,
}

impl IngestReconciler {
    pub fn new(ctx: CoreContext) -> Self {
        Self { ctx }
    }

    // ---- id derivation ------------------------------------------------

    pub fn playlist_id(studio_id: &StudioId, rundown_external_id: &str) -> PlaylistId {
        PlaylistId::derived(studio_id, &format!("playlist_{rundown_external_id}"))
    }

    pub fn rundown_id(studio_id: &StudioId, rundown_external_id: &str) -> RundownId {
        RundownId::derived(studio_id, rundown_external_id)
    }

    pub fn segment_id(
        studio_id: &StudioId,
        rundown_external_id: &str,
        segment_external_id: &str,
    ) -> SegmentId {
        SegmentId::derived(
            studio_id,
            &format!("{rundown_external_id}_{segment_external_id}"),
        )
    }

    pub fn part_id(
        studio_id: &StudioId,
        rundown_external_id: &str,
        part_external_id: &str,
    ) -> PartId {
        PartId::derived(
            studio_id,
            &format!("{rundown_external_id}_{part_external_id}"),
        )
    }

    // ---- materialization ----------------------------------------------

    fn materialize_segment(
        &self,
        studio_id: &StudioId,
        rundown_id: &RundownId,
        rundown_external_id: &str,
        ingest_segment: &IngestSegment,
    ) -> Result<MaterializedSegment> {
        let segment_id = Self::segment_id(studio_id, rundown_external_id, &ingest_segment.external_id);
        let context = IngestMaterializeContext {
            studio_id: studio_id.clone(),
            rundown_id: rundown_id.clone(),
            segment_id: segment_id.clone(),
            segment_external_id: ingest_segment.external_id.clone(),
        };
        let result = self.ctx.blueprint.materialize_segment(&context, ingest_segment)?;

        let mut parts = Vec::new();
        let mut pieces = Vec::new();
        let mut adlib_pieces = Vec::new();
        let mut adlib_actions = Vec::new();

        let mut part_notes: HashMap<String, Vec<Note>> = HashMap::new();
        for note in &result.notes {
            if let Some(part_ext) = &note.origin.part_external_id {
                part_notes
                    .entry(part_ext.clone())
                    .or_default()
                    .push(note.clone());
            }
        }

        for (part_idx, bp_part) in result.parts.iter().enumerate() {
            let part_id = Self::part_id(studio_id, rundown_external_id, &bp_part.external_id);
            parts.push(Part {
                id: part_id.clone(),
                rundown_id: rundown_id.clone(),
                segment_id: segment_id.clone(),
                external_id: bp_part.external_id.clone(),
                name: bp_part.part.name.clone(),
                // Pushed ranks order the parts; the stored rank is the
                // index, so identical pushes stay byte-identical
                rank: part_idx as f64,
                expected_duration_ms: bp_part.part.expected_duration_ms,
                autonext: bp_part.part.autonext,
                in_transition_duration_ms: bp_part.part.in_transition_duration_ms,
                floated: bp_part.part.floated,
                invalid: bp_part.part.invalid,
                dynamically_inserted_after_part_id: None,
                notes: part_notes.remove(&bp_part.external_id).unwrap_or_default(),
            });

            for bp_piece in &bp_part.pieces {
                pieces.push(Piece {
                    id: PieceId::derived(
                        studio_id,
                        &format!(
                            "{rundown_external_id}_{}_{}",
                            bp_part.external_id, bp_piece.external_id
                        ),
                    ),
                    rundown_id: rundown_id.clone(),
                    start_part_id: part_id.clone(),
                    external_id: bp_piece.external_id.clone(),
                    name: bp_piece.name.clone(),
                    source_layer_id: bp_piece.source_layer_id.clone(),
                    output_layer_id: bp_piece.output_layer_id.clone(),
                    enable: bp_piece.enable.clone(),
                    lifespan: bp_piece.lifespan,
                    extend_on_hold: bp_piece.extend_on_hold,
                    is_virtual: false,
                    content: bp_piece.content.clone(),
                });
            }

            for bp_adlib in &bp_part.adlib_pieces {
                adlib_pieces.push(AdLibPiece {
                    id: AdLibPieceId::derived(
                        studio_id,
                        &format!(
                            "{rundown_external_id}_{}_{}",
                            bp_part.external_id, bp_adlib.external_id
                        ),
                    ),
                    rundown_id: rundown_id.clone(),
                    part_id: Some(part_id.clone()),
                    external_id: bp_adlib.external_id.clone(),
                    name: bp_adlib.name.clone(),
                    rank: bp_adlib.rank,
                    source_layer_id: bp_adlib.source_layer_id.clone(),
                    output_layer_id: bp_adlib.output_layer_id.clone(),
                    lifespan: bp_adlib.lifespan,
                    expected_duration_ms: bp_adlib.expected_duration_ms,
                    to_be_queued: bp_adlib.to_be_queued,
                    invalid: false,
                    content: bp_adlib.content.clone(),
                });
            }

            for bp_action in &bp_part.adlib_actions {
                adlib_actions.push(AdLibAction {
                    id: AdLibActionId::derived(
                        studio_id,
                        &format!(
                            "{rundown_external_id}_{}_{}",
                            bp_part.external_id, bp_action.external_id
                        ),
                    ),
                    rundown_id: rundown_id.clone(),
                    part_id: Some(part_id.clone()),
                    external_id: bp_action.external_id.clone(),
                    action_id: bp_action.action_id.clone(),
                    display_name: bp_action.display_name.clone(),
                    user_data: bp_action.user_data.clone(),
                });
            }
        }

        let segment_notes: Vec<Note> = result
            .notes
            .iter()
            .filter(|n| n.origin.part_external_id.is_none())
            .cloned()
            .collect();

        Ok(MaterializedSegment {
            segment: Segment {
                id: segment_id,
                rundown_id: rundown_id.clone(),
                external_id: ingest_segment.external_id.clone(),
                name: result.name,
                rank: ingest_segment.rank,
                unsynced: None,
                notes: segment_notes,
            },
            parts,
            pieces,
            adlib_pieces,
            adlib_actions,
        })
    }

    // ---- safety -------------------------------------------------------

    /// Part ids that must not be removed while on air: the part of the
    /// current instance, plus the next one when the current part is about
    /// to auto-next into it.
    fn protected_part_ids(&self, cache: &PlaylistCache, now: chrono::DateTime<Utc>) -> Vec<PartId> {
        if !cache.playlist.active {
            return Vec::new();
        }
        let mut protected = Vec::new();
        if let Some(current) = cache.current_part_instance() {
            if !current.reset {
                protected.push(current.part.id.clone());
                let close_to_autonext = current.part.autonext
                    && match (current.part.expected_duration_ms, current.elapsed_ms(now)) {
                        (Some(expected), Some(elapsed)) => {
                            let remaining = expected as i64 - elapsed;
                            remaining > 0
                                && (remaining as u64) < self.ctx.config.autonext_guard_ms
                        }
                        _ => false,
                    };
                if close_to_autonext {
                    if let Some(next) = cache.next_part_instance() {
                        protected.push(next.part.id.clone());
                    }
                }
            }
        }
        protected
    }

    /// Degrade unsafe removals into segment-level unsync markings. Returns
    /// the set of segment ids frozen by this check; every change touching
    /// them must be skipped by the apply step.
    fn degrade_unsafe_changes(
        &self,
        cache: &mut PlaylistCache,
        changes: &RundownChangeSet,
        now: chrono::DateTime<Utc>,
    ) -> HashSet<SegmentId> {
        let mut frozen = HashSet::new();
        let protected = self.protected_part_ids(cache, now);
        if protected.is_empty() {
            return frozen;
        }

        let segment_of_part = |cache: &PlaylistCache, part_id: &PartId| {
            cache.parts.find_one(part_id).map(|p| p.segment_id.clone())
        };

        // Removing a whole segment that holds a protected part
        for segment_id in &changes.segments.removed {
            let holds_protected = protected
                .iter()
                .any(|pid| segment_of_part(cache, pid).as_ref() == Some(segment_id));
            if holds_protected {
                mark_segment_unsynced(cache, segment_id, SegmentUnsyncedReason::Removed);
                frozen.insert(segment_id.clone());
            }
        }

        // Removing a protected part out of a surviving segment
        for part_id in &changes.parts.removed {
            if protected.contains(part_id) {
                if let Some(segment_id) = segment_of_part(cache, part_id) {
                    if !frozen.contains(&segment_id) {
                        mark_segment_unsynced(cache, &segment_id, SegmentUnsyncedReason::Changed);
                        frozen.insert(segment_id);
                    }
                }
            }
        }

        if !frozen.is_empty() {
            let _ = self.ctx.events.publish(
                events::INGEST_SEGMENT_UNSYNCED,
                serde_json::json!({
                    "playlistId": cache.playlist.id.as_str(),
                    "segments": frozen.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                }),
            );
        }
        frozen
    }

    // ---- apply --------------------------------------------------------

    /// Apply prepared changes, skipping anything under a frozen segment
    fn apply_changes(
        &self,
        cache: &mut PlaylistCache,
        changes: RundownChangeSet,
        frozen: &HashSet<SegmentId>,
    ) {
        // Segment id per part, across both sides of the diff
        let mut part_segments: HashMap<PartId, SegmentId> = HashMap::new();
        for part in cache.parts.find(|_| true) {
            part_segments.insert(part.id.clone(), part.segment_id.clone());
        }
        for part in changes.parts.inserted.iter().chain(&changes.parts.changed) {
            part_segments.insert(part.id.clone(), part.segment_id.clone());
        }
        let part_frozen =
            |part_id: &PartId| part_segments.get(part_id).is_some_and(|s| frozen.contains(s));

        for segment in changes.segments.inserted {
            if !frozen.contains(&segment.id) {
                cache.segments.insert(segment);
            }
        }
        for segment in changes.segments.changed {
            if !frozen.contains(&segment.id) {
                cache.segments.insert(segment);
            }
        }
        for segment_id in changes.segments.removed {
            if !frozen.contains(&segment_id) {
                cache.segments.remove(&segment_id);
            }
        }

        for part in changes.parts.inserted.into_iter().chain(changes.parts.changed) {
            if !frozen.contains(&part.segment_id) {
                cache.parts.insert(part);
            }
        }
        for part_id in changes.parts.removed {
            if !part_frozen(&part_id) {
                cache.parts.remove(&part_id);
            }
        }

        for piece in changes.pieces.inserted.into_iter().chain(changes.pieces.changed) {
            if !part_frozen(&piece.start_part_id) {
                cache.pieces.insert(piece);
            }
        }
        for piece_id in changes.pieces.removed {
            let piece_part = cache.pieces.find_one(&piece_id).map(|p| p.start_part_id.clone());
            if piece_part.map(|pid| !part_frozen(&pid)).unwrap_or(true) {
                cache.pieces.remove(&piece_id);
            }
        }

        for adlib in changes
            .adlib_pieces
            .inserted
            .into_iter()
            .chain(changes.adlib_pieces.changed)
        {
            let frozen_part = adlib.part_id.as_ref().map(|pid| part_frozen(pid)).unwrap_or(false);
            if !frozen_part {
                cache.adlib_pieces.insert(adlib);
            }
        }
        for adlib_id in changes.adlib_pieces.removed {
            let adlib_part = cache
                .adlib_pieces
                .find_one(&adlib_id)
                .and_then(|a| a.part_id.clone());
            if adlib_part.map(|pid| !part_frozen(&pid)).unwrap_or(true) {
                cache.adlib_pieces.remove(&adlib_id);
            }
        }

        for action in changes
            .adlib_actions
            .inserted
            .into_iter()
            .chain(changes.adlib_actions.changed)
        {
            let frozen_part = action.part_id.as_ref().map(|pid| part_frozen(pid)).unwrap_or(false);
            if !frozen_part {
                cache.adlib_actions.insert(action);
            }
        }
        for action_id in changes.adlib_actions.removed {
            let action_part = cache
                .adlib_actions
                .find_one(&action_id)
                .and_then(|a| a.part_id.clone());
            if action_part.map(|pid| !part_frozen(&pid)).unwrap_or(true) {
                cache.adlib_actions.remove(&action_id);
            }
        }
    }

    /// Push ingest edits into the live current/next instances without
    /// losing their playback state
    fn sync_changes_to_live_instances(&self, cache: &mut PlaylistCache, changed_parts: &[Part]) {
        if !cache.playlist.active {
            return;
        }
        let live_ids: Vec<_> = [
            cache.playlist.current_part_instance_id.clone(),
            cache.playlist.next_part_instance_id.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        for instance_id in live_ids {
            let Some(instance) = cache.part_instances.find_one(&instance_id).cloned() else {
                continue;
            };
            if instance.reset {
                continue;
            }
            let Some(new_part) = changed_parts.iter().find(|p| p.id == instance.part.id) else {
                continue;
            };

            let mut updated = instance.clone();
            if self
                .ctx
                .blueprint
                .sync_ingest_to_part_instance(&mut updated, new_part)
            {
                let rebuilt_pieces = !updated.is_taken;
                cache.part_instances.insert(updated);

                // An untaken next instance also gets its content rebuilt
                if rebuilt_pieces {
                    cache.piece_instances.remove_where(|pi| {
                        pi.part_instance_id == instance_id
                            && !pi.dynamically_inserted
                            && pi.infinite.is_none()
                    });
                    for piece in cache.pieces.find(|p| p.start_part_id == new_part.id) {
                        cache.piece_instances.insert(
                            crate::models::PieceInstance::from_piece(piece, instance_id.clone()),
                        );
                    }
                }
                tracing::debug!(
                    part_instance_id = %instance_id,
                    part_id = %new_part.id,
                    "📥 INGEST: synced change into live instance"
                );
            }
        }
    }

    /// Recompute derived media references for one rundown, applied after a
    /// successful flush
    fn defer_expected_playout_items(&self, cache: &mut PlaylistCache, rundown_id: &RundownId) {
        let mut items: Vec<ExpectedPlayoutItem> = Vec::new();
        for piece in cache.pieces.find(|p| p.rundown_id == *rundown_id && !p.is_virtual) {
            if piece.content.get("fileName").is_some() {
                items.push(ExpectedPlayoutItem {
                    id: format!("{}_{}", rundown_id, piece.id),
                    rundown_id: rundown_id.clone(),
                    piece_id: piece.id.clone(),
                    content: piece.content.clone(),
                });
            }
        }
        for adlib in cache.adlib_pieces.find(|a| a.rundown_id == *rundown_id) {
            if adlib.content.get("fileName").is_some() {
                items.push(ExpectedPlayoutItem {
                    id: format!("{}_adlib_{}", rundown_id, adlib.id),
                    rundown_id: rundown_id.clone(),
                    piece_id: PieceId::new(adlib.id.as_str()),
                    content: adlib.content.clone(),
                });
            }
        }

        let rundown_id = rundown_id.clone();
        cache.defer_after_save(move |store| {
            Box::pin(async move {
                store
                    .expected_playout_items
                    .remove_where(|item| item.rundown_id == rundown_id)
                    .await?;
                for item in items {
                    store.expected_playout_items.insert(item).await?;
                }
                Ok(())
            })
        });
    }

    /// Shared tail of every applying ingest operation. `previous_order` is
    /// the rundown's segment order captured before any mutation.
    async fn finish_apply(
        &self,
        mut cache: PlaylistCache,
        rundown_id: &RundownId,
        touched_segments: &HashSet<SegmentId>,
        changed_parts: Vec<Part>,
        previous_order: Vec<SegmentId>,
    ) -> Result<()> {
        let now = Utc::now();
        ranks::update_unsynced_segment_ranks(&mut cache, rundown_id, &previous_order);
        for segment_id in touched_segments {
            if cache.segments.contains(segment_id) {
                ranks::renormalize_part_ranks(&mut cache, segment_id);
            }
        }
        self.defer_expected_playout_items(&mut cache, rundown_id);
        selection::ensure_next_part_is_valid(&mut cache, now)?;
        self.sync_changes_to_live_instances(&mut cache, &changed_parts);

        let active = cache.playlist.active;
        if active {
            self.ctx.timeline.request_recompute(&cache).await?;
        }
        let playlist_id = cache.playlist.id.clone();
        cache.save_all_to_store().await?;

        let _ = self.ctx.events.publish(
            events::INGEST_RUNDOWN_UPDATED,
            serde_json::json!({
                "playlistId": playlist_id.as_str(),
                "rundownId": rundown_id.as_str(),
            }),
        );
        Ok(())
    }

    // ---- operations ---------------------------------------------------

    /// Full-tree create/update push
    pub async fn handle_rundown_push(
        &self,
        studio_id: &StudioId,
        ingest: IngestRundown,
    ) -> Result<()> {
        let rundown_id = Self::rundown_id(studio_id, &ingest.external_id);
        let playlist_id = Self::playlist_id(studio_id, &ingest.external_id);
        let studio_id = studio_id.clone();

        self.ctx
            .queue
            .run_exclusive(&playlist_id, QueuePriority::Ingest, "rundown_push", || async {
                let now = Utc::now();
                let existing_playlist =
                    self.ctx.store.playlists.find_one(&playlist_id).await?;

                let mut cache = match existing_playlist {
                    Some(_) => PlaylistCache::load(&self.ctx.store, &playlist_id).await?,
                    None => {
                        let playlist = RundownPlaylist {
                            id: playlist_id.clone(),
                            external_id: ingest.external_id.clone(),
                            studio_id: studio_id.clone(),
                            name: ingest.name.clone(),
                            active: false,
                            rehearsal: false,
                            hold_state: crate::models::HoldState::None,
                            current_part_instance_id: None,
                            next_part_instance_id: None,
                            previous_part_instance_id: None,
                            next_time_offset: None,
                            rundown_ids_in_order: vec![rundown_id.clone()],
                            created: now,
                            modified: now,
                        };
                        PlaylistCache::create(&self.ctx.store, playlist)
                    }
                };

                if let Some(existing) = cache.rundowns.find_one(&rundown_id) {
                    if existing.unsynced {
                        tracing::warn!(
                            rundown_external_id = %ingest.external_id,
                            "📥 INGEST: rundown is unsynced; push rejected until resync"
                        );
                        return Ok(());
                    }
                }

                // Upsert the rundown document itself
                match cache.rundowns.find_one(&rundown_id).cloned() {
                    Some(mut rundown) => {
                        rundown.name = ingest.name.clone();
                        rundown.source_type = ingest.rundown_type.clone();
                        rundown.modified = now;
                        cache.rundowns.insert(rundown);
                    }
                    None => {
                        cache.rundowns.insert(Rundown {
                            id: rundown_id.clone(),
                            external_id: ingest.external_id.clone(),
                            playlist_id: playlist_id.clone(),
                            studio_id: studio_id.clone(),
                            name: ingest.name.clone(),
                            source_type: ingest.rundown_type.clone(),
                            unsynced: false,
                            unsynced_time: None,
                            created: now,
                            modified: now,
                        });
                        if !cache.playlist.rundown_ids_in_order.contains(&rundown_id) {
                            cache.playlist.rundown_ids_in_order.push(rundown_id.clone());
                        }
                    }
                }
                cache.playlist.name = ingest.name.clone();
                let previous_order = ranks::capture_segment_order(&cache, &rundown_id);

                // Materialize the full incoming tree
                let mut incoming_segments = Vec::new();
                let mut incoming_parts = Vec::new();
                let mut incoming_pieces = Vec::new();
                let mut incoming_adlibs = Vec::new();
                let mut incoming_actions = Vec::new();
                for ingest_segment in ingest.ordered_segments() {
                    let materialized = self.materialize_segment(
                        &studio_id,
                        &rundown_id,
                        &ingest.external_id,
                        ingest_segment,
                    )?;
                    incoming_segments.push(materialized.segment);
                    incoming_parts.extend(materialized.parts);
                    incoming_pieces.extend(materialized.pieces);
                    incoming_adlibs.extend(materialized.adlib_pieces);
                    incoming_actions.extend(materialized.adlib_actions);
                }

                // Already-frozen segments are invisible to the diff
                let pre_frozen: HashSet<SegmentId> = cache
                    .segments
                    .find(|s| s.rundown_id == rundown_id && s.is_unsynced())
                    .into_iter()
                    .map(|s| s.id)
                    .collect();
                let frozen_parts: HashSet<PartId> = cache
                    .parts
                    .find(|p| pre_frozen.contains(&p.segment_id))
                    .into_iter()
                    .map(|p| p.id)
                    .collect();

                incoming_segments.retain(|s| !pre_frozen.contains(&s.id));
                incoming_parts.retain(|p| !pre_frozen.contains(&p.segment_id));
                incoming_pieces.retain(|p| !frozen_parts.contains(&p.start_part_id));
                incoming_adlibs
                    .retain(|a| a.part_id.as_ref().map(|p| !frozen_parts.contains(p)).unwrap_or(true));
                incoming_actions
                    .retain(|a| a.part_id.as_ref().map(|p| !frozen_parts.contains(p)).unwrap_or(true));

                // Ingest-sourced documents only; ad-libbed parts are playout-owned
                let existing_segments: Vec<Segment> = cache
                    .segments
                    .find(|s| s.rundown_id == rundown_id && !pre_frozen.contains(&s.id));
                let existing_parts: Vec<Part> = cache.parts.find(|p| {
                    p.rundown_id == rundown_id
                        && !p.is_dynamically_inserted()
                        && !pre_frozen.contains(&p.segment_id)
                });
                let dynamic_part_ids: HashSet<PartId> = cache
                    .parts
                    .find(|p| p.is_dynamically_inserted())
                    .into_iter()
                    .map(|p| p.id)
                    .collect();
                let existing_pieces: Vec<Piece> = cache.pieces.find(|p| {
                    p.rundown_id == rundown_id
                        && !p.is_virtual
                        && !frozen_parts.contains(&p.start_part_id)
                        && !dynamic_part_ids.contains(&p.start_part_id)
                });
                let existing_adlibs: Vec<AdLibPiece> = cache.adlib_pieces.find(|a| {
                    a.rundown_id == rundown_id
                        && a.part_id.as_ref().map(|p| !frozen_parts.contains(p)).unwrap_or(true)
                });
                let existing_actions: Vec<AdLibAction> = cache.adlib_actions.find(|a| {
                    a.rundown_id == rundown_id
                        && a.part_id.as_ref().map(|p| !frozen_parts.contains(p)).unwrap_or(true)
                });

                let changes = RundownChangeSet {
                    segments: diff_documents(&existing_segments, &incoming_segments),
                    parts: diff_documents(&existing_parts, &incoming_parts),
                    pieces: diff_documents(&existing_pieces, &incoming_pieces),
                    adlib_pieces: diff_documents(&existing_adlibs, &incoming_adlibs),
                    adlib_actions: diff_documents(&existing_actions, &incoming_actions),
                };

                if changes.is_empty() && pre_frozen.is_empty() {
                    tracing::debug!(
                        rundown_external_id = %ingest.external_id,
                        "📥 INGEST: push identical to cached state; nothing to apply"
                    );
                    cache.save_all_to_store().await?;
                    return Ok(());
                }

                let touched_segments: HashSet<SegmentId> = changes
                    .parts
                    .inserted
                    .iter()
                    .chain(&changes.parts.changed)
                    .map(|p| p.segment_id.clone())
                    .chain(changes.segments.inserted.iter().map(|s| s.id.clone()))
                    .collect();
                let changed_parts: Vec<Part> = changes
                    .parts
                    .changed
                    .iter()
                    .chain(&changes.parts.inserted)
                    .cloned()
                    .collect();

                let newly_frozen = self.degrade_unsafe_changes(&mut cache, &changes, now);
                self.apply_changes(&mut cache, changes, &newly_frozen);

                self.finish_apply(cache, &rundown_id, &touched_segments, changed_parts, previous_order)
                    .await
            })
            .await
    }

    /// Remove a rundown; degraded to a whole-rundown unsync while removing
    /// it would pull the floor out from under the playhead
    pub async fn handle_rundown_delete(
        &self,
        studio_id: &StudioId,
        rundown_external_id: &str,
    ) -> Result<()> {
        let rundown_id = Self::rundown_id(studio_id, rundown_external_id);
        let playlist_id = Self::playlist_id(studio_id, rundown_external_id);

        self.ctx
            .queue
            .run_exclusive(&playlist_id, QueuePriority::Ingest, "rundown_delete", || async {
                let now = Utc::now();
                let mut cache = PlaylistCache::load(&self.ctx.store, &playlist_id).await?;
                if cache.rundowns.find_one(&rundown_id).is_none() {
                    return Err(not_found(format!("rundown {rundown_external_id}")));
                }

                let protected = self.protected_part_ids(&cache, now);
                let playhead_inside = protected.iter().any(|part_id| {
                    cache
                        .parts
                        .find_one(part_id)
                        .map(|p| p.rundown_id == rundown_id)
                        .unwrap_or(false)
                });

                if playhead_inside {
                    cache.rundowns.update(&rundown_id, |r| r.mark_unsynced(now));
                    let _ = self.ctx.events.publish(
                        events::INGEST_RUNDOWN_UNSYNCED,
                        serde_json::json!({ "rundownId": rundown_id.as_str() }),
                    );
                    tracing::warn!(
                        rundown_external_id = %rundown_external_id,
                        "📥 INGEST: removal blocked by playhead; rundown marked unsynced"
                    );
                    cache.save_all_to_store().await?;
                    return Ok(());
                }

                cache.segments.remove_where(|s| s.rundown_id == rundown_id);
                cache.parts.remove_where(|p| p.rundown_id == rundown_id);
                cache.pieces.remove_where(|p| p.rundown_id == rundown_id);
                cache.adlib_pieces.remove_where(|a| a.rundown_id == rundown_id);
                cache.adlib_actions.remove_where(|a| a.rundown_id == rundown_id);
                cache.part_instances.remove_where(|i| i.rundown_id == rundown_id);
                cache.piece_instances.remove_where(|i| i.rundown_id == rundown_id);
                cache.rundowns.remove(&rundown_id);
                cache.playlist.rundown_ids_in_order.retain(|id| *id != rundown_id);

                {
                    let rundown_id = rundown_id.clone();
                    cache.defer_after_save(move |store| {
                        Box::pin(async move {
                            store
                                .expected_playout_items
                                .remove_where(|item| item.rundown_id == rundown_id)
                                .await?;
                            Ok(())
                        })
                    });
                }

                if cache.rundowns.is_empty() {
                    // Last rundown gone: the playlist goes with it
                    cache.mark_playlist_removed();
                } else {
                    selection::ensure_next_part_is_valid(&mut cache, now)?;
                    if cache.playlist.active {
                        self.ctx.timeline.request_recompute(&cache).await?;
                    }
                }

                cache.save_all_to_store().await?;
                let _ = self.ctx.events.publish(
                    events::INGEST_RUNDOWN_REMOVED,
                    serde_json::json!({ "rundownId": rundown_id.as_str() }),
                );
                Ok(())
            })
            .await
    }

    /// Create/update one pushed segment
    pub async fn handle_segment_push(
        &self,
        studio_id: &StudioId,
        rundown_external_id: &str,
        ingest_segment: IngestSegment,
    ) -> Result<()> {
        let rundown_id = Self::rundown_id(studio_id, rundown_external_id);
        let playlist_id = Self::playlist_id(studio_id, rundown_external_id);
        let studio_id = studio_id.clone();

        self.ctx
            .queue
            .run_exclusive(&playlist_id, QueuePriority::Ingest, "segment_push", || async {
                let now = Utc::now();
                let mut cache = PlaylistCache::load(&self.ctx.store, &playlist_id).await?;
                let rundown = cache
                    .rundowns
                    .find_one(&rundown_id)
                    .cloned()
                    .ok_or_else(|| not_found(format!("rundown {rundown_external_id}")))?;
                if rundown.unsynced {
                    tracing::warn!(
                        rundown_external_id = %rundown_external_id,
                        "📥 INGEST: rundown is unsynced; segment push rejected"
                    );
                    return Ok(());
                }

                let materialized = self.materialize_segment(
                    &studio_id,
                    &rundown_id,
                    rundown_external_id,
                    &ingest_segment,
                )?;
                let segment_id = materialized.segment.id.clone();

                if cache
                    .segments
                    .find_one(&segment_id)
                    .map(Segment::is_unsynced)
                    .unwrap_or(false)
                {
                    tracing::warn!(
                        segment_external_id = %ingest_segment.external_id,
                        "📥 INGEST: segment is unsynced; push rejected"
                    );
                    return Ok(());
                }

                let previous_order = ranks::capture_segment_order(&cache, &rundown_id);
                let existing_segment: Vec<Segment> =
                    cache.segments.find(|s| s.id == segment_id);
                let existing_parts: Vec<Part> = cache
                    .parts
                    .find(|p| p.segment_id == segment_id && !p.is_dynamically_inserted());
                let existing_part_ids: HashSet<PartId> =
                    existing_parts.iter().map(|p| p.id.clone()).collect();
                let existing_pieces: Vec<Piece> = cache
                    .pieces
                    .find(|p| existing_part_ids.contains(&p.start_part_id) && !p.is_virtual);
                let existing_adlibs: Vec<AdLibPiece> = cache.adlib_pieces.find(|a| {
                    a.part_id.as_ref().map(|p| existing_part_ids.contains(p)).unwrap_or(false)
                });
                let existing_actions: Vec<AdLibAction> = cache.adlib_actions.find(|a| {
                    a.part_id.as_ref().map(|p| existing_part_ids.contains(p)).unwrap_or(false)
                });

                let changes = RundownChangeSet {
                    segments: diff_documents(&existing_segment, &[materialized.segment]),
                    parts: diff_documents(&existing_parts, &materialized.parts),
                    pieces: diff_documents(&existing_pieces, &materialized.pieces),
                    adlib_pieces: diff_documents(&existing_adlibs, &materialized.adlib_pieces),
                    adlib_actions: diff_documents(&existing_actions, &materialized.adlib_actions),
                };

                let touched: HashSet<SegmentId> = [segment_id.clone()].into_iter().collect();
                let changed_parts: Vec<Part> = changes
                    .parts
                    .changed
                    .iter()
                    .chain(&changes.parts.inserted)
                    .cloned()
                    .collect();

                let newly_frozen = self.degrade_unsafe_changes(&mut cache, &changes, now);
                self.apply_changes(&mut cache, changes, &newly_frozen);
                self.finish_apply(cache, &rundown_id, &touched, changed_parts, previous_order)
                    .await
            })
            .await
    }

    /// Remove one segment; degraded to an unsync marking when the playhead
    /// sits inside it
    pub async fn handle_segment_delete(
        &self,
        studio_id: &StudioId,
        rundown_external_id: &str,
        segment_external_id: &str,
    ) -> Result<()> {
        let rundown_id = Self::rundown_id(studio_id, rundown_external_id);
        let playlist_id = Self::playlist_id(studio_id, rundown_external_id);
        let segment_id = Self::segment_id(studio_id, rundown_external_id, segment_external_id);

        self.ctx
            .queue
            .run_exclusive(&playlist_id, QueuePriority::Ingest, "segment_delete", || async {
                let now = Utc::now();
                let mut cache = PlaylistCache::load(&self.ctx.store, &playlist_id).await?;
                let rundown = cache
                    .rundowns
                    .find_one(&rundown_id)
                    .cloned()
                    .ok_or_else(|| not_found(format!("rundown {rundown_external_id}")))?;
                if cache.segments.find_one(&segment_id).is_none() {
                    return Err(not_found(format!("segment {segment_external_id}")));
                }
                if rundown.unsynced {
                    return Ok(());
                }

                let previous_order = ranks::capture_segment_order(&cache, &rundown_id);
                let part_ids: HashSet<PartId> = cache
                    .parts
                    .find(|p| p.segment_id == segment_id)
                    .into_iter()
                    .map(|p| p.id)
                    .collect();

                let protected = self.protected_part_ids(&cache, now);
                if protected.iter().any(|pid| part_ids.contains(pid)) {
                    mark_segment_unsynced(&mut cache, &segment_id, SegmentUnsyncedReason::Removed);
                    ranks::update_unsynced_segment_ranks(&mut cache, &rundown_id, &previous_order);
                    let _ = self.ctx.events.publish(
                        events::INGEST_SEGMENT_UNSYNCED,
                        serde_json::json!({ "segmentId": segment_id.as_str() }),
                    );
                    if cache.playlist.active {
                        self.ctx.timeline.request_recompute(&cache).await?;
                    }
                    cache.save_all_to_store().await?;
                    return Ok(());
                }

                cache.segments.remove(&segment_id);
                cache.parts.remove_where(|p| p.segment_id == segment_id);
                cache.pieces.remove_where(|p| part_ids.contains(&p.start_part_id));
                cache.adlib_pieces.remove_where(|a| {
                    a.part_id.as_ref().map(|p| part_ids.contains(p)).unwrap_or(false)
                });
                cache.adlib_actions.remove_where(|a| {
                    a.part_id.as_ref().map(|p| part_ids.contains(p)).unwrap_or(false)
                });

                self.finish_apply(cache, &rundown_id, &HashSet::new(), Vec::new(), previous_order)
                    .await
            })
            .await
    }

    /// Bulk segment rank reassignment; unsynced segments re-interpolate
    /// against the new survivor ranks afterwards
    pub async fn handle_segment_ranks_update(
        &self,
        studio_id: &StudioId,
        rundown_external_id: &str,
        new_ranks: HashMap<String, f64>,
    ) -> Result<()> {
        let rundown_id = Self::rundown_id(studio_id, rundown_external_id);
        let playlist_id = Self::playlist_id(studio_id, rundown_external_id);
        let studio_id = studio_id.clone();

        self.ctx
            .queue
            .run_exclusive(&playlist_id, QueuePriority::Ingest, "segment_ranks", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, &playlist_id).await?;
                let rundown = cache
                    .rundowns
                    .find_one(&rundown_id)
                    .cloned()
                    .ok_or_else(|| not_found(format!("rundown {rundown_external_id}")))?;
                if rundown.unsynced {
                    return Ok(());
                }
                let previous_order = ranks::capture_segment_order(&cache, &rundown_id);

                // Resolve the pushed external ids to cached segments
                let mut moved: HashMap<SegmentId, f64> = HashMap::new();
                for (segment_external_id, rank) in &new_ranks {
                    let segment_id =
                        Self::segment_id(&studio_id, rundown_external_id, segment_external_id);
                    if cache.segments.contains(&segment_id) {
                        moved.insert(segment_id, *rank);
                    } else {
                        tracing::warn!(
                            segment_external_id = %segment_external_id,
                            "📥 INGEST: rank update for unknown segment skipped"
                        );
                    }
                }

                // Order by requested rank; a moved segment lands ahead of a
                // stationary one on a tie, stationary segments keep their
                // old relative order. Survivors then renormalize to
                // consecutive integer ranks starting at 1.
                let mut synced: Vec<Segment> = cache
                    .segments
                    .find(|s| s.rundown_id == rundown_id && !s.is_unsynced());
                synced.sort_by(|a, b| {
                    let rank_a = moved.get(&a.id).copied().unwrap_or(a.rank);
                    let rank_b = moved.get(&b.id).copied().unwrap_or(b.rank);
                    rank_a
                        .partial_cmp(&rank_b)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| moved.contains_key(&b.id).cmp(&moved.contains_key(&a.id)))
                        .then_with(|| {
                            a.rank.partial_cmp(&b.rank).unwrap_or(std::cmp::Ordering::Equal)
                        })
                });
                for (idx, segment) in synced.iter().enumerate() {
                    cache
                        .segments
                        .update(&segment.id, |s| s.rank = (idx + 1) as f64);
                }

                ranks::update_unsynced_segment_ranks(&mut cache, &rundown_id, &previous_order);
                cache.save_all_to_store().await?;
                Ok(())
            })
            .await
    }

    /// Create/update one pushed part within a segment
    pub async fn handle_part_push(
        &self,
        studio_id: &StudioId,
        rundown_external_id: &str,
        segment_external_id: &str,
        ingest_part: IngestPart,
    ) -> Result<()> {
        let rundown_id = Self::rundown_id(studio_id, rundown_external_id);
        let playlist_id = Self::playlist_id(studio_id, rundown_external_id);
        let segment_id = Self::segment_id(studio_id, rundown_external_id, segment_external_id);
        let studio_id = studio_id.clone();

        self.ctx
            .queue
            .run_exclusive(&playlist_id, QueuePriority::Ingest, "part_push", || async {
                let now = Utc::now();
                let mut cache = PlaylistCache::load(&self.ctx.store, &playlist_id).await?;
                let rundown = cache
                    .rundowns
                    .find_one(&rundown_id)
                    .cloned()
                    .ok_or_else(|| not_found(format!("rundown {rundown_external_id}")))?;
                let segment = cache
                    .segments
                    .find_one(&segment_id)
                    .cloned()
                    .ok_or_else(|| not_found(format!("segment {segment_external_id}")))?;
                if rundown.unsynced || segment.is_unsynced() {
                    return Ok(());
                }
                let previous_order = ranks::capture_segment_order(&cache, &rundown_id);

                // Materialize just this part through the segment-shaped hook
                let synthetic_segment = IngestSegment {
                    external_id: segment.external_id.clone(),
                    name: segment.name.clone(),
                    rank: segment.rank,
                    parts: vec![ingest_part.clone()],
                    payload: None,
                };
                let mut materialized = self.materialize_segment(
                    &studio_id,
                    &rundown_id,
                    rundown_external_id,
                    &synthetic_segment,
                )?;
                // A lone pushed part keeps its NRCS rank so it sorts into
                // place; renormalization then settles the segment
                for part in &mut materialized.parts {
                    part.rank = ingest_part.rank;
                }

                let part_id =
                    Self::part_id(&studio_id, rundown_external_id, &ingest_part.external_id);
                let existing_parts: Vec<Part> = cache.parts.find(|p| p.id == part_id);
                let existing_pieces: Vec<Piece> = cache
                    .pieces
                    .find(|p| p.start_part_id == part_id && !p.is_virtual);
                let existing_adlibs: Vec<AdLibPiece> = cache
                    .adlib_pieces
                    .find(|a| a.part_id.as_ref() == Some(&part_id));
                let existing_actions: Vec<AdLibAction> = cache
                    .adlib_actions
                    .find(|a| a.part_id.as_ref() == Some(&part_id));

                let changes = RundownChangeSet {
                    segments: PreparedChanges::default(),
                    parts: diff_documents(&existing_parts, &materialized.parts),
                    pieces: diff_documents(&existing_pieces, &materialized.pieces),
                    adlib_pieces: diff_documents(&existing_adlibs, &materialized.adlib_pieces),
                    adlib_actions: diff_documents(&existing_actions, &materialized.adlib_actions),
                };

                let touched: HashSet<SegmentId> = [segment_id.clone()].into_iter().collect();
                let changed_parts: Vec<Part> = changes
                    .parts
                    .changed
                    .iter()
                    .chain(&changes.parts.inserted)
                    .cloned()
                    .collect();

                let newly_frozen = self.degrade_unsafe_changes(&mut cache, &changes, now);
                self.apply_changes(&mut cache, changes, &newly_frozen);
                self.finish_apply(cache, &rundown_id, &touched, changed_parts, previous_order)
                    .await
            })
            .await
    }

    /// Remove one part; degraded to a segment unsync when it is on air
    pub async fn handle_part_delete(
        &self,
        studio_id: &StudioId,
        rundown_external_id: &str,
        segment_external_id: &str,
        part_external_id: &str,
    ) -> Result<()> {
        let rundown_id = Self::rundown_id(studio_id, rundown_external_id);
        let playlist_id = Self::playlist_id(studio_id, rundown_external_id);
        let segment_id = Self::segment_id(studio_id, rundown_external_id, segment_external_id);
        let part_id = Self::part_id(studio_id, rundown_external_id, part_external_id);

        self.ctx
            .queue
            .run_exclusive(&playlist_id, QueuePriority::Ingest, "part_delete", || async {
                let now = Utc::now();
                let mut cache = PlaylistCache::load(&self.ctx.store, &playlist_id).await?;
                let rundown = cache
                    .rundowns
                    .find_one(&rundown_id)
                    .cloned()
                    .ok_or_else(|| not_found(format!("rundown {rundown_external_id}")))?;
                if cache.parts.find_one(&part_id).is_none() {
                    return Err(not_found(format!("part {part_external_id}")));
                }
                let segment_unsynced = cache
                    .segments
                    .find_one(&segment_id)
                    .map(Segment::is_unsynced)
                    .unwrap_or(false);
                if rundown.unsynced || segment_unsynced {
                    return Ok(());
                }
                let previous_order = ranks::capture_segment_order(&cache, &rundown_id);

                let protected = self.protected_part_ids(&cache, now);
                if protected.contains(&part_id) {
                    mark_segment_unsynced(&mut cache, &segment_id, SegmentUnsyncedReason::Changed);
                    let _ = self.ctx.events.publish(
                        events::INGEST_SEGMENT_UNSYNCED,
                        serde_json::json!({ "segmentId": segment_id.as_str() }),
                    );
                    cache.save_all_to_store().await?;
                    return Ok(());
                }

                cache.parts.remove(&part_id);
                cache.pieces.remove_where(|p| p.start_part_id == part_id);
                cache
                    .adlib_pieces
                    .remove_where(|a| a.part_id.as_ref() == Some(&part_id));
                cache
                    .adlib_actions
                    .remove_where(|a| a.part_id.as_ref() == Some(&part_id));

                let touched: HashSet<SegmentId> = [segment_id.clone()].into_iter().collect();
                self.finish_apply(cache, &rundown_id, &touched, Vec::new(), previous_order)
                    .await
            })
            .await
    }

    /// Clear a rundown's unsynced flag; the next push rebuilds its content
    pub async fn resync_rundown(
        &self,
        studio_id: &StudioId,
        rundown_external_id: &str,
    ) -> Result<()> {
        let rundown_id = Self::rundown_id(studio_id, rundown_external_id);
        let playlist_id = Self::playlist_id(studio_id, rundown_external_id);

        self.ctx
            .queue
            .run_exclusive(&playlist_id, QueuePriority::UserIngest, "resync_rundown", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, &playlist_id).await?;
                let updated = cache.rundowns.update(&rundown_id, Rundown::resync);
                if !updated {
                    return Err(not_found(format!("rundown {rundown_external_id}")));
                }
                cache.segments.update_where(
                    |s| s.rundown_id == rundown_id,
                    |s| s.unsynced = None,
                );
                cache.save_all_to_store().await?;
                Ok(())
            })
            .await
    }

    /// Clear one segment's unsynced flag
    pub async fn resync_segment(
        &self,
        studio_id: &StudioId,
        rundown_external_id: &str,
        segment_external_id: &str,
    ) -> Result<()> {
        let playlist_id = Self::playlist_id(studio_id, rundown_external_id);
        let segment_id = Self::segment_id(studio_id, rundown_external_id, segment_external_id);

        self.ctx
            .queue
            .run_exclusive(&playlist_id, QueuePriority::UserIngest, "resync_segment", || async {
                let mut cache = PlaylistCache::load(&self.ctx.store, &playlist_id).await?;
                let updated = cache.segments.update(&segment_id, |s| s.unsynced = None);
                if !updated {
                    return Err(not_found(format!("segment {segment_external_id}")));
                }
                cache.save_all_to_store().await?;
                Ok(())
            })
            .await
    }
}

/// Freeze a segment against ingest, leaving a note for the operator UI
fn mark_segment_unsynced(
    cache: &mut PlaylistCache,
    segment_id: &SegmentId,
    reason: SegmentUnsyncedReason,
) {
    cache.segments.update(segment_id, |segment| {
        if segment.unsynced.is_none() {
            segment.unsynced = Some(reason);
            let message = match reason {
                SegmentUnsyncedReason::Removed => {
                    "Segment was removed in the newsroom system while on air; content is frozen"
                }
                SegmentUnsyncedReason::Changed => {
                    "Segment changed in the newsroom system while on air; content is frozen"
                }
            };
            segment.notes.push(Note::warning(
                message,
                NoteOrigin {
                    name: segment.name.clone(),
                    segment_external_id: Some(segment.external_id.clone()),
                    part_external_id: None,
                },
            ));
        }
    });
}
