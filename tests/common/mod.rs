#![allow(dead_code)]

//! Shared fixtures for the integration suites: a wired core context with an
//! authenticated ingest gateway, plus builders for pushed story trees.

use std::sync::Arc;

use serde_json::Value;

use rundown_core::config::RundownConfig;
use rundown_core::context::CoreContext;
use rundown_core::ingest::{
    IngestPart, IngestReconciler, IngestRundown, IngestSegment, PassthroughShowStyle,
};
use rundown_core::models::{
    AdLibPieceId, DeviceId, DeviceType, PartId, PartInstance, PeripheralDevice, PlaylistId,
    RundownPlaylist, Segment, SegmentId, StudioId,
};
use rundown_core::services::{IngestService, PlayoutService};
use rundown_core::store::DocumentStore;
use rundown_core::timeline::RecordingTimelinePublisher;

pub const STUDIO: &str = "studio0";
pub const DEVICE: &str = "mos-gateway";
pub const TOKEN: &str = "secret";

pub struct Harness {
    pub ctx: CoreContext,
    pub ingest: IngestService,
    pub playout: PlayoutService,
    pub timeline: Arc<RecordingTimelinePublisher>,
    pub device_id: DeviceId,
}

impl Harness {
    pub async fn new() -> Self {
        let store = DocumentStore::new();
        let timeline = Arc::new(RecordingTimelinePublisher::new());
        let ctx = CoreContext::new(
            store,
            Arc::new(PassthroughShowStyle),
            timeline.clone(),
            RundownConfig::default(),
        );
        let device_id = DeviceId::new(DEVICE);
        ctx.store
            .devices
            .insert(PeripheralDevice {
                id: device_id.clone(),
                token: TOKEN.into(),
                studio_id: StudioId::new(STUDIO),
                name: "MOS gateway".into(),
                device_type: DeviceType::Ingest,
                connected: true,
                last_seen: None,
            })
            .await
            .unwrap();

        Self {
            ingest: IngestService::new(ctx.clone()),
            playout: PlayoutService::new(ctx.clone()),
            ctx,
            timeline,
            device_id,
        }
    }

    pub fn studio(&self) -> StudioId {
        StudioId::new(STUDIO)
    }

    pub fn playlist_id(&self, rundown_external_id: &str) -> PlaylistId {
        IngestReconciler::playlist_id(&self.studio(), rundown_external_id)
    }

    pub fn segment_id(&self, rundown_external_id: &str, segment_external_id: &str) -> SegmentId {
        IngestReconciler::segment_id(&self.studio(), rundown_external_id, segment_external_id)
    }

    pub fn part_id(&self, rundown_external_id: &str, part_external_id: &str) -> PartId {
        IngestReconciler::part_id(&self.studio(), rundown_external_id, part_external_id)
    }

    pub fn adlib_id(
        &self,
        rundown_external_id: &str,
        part_external_id: &str,
        adlib_external_id: &str,
    ) -> AdLibPieceId {
        AdLibPieceId::derived(
            &self.studio(),
            &format!("{rundown_external_id}_{part_external_id}_{adlib_external_id}"),
        )
    }

    pub async fn push_rundown(&self, ingest_rundown: IngestRundown) {
        let response = self
            .ingest
            .data_rundown_create(&self.device_id, TOKEN, ingest_rundown)
            .await;
        assert!(response.is_ok(), "rundown push failed: {response:?}");
    }

    pub async fn playlist(&self, rundown_external_id: &str) -> RundownPlaylist {
        self.ctx
            .store
            .playlists
            .find_one(&self.playlist_id(rundown_external_id))
            .await
            .unwrap()
            .expect("playlist exists")
    }

    /// Segments of the rundown, sorted by rank
    pub async fn segments_of(&self, rundown_external_id: &str) -> Vec<Segment> {
        let rundown_id = IngestReconciler::rundown_id(&self.studio(), rundown_external_id);
        let mut segments = self
            .ctx
            .store
            .segments
            .find(|s| s.rundown_id == rundown_id)
            .await
            .unwrap();
        segments.sort_by(|a, b| a.rank.partial_cmp(&b.rank).unwrap());
        segments
    }

    /// Parts of one segment, sorted by rank
    pub async fn parts_of(
        &self,
        rundown_external_id: &str,
        segment_external_id: &str,
    ) -> Vec<rundown_core::models::Part> {
        let segment_id = self.segment_id(rundown_external_id, segment_external_id);
        let mut parts = self
            .ctx
            .store
            .parts
            .find(|p| p.segment_id == segment_id)
            .await
            .unwrap();
        parts.sort_by(|a, b| a.rank.partial_cmp(&b.rank).unwrap());
        parts
    }

    pub async fn current_part_instance(&self, rundown_external_id: &str) -> Option<PartInstance> {
        let playlist = self.playlist(rundown_external_id).await;
        match playlist.current_part_instance_id {
            Some(id) => self.ctx.store.part_instances.find_one(&id).await.unwrap(),
            None => None,
        }
    }

    pub async fn next_part_instance(&self, rundown_external_id: &str) -> Option<PartInstance> {
        let playlist = self.playlist(rundown_external_id).await;
        match playlist.next_part_instance_id {
            Some(id) => self.ctx.store.part_instances.find_one(&id).await.unwrap(),
            None => None,
        }
    }

    /// Activate and take until the given part is on air
    pub async fn activate_and_take_to(
        &self,
        rundown_external_id: &str,
        part_external_id: &str,
    ) {
        let playlist_id = self.playlist_id(rundown_external_id);
        let response = self.playout.activate(&playlist_id, false).await;
        assert!(response.is_ok(), "activate failed: {response:?}");

        let target = self.part_id(rundown_external_id, part_external_id);
        for _ in 0..32 {
            let response = self.playout.take(&playlist_id).await;
            assert!(response.is_ok(), "take failed: {response:?}");
            if self
                .current_part_instance(rundown_external_id)
                .await
                .map(|pi| pi.part.id == target)
                .unwrap_or(false)
            {
                return;
            }
        }
        panic!("never reached part {part_external_id}");
    }
}

/// Build a pushed part with no payload
pub fn ingest_part(external_id: &str, rank: f64) -> IngestPart {
    IngestPart {
        external_id: external_id.into(),
        name: format!("Part {external_id}"),
        rank,
        payload: None,
    }
}

/// Build a pushed part carrying a payload for the passthrough show style
pub fn ingest_part_with_payload(external_id: &str, rank: f64, payload: Value) -> IngestPart {
    IngestPart {
        external_id: external_id.into(),
        name: format!("Part {external_id}"),
        rank,
        payload: Some(payload),
    }
}

/// Build a pushed segment with `part_count` plain parts named
/// `{segment}_part{i}`
pub fn ingest_segment(external_id: &str, rank: f64, part_count: usize) -> IngestSegment {
    IngestSegment {
        external_id: external_id.into(),
        name: format!("Segment {external_id}"),
        rank,
        parts: (0..part_count)
            .map(|i| ingest_part(&format!("{external_id}_part{i}"), i as f64))
            .collect(),
        payload: None,
    }
}

/// Build a full pushed rundown from (segment external id, part count) pairs
pub fn simple_rundown(external_id: &str, segments: &[(&str, usize)]) -> IngestRundown {
    IngestRundown {
        external_id: external_id.into(),
        name: format!("Rundown {external_id}"),
        rundown_type: "mos".into(),
        segments: segments
            .iter()
            .enumerate()
            .map(|(idx, (seg_ext, part_count))| ingest_segment(seg_ext, idx as f64, *part_count))
            .collect(),
        payload: None,
    }
}
