//! Ingest push API, invoked by the external newsroom system through an
//! authenticated gateway device identity.

use std::collections::HashMap;

use crate::context::CoreContext;
use crate::error::{not_found, precondition, Result};
use crate::ingest::{IngestPart, IngestReconciler, IngestRundown, IngestSegment};
use crate::models::{DeviceId, DeviceType, StudioId};

use super::response::ClientResponse;

pub struct IngestService {
    ctx: CoreContext,
    reconciler: IngestReconciler,
}

impl IngestService {
    pub fn new(ctx: CoreContext) -> Self {
        Self {
            reconciler: IngestReconciler::new(ctx.clone()),
            ctx,
        }
    }

    /// Resolve and verify the pushing device; returns its studio
    async fn authenticate(&self, device_id: &DeviceId, token: &str) -> Result<StudioId> {
        let device = self
            .ctx
            .store
            .devices
            .find_one(device_id)
            .await?
            .ok_or_else(|| not_found(format!("peripheral device {device_id}")))?;
        if device.token != token {
            return Err(precondition("device token mismatch"));
        }
        if device.device_type != DeviceType::Ingest {
            return Err(precondition("device is not an ingest gateway"));
        }
        Ok(device.studio_id)
    }

    pub async fn data_rundown_create(
        &self,
        device_id: &DeviceId,
        token: &str,
        ingest_rundown: IngestRundown,
    ) -> ClientResponse<()> {
        ClientResponse::from_result(
            self.push_rundown(device_id, token, ingest_rundown, "create").await,
        )
    }

    pub async fn data_rundown_update(
        &self,
        device_id: &DeviceId,
        token: &str,
        ingest_rundown: IngestRundown,
    ) -> ClientResponse<()> {
        ClientResponse::from_result(
            self.push_rundown(device_id, token, ingest_rundown, "update").await,
        )
    }

    async fn push_rundown(
        &self,
        device_id: &DeviceId,
        token: &str,
        ingest_rundown: IngestRundown,
        operation: &str,
    ) -> Result<()> {
        let studio_id = self.authenticate(device_id, token).await?;
        crate::logging::log_ingest_operation(
            operation,
            &ingest_rundown.external_id,
            None,
            "received",
            None,
        );
        self.reconciler.handle_rundown_push(&studio_id, ingest_rundown).await
    }

    pub async fn data_rundown_delete(
        &self,
        device_id: &DeviceId,
        token: &str,
        rundown_external_id: &str,
    ) -> ClientResponse<()> {
        ClientResponse::from_result(async {
            let studio_id = self.authenticate(device_id, token).await?;
            self.reconciler
                .handle_rundown_delete(&studio_id, rundown_external_id)
                .await
        }.await)
    }

    pub async fn data_segment_create(
        &self,
        device_id: &DeviceId,
        token: &str,
        rundown_external_id: &str,
        ingest_segment: IngestSegment,
    ) -> ClientResponse<()> {
        self.data_segment_update(device_id, token, rundown_external_id, ingest_segment)
            .await
    }

    pub async fn data_segment_update(
        &self,
        device_id: &DeviceId,
        token: &str,
        rundown_external_id: &str,
        ingest_segment: IngestSegment,
    ) -> ClientResponse<()> {
        ClientResponse::from_result(async {
            let studio_id = self.authenticate(device_id, token).await?;
            crate::logging::log_ingest_operation(
                "segment_update",
                rundown_external_id,
                Some(&ingest_segment.external_id),
                "received",
                None,
            );
            self.reconciler
                .handle_segment_push(&studio_id, rundown_external_id, ingest_segment)
                .await
        }.await)
    }

    pub async fn data_segment_delete(
        &self,
        device_id: &DeviceId,
        token: &str,
        rundown_external_id: &str,
        segment_external_id: &str,
    ) -> ClientResponse<()> {
        ClientResponse::from_result(async {
            let studio_id = self.authenticate(device_id, token).await?;
            self.reconciler
                .handle_segment_delete(&studio_id, rundown_external_id, segment_external_id)
                .await
        }.await)
    }

    pub async fn data_segment_ranks_update(
        &self,
        device_id: &DeviceId,
        token: &str,
        rundown_external_id: &str,
        new_ranks: HashMap<String, f64>,
    ) -> ClientResponse<()> {
        ClientResponse::from_result(async {
            let studio_id = self.authenticate(device_id, token).await?;
            self.reconciler
                .handle_segment_ranks_update(&studio_id, rundown_external_id, new_ranks)
                .await
        }.await)
    }

    pub async fn data_part_create(
        &self,
        device_id: &DeviceId,
        token: &str,
        rundown_external_id: &str,
        segment_external_id: &str,
        ingest_part: IngestPart,
    ) -> ClientResponse<()> {
        self.data_part_update(
            device_id,
            token,
            rundown_external_id,
            segment_external_id,
            ingest_part,
        )
        .await
    }

    pub async fn data_part_update(
        &self,
        device_id: &DeviceId,
        token: &str,
        rundown_external_id: &str,
        segment_external_id: &str,
        ingest_part: IngestPart,
    ) -> ClientResponse<()> {
        ClientResponse::from_result(async {
            let studio_id = self.authenticate(device_id, token).await?;
            self.reconciler
                .handle_part_push(&studio_id, rundown_external_id, segment_external_id, ingest_part)
                .await
        }.await)
    }

    pub async fn data_part_delete(
        &self,
        device_id: &DeviceId,
        token: &str,
        rundown_external_id: &str,
        segment_external_id: &str,
        part_external_id: &str,
    ) -> ClientResponse<()> {
        ClientResponse::from_result(async {
            let studio_id = self.authenticate(device_id, token).await?;
            self.reconciler
                .handle_part_delete(
                    &studio_id,
                    rundown_external_id,
                    segment_external_id,
                    part_external_id,
                )
                .await
        }.await)
    }

    /// Operator-initiated resync of a frozen rundown
    pub async fn resync_rundown(
        &self,
        device_id: &DeviceId,
        token: &str,
        rundown_external_id: &str,
    ) -> ClientResponse<()> {
        ClientResponse::from_result(async {
            let studio_id = self.authenticate(device_id, token).await?;
            self.reconciler
                .resync_rundown(&studio_id, rundown_external_id)
                .await
        }.await)
    }

    /// Operator-initiated resync of a frozen segment
    pub async fn resync_segment(
        &self,
        device_id: &DeviceId,
        token: &str,
        rundown_external_id: &str,
        segment_external_id: &str,
    ) -> ClientResponse<()> {
        ClientResponse::from_result(async {
            let studio_id = self.authenticate(device_id, token).await?;
            self.reconciler
                .resync_segment(&studio_id, rundown_external_id, segment_external_id)
                .await
        }.await)
    }
}
