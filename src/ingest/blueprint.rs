//! # Show-Style Blueprint Seam
//!
//! The installed show style materializes newsroom payloads into playable
//! documents and owns the continuity decisions around takes. The engine
//! never interprets payloads itself.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{
    Note, Part, PartInstance, PieceEnable, PieceInstance, PieceLifespan, RundownId, SegmentId,
    StudioId,
};

use super::types::IngestSegment;

/// Ids resolved by the reconciler before materialization
#[derive(Debug, Clone)]
pub struct IngestMaterializeContext {
    pub studio_id: StudioId,
    pub rundown_id: RundownId,
    pub segment_id: SegmentId,
    pub segment_external_id: String,
}

/// Part fields the blueprint decides
#[derive(Debug, Clone, Default)]
pub struct BlueprintPart {
    pub name: String,
    pub expected_duration_ms: Option<u64>,
    pub autonext: bool,
    pub in_transition_duration_ms: Option<u64>,
    pub floated: bool,
    pub invalid: bool,
}

/// Piece fields the blueprint decides
#[derive(Debug, Clone)]
pub struct BlueprintPiece {
    pub external_id: String,
    pub name: String,
    pub source_layer_id: String,
    pub output_layer_id: String,
    pub enable: PieceEnable,
    pub lifespan: PieceLifespan,
    pub extend_on_hold: bool,
    pub content: Value,
}

/// Ad-lib piece template fields the blueprint decides
#[derive(Debug, Clone)]
pub struct BlueprintAdLibPiece {
    pub external_id: String,
    pub name: String,
    pub rank: f64,
    pub source_layer_id: String,
    pub output_layer_id: String,
    pub lifespan: PieceLifespan,
    pub expected_duration_ms: Option<u64>,
    pub to_be_queued: bool,
    pub content: Value,
}

/// Ad-lib action template fields the blueprint decides
#[derive(Debug, Clone)]
pub struct BlueprintAdLibAction {
    pub external_id: String,
    pub action_id: String,
    pub display_name: String,
    pub user_data: Value,
}

/// One materialized part with its playable content
#[derive(Debug, Clone)]
pub struct BlueprintResultPart {
    pub external_id: String,
    pub part: BlueprintPart,
    pub pieces: Vec<BlueprintPiece>,
    pub adlib_pieces: Vec<BlueprintAdLibPiece>,
    pub adlib_actions: Vec<BlueprintAdLibAction>,
}

/// One materialized segment, plus any notes the blueprint raised against it
#[derive(Debug, Clone)]
pub struct BlueprintResultSegment {
    pub name: String,
    pub parts: Vec<BlueprintResultPart>,
    pub notes: Vec<Note>,
}

/// The installed show style
#[async_trait]
pub trait ShowStyle: Send + Sync {
    /// Materialize one pushed segment into playable documents. Warnings and
    /// errors go into the result's notes, not into the error channel;
    /// returning an error fails the whole ingest call.
    fn materialize_segment(
        &self,
        context: &IngestMaterializeContext,
        segment: &IngestSegment,
    ) -> Result<BlueprintResultSegment>;

    /// Sync an ingest change into an already-instantiated part instance
    /// without losing its playback state. Returns whether the change was
    /// applied; `false` leaves the instance on its old content.
    fn sync_ingest_to_part_instance(&self, instance: &mut PartInstance, new_part: &Part) -> bool {
        let timings = instance.timings.clone();
        let is_taken = instance.is_taken;
        instance.part = new_part.clone();
        instance.timings = timings;
        instance.is_taken = is_taken;
        true
    }

    /// End state of the outgoing part's resolved pieces, captured at take
    /// for continuity decisions on the incoming part
    fn get_part_end_state(
        &self,
        outgoing: &PartInstance,
        resolved_pieces: &[PieceInstance],
    ) -> Value {
        serde_json::json!({
            "partId": outgoing.part.id.as_str(),
            "pieceCount": resolved_pieces.len(),
        })
    }

    /// Best-effort hook before the take mutates anything
    async fn on_pre_take(&self, _taken: &PartInstance) -> Result<()> {
        Ok(())
    }

    /// Best-effort hook after a committed take; errors are logged and swallowed
    async fn on_take(&self, _taken: &PartInstance) -> Result<()> {
        Ok(())
    }

    /// Best-effort hook after the first committed take of an activation
    async fn on_first_take(&self, _taken: &PartInstance) -> Result<()> {
        Ok(())
    }
}

/// Default show style: maps payload fields straight through.
///
/// A part payload may carry `pieces` (array of piece specs), plus
/// `expectedDuration`, `autonext`, `float`, and `adLibs`. Parts without a
/// payload get one full-part piece on the `default` source layer so every
/// part stays playable.
#[derive(Debug, Default)]
pub struct PassthroughShowStyle;

impl PassthroughShowStyle {
    fn lifespan_from(value: Option<&Value>) -> PieceLifespan {
        match value.and_then(Value::as_str) {
            Some("out_on_segment_change") => PieceLifespan::OutOnSegmentChange,
            Some("out_on_segment_end") => PieceLifespan::OutOnSegmentEnd,
            Some("out_on_rundown_change") => PieceLifespan::OutOnRundownChange,
            Some("out_on_rundown_end") => PieceLifespan::OutOnRundownEnd,
            _ => PieceLifespan::WithinPart,
        }
    }

    fn pieces_from_payload(part_external_id: &str, payload: &Value) -> Vec<BlueprintPiece> {
        let Some(specs) = payload.get("pieces").and_then(Value::as_array) else {
            return Vec::new();
        };
        specs
            .iter()
            .enumerate()
            .map(|(idx, spec)| BlueprintPiece {
                external_id: spec
                    .get("externalId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{part_external_id}_piece{idx}")),
                name: spec
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("piece")
                    .to_string(),
                source_layer_id: spec
                    .get("sourceLayerId")
                    .and_then(Value::as_str)
                    .unwrap_or("default")
                    .to_string(),
                output_layer_id: spec
                    .get("outputLayerId")
                    .and_then(Value::as_str)
                    .unwrap_or("pgm")
                    .to_string(),
                enable: PieceEnable {
                    start_ms: spec.get("startMs").and_then(Value::as_u64).unwrap_or(0),
                    duration_ms: spec.get("durationMs").and_then(Value::as_u64),
                },
                lifespan: Self::lifespan_from(spec.get("lifespan")),
                extend_on_hold: spec
                    .get("extendOnHold")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                content: spec.get("content").cloned().unwrap_or(Value::Null),
            })
            .collect()
    }

    fn adlibs_from_payload(part_external_id: &str, payload: &Value) -> Vec<BlueprintAdLibPiece> {
        let Some(specs) = payload.get("adLibs").and_then(Value::as_array) else {
            return Vec::new();
        };
        specs
            .iter()
            .enumerate()
            .map(|(idx, spec)| BlueprintAdLibPiece {
                external_id: spec
                    .get("externalId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{part_external_id}_adlib{idx}")),
                name: spec
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("ad-lib")
                    .to_string(),
                rank: idx as f64,
                source_layer_id: spec
                    .get("sourceLayerId")
                    .and_then(Value::as_str)
                    .unwrap_or("default")
                    .to_string(),
                output_layer_id: spec
                    .get("outputLayerId")
                    .and_then(Value::as_str)
                    .unwrap_or("pgm")
                    .to_string(),
                lifespan: Self::lifespan_from(spec.get("lifespan")),
                expected_duration_ms: spec.get("durationMs").and_then(Value::as_u64),
                to_be_queued: spec
                    .get("toBeQueued")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                content: spec.get("content").cloned().unwrap_or(Value::Null),
            })
            .collect()
    }
}

#[async_trait]
impl ShowStyle for PassthroughShowStyle {
    fn materialize_segment(
        &self,
        _context: &IngestMaterializeContext,
        segment: &IngestSegment,
    ) -> Result<BlueprintResultSegment> {
        let mut parts = Vec::with_capacity(segment.parts.len());
        for ingest_part in segment.ordered_parts() {
            let payload = ingest_part.payload.clone().unwrap_or(Value::Null);
            let mut pieces = Self::pieces_from_payload(&ingest_part.external_id, &payload);
            if pieces.is_empty() {
                pieces.push(BlueprintPiece {
                    external_id: format!("{}_piece0", ingest_part.external_id),
                    name: ingest_part.name.clone(),
                    source_layer_id: "default".into(),
                    output_layer_id: "pgm".into(),
                    enable: PieceEnable::default(),
                    lifespan: PieceLifespan::WithinPart,
                    extend_on_hold: false,
                    content: Value::Null,
                });
            }

            parts.push(BlueprintResultPart {
                external_id: ingest_part.external_id.clone(),
                part: BlueprintPart {
                    name: ingest_part.name.clone(),
                    expected_duration_ms: payload
                        .get("expectedDuration")
                        .and_then(Value::as_u64),
                    autonext: payload
                        .get("autonext")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    in_transition_duration_ms: payload
                        .get("inTransitionDuration")
                        .and_then(Value::as_u64),
                    floated: payload.get("float").and_then(Value::as_bool).unwrap_or(false),
                    invalid: false,
                },
                pieces,
                adlib_pieces: Self::adlibs_from_payload(&ingest_part.external_id, &payload),
                adlib_actions: Vec::new(),
            });
        }

        Ok(BlueprintResultSegment {
            name: segment.name.clone(),
            parts,
            notes: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::IngestPart;
    use serde_json::json;

    fn context() -> IngestMaterializeContext {
        IngestMaterializeContext {
            studio_id: StudioId::new("studio0"),
            rundown_id: RundownId::new("rd0"),
            segment_id: SegmentId::new("seg0"),
            segment_external_id: "segment0".into(),
        }
    }

    #[test]
    fn test_part_without_payload_gets_default_piece() {
        let segment = IngestSegment {
            external_id: "segment0".into(),
            name: "Opening".into(),
            rank: 0.0,
            parts: vec![IngestPart {
                external_id: "part0".into(),
                name: "Hello".into(),
                rank: 0.0,
                payload: None,
            }],
            payload: None,
        };
        let result = PassthroughShowStyle
            .materialize_segment(&context(), &segment)
            .unwrap();
        assert_eq!(result.parts.len(), 1);
        assert_eq!(result.parts[0].pieces.len(), 1);
        assert_eq!(result.parts[0].pieces[0].source_layer_id, "default");
    }

    #[test]
    fn test_payload_pieces_pass_through() {
        let segment = IngestSegment {
            external_id: "segment0".into(),
            name: "Opening".into(),
            rank: 0.0,
            parts: vec![IngestPart {
                external_id: "part0".into(),
                name: "Hello".into(),
                rank: 0.0,
                payload: Some(json!({
                    "expectedDuration": 4000,
                    "autonext": true,
                    "pieces": [{
                        "name": "clip",
                        "sourceLayerId": "vt0",
                        "lifespan": "out_on_segment_end",
                        "extendOnHold": true,
                        "content": {"fileName": "clip.mov"}
                    }]
                })),
            }],
            payload: None,
        };
        let result = PassthroughShowStyle
            .materialize_segment(&context(), &segment)
            .unwrap();
        let part = &result.parts[0];
        assert_eq!(part.part.expected_duration_ms, Some(4000));
        assert!(part.part.autonext);
        assert_eq!(part.pieces.len(), 1);
        assert_eq!(part.pieces[0].lifespan, PieceLifespan::OutOnSegmentEnd);
        assert!(part.pieces[0].extend_on_hold);
        assert_eq!(part.pieces[0].content["fileName"], "clip.mov");
    }

    #[test]
    fn test_sync_preserves_playback_state() {
        use crate::models::PartId;

        let part_old = Part {
            id: PartId::new("part0"),
            rundown_id: RundownId::new("rd0"),
            segment_id: SegmentId::new("seg0"),
            external_id: "part0".into(),
            name: "Old name".into(),
            rank: 0.0,
            expected_duration_ms: None,
            autonext: false,
            in_transition_duration_ms: None,
            floated: false,
            invalid: false,
            dynamically_inserted_after_part_id: None,
            notes: Vec::new(),
        };
        let mut part_new = part_old.clone();
        part_new.name = "New name".into();

        let mut instance = PartInstance::new(
            RundownId::new("rd0"),
            SegmentId::new("seg0"),
            part_old,
            1,
            false,
        );
        instance.is_taken = true;
        instance.timings.started_playback = Some(chrono::Utc::now());

        assert!(PassthroughShowStyle.sync_ingest_to_part_instance(&mut instance, &part_new));
        assert_eq!(instance.part.name, "New name");
        assert!(instance.is_taken);
        assert!(instance.timings.started_playback.is_some());
    }
}
