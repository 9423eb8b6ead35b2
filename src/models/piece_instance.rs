use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{InfiniteId, PartInstanceId, PieceId, PieceInstanceId, RundownId};
use super::piece::Piece;

/// Continuation descriptor shared by every instance of the same infinite.
/// `infinite_instance_id` is minted when the infinite first starts (or when a
/// hold extends a piece) and copied onto each continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceInstanceInfinite {
    pub infinite_instance_id: InfiniteId,
    pub infinite_piece_id: PieceId,
    /// This instance continues a piece that started in an earlier part
    #[serde(default)]
    pub from_previous_part: bool,
    /// This instance exists because a hold extended the piece
    #[serde(default)]
    pub from_hold: bool,
}

/// Manual truncation: the piece must be off air at `end`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceUserDuration {
    pub end: DateTime<Utc>,
}

/// One playback occurrence of a piece within one part instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceInstance {
    pub id: PieceInstanceId,
    pub rundown_id: RundownId,
    pub part_instance_id: PartInstanceId,
    /// Snapshot of the piece (or materialized ad-lib) at instantiation time
    pub piece: Piece,

    /// Originating ad-lib template, when operator-triggered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adlib_source_id: Option<String>,
    #[serde(default)]
    pub dynamically_inserted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_playback: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_playback: Option<DateTime<Utc>>,

    /// Manual truncation, set by stop-piece operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_duration: Option<PieceUserDuration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub infinite: Option<PieceInstanceInfinite>,

    #[serde(default)]
    pub reset: bool,
}

impl PieceInstance {
    pub fn from_piece(
        piece: Piece,
        part_instance_id: PartInstanceId,
    ) -> Self {
        Self {
            id: PieceInstanceId::random(),
            rundown_id: piece.rundown_id.clone(),
            part_instance_id,
            piece,
            adlib_source_id: None,
            dynamically_inserted: false,
            started_playback: None,
            stopped_playback: None,
            user_duration: None,
            infinite: None,
            reset: false,
        }
    }

    /// Still on air: playback started and no stop/truncation applies yet
    pub fn is_unresolved_at(&self, now: DateTime<Utc>) -> bool {
        if self.stopped_playback.is_some() {
            return false;
        }
        if let Some(user_duration) = &self.user_duration {
            if user_duration.end <= now {
                return false;
            }
        }
        true
    }

    /// The piece's resolved on-air start, relative to its part instance
    pub fn resolved_start(&self, part_started: DateTime<Utc>) -> DateTime<Utc> {
        self.started_playback.unwrap_or_else(|| {
            part_started + chrono::Duration::milliseconds(self.piece.enable.start_ms as i64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ids::PartId;
    use crate::models::piece::{PieceEnable, PieceLifespan};
    use serde_json::json;

    fn piece() -> Piece {
        Piece {
            id: PieceId::new("piece0"),
            rundown_id: RundownId::new("rd0"),
            start_part_id: PartId::new("part0"),
            external_id: "piece0".into(),
            name: "Lower third".into(),
            source_layer_id: "gfx0".into(),
            output_layer_id: "pgm".into(),
            enable: PieceEnable {
                start_ms: 500,
                duration_ms: None,
            },
            lifespan: PieceLifespan::WithinPart,
            extend_on_hold: false,
            is_virtual: false,
            content: json!({"fileName": "lower-third.mov"}),
        }
    }

    #[test]
    fn test_unresolved_until_stopped() {
        let now = Utc::now();
        let mut inst = PieceInstance::from_piece(piece(), PartInstanceId::random());
        inst.started_playback = Some(now - chrono::Duration::seconds(2));
        assert!(inst.is_unresolved_at(now));

        inst.user_duration = Some(PieceUserDuration { end: now });
        assert!(!inst.is_unresolved_at(now));

        inst.user_duration = None;
        inst.stopped_playback = Some(now);
        assert!(!inst.is_unresolved_at(now));
    }

    #[test]
    fn test_resolved_start_prefers_reported_playback() {
        let part_started = Utc::now();
        let mut inst = PieceInstance::from_piece(piece(), PartInstanceId::random());
        let expected = part_started + chrono::Duration::milliseconds(500);
        assert_eq!(inst.resolved_start(part_started), expected);

        let reported = part_started + chrono::Duration::milliseconds(730);
        inst.started_playback = Some(reported);
        assert_eq!(inst.resolved_start(part_started), reported);
    }
}
