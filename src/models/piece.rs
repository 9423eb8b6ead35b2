use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{PartId, PieceId, RundownId};

/// How long a piece stays on air relative to part boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PieceLifespan {
    /// Ends with its own part
    #[default]
    WithinPart,
    /// Continues until another part in any segment is taken
    OutOnSegmentChange,
    /// Continues until playback leaves the segment it started in
    OutOnSegmentEnd,
    /// Continues until another rundown's part is taken
    OutOnRundownChange,
    /// Continues until the rundown ends
    OutOnRundownEnd,
}

impl PieceLifespan {
    /// Whether instances of this piece continue into following parts
    pub fn is_infinite(&self) -> bool {
        !matches!(self, Self::WithinPart)
    }

    /// Infinites of these lifespans are cropped with a user duration;
    /// segment/rundown-end lifespans need a virtual terminator instead so
    /// later continuation logic still finds an end marker
    pub fn stopped_by_user_duration(&self) -> bool {
        matches!(
            self,
            Self::WithinPart | Self::OutOnSegmentChange | Self::OutOnRundownChange
        )
    }
}

/// When a piece starts within its part, and for how long it runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PieceEnable {
    /// Offset from the part's started playback, in ms
    pub start_ms: u64,
    /// Planned duration; unset means until lifespan rules end it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// A playable element of a part: one graphic, clip, camera cut, etc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,
    pub rundown_id: RundownId,
    /// The part this piece starts in
    pub start_part_id: PartId,
    pub external_id: String,
    pub name: String,

    pub source_layer_id: String,
    pub output_layer_id: String,
    pub enable: PieceEnable,
    pub lifespan: PieceLifespan,

    /// Survive across a hold by extending into the incoming part
    #[serde(default)]
    pub extend_on_hold: bool,
    /// Zero-content terminator inserted to end an infinite
    #[serde(default)]
    pub is_virtual: bool,

    /// Device-facing payload; file-backed content carries `fileName` and an
    /// optional `seek` offset in ms
    pub content: Value,
}

impl Piece {
    /// Zero-content virtual piece used to terminate an infinite on a layer
    pub fn virtual_terminator(
        rundown_id: RundownId,
        part_id: PartId,
        source_layer_id: &str,
        output_layer_id: &str,
        start_ms: u64,
        lifespan: PieceLifespan,
    ) -> Self {
        Self {
            id: PieceId::random(),
            rundown_id,
            start_part_id: part_id,
            external_id: String::new(),
            name: String::new(),
            source_layer_id: source_layer_id.to_string(),
            output_layer_id: output_layer_id.to_string(),
            enable: PieceEnable {
                start_ms,
                duration_ms: None,
            },
            lifespan,
            extend_on_hold: false,
            is_virtual: true,
            content: Value::Null,
        }
    }
}
