use serde::{Deserialize, Serialize};

use super::ids::{PartId, RundownId, SegmentId};
use super::note::Note;

/// A schedulable unit of a segment: one cue-able block of the show.
///
/// Ingest-sourced parts carry the newsroom external id; ad-libbed/queued
/// parts instead carry `dynamically_inserted_after_part_id` and survive only
/// as long as their instances do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub rundown_id: RundownId,
    pub segment_id: SegmentId,
    pub external_id: String,
    pub name: String,
    #[serde(rename = "_rank")]
    pub rank: f64,

    /// Expected on-air duration, used for auto-next scheduling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_duration_ms: Option<u64>,
    /// Advance to the next part automatically when the expected duration elapses
    #[serde(default)]
    pub autonext: bool,
    /// Duration of the in-transition from the previous part; takes are
    /// rejected while it is still running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_transition_duration_ms: Option<u64>,

    /// Excluded from playback until un-floated by ingest
    #[serde(default)]
    pub floated: bool,
    /// Failed blueprint materialization; never playable
    #[serde(default)]
    pub invalid: bool,

    /// Set on ad-lib/queued parts; marks the part as operator-inserted
    /// rather than ingest-sourced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamically_inserted_after_part_id: Option<PartId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
}

impl Part {
    /// Whether this part may be selected as next / taken
    pub fn is_playable(&self) -> bool {
        !self.floated && !self.invalid
    }

    pub fn is_dynamically_inserted(&self) -> bool {
        self.dynamically_inserted_after_part_id.is_some()
    }
}
