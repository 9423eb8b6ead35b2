use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{PartInstanceId, RundownId, SegmentId};
use super::part::Part;

/// Playback timing marks of one part instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PartInstanceTimings {
    /// When the operator took this part
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take: Option<DateTime<Utc>>,
    /// Offset into the part at which playback begins
    #[serde(default)]
    pub play_offset_ms: i64,
    /// Reported (or self-reported) on-air start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_playback: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_playback: Option<DateTime<Utc>>,
    /// When the take choreography finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_done: Option<DateTime<Utc>>,
}

/// One playback occurrence of a part. Copies its part at take/insert time so
/// later ingest edits never rewrite history; superseded instances are marked
/// `reset`, not deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartInstance {
    pub id: PartInstanceId,
    pub rundown_id: RundownId,
    pub segment_id: SegmentId,
    /// Snapshot of the part at instantiation time
    pub part: Part,

    pub rehearsal: bool,
    /// Position in the take sequence of this activation
    pub take_count: u32,
    #[serde(default)]
    pub is_taken: bool,
    /// Superseded; excluded from the playhead and from ingest sync
    #[serde(default)]
    pub reset: bool,

    pub timings: PartInstanceTimings,

    /// End state of the preceding part's resolved pieces, captured at take
    /// for blueprint continuity decisions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_part_end_state: Option<Value>,
}

impl PartInstance {
    pub fn new(
        rundown_id: RundownId,
        segment_id: SegmentId,
        part: Part,
        take_count: u32,
        rehearsal: bool,
    ) -> Self {
        Self {
            id: PartInstanceId::random(),
            rundown_id,
            segment_id,
            part,
            rehearsal,
            take_count,
            is_taken: false,
            reset: false,
            timings: PartInstanceTimings::default(),
            previous_part_end_state: None,
        }
    }

    /// Elapsed on-air time, if playback has started
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.timings
            .started_playback
            .map(|start| (now - start).num_milliseconds())
    }
}
