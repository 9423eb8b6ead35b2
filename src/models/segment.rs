use serde::{Deserialize, Serialize};

use super::ids::{RundownId, SegmentId};
use super::note::Note;

/// Why a segment was frozen against ingest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentUnsyncedReason {
    /// The newsroom system removed the segment while it was unsafe to drop
    Removed,
    /// The newsroom system changed the segment while it was unsafe to apply
    Changed,
}

/// Ordered grouping of parts within a rundown. `rank` is a float and not
/// necessarily contiguous; ordering is by rank only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub rundown_id: RundownId,
    pub external_id: String,
    pub name: String,
    #[serde(rename = "_rank")]
    pub rank: f64,

    /// Present while the segment is frozen against ingest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsynced: Option<SegmentUnsyncedReason>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
}

impl Segment {
    pub fn is_unsynced(&self) -> bool {
        self.unsynced.is_some()
    }
}
