use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PlaylistId, RundownId, StudioId};

/// Externally-sourced show container. `external_id` is the stable key
/// supplied by the newsroom system; everything else is rebuilt on every
/// ingest push. Playout never mutates a rundown beyond the `unsynced` flag
/// and the touch timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rundown {
    pub id: RundownId,
    pub external_id: String,
    pub playlist_id: PlaylistId,
    pub studio_id: StudioId,
    pub name: String,
    /// Source show type reported by the newsroom system
    pub source_type: String,

    /// Frozen against ingest until explicitly resynced
    pub unsynced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsynced_time: Option<DateTime<Utc>>,

    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Rundown {
    pub fn mark_unsynced(&mut self, at: DateTime<Utc>) {
        self.unsynced = true;
        self.unsynced_time = Some(at);
    }

    pub fn resync(&mut self) {
        self.unsynced = false;
        self.unsynced_time = None;
    }
}
