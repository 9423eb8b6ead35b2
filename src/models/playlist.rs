use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{PartInstanceId, PlaylistId, RundownId, StudioId};

/// Hold choreography state, tracked independently of activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    /// No hold in progress
    #[default]
    None,
    /// Hold armed; the next take enters it
    Pending,
    /// Hold running; extended pieces span the current and previous parts
    Active,
    /// Hold finished; extended pieces have been cropped
    Complete,
}

impl HoldState {
    pub fn is_in_hold(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

impl fmt::Display for HoldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

impl std::str::FromStr for HoldState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "complete" => Ok(Self::Complete),
            _ => Err(format!("Invalid hold state: {s}")),
        }
    }
}

/// Aggregate root: the ordered group of rundowns currently loaded for
/// broadcast, plus the live playhead pointers.
///
/// Created and updated by ingest; the playout pointers (`current`/`next`/
/// `previous`, `hold_state`, activation flags) are mutated only by the
/// playout state machine. Removed when its last rundown is removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RundownPlaylist {
    pub id: PlaylistId,
    pub external_id: String,
    pub studio_id: StudioId,
    pub name: String,

    pub active: bool,
    pub rehearsal: bool,
    pub hold_state: HoldState,

    pub current_part_instance_id: Option<PartInstanceId>,
    pub next_part_instance_id: Option<PartInstanceId>,
    pub previous_part_instance_id: Option<PartInstanceId>,
    /// Playback offset into the next part, set alongside set-next
    pub next_time_offset: Option<i64>,

    /// Rundown membership in display order
    pub rundown_ids_in_order: Vec<RundownId>,

    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl RundownPlaylist {
    /// A playlist consuming its studio for broadcast (rehearsal counts)
    pub fn is_active(&self) -> bool {
        self.active
    }
}
