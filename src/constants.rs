//! # System Constants
//!
//! Core constants and enums that define the operational boundaries of the
//! rundown automation core: queue priorities, rank arithmetic, and the
//! well-known event names emitted on committed flushes.

use serde::{Deserialize, Serialize};

/// Core system events published on the process-local event bus
pub mod events {
    // Ingest lifecycle events
    pub const INGEST_RUNDOWN_UPDATED: &str = "ingest.rundown_updated";
    pub const INGEST_RUNDOWN_REMOVED: &str = "ingest.rundown_removed";
    pub const INGEST_SEGMENT_UNSYNCED: &str = "ingest.segment_unsynced";
    pub const INGEST_RUNDOWN_UNSYNCED: &str = "ingest.rundown_unsynced";

    // Playout lifecycle events
    pub const PLAYOUT_ACTIVATED: &str = "playout.activated";
    pub const PLAYOUT_DEACTIVATED: &str = "playout.deactivated";
    pub const PLAYOUT_TAKE: &str = "playout.take";
    pub const PLAYOUT_NEXT_CHANGED: &str = "playout.next_changed";
    pub const PLAYOUT_HOLD_CHANGED: &str = "playout.hold_changed";
    pub const PLAYOUT_TIMELINE_REQUESTED: &str = "playout.timeline_requested";
}

/// Priority classes for the per-playlist serialization queue.
///
/// Lower numeric value runs first when multiple callers are waiting on the
/// same playlist. An already-running operation is never preempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePriority {
    /// Pushes from the external newsroom system
    Ingest,
    /// User-initiated ingest actions (resync, manual reload)
    UserIngest,
    /// Operator playout actions (take, next, ad-lib)
    UserPlayout,
    /// Playback-state callbacks from device gateways
    DeviceCallback,
}

impl QueuePriority {
    /// Numeric ordering key; lower runs first
    pub fn order(self) -> u8 {
        match self {
            Self::Ingest => 10,
            Self::UserIngest => 20,
            Self::UserPlayout => 30,
            Self::DeviceCallback => 40,
        }
    }
}

impl Default for QueuePriority {
    fn default() -> Self {
        Self::UserPlayout
    }
}

/// Rank arithmetic for sparse float ordering.
pub mod ranks {
    /// Epsilon step used when interpolating an unsynced segment between its
    /// surviving neighbors.
    pub const UNSYNCED_RANK_EPSILON: f64 = 1e-6;

    /// Rank assigned to an unsynced segment once every neighbor before it is
    /// gone; sorts before any real rank.
    pub const MINIMUM_RANK: f64 = f64::MIN;

    /// Step between a part and a dynamically inserted (ad-libbed) part
    /// queued directly after it.
    pub const QUEUED_PART_RANK_STEP: f64 = 0.5;
}

/// Truncated hex length for ids derived from external identity
pub const DERIVED_ID_LENGTH: usize = 17;

/// Default capacity of the committed-change broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
