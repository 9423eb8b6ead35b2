use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{CommandId, DeviceId, PieceId, RundownId, StudioId};

/// Kind of gateway a peripheral device represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Newsroom ingest gateway pushing story trees
    Ingest,
    /// Studio playout gateway consuming timelines and reporting playback
    Playout,
}

/// A registered gateway identity. Ingest pushes authenticate against the
/// stored token; playout command records are addressed to a device id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeripheralDevice {
    pub id: DeviceId,
    pub token: String,
    pub studio_id: StudioId,
    pub name: String,
    pub device_type: DeviceType,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Persisted request/reply record for the outbound device command channel.
/// Observed until `has_reply` or a fixed timeout elapses, then deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub id: CommandId,
    pub device_id: DeviceId,
    pub function_name: String,
    pub args: Vec<Value>,
    #[serde(default)]
    pub has_reply: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_error: Option<String>,
    pub time: DateTime<Utc>,
}

impl DeviceCommand {
    pub fn new(device_id: DeviceId, function_name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: CommandId::random(),
            device_id,
            function_name: function_name.into(),
            args,
            has_reply: false,
            reply: None,
            reply_error: None,
            time: Utc::now(),
        }
    }
}

/// Derived media reference pushed toward device gateways so they can preload
/// content. Recomputed per rundown after every ingest apply; never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedPlayoutItem {
    pub id: String,
    pub rundown_id: RundownId,
    pub piece_id: PieceId,
    pub content: Value,
}
