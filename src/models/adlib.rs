use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{AdLibActionId, AdLibPieceId, BucketAdLibId, PartId, RundownId, StudioId};
use super::piece::PieceLifespan;

/// Operator-triggerable piece template. Immutable once ingested. Templates
/// with `part_id` set belong to a segment's part; without it they are
/// rundown baseline ad-libs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdLibPiece {
    pub id: AdLibPieceId,
    pub rundown_id: RundownId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_id: Option<PartId>,
    pub external_id: String,
    pub name: String,
    /// Display order among sibling ad-libs
    #[serde(rename = "_rank")]
    pub rank: f64,

    pub source_layer_id: String,
    pub output_layer_id: String,
    pub lifespan: PieceLifespan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_duration_ms: Option<u64>,
    /// Force queue-as-next-part behavior instead of inserting into current
    #[serde(default)]
    pub to_be_queued: bool,
    #[serde(default)]
    pub invalid: bool,

    pub content: Value,
}

/// Operator-triggerable blueprint action template; executed by the installed
/// show style, not by the core directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdLibAction {
    pub id: AdLibActionId,
    pub rundown_id: RundownId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_id: Option<PartId>,
    pub external_id: String,
    /// Action identifier understood by the show style
    pub action_id: String,
    pub display_name: String,
    pub user_data: Value,
}

/// Studio-scoped ad-lib living in an operator bucket rather than a rundown;
/// the only ad-lib kind that accepts user edits after ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketAdLib {
    pub id: BucketAdLibId,
    pub bucket_id: String,
    pub studio_id: StudioId,
    pub external_id: String,
    pub name: String,

    pub source_layer_id: String,
    pub output_layer_id: String,
    pub lifespan: PieceLifespan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_duration_ms: Option<u64>,
    #[serde(default)]
    pub to_be_queued: bool,

    pub content: Value,
}
