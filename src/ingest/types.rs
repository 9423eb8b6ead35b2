use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One cue-able unit as pushed by the newsroom system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestPart {
    pub external_id: String,
    pub name: String,
    pub rank: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// One titled block as pushed by the newsroom system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSegment {
    pub external_id: String,
    pub name: String,
    pub rank: f64,
    #[serde(default)]
    pub parts: Vec<IngestPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// The full story tree for one show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRundown {
    pub external_id: String,
    pub name: String,
    /// Source show type reported by the newsroom system
    #[serde(rename = "type")]
    pub rundown_type: String,
    #[serde(default)]
    pub segments: Vec<IngestSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl IngestSegment {
    /// Parts in pushed rank order
    pub fn ordered_parts(&self) -> Vec<&IngestPart> {
        let mut parts: Vec<&IngestPart> = self.parts.iter().collect();
        parts.sort_by(|a, b| a.rank.partial_cmp(&b.rank).unwrap_or(std::cmp::Ordering::Equal));
        parts
    }
}

impl IngestRundown {
    /// Segments in pushed rank order
    pub fn ordered_segments(&self) -> Vec<&IngestSegment> {
        let mut segments: Vec<&IngestSegment> = self.segments.iter().collect();
        segments
            .sort_by(|a, b| a.rank.partial_cmp(&b.rank).unwrap_or(std::cmp::Ordering::Equal));
        segments
    }
}
