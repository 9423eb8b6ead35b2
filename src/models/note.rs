use serde::{Deserialize, Serialize};

/// Severity of a persisted ingest note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteSeverity {
    Warning,
    Error,
}

/// What the note was raised against, in external-id terms so the UI layer
/// can link back to the newsroom entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteOrigin {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_external_id: Option<String>,
}

/// A warning or error raised by the blueprint during ingest, persisted on the
/// Segment or Part it references. Degraded-apply unsync markings also leave a
/// note so operators can see why content froze.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub severity: NoteSeverity,
    pub message: String,
    pub origin: NoteOrigin,
}

impl Note {
    pub fn warning(message: impl Into<String>, origin: NoteOrigin) -> Self {
        Self {
            severity: NoteSeverity::Warning,
            message: message.into(),
            origin,
        }
    }

    pub fn error(message: impl Into<String>, origin: NoteOrigin) -> Self {
        Self {
            severity: NoteSeverity::Error,
            message: message.into(),
            origin,
        }
    }
}
