//! # Ingest Reconciliation
//!
//! Turns an externally pushed story tree into a minimal, rank-stable set of
//! document changes against the cached playlist state. Changes that are
//! unsafe while on air never fail the broadcast: they degrade into an
//! `unsynced` marking on the affected segment or rundown plus a persisted
//! note, and every other change applies normally.

pub mod blueprint;
pub mod diff;
pub mod ranks;
pub mod reconciler;
pub mod types;

pub use blueprint::{
    BlueprintAdLibAction, BlueprintAdLibPiece, BlueprintPart, BlueprintPiece,
    BlueprintResultPart, BlueprintResultSegment, IngestMaterializeContext, PassthroughShowStyle,
    ShowStyle,
};
pub use diff::{diff_documents, PreparedChanges};
pub use reconciler::IngestReconciler;
pub use types::{IngestPart, IngestRundown, IngestSegment};
