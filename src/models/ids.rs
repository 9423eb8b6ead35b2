//! # Document Identifiers
//!
//! Newtype ids for every document kind. Ingest-sourced documents derive their
//! id as a stable SHA-256 hash of `studioId + externalId`, so repeated pushes
//! of the same external entity resolve to the same internal document.
//! Instance documents get random ids.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::constants::DERIVED_ID_LENGTH;

/// Stable internal id for an externally-keyed document
pub fn derive_id(studio_id: &StudioId, external_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(studio_id.as_str().as_bytes());
    hasher.update(b"_");
    hasher.update(external_id.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..DERIVED_ID_LENGTH].to_string()
}

macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Random id for documents with no external identity
            pub fn random() -> Self {
                Self(uuid::Uuid::new_v4().simple().to_string())
            }

            /// Stable id derived from studio and external id
            pub fn derived(studio_id: &StudioId, external_id: &str) -> Self {
                Self(derive_id(studio_id, external_id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

document_id!(StudioId);
document_id!(PlaylistId);
document_id!(RundownId);
document_id!(SegmentId);
document_id!(PartId);
document_id!(PieceId);
document_id!(PartInstanceId);
document_id!(PieceInstanceId);
document_id!(AdLibPieceId);
document_id!(AdLibActionId);
document_id!(BucketAdLibId);
document_id!(DeviceId);
document_id!(CommandId);
document_id!(
    /// Shared by every PieceInstance that continues the same infinite piece
    InfiniteId
);
