//! # Document Store
//!
//! The reactive, queryable store holding all entities. In the deployed
//! product this is an external collaborator; the engine only relies on the
//! interface here: typed collections with `find/insert/update/remove` and
//! per-collection change subscription. The in-memory implementation is the
//! single shared mutable resource of the process; everything else is
//! per-operation local state.

pub mod collection;

pub use collection::{Collection, DocChange, DocChangeKind};

use crate::models::{
    AdLibAction, AdLibPiece, BucketAdLib, DeviceCommand, ExpectedPlayoutItem, Part, PartInstance,
    PeripheralDevice, Piece, PieceInstance, Rundown, RundownPlaylist, Segment,
};

/// A document the store can hold: cloneable value with a stable id and a
/// collection name for change notifications.
pub trait DocEntity: std::fmt::Debug + Clone + PartialEq + Send + Sync + 'static {
    type Id: std::fmt::Debug
        + Clone
        + Eq
        + std::hash::Hash
        + Ord
        + std::fmt::Display
        + Send
        + Sync
        + 'static;

    const COLLECTION: &'static str;

    fn doc_id(&self) -> Self::Id;
}

macro_rules! doc_entity {
    ($ty:ty, $id:ty, $collection:literal) => {
        impl DocEntity for $ty {
            type Id = $id;
            const COLLECTION: &'static str = $collection;

            fn doc_id(&self) -> Self::Id {
                self.id.clone()
            }
        }
    };
}

doc_entity!(RundownPlaylist, crate::models::PlaylistId, "rundownPlaylists");
doc_entity!(Rundown, crate::models::RundownId, "rundowns");
doc_entity!(Segment, crate::models::SegmentId, "segments");
doc_entity!(Part, crate::models::PartId, "parts");
doc_entity!(Piece, crate::models::PieceId, "pieces");
doc_entity!(PartInstance, crate::models::PartInstanceId, "partInstances");
doc_entity!(PieceInstance, crate::models::PieceInstanceId, "pieceInstances");
doc_entity!(AdLibPiece, crate::models::AdLibPieceId, "adLibPieces");
doc_entity!(AdLibAction, crate::models::AdLibActionId, "adLibActions");
doc_entity!(BucketAdLib, crate::models::BucketAdLibId, "bucketAdLibs");
doc_entity!(PeripheralDevice, crate::models::DeviceId, "peripheralDevices");
doc_entity!(DeviceCommand, crate::models::CommandId, "deviceCommands");
doc_entity!(ExpectedPlayoutItem, String, "expectedPlayoutItems");

/// The full set of collections. Cheap to clone; all clones share state.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    pub playlists: Collection<RundownPlaylist>,
    pub rundowns: Collection<Rundown>,
    pub segments: Collection<Segment>,
    pub parts: Collection<Part>,
    pub pieces: Collection<Piece>,
    pub part_instances: Collection<PartInstance>,
    pub piece_instances: Collection<PieceInstance>,
    pub adlib_pieces: Collection<AdLibPiece>,
    pub adlib_actions: Collection<AdLibAction>,
    pub bucket_adlibs: Collection<BucketAdLib>,
    pub expected_playout_items: Collection<ExpectedPlayoutItem>,
    pub devices: Collection<PeripheralDevice>,
    pub device_commands: Collection<DeviceCommand>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}
