//! # Data Model
//!
//! Plain serde value structs for every document the engine owns. Documents
//! are immutable values passed by clone; derived views are produced by free
//! functions, never by subclassing or lazy store calls.

pub mod adlib;
pub mod device;
pub mod ids;
pub mod note;
pub mod part;
pub mod part_instance;
pub mod piece;
pub mod piece_instance;
pub mod playlist;
pub mod rundown;
pub mod segment;

pub use adlib::{AdLibAction, AdLibPiece, BucketAdLib};
pub use device::{DeviceCommand, DeviceType, ExpectedPlayoutItem, PeripheralDevice};
pub use ids::{
    derive_id, AdLibActionId, AdLibPieceId, BucketAdLibId, CommandId, DeviceId, InfiniteId,
    PartId, PartInstanceId, PieceId, PieceInstanceId, PlaylistId, RundownId, SegmentId, StudioId,
};
pub use note::{Note, NoteOrigin, NoteSeverity};
pub use part::Part;
pub use part_instance::{PartInstance, PartInstanceTimings};
pub use piece::{Piece, PieceEnable, PieceLifespan};
pub use piece_instance::{PieceInstance, PieceInstanceInfinite, PieceUserDuration};
pub use playlist::{HoldState, RundownPlaylist};
pub use rundown::Rundown;
pub use segment::{Segment, SegmentUnsyncedReason};
