//! # Playout State Machine
//!
//! Take, set-next, hold, and ad-lib operations over part/piece instances.
//! Every operation runs inside the serialization queue against a loaded
//! `PlaylistCache`; a thrown error aborts the whole operation and the cache
//! is discarded unsaved, so no partial on-air state change is ever visible.

pub mod activation;
pub mod adlib;
pub mod guards;
pub mod hold;
pub mod infinites;
pub mod instances;
pub mod selection;
pub mod stop;
pub mod take;

pub use take::TakeResult;
