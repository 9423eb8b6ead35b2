//! # Service Layer
//!
//! The two public API surfaces. Every call returns a tagged
//! `ClientResponse`, never a bare value, so clients can tell a domain-level
//! rejection from a transport failure.

pub mod ingest_service;
pub mod playout_service;
pub mod response;

pub use ingest_service::IngestService;
pub use playout_service::PlayoutService;
pub use response::ClientResponse;
