#![allow(clippy::doc_markdown)] // Allow technical terms like PieceInstance in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Rundown Core
//!
//! Rust core of a broadcast rundown automation engine: it keeps an
//! authoritative, continuously-updated model of a running show synchronized
//! against an external newsroom system while simultaneously driving live
//! on-air playout, over one shared mutable aggregate per show.
//!
//! ## Architecture
//!
//! Three pieces define the consistency, ordering, and partial-failure
//! guarantees of the whole product:
//!
//! - **[`queue`]** — at most one in-flight operation per playlist id,
//!   admitted by priority (ingest < user-ingest < user-playout <
//!   device-callback), fully concurrent across playlists.
//! - **[`cache`]** — a per-operation unit of work that snapshots one
//!   playlist and everything it owns, buffers every mutation, and flushes
//!   deltas collection-by-collection in a fixed dependency order.
//! - **[`ingest`]** and **[`playout`]** — the reconciliation algorithm
//!   (diff, degrade-to-unsync, rank preservation) and the take/hold/ad-lib
//!   state machine (pointer choreography, infinite-piece continuity).
//!
//! ## Module Organization
//!
//! - [`models`] - Plain serde document structs and typed ids
//! - [`store`] - The reactive document store collaborator
//! - [`cache`] - Per-playlist unit of work
//! - [`queue`] - Per-playlist serialization queue
//! - [`ingest`] - Reconciler, blueprint seam, diffing, rank arithmetic
//! - [`playout`] - Take/set-next/hold/ad-lib operations
//! - [`services`] - Public ingest-push and operator APIs
//! - [`devices`] - Outbound device command channel
//! - [`timeline`] - Timeline publisher seam
//! - [`config`] / [`error`] / [`events`] / [`logging`] - Ambient concerns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rundown_core::config::RundownConfig;
//! use rundown_core::context::CoreContext;
//! use rundown_core::ingest::PassthroughShowStyle;
//! use rundown_core::services::{IngestService, PlayoutService};
//! use rundown_core::store::DocumentStore;
//! use rundown_core::timeline::NoopTimelinePublisher;
//!
//! let ctx = CoreContext::new(
//!     DocumentStore::new(),
//!     Arc::new(PassthroughShowStyle),
//!     Arc::new(NoopTimelinePublisher),
//!     RundownConfig::default(),
//! );
//! let ingest = IngestService::new(ctx.clone());
//! let playout = PlayoutService::new(ctx);
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod context;
pub mod devices;
pub mod error;
pub mod events;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod playout;
pub mod queue;
pub mod services;
pub mod store;
pub mod timeline;

pub use config::RundownConfig;
pub use constants::QueuePriority;
pub use context::CoreContext;
pub use error::{Result, RundownError};
pub use events::EventPublisher;
pub use queue::SerializedQueue;
pub use services::{ClientResponse, IngestService, PlayoutService};
