//! # Playlist Cache
//!
//! Per-aggregate unit of work. `PlaylistCache::load` pulls a consistent
//! snapshot of one playlist and everything it owns into typed in-memory
//! tables; every mutation is buffered; `save_all_to_store` diffs each table
//! against its load-time snapshot and writes only the deltas, collection by
//! collection, in a fixed dependency order. A failed operation drops the
//! cache unsaved, leaving the store untouched.

pub mod playlist_cache;
pub mod table;

pub use playlist_cache::PlaylistCache;
pub use table::{CacheTable, TableDelta};
