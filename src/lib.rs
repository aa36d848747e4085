//! booktrack-rs: A personal reading tracker with catalog lookup and a
//! shared leaderboard.
//!
//! This crate keeps a local library of books and per-book reading
//! progress in a SQLite-backed store, fills in metadata from the Open
//! Library catalog, derives aggregate reading statistics, and can push
//! those statistics to a shared realtime store where a leaderboard of
//! fellow readers is merged and ranked. Everything works offline;
//! the leaderboard is strictly optional.
//!
//! # Features
//!
//! - Catalog search and ISBN lookup with normalized metadata
//! - Best-effort page-count backfill across catalog sources
//! - Clamped, monotonic reading progress per book
//! - Aggregate statistics (pages read, completed books, streak)
//! - JSON export/import of the whole library
//! - Optional shared leaderboard with a live subscription

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Open Library catalog client.
pub mod catalog;
/// Configuration and CLI.
pub mod config;
/// Error types.
pub mod error;
/// Leaderboard ranking and sync.
pub mod leaderboard;
/// Statistics derivation.
pub mod stats;
/// Record types and persistence.
pub mod store;
/// Local state manager.
pub mod tracker;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use error::{AppError, Result};
pub use leaderboard::LeaderboardSync;
pub use store::Store;
pub use tracker::Tracker;
