//! Music catalog persistence library
//!
//! Bulk loaders and analytical queries over a SQLite music catalog.

pub mod config;
pub mod music_store;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use music_store::{MusicStore, SqliteMusicStore, StorePolicies};
