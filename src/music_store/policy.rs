//! Behaviour switches for the places where two reasonable semantics exist.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How a loader call maps onto transactions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// One transaction per item: an error keeps earlier items committed.
    #[default]
    PerItem,
    /// One transaction per call: an error rolls back the whole call.
    Batch,
}

/// What `load_albums` does with an album whose (name, artist) already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAlbumPolicy {
    /// Reject the album and skip all of its songs.
    #[default]
    Reject,
    /// Reject the album but still add its missing songs to the existing one.
    Merge,
}

/// What `load_ratings` does when the user already rated the song.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateRatingPolicy {
    #[default]
    Reject,
    /// Overwrite the previous score and date.
    Upsert,
}

/// Which songs count towards the most prolific artists ranking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProlificScope {
    #[default]
    SinglesOnly,
    /// Singles and album tracks; a track without its own date uses its album's.
    AllSongs,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorePolicies {
    pub commit_mode: CommitMode,
    pub duplicate_album: DuplicateAlbumPolicy,
    pub duplicate_rating: DuplicateRatingPolicy,
    pub prolific_scope: ProlificScope,
}
