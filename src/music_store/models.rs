//! Records accepted by the loaders and rows returned by the queries.
//!
//! Loader inputs are named records rather than positional tuples, so the
//! artist/title order of an item is never ambiguous.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Genre assigned to an album whose genre cannot be inferred.
pub const UNKNOWN_GENRE: &str = "Unknown";

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

// =============================================================================
// Loader Inputs
// =============================================================================

/// A song released outside of any album.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleRecord {
    pub title: String,
    pub genres: Vec<String>,
    pub artist: String,
    pub release_date: NaiveDate,
}

impl SingleRecord {
    pub fn new<S: Into<String>>(
        title: S,
        genres: &[&str],
        artist: S,
        release_date: NaiveDate,
    ) -> Self {
        Self {
            title: title.into(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            artist: artist.into(),
            release_date,
        }
    }

    pub fn key(&self) -> SongKey {
        SongKey::new(&self.artist, &self.title)
    }
}

/// An album together with the titles of its tracks.
///
/// When `genre` is `None` the album genre is taken from the first listed
/// title the artist already owns, falling back to [`UNKNOWN_GENRE`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRecord {
    pub title: String,
    #[serde(default)]
    pub genre: Option<String>,
    pub artist: String,
    pub release_date: NaiveDate,
    pub songs: Vec<String>,
}

impl AlbumRecord {
    pub fn new<S: Into<String>>(
        title: S,
        genre: Option<&str>,
        artist: S,
        release_date: NaiveDate,
        songs: &[&str],
    ) -> Self {
        Self {
            title: title.into(),
            genre: genre.map(str::to_string),
            artist: artist.into(),
            release_date,
            songs: songs.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn key(&self) -> AlbumKey {
        AlbumKey::new(&self.artist, &self.title)
    }
}

/// A user's score for a song. `score` is kept raw and validated on load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub username: String,
    pub artist: String,
    pub title: String,
    #[serde(deserialize_with = "deserialize_raw_score")]
    pub score: String,
    pub rating_date: NaiveDate,
}

impl RatingRecord {
    pub fn new<S: Into<String>, R: ToString>(
        username: S,
        artist: S,
        title: S,
        score: R,
        rating_date: NaiveDate,
    ) -> Self {
        Self {
            username: username.into(),
            artist: artist.into(),
            title: title.into(),
            score: score.to_string(),
            rating_date,
        }
    }

    pub fn key(&self) -> RatingKey {
        RatingKey {
            username: self.username.trim().to_string(),
            artist: self.artist.trim().to_string(),
            title: self.title.trim().to_string(),
        }
    }
}

/// Accepts both `"score": 4` and `"score": "4"` in JSON input.
fn deserialize_raw_score<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// A validated rating score.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RatingScore(i64);

impl RatingScore {
    pub fn parse(raw: &str) -> Option<Self> {
        let value: i64 = raw.trim().parse().ok()?;
        (MIN_RATING..=MAX_RATING)
            .contains(&value)
            .then_some(RatingScore(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

// =============================================================================
// Result Keys
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SongKey {
    pub artist: String,
    pub title: String,
}

impl SongKey {
    pub fn new(artist: &str, title: &str) -> Self {
        Self {
            artist: artist.trim().to_string(),
            title: title.trim().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AlbumKey {
    pub artist: String,
    pub album: String,
}

impl AlbumKey {
    pub fn new(artist: &str, album: &str) -> Self {
        Self {
            artist: artist.trim().to_string(),
            album: album.trim().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RatingKey {
    pub username: String,
    pub artist: String,
    pub title: String,
}

// =============================================================================
// Query Inputs and Rows
// =============================================================================

/// Inclusive range of years. A range whose start is after its end matches nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn single(year: i32) -> Self {
        Self::new(year, year)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        (self.start..=self.end).contains(&date.year())
    }
}

/// A name ranked by a count: artist, genre or username depending on the query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankedName {
    pub name: String,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankedSong {
    pub artist: String,
    pub title: String,
    pub count: i64,
}

/// Row counts of every table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CatalogCounts {
    pub artists: usize,
    pub genres: usize,
    pub albums: usize,
    pub songs: usize,
    pub users: usize,
    pub ratings: usize,
}
