//! MusicStore trait definition.

use super::models::*;
use super::report::LoadReport;
use anyhow::Result;
use std::collections::BTreeSet;

/// Load and query operations of the music catalog.
///
/// Loaders classify every input item as loaded or rejected and only return
/// `Err` on storage failures. Rankings sort by count descending, then by
/// label ascending, and return at most `n` rows.
pub trait MusicStore: Send + Sync {
    // =========================================================================
    // Bulk Loaders
    // =========================================================================

    /// Inserts singles, creating artists and genres on first reference.
    /// A (title, artist) that already exists is rejected.
    fn load_singles(&self, singles: &[SingleRecord]) -> Result<LoadReport<SongKey>>;

    /// Inserts albums and their tracks. Tracks whose title the artist
    /// already owns are skipped.
    fn load_albums(&self, albums: &[AlbumRecord]) -> Result<LoadReport<AlbumKey>>;

    /// Inserts users; existing usernames are rejected, never overwritten.
    fn load_users(&self, usernames: &[String]) -> Result<LoadReport<String>>;

    /// Inserts ratings after checking user, song, score and duplicates, in
    /// that order.
    fn load_ratings(&self, ratings: &[RatingRecord]) -> Result<LoadReport<RatingKey>>;

    /// Deletes every row of every table.
    fn clear_database(&self) -> Result<()>;

    // =========================================================================
    // Analytical Queries
    // =========================================================================

    /// Artists ranked by the number of songs released in `years`.
    fn most_prolific_individual_artists(
        &self,
        n: usize,
        years: YearRange,
    ) -> Result<Vec<RankedName>>;

    /// Artists whose most recent single was released in `year`.
    fn artists_last_single_in_year(&self, year: i32) -> Result<BTreeSet<String>>;

    /// Genres ranked by the number of songs, singles and album tracks alike.
    fn top_song_genres(&self, n: usize) -> Result<Vec<RankedName>>;

    /// Artists with at least one album track and at least one single.
    fn album_and_single_artists(&self) -> Result<BTreeSet<String>>;

    /// Songs ranked by the number of ratings dated in `years`.
    fn most_rated_songs(&self, years: YearRange, n: usize) -> Result<Vec<RankedSong>>;

    /// Users ranked by the number of ratings they gave in `years`.
    fn most_engaged_users(&self, years: YearRange, n: usize) -> Result<Vec<RankedName>>;

    // =========================================================================
    // Counts
    // =========================================================================

    fn counts(&self) -> Result<CatalogCounts>;
}
