//! Per-item load routines.
//!
//! Each function processes one record against a connection that is already
//! inside a transaction, and classifies the record as loaded or rejected.

use super::models::*;
use super::policy::{DuplicateAlbumPolicy, DuplicateRatingPolicy};
use super::report::{ItemOutcome, RejectReason};
use super::store::{ensure_artist, ensure_genre, song_id, song_ids_by_name, user_id};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use tracing::debug;

/// Trimmed, non-blank names in first-seen order, without repeats.
fn distinct_names(names: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty() && seen.insert(*name))
        .collect()
}

fn first_blank(fields: &[(&'static str, &str)]) -> Option<&'static str> {
    fields
        .iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| *field)
}

fn insert_song(
    conn: &Connection,
    title: &str,
    artist_id: i64,
    album_id: Option<i64>,
    release_date: NaiveDate,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO songs (title, artist_id, album_id, release_date) VALUES (?1, ?2, ?3, ?4)",
        params![title, artist_id, album_id, release_date],
    )
    .with_context(|| format!("Failed to insert song {}", title))?;
    Ok(conn.last_insert_rowid())
}

fn link_genre(conn: &Connection, song_id: i64, genre_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO song_genres (song_id, genre_id) VALUES (?1, ?2)",
        params![song_id, genre_id],
    )?;
    Ok(())
}

// =========================================================================
// Singles
// =========================================================================

pub(super) fn load_single(conn: &Connection, single: &SingleRecord) -> Result<ItemOutcome<SongKey>> {
    let key = single.key();
    let required = [("artist", key.artist.as_str()), ("title", key.title.as_str())];
    if let Some(field) = first_blank(&required) {
        return Ok(ItemOutcome::Rejected(key, RejectReason::MissingField(field)));
    }
    let genres = distinct_names(&single.genres);
    if genres.is_empty() {
        return Ok(ItemOutcome::Rejected(
            key,
            RejectReason::MissingField("genres"),
        ));
    }

    let artist_id = ensure_artist(conn, &key.artist)?;
    let genre_ids = genres
        .iter()
        .map(|genre| ensure_genre(conn, genre))
        .collect::<Result<Vec<i64>>>()?;

    if song_id(conn, &key.title, artist_id)?.is_some() {
        return Ok(ItemOutcome::Rejected(key, RejectReason::Duplicate));
    }

    let song_id = insert_song(conn, &key.title, artist_id, None, single.release_date)?;
    for genre_id in genre_ids {
        link_genre(conn, song_id, genre_id)?;
    }
    Ok(ItemOutcome::Loaded(key))
}

// =========================================================================
// Albums
// =========================================================================

struct ExistingAlbum {
    id: i64,
    genre_id: i64,
    release_date: NaiveDate,
}

fn find_album(conn: &Connection, name: &str, artist_id: i64) -> Result<Option<ExistingAlbum>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, genre_id, release_date FROM albums WHERE name = ?1 AND artist_id = ?2",
    )?;
    match stmt.query_row(params![name, artist_id], |row| {
        Ok(ExistingAlbum {
            id: row.get(0)?,
            genre_id: row.get(1)?,
            release_date: row.get(2)?,
        })
    }) {
        Ok(album) => Ok(Some(album)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Genre of the first listed title the artist already owns, if any.
fn infer_album_genre(conn: &Connection, titles: &[&str], artist_id: i64) -> Result<Option<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT sg.genre_id FROM songs s JOIN song_genres sg ON sg.song_id = s.id
         WHERE s.title = ?1 AND s.artist_id = ?2
         ORDER BY sg.genre_id LIMIT 1",
    )?;
    for title in titles {
        match stmt.query_row(params![title, artist_id], |r| r.get(0)) {
            Ok(genre_id) => return Ok(Some(genre_id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

fn resolve_album_genre(
    conn: &Connection,
    album: &AlbumRecord,
    titles: &[&str],
    artist_id: i64,
) -> Result<i64> {
    let explicit = album
        .genre
        .as_deref()
        .map(str::trim)
        .filter(|genre| !genre.is_empty());
    if let Some(genre) = explicit {
        return ensure_genre(conn, genre);
    }
    match infer_album_genre(conn, titles, artist_id)? {
        Some(genre_id) => Ok(genre_id),
        None => ensure_genre(conn, UNKNOWN_GENRE),
    }
}

pub(super) fn load_album(
    conn: &Connection,
    album: &AlbumRecord,
    duplicate_policy: DuplicateAlbumPolicy,
) -> Result<ItemOutcome<AlbumKey>> {
    let key = album.key();
    let required = [("artist", key.artist.as_str()), ("title", key.album.as_str())];
    if let Some(field) = first_blank(&required) {
        return Ok(ItemOutcome::Rejected(key, RejectReason::MissingField(field)));
    }
    let titles = distinct_names(&album.songs);

    let artist_id = ensure_artist(conn, &key.artist)?;
    let genre_id = resolve_album_genre(conn, album, &titles, artist_id)?;

    let (album_id, genre_id, release_date, outcome) =
        match find_album(conn, &key.album, artist_id)? {
            Some(_) if duplicate_policy == DuplicateAlbumPolicy::Reject => {
                return Ok(ItemOutcome::Rejected(key, RejectReason::Duplicate));
            }
            // Merged tracks follow the existing album's genre and date.
            Some(existing) => (
                existing.id,
                existing.genre_id,
                existing.release_date,
                ItemOutcome::Rejected(key.clone(), RejectReason::Duplicate),
            ),
            None => {
                conn.execute(
                    "INSERT INTO albums (name, artist_id, release_date, genre_id) VALUES (?1, ?2, ?3, ?4)",
                    params![&key.album, artist_id, album.release_date, genre_id],
                )
                .with_context(|| format!("Failed to insert album {}", key.album))?;
                (
                    conn.last_insert_rowid(),
                    genre_id,
                    album.release_date,
                    ItemOutcome::Loaded(key.clone()),
                )
            }
        };

    for title in titles {
        if song_id(conn, title, artist_id)?.is_some() {
            debug!(
                "Skipping track {} of album {}: {} already has a song with that title",
                title, key.album, key.artist
            );
            continue;
        }
        let song_id = insert_song(conn, title, artist_id, Some(album_id), release_date)?;
        link_genre(conn, song_id, genre_id)?;
    }
    Ok(outcome)
}

// =========================================================================
// Users
// =========================================================================

pub(super) fn load_user(conn: &Connection, username: &str) -> Result<ItemOutcome<String>> {
    let username = username.trim();
    if username.is_empty() {
        return Ok(ItemOutcome::Rejected(
            username.to_string(),
            RejectReason::MissingField("username"),
        ));
    }
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO users (username) VALUES (?1)",
        params![username],
    )?;
    if inserted == 0 {
        return Ok(ItemOutcome::Rejected(
            username.to_string(),
            RejectReason::Duplicate,
        ));
    }
    Ok(ItemOutcome::Loaded(username.to_string()))
}

// =========================================================================
// Ratings
// =========================================================================

fn rating_exists(conn: &Connection, user_id: i64, song_id: i64) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM ratings WHERE user_id = ?1 AND song_id = ?2)",
        params![user_id, song_id],
        |r| r.get(0),
    )?;
    Ok(exists)
}

pub(super) fn load_rating(
    conn: &Connection,
    rating: &RatingRecord,
    duplicate_policy: DuplicateRatingPolicy,
) -> Result<ItemOutcome<RatingKey>> {
    let key = rating.key();

    let Some(user_id) = user_id(conn, &key.username)? else {
        return Ok(ItemOutcome::Rejected(key, RejectReason::UnknownUser));
    };
    let song_ids = song_ids_by_name(conn, &key.artist, &key.title)?;
    let [song_id] = song_ids[..] else {
        return Ok(ItemOutcome::Rejected(key, RejectReason::UnknownSong));
    };
    let Some(score) = RatingScore::parse(&rating.score) else {
        return Ok(ItemOutcome::Rejected(
            key,
            RejectReason::InvalidScore(rating.score.trim().to_string()),
        ));
    };

    match duplicate_policy {
        DuplicateRatingPolicy::Reject => {
            if rating_exists(conn, user_id, song_id)? {
                return Ok(ItemOutcome::Rejected(key, RejectReason::Duplicate));
            }
            conn.execute(
                "INSERT INTO ratings (user_id, song_id, rating, rating_date) VALUES (?1, ?2, ?3, ?4)",
                params![user_id, song_id, score.value(), rating.rating_date],
            )?;
        }
        DuplicateRatingPolicy::Upsert => {
            conn.execute(
                "INSERT INTO ratings (user_id, song_id, rating, rating_date) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, song_id) DO UPDATE SET
                    rating = excluded.rating,
                    rating_date = excluded.rating_date",
                params![user_id, song_id, score.value(), rating.rating_date],
            )?;
        }
    }
    Ok(ItemOutcome::Loaded(key))
}
