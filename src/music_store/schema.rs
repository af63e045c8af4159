//! SQLite schema of the music catalog.
//!
//! Surrogate integer ids everywhere; names are unique per table or per owning
//! artist. Dates are stored as ISO `YYYY-MM-DD` text.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

const ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const GENRE_FK: ForeignKey = ForeignKey {
    foreign_table: "genres",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const ALBUM_FK: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const SONG_FK: ForeignKey = ForeignKey {
    foreign_table: "songs",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const USER_FK: ForeignKey = ForeignKey {
    foreign_table: "users",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

// =============================================================================
// Entity Tables
// =============================================================================

pub(super) const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub(super) const GENRES_TABLE: Table = Table {
    name: "genres",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub(super) const USERS_TABLE: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("username", &SqlType::Text, non_null = true, is_unique = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub(super) const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("release_date", &SqlType::Text, non_null = true),
        sqlite_column!(
            "genre_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&GENRE_FK)
        ),
    ],
    indices: &[("idx_albums_artist", "artist_id")],
    unique_constraints: &[&["name", "artist_id"]],
};

/// Songs with a null `album_id` are singles.
pub(super) const SONGS_TABLE: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("album_id", &SqlType::Integer, foreign_key = Some(&ALBUM_FK)),
        sqlite_column!("release_date", &SqlType::Text),
    ],
    indices: &[
        ("idx_songs_artist", "artist_id"),
        ("idx_songs_album", "album_id"),
    ],
    unique_constraints: &[&["title", "artist_id"]],
};

// =============================================================================
// Relationship Tables
// =============================================================================

pub(super) const SONG_GENRES_TABLE: Table = Table {
    name: "song_genres",
    columns: &[
        sqlite_column!(
            "song_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&SONG_FK)
        ),
        sqlite_column!(
            "genre_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&GENRE_FK)
        ),
    ],
    indices: &[("idx_song_genres_genre", "genre_id")],
    unique_constraints: &[&["song_id", "genre_id"]],
};

pub(super) const RATINGS_TABLE: Table = Table {
    name: "ratings",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!(
            "song_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&SONG_FK)
        ),
        sqlite_column!("rating", &SqlType::Integer, non_null = true),
        sqlite_column!("rating_date", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_ratings_song", "song_id")],
    unique_constraints: &[&["user_id", "song_id"]],
};

// =============================================================================
// Versioned Schemas
// =============================================================================

pub const MUSIC_DB_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        ARTISTS_TABLE,
        GENRES_TABLE,
        USERS_TABLE,
        ALBUMS_TABLE,
        SONGS_TABLE,
        SONG_GENRES_TABLE,
        RATINGS_TABLE,
    ],
    migration: None,
}];

/// Order in which `clear_database` empties the tables.
pub const CLEAR_ORDER: &[&str] = &[
    "ratings",
    "song_genres",
    "songs",
    "albums",
    "artists",
    "genres",
    "users",
];
