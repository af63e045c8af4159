//! SQLite-backed music store.
//!
//! `SqliteMusicStore` owns a single connection guarded by a mutex and runs
//! every loader item inside a transaction chosen by the configured
//! [`CommitMode`].

use super::loaders;
use super::models::*;
use super::policy::{CommitMode, StorePolicies};
use super::queries;
use super::report::{ItemOutcome, LoadReport};
use super::schema::{CLEAR_ORDER, MUSIC_DB_VERSIONED_SCHEMAS};
use super::trait_def::MusicStore;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct SqliteMusicStore {
    conn: Arc<Mutex<Connection>>,
    policies: StorePolicies,
}

impl SqliteMusicStore {
    /// Opens the database at `db_path`, creating it with the latest schema if
    /// it does not exist yet. Existing databases are validated against their
    /// recorded schema version and migrated forward.
    pub fn new<P: AsRef<Path>>(db_path: P, policies: StorePolicies) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = if db_path.exists() {
            Connection::open_with_flags(
                db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_context(|| format!("Failed to open music database {:?}", db_path))?
        } else {
            Connection::open(db_path)
                .with_context(|| format!("Failed to create music database {:?}", db_path))?
        };
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Self::create_or_migrate(&conn)?;

        let store = SqliteMusicStore {
            conn: Arc::new(Mutex::new(conn)),
            policies,
        };
        let counts = store.counts()?;
        info!(
            "Opened music catalog: {} artists, {} albums, {} songs, {} users, {} ratings",
            counts.artists, counts.albums, counts.songs, counts.users, counts.ratings
        );
        Ok(store)
    }

    pub fn policies(&self) -> &StorePolicies {
        &self.policies
    }

    fn create_or_migrate(conn: &Connection) -> Result<()> {
        let latest_schema = MUSIC_DB_VERSIONED_SCHEMAS
            .last()
            .context("No music db schema defined")?;

        let table_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )?;
        if table_count == 0 {
            info!(
                "Creating music db schema at version {}",
                latest_schema.version
            );
            return latest_schema.create(conn);
        }

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;
        if version >= MUSIC_DB_VERSIONED_SCHEMAS.len() {
            bail!("Database version {} is too new", version);
        }
        MUSIC_DB_VERSIONED_SCHEMAS[version].validate(conn)?;

        Self::migrate_if_needed(conn, version)
    }

    fn migrate_if_needed(conn: &Connection, version: usize) -> Result<()> {
        let mut latest_from = version;
        for schema in MUSIC_DB_VERSIONED_SCHEMAS.iter().skip(version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!(
                    "Migrating music db from version {} to {}",
                    latest_from, schema.version
                );
                migration_fn(conn)?;
                latest_from = schema.version;
            }
        }
        if latest_from != version {
            conn.pragma_update(None, "user_version", (BASE_DB_VERSION + latest_from) as i64)?;
        }
        Ok(())
    }

    /// Runs `load_item` over `items` under the configured commit mode.
    ///
    /// In per-item mode an error leaves the items before it committed and the
    /// items after it unattempted; in batch mode it rolls back the whole call.
    fn run_items<T, K, F>(
        &self,
        kind: &str,
        items: &[T],
        mut load_item: F,
    ) -> Result<LoadReport<K>>
    where
        K: Ord + Clone + Debug,
        F: FnMut(&Connection, &T) -> Result<ItemOutcome<K>>,
    {
        let mut conn = self.conn.lock().unwrap();
        let mut report = LoadReport::default();

        match self.policies.commit_mode {
            CommitMode::PerItem => {
                for (index, item) in items.iter().enumerate() {
                    let tx = conn.transaction()?;
                    let outcome = load_item(&tx, item)
                        .with_context(|| format!("Failed to load {} item #{}", kind, index))?;
                    tx.commit()?;
                    log_outcome(kind, &outcome);
                    report.record(outcome);
                }
            }
            CommitMode::Batch => {
                let tx = conn.transaction()?;
                for (index, item) in items.iter().enumerate() {
                    let outcome = match load_item(&tx, item) {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(
                                "Rolling back {} batch of {} items after item #{} failed",
                                kind,
                                items.len(),
                                index
                            );
                            return Err(e)
                                .with_context(|| format!("Failed to load {} item #{}", kind, index));
                        }
                    };
                    log_outcome(kind, &outcome);
                    report.record(outcome);
                }
                tx.commit()?;
            }
        }

        info!(
            "Loaded {} {}, rejected {}",
            report.loaded.len(),
            kind,
            report.rejected.len()
        );
        Ok(report)
    }

    fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

fn log_outcome<K: Debug>(kind: &str, outcome: &ItemOutcome<K>) {
    if let ItemOutcome::Rejected(key, reason) = outcome {
        debug!("Rejected {} {:?}: {}", kind, key, reason);
    }
}

// =========================================================================
// Internal Helper Methods
// =========================================================================

fn query_optional_id(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<i64>> {
    let mut stmt = conn.prepare_cached(sql)?;
    match stmt.query_row(params, |r| r.get(0)) {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(super) fn artist_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    query_optional_id(conn, "SELECT id FROM artists WHERE name = ?1", params![name])
}

pub(super) fn genre_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    query_optional_id(conn, "SELECT id FROM genres WHERE name = ?1", params![name])
}

pub(super) fn user_id(conn: &Connection, username: &str) -> Result<Option<i64>> {
    query_optional_id(
        conn,
        "SELECT id FROM users WHERE username = ?1",
        params![username],
    )
}

/// Id of the song with `title` owned by the artist, single or album track.
pub(super) fn song_id(conn: &Connection, title: &str, artist_id: i64) -> Result<Option<i64>> {
    query_optional_id(
        conn,
        "SELECT id FROM songs WHERE title = ?1 AND artist_id = ?2",
        params![title, artist_id],
    )
}

/// Ids of the songs matching an artist name and a title.
pub(super) fn song_ids_by_name(conn: &Connection, artist: &str, title: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT s.id FROM songs s JOIN artists a ON a.id = s.artist_id
         WHERE a.name = ?1 AND s.title = ?2",
    )?;
    let ids = stmt
        .query_map(params![artist, title], |r| r.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

pub(super) fn ensure_artist(conn: &Connection, name: &str) -> Result<i64> {
    if let Some(id) = artist_id(conn, name)? {
        return Ok(id);
    }
    conn.execute("INSERT INTO artists (name) VALUES (?1)", params![name])
        .with_context(|| format!("Failed to create artist {}", name))?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn ensure_genre(conn: &Connection, name: &str) -> Result<i64> {
    if let Some(id) = genre_id(conn, name)? {
        return Ok(id);
    }
    conn.execute("INSERT INTO genres (name) VALUES (?1)", params![name])
        .with_context(|| format!("Failed to create genre {}", name))?;
    Ok(conn.last_insert_rowid())
}

impl MusicStore for SqliteMusicStore {
    fn load_singles(&self, singles: &[SingleRecord]) -> Result<LoadReport<SongKey>> {
        self.run_items("singles", singles, loaders::load_single)
    }

    fn load_albums(&self, albums: &[AlbumRecord]) -> Result<LoadReport<AlbumKey>> {
        let policy = self.policies.duplicate_album;
        self.run_items("albums", albums, |conn, album| {
            loaders::load_album(conn, album, policy)
        })
    }

    fn load_users(&self, usernames: &[String]) -> Result<LoadReport<String>> {
        self.run_items("users", usernames, |conn, username| {
            loaders::load_user(conn, username)
        })
    }

    fn load_ratings(&self, ratings: &[RatingRecord]) -> Result<LoadReport<RatingKey>> {
        let policy = self.policies.duplicate_rating;
        self.run_items("ratings", ratings, |conn, rating| {
            loaders::load_rating(conn, rating, policy)
        })
    }

    fn clear_database(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let schema = MUSIC_DB_VERSIONED_SCHEMAS
            .last()
            .context("No music db schema defined")?;
        let tx = conn.transaction()?;
        let deleted = schema.clear(&tx, CLEAR_ORDER)?;
        tx.commit()?;
        info!("Cleared music database, {} rows deleted", deleted);
        Ok(())
    }

    fn most_prolific_individual_artists(
        &self,
        n: usize,
        years: YearRange,
    ) -> Result<Vec<RankedName>> {
        let conn = self.conn.lock().unwrap();
        queries::most_prolific_individual_artists(&conn, n, years, self.policies.prolific_scope)
    }

    fn artists_last_single_in_year(&self, year: i32) -> Result<BTreeSet<String>> {
        let conn = self.conn.lock().unwrap();
        queries::artists_last_single_in_year(&conn, year)
    }

    fn top_song_genres(&self, n: usize) -> Result<Vec<RankedName>> {
        let conn = self.conn.lock().unwrap();
        queries::top_song_genres(&conn, n)
    }

    fn album_and_single_artists(&self) -> Result<BTreeSet<String>> {
        let conn = self.conn.lock().unwrap();
        queries::album_and_single_artists(&conn)
    }

    fn most_rated_songs(&self, years: YearRange, n: usize) -> Result<Vec<RankedSong>> {
        let conn = self.conn.lock().unwrap();
        queries::most_rated_songs(&conn, years, n)
    }

    fn most_engaged_users(&self, years: YearRange, n: usize) -> Result<Vec<RankedName>> {
        let conn = self.conn.lock().unwrap();
        queries::most_engaged_users(&conn, years, n)
    }

    fn counts(&self) -> Result<CatalogCounts> {
        let conn = self.conn.lock().unwrap();
        Ok(CatalogCounts {
            artists: Self::count_rows(&conn, "artists")?,
            genres: Self::count_rows(&conn, "genres")?,
            albums: Self::count_rows(&conn, "albums")?,
            songs: Self::count_rows(&conn, "songs")?,
            users: Self::count_rows(&conn, "users")?,
            ratings: Self::count_rows(&conn, "ratings")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_tmp_store(policies: StorePolicies) -> (SqliteMusicStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteMusicStore::new(temp_dir.path().join("music.db"), policies).unwrap();
        (store, temp_dir)
    }

    /// Makes any insert of a song titled "boom" fail with a SQL error.
    fn install_failing_trigger(store: &SqliteMusicStore) {
        store
            .conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER fail_boom BEFORE INSERT ON songs WHEN NEW.title = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'boom'); END;",
            )
            .unwrap();
    }

    fn three_singles() -> Vec<SingleRecord> {
        vec![
            SingleRecord::new("S1", &["Pop"], "A1", date(2020, 1, 1)),
            SingleRecord::new("boom", &["Rock"], "B1", date(2020, 1, 2)),
            SingleRecord::new("S3", &["Pop"], "C1", date(2020, 1, 3)),
        ]
    }

    #[test]
    fn creates_schema_on_new_file_and_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("music.db");

        {
            let store = SqliteMusicStore::new(&db_path, StorePolicies::default()).unwrap();
            store
                .load_users(&["ana".to_string(), "bob".to_string()])
                .unwrap();
        }

        let reopened = SqliteMusicStore::new(&db_path, StorePolicies::default()).unwrap();
        assert_eq!(reopened.counts().unwrap().users, 2);
    }

    #[test]
    fn opens_existing_empty_file() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let store = SqliteMusicStore::new(temp_file.path(), StorePolicies::default()).unwrap();
        assert_eq!(store.counts().unwrap(), CatalogCounts::default());
    }

    #[test]
    fn refuses_database_without_versioned_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("foreign.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute("CREATE TABLE artists (id INTEGER PRIMARY KEY)", [])
                .unwrap();
        }

        let result = SqliteMusicStore::new(&db_path, StorePolicies::default());
        assert!(result.is_err());
        assert!(result.err().unwrap().to_string().contains("too old"));
    }

    #[test]
    fn refuses_database_from_newer_version() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("music.db");
        drop(SqliteMusicStore::new(&db_path, StorePolicies::default()).unwrap());
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.pragma_update(None, "user_version", (BASE_DB_VERSION + 7) as i64)
                .unwrap();
        }

        let result = SqliteMusicStore::new(&db_path, StorePolicies::default());
        assert!(result.err().unwrap().to_string().contains("too new"));
    }

    #[test]
    fn refuses_database_with_tampered_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("music.db");
        drop(SqliteMusicStore::new(&db_path, StorePolicies::default()).unwrap());
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute("DROP INDEX idx_songs_album", []).unwrap();
        }

        let result = SqliteMusicStore::new(&db_path, StorePolicies::default());
        assert!(result
            .err()
            .unwrap()
            .to_string()
            .contains("missing index 'idx_songs_album'"));
    }

    #[test]
    fn clear_database_empties_every_table() {
        let (store, _temp_dir) = create_tmp_store(StorePolicies::default());
        store
            .load_singles(&[SingleRecord::new("S1", &["Pop"], "A1", date(2020, 1, 1))])
            .unwrap();
        store
            .load_albums(&[AlbumRecord::new(
                "Alb1",
                Some("Jazz"),
                "A1",
                date(2019, 5, 1),
                &["T1", "T2"],
            )])
            .unwrap();
        store.load_users(&["ana".to_string()]).unwrap();
        store
            .load_ratings(&[RatingRecord::new("ana", "A1", "S1", 5, date(2021, 1, 1))])
            .unwrap();
        assert_eq!(store.counts().unwrap().ratings, 1);

        store.clear_database().unwrap();

        assert_eq!(store.counts().unwrap(), CatalogCounts::default());
        let conn = store.conn.lock().unwrap();
        assert_eq!(SqliteMusicStore::count_rows(&conn, "song_genres").unwrap(), 0);
    }

    #[test]
    fn per_item_commit_keeps_items_before_failure() {
        let (store, _temp_dir) = create_tmp_store(StorePolicies::default());
        install_failing_trigger(&store);

        let result = store.load_singles(&three_singles());
        assert!(result.is_err());

        let counts = store.counts().unwrap();
        assert_eq!(counts.songs, 1);
        // The failing item's artist went down with its transaction, and the
        // third item never ran.
        assert_eq!(counts.artists, 1);
        assert_eq!(counts.genres, 1);
    }

    #[test]
    fn batch_commit_rolls_back_whole_call() {
        let (store, _temp_dir) = create_tmp_store(StorePolicies {
            commit_mode: CommitMode::Batch,
            ..Default::default()
        });
        install_failing_trigger(&store);

        let result = store.load_singles(&three_singles());
        assert!(result.is_err());
        assert_eq!(store.counts().unwrap(), CatalogCounts::default());
    }

    #[test]
    fn batch_commit_keeps_rejections_non_fatal() {
        let (store, _temp_dir) = create_tmp_store(StorePolicies {
            commit_mode: CommitMode::Batch,
            ..Default::default()
        });

        let report = store
            .load_users(&["ana".to_string(), "ana".to_string(), "bob".to_string()])
            .unwrap();

        assert_eq!(report.loaded, vec!["ana".to_string(), "bob".to_string()]);
        assert_eq!(report.rejected_keys(), BTreeSet::from(["ana".to_string()]));
        assert_eq!(store.counts().unwrap().users, 2);
    }

    #[test]
    fn lookup_helpers_find_created_rows() {
        let (store, _temp_dir) = create_tmp_store(StorePolicies::default());
        let conn = store.conn.lock().unwrap();

        let artist = ensure_artist(&conn, "A1").unwrap();
        assert_eq!(ensure_artist(&conn, "A1").unwrap(), artist);
        assert_eq!(artist_id(&conn, "A1").unwrap(), Some(artist));
        assert_eq!(artist_id(&conn, "nobody").unwrap(), None);

        let genre = ensure_genre(&conn, "Pop").unwrap();
        assert_eq!(genre_id(&conn, "Pop").unwrap(), Some(genre));
        assert_eq!(user_id(&conn, "ana").unwrap(), None);
        assert!(song_ids_by_name(&conn, "A1", "S1").unwrap().is_empty());
        assert_eq!(song_id(&conn, "S1", artist).unwrap(), None);
    }
}
