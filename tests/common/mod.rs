//! Common test infrastructure
//!
//! Tests should only import from this module.

use chrono::NaiveDate;
use music_catalog_db::music_store::StorePolicies;
use music_catalog_db::SqliteMusicStore;
use tempfile::TempDir;

pub const POP: &str = "Pop";
pub const JAZZ: &str = "Jazz";
pub const ARTIST_1: &str = "A1";
pub const ARTIST_2: &str = "A2";
pub const USER_1: &str = "ana";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A store on a fresh database file, deleted when dropped.
pub struct TestCatalog {
    pub store: SqliteMusicStore,
    _temp_dir: TempDir,
}

impl TestCatalog {
    pub fn new() -> Self {
        Self::with_policies(StorePolicies::default())
    }

    pub fn with_policies(policies: StorePolicies) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteMusicStore::new(temp_dir.path().join("music.db"), policies).unwrap();
        Self {
            store,
            _temp_dir: temp_dir,
        }
    }
}
