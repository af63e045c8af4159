use crate::music_store::{CommitMode, DuplicateAlbumPolicy, DuplicateRatingPolicy, ProlificScope};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_path: Option<String>,
    pub policies: Option<PoliciesConfig>,
}

/// `[policies]` table. Unset entries fall back to the command line.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PoliciesConfig {
    pub commit_mode: Option<CommitMode>,
    pub duplicate_album: Option<DuplicateAlbumPolicy>,
    pub duplicate_rating: Option<DuplicateRatingPolicy>,
    pub prolific_scope: Option<ProlificScope>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
