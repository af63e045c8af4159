mod file_config;

pub use file_config::{FileConfig, PoliciesConfig};

use crate::music_store::StorePolicies;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub policies: StorePolicies,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub policies: StorePolicies,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }
        // A bare file name lives in the working directory.
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let file_policies = file.policies.unwrap_or_default();
        let policies = StorePolicies {
            commit_mode: file_policies
                .commit_mode
                .unwrap_or(cli.policies.commit_mode),
            duplicate_album: file_policies
                .duplicate_album
                .unwrap_or(cli.policies.duplicate_album),
            duplicate_rating: file_policies
                .duplicate_rating
                .unwrap_or(cli.policies.duplicate_rating),
            prolific_scope: file_policies
                .prolific_scope
                .unwrap_or(cli.policies.prolific_scope),
        };

        Ok(Self { db_path, policies })
    }
}
