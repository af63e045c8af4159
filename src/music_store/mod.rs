mod loaders;
mod models;
mod policy;
mod queries;
mod report;
mod schema;
mod store;
mod trait_def;

pub use models::*;
pub use policy::{
    CommitMode, DuplicateAlbumPolicy, DuplicateRatingPolicy, ProlificScope, StorePolicies,
};
pub use report::{LoadReport, RejectReason, Rejected};
pub use schema::{CLEAR_ORDER, MUSIC_DB_VERSIONED_SCHEMAS};
pub use store::SqliteMusicStore;
pub use trait_def::MusicStore;
