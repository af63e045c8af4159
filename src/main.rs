use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use music_catalog_db::config::{AppConfig, CliConfig, FileConfig};
use music_catalog_db::music_store::{
    AlbumRecord, CommitMode, DuplicateAlbumPolicy, DuplicateRatingPolicy, MusicStore,
    ProlificScope, RatingRecord, SingleRecord, SqliteMusicStore, StorePolicies, YearRange,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[command(name = "music-db", about = "Loads and queries a SQLite music catalog")]
struct CliArgs {
    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Transaction granularity of the loaders.
    #[clap(long, default_value = "per-item")]
    pub commit_mode: CommitMode,

    /// What to do with an album that already exists.
    #[clap(long, default_value = "reject")]
    pub duplicate_album: DuplicateAlbumPolicy,

    /// What to do when a user rates the same song twice.
    #[clap(long, default_value = "reject")]
    pub duplicate_rating: DuplicateRatingPolicy,

    /// Which songs count towards the prolific artists ranking.
    #[clap(long, default_value = "singles-only")]
    pub prolific_scope: ProlificScope,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct YearArgs {
    /// First year of the range, inclusive.
    #[clap(long)]
    from: i32,

    /// Last year of the range, inclusive. Defaults to `--from`.
    #[clap(long)]
    to: Option<i32>,
}

impl YearArgs {
    fn range(&self) -> YearRange {
        YearRange::new(self.from, self.to.unwrap_or(self.from))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates the database schema if needed and prints the table counts.
    Init,
    /// Deletes every row of every table.
    Clear,
    /// Prints the table counts.
    Stats,
    /// Loads singles from a JSON array.
    LoadSingles { file: PathBuf },
    /// Loads albums and their tracks from a JSON array.
    LoadAlbums { file: PathBuf },
    /// Loads usernames from a JSON array of strings.
    LoadUsers { file: PathBuf },
    /// Loads ratings from a JSON array.
    LoadRatings { file: PathBuf },
    /// Artists with the most songs released in a year range.
    ProlificArtists {
        #[clap(short, long, default_value_t = 10)]
        n: usize,
        #[command(flatten)]
        years: YearArgs,
    },
    /// Artists whose latest single came out in the given year.
    LastSingleArtists { year: i32 },
    /// Genres with the most songs.
    TopGenres {
        #[clap(short, long, default_value_t = 10)]
        n: usize,
    },
    /// Artists with both album tracks and singles.
    AlbumAndSingleArtists,
    /// Songs with the most ratings in a year range.
    MostRatedSongs {
        #[clap(short, long, default_value_t = 10)]
        n: usize,
        #[command(flatten)]
        years: YearArgs,
    },
    /// Users who gave the most ratings in a year range.
    MostEngagedUsers {
        #[clap(short, long, default_value_t = 10)]
        n: usize,
        #[command(flatten)]
        years: YearArgs,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse input file: {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(store: &SqliteMusicStore, command: Command) -> Result<()> {
    match command {
        Command::Init | Command::Stats => print_json(&store.counts()?),
        Command::Clear => {
            store.clear_database()?;
            print_json(&store.counts()?)
        }
        Command::LoadSingles { file } => {
            let singles = read_json::<SingleRecord>(&file)?;
            print_json(&store.load_singles(&singles)?)
        }
        Command::LoadAlbums { file } => {
            let albums = read_json::<AlbumRecord>(&file)?;
            print_json(&store.load_albums(&albums)?)
        }
        Command::LoadUsers { file } => {
            let usernames = read_json::<String>(&file)?;
            print_json(&store.load_users(&usernames)?)
        }
        Command::LoadRatings { file } => {
            let ratings = read_json::<RatingRecord>(&file)?;
            print_json(&store.load_ratings(&ratings)?)
        }
        Command::ProlificArtists { n, years } => {
            print_json(&store.most_prolific_individual_artists(n, years.range())?)
        }
        Command::LastSingleArtists { year } => {
            print_json(&store.artists_last_single_in_year(year)?)
        }
        Command::TopGenres { n } => print_json(&store.top_song_genres(n)?),
        Command::AlbumAndSingleArtists => print_json(&store.album_and_single_artists()?),
        Command::MostRatedSongs { n, years } => {
            print_json(&store.most_rated_songs(years.range(), n)?)
        }
        Command::MostEngagedUsers { n, years } => {
            print_json(&store.most_engaged_users(years.range(), n)?)
        }
    }
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        policies: StorePolicies {
            commit_mode: cli_args.commit_mode,
            duplicate_album: cli_args.duplicate_album,
            duplicate_rating: cli_args.duplicate_rating,
            prolific_scope: cli_args.prolific_scope,
        },
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening music database at {:?}...", config.db_path);
    let store = SqliteMusicStore::new(&config.db_path, config.policies)?;

    run(&store, cli_args.command)
}
