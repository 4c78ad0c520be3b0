mod browse_tui;
mod config;
mod database;
mod discogs_rs;
mod entities;
mod http_server;
mod logging;
mod ports;
mod services;
#[cfg(test)]
mod test_utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};

use crate::{
    config::Config,
    database::Database,
    http_server::app::{DEFAULT_PORT, HttpServerConfig},
    logging::setup_logging,
    ports::columnar::ColumnarSink,
    services::{
        clickhouse::ClickHouseSink,
        collection_sync::CollectionSyncService,
        discogs::client::DiscogsHttpAdapter,
        random_pick::{PickSource, RandomPickService},
    },
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "DISQ_CONFIG")]
    config: Option<PathBuf>,

    /// Console log level (default: off)
    #[arg(long, default_value = "off", global = true, env = "LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// File log level (default: debug)
    #[arg(long, default_value = "debug", global = true)]
    log_file_level: log::LevelFilter,

    /// Path to log file
    #[arg(long, env = "DISQ_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy a Discogs collection into the local database (and ClickHouse, if configured)
    Sync {
        /// Discogs username, defaults to discogs.user from the config
        user: Option<String>,

        /// Releases per page, 1 to 500
        #[arg(long)]
        per_page: Option<u32>,

        /// Wait between page requests, e.g. "2s"
        #[arg(long)]
        delay: Option<humantime::Duration>,

        /// Only write to SQLite, even when ClickHouse is configured
        #[arg(long)]
        no_clickhouse: bool,
    },
    /// Print random albums rated 3 or more
    Random {
        /// Pick from this artist instead, regardless of rating
        #[arg(short, long)]
        artist: Option<String>,

        #[arg(short = 'n', long, default_value = "1")]
        count: u32,

        #[arg(long, value_enum, default_value_t = PickSource::Auto)]
        source: PickSource,
    },
    /// List an artist's albums, oldest first
    Artist { name: String },
    /// Artists with several rated albums, best average first
    TopArtists,
    /// Count albums, artists and labels
    Stats,
    /// Browse the collection in the terminal
    Browse,
    /// Serve random picks over HTTP
    Serve {
        /// The port to run the server on
        #[arg(short, long, default_value_t = DEFAULT_PORT, env = "DISQ_HTTP_PORT")]
        port: u16,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

/// Load the config (explicit path, or the default location) and open its database.
async fn open(config_path: Option<&Path>) -> Result<(Config, Arc<Database>)> {
    let config = match config_path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .with_context(|| "Failed to load disq config")?;

    let database = Database::open(&config.database_path()).await?;
    Ok((config, Arc::new(database)))
}

async fn connect_columnar(config: &Config) -> Result<Option<Arc<dyn ColumnarSink>>> {
    let Some(clickhouse) = &config.clickhouse else {
        return Ok(None);
    };

    let sink = ClickHouseSink::connect(clickhouse).await?;
    sink.ensure_schema().await?;
    Ok(Some(Arc::new(sink)))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_logging(args.log_level, args.log_file.clone(), args.log_file_level)?;

    log::debug!("disq starting");

    match args.command {
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                log::debug!("Creating default config");
                let path = Config::create_default()?;
                println!("{}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
        Commands::Sync {
            user,
            per_page,
            delay,
            no_clickhouse,
        } => {
            let (config, database) = open(args.config.as_deref()).await?;
            let user = user
                .or_else(|| config.discogs.user.clone())
                .ok_or(eyre!(
                    "No Discogs user given. Pass one or set discogs.user in the config"
                ))?;
            let per_page = per_page.unwrap_or(config.discogs.per_page);
            let page_delay = match delay {
                Some(delay) => delay.into(),
                None => config.discogs.page_delay()?,
            };
            let columnar = if no_clickhouse {
                None
            } else {
                connect_columnar(&config).await?
            };

            let service = CollectionSyncService::new(
                database,
                DiscogsHttpAdapter::new(&config.discogs)?,
                columnar,
                page_delay,
            );
            let report = service.sync_collection(&user, per_page).await?;
            println!(
                "Synced {} releases over {} pages ({} new albums, {} new artists)",
                report.releases, report.pages, report.inserted.albums, report.inserted.artists
            );
        }
        Commands::Random {
            artist,
            count,
            source,
        } => {
            let (config, database) = open(args.config.as_deref()).await?;
            let columnar = match source {
                PickSource::Sqlite => None,
                _ => connect_columnar(&config).await?,
            };
            let picks = RandomPickService::new(database, columnar);

            match artist {
                Some(artist) => match picks.random_album_from_artist(source, &artist).await? {
                    Some(title) => println!("{} - {}", artist, title),
                    None => println!("No albums by {}", artist),
                },
                None => {
                    for album in picks.random_albums(source, count).await? {
                        println!("{} - {}", album.artist_name, album.title);
                    }
                }
            }
        }
        Commands::Artist { name } => {
            let (_, database) = open(args.config.as_deref()).await?;
            for row in database.albums_by_artist(&name).await? {
                let year = row.year.map(|y| y.to_string()).unwrap_or_default();
                println!("{:>4}  {}  ({}/5)", year, row.title, row.rating);
            }
        }
        Commands::TopArtists => {
            let (_, database) = open(args.config.as_deref()).await?;
            for artist in database.artist_rating_summary().await? {
                println!("{:.2}  {}", artist.avg_rating, artist.artist);
                for album in artist.albums {
                    println!("      {}", album);
                }
            }
        }
        Commands::Stats => {
            let (_, database) = open(args.config.as_deref()).await?;
            let counts = database.collection_counts().await?;
            println!("Albums:  {}", counts.albums);
            println!("Artists: {}", counts.artists);
            println!("Labels:  {}", counts.labels);
        }
        Commands::Browse => {
            let (_, database) = open(args.config.as_deref()).await?;
            browse_tui::run(database).await?;
        }
        Commands::Serve { port } => {
            let (config, database) = open(args.config.as_deref()).await?;
            let columnar = connect_columnar(&config).await?;
            log::info!("Starting HTTP server on port: {}", port);
            http_server::app::start(HttpServerConfig {
                port,
                picks: RandomPickService::new(database, columnar),
            })
            .await?;
        }
    }

    Ok(())
}
