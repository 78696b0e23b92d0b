mod catalog;
mod config;
mod itunes;
mod logging;
mod photos;
mod ports;
mod sync;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context, eyre::eyre};

use crate::{
    config::Config,
    itunes::ItunesClient,
    logging::setup_logging,
    photos::{ThumbnailBounds, compress_photos, generate_thumbnails},
    sync::{SyncOptions, run_sync},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "PORTFOLIO_ASSETS_CONFIG")]
    config: Option<PathBuf>,

    /// Console log level (default: info)
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// File log level (default: debug)
    #[arg(long, default_value = "debug", global = true)]
    log_file_level: log::LevelFilter,

    /// Path to log file
    #[arg(long, env = "PORTFOLIO_ASSETS_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download missing music previews and update the song catalog
    SyncPreviews {
        /// The song catalog JSON file (defaults to the configured path)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Directory to store downloaded audio previews in
        #[arg(long)]
        audio_dir: Option<PathBuf>,

        /// Pause between catalog entries, in milliseconds
        #[arg(long, default_value = "500")]
        delay_ms: u64,
    },
    /// Transcode portfolio photos to WebP
    CompressPhotos {
        /// Directory of uncompressed source photos
        #[arg(long)]
        input: Option<PathBuf>,

        /// Directory for the compressed WebP output
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Generate bounded-size thumbnails for processed photos
    Thumbnails {
        /// Directory of processed photos
        #[arg(long)]
        input: Option<PathBuf>,

        /// Directory for the generated thumbnails
        #[arg(long)]
        output: Option<PathBuf>,

        /// Maximum thumbnail width in pixels
        #[arg(long, default_value = "800")]
        max_width: u32,

        /// Maximum thumbnail height in pixels
        #[arg(long, default_value = "1200")]
        max_height: u32,
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

/// CLI flags win over config-file values; one of the two must be present.
fn require_path(cli: Option<PathBuf>, configured: Option<PathBuf>, what: &str) -> Result<PathBuf> {
    cli.or(configured).ok_or_else(|| {
        eyre!("No {what} given; pass the flag or set it in the config file")
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_logging(args.log_level, args.log_file.clone(), args.log_file_level)?;

    log::debug!("Portfolio asset pipeline starting");
    log::debug!("Loading configuration");

    let config = {
        if let Some(config) = args.config {
            Config::from_file(&config)
        } else {
            Config::load()
        }
    }
    .with_context(|| "Failed to load portfolio-assets config")?;

    match args.command {
        Commands::SyncPreviews {
            catalog,
            audio_dir,
            delay_ms,
        } => {
            let catalog = require_path(catalog, config.catalog_path(), "catalog file")?;
            let audio_dir = require_path(audio_dir, config.audio_directory_path(), "audio directory")?;
            let options = SyncOptions {
                request_delay: Duration::from_millis(delay_ms),
            };

            log::debug!("Starting preview sync for: {}", catalog.display());
            let client = ItunesClient::new()?;
            let summary = run_sync(&client, &catalog, &audio_dir, &options).await?;
            log::info!("Preview sync complete: {summary}");
        }
        Commands::CompressPhotos { input, output } => {
            let input = require_path(input, config.photo_source_path(), "photo source directory")?;
            let output = require_path(
                output,
                config.photo_processed_path(),
                "photo output directory",
            )?;

            log::debug!("Starting photo compression for: {}", input.display());
            let summary = compress_photos(&input, &output)?;
            log::info!("Photo compression complete: {summary}");
        }
        Commands::Thumbnails {
            input,
            output,
            max_width,
            max_height,
        } => {
            let input = require_path(
                input,
                config.photo_processed_path(),
                "thumbnail input directory",
            )?;
            let output = require_path(
                output,
                config.photo_thumbnail_path(),
                "thumbnail output directory",
            )?;
            let bounds = ThumbnailBounds {
                max_width,
                max_height,
            };

            log::debug!("Starting thumbnail generation for: {}", input.display());
            let summary = generate_thumbnails(&input, &output, bounds)?;
            log::info!("Thumbnail generation complete: {summary}");
        }
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                log::debug!("Creating default config");
                let path = Config::create_default()?;
                log::info!("Default config available at: {}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
    }

    Ok(())
}
