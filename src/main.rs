//! Guildbot - a guild automation bot for a chat platform.
//!
//! The bot connects to the platform, loads the configuration of every guild it
//! can reach from a revisioned document store, publishes its slash commands to
//! each guild and answers the interactions it receives.
//!
//! # Configuration
//!
//! Create a `config.yaml` file (see [`guildbot::config`] for every key):
//!
//! ```yaml
//! store:
//!   path: ./data/store.json
//! discord:
//!   api_url: https://discord.com/api/v10
//! ```
//!
//! Any value can be overridden with a `GUILDBOT_` environment variable:
//!
//! ```bash
//! export GUILDBOT_STORE__PATH="/var/lib/guildbot/store.json"
//! ```
//!
//! The bot token, the application id and the API tokens are read from the
//! store. Seed a new store by importing a snapshot.
//!
//! # Usage
//!
//! ```bash
//! guildbot --config config.yaml import ./db.json
//! guildbot --config config.yaml show
//! gateway-relay | guildbot --config config.yaml run
//! guildbot --config config.yaml run --events ./events.jsonl
//! guildbot --config config.yaml export
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (default: `info`)

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use tokio::io::BufReader;

use guildbot::{
    bot::Bot,
    commands::BuiltinCommands,
    config::Config,
    store::{DocumentStore, SnapshotArchive},
    upstream::DiscordClient,
};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    ///
    /// A missing file leaves every setting at its default.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boot the bot and answer the events read from stdin or a file
    Run {
        /// JSON-lines file to read events from instead of stdin
        #[arg(short, long)]
        events: Option<PathBuf>,
    },
    /// Write a timestamped backup and the latest snapshot of the store
    Export,
    /// Replace the store content with a snapshot, after backing it up
    Import {
        /// Snapshot file
        file: PathBuf,
    },
    /// Print the guild configurations held by the store
    Show,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Put logger at info level by default
    let env = Env::default().filter_or("RUST_LOG", "info");
    env_logger::init_from_env(env);

    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load config file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match execute(args.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command, config: Config) -> anyhow::Result<()> {
    let store = DocumentStore::open(&config.store.path)
        .await
        .with_context(|| format!("unable to open store {}", config.store.path.display()))?;

    match command {
        Command::Run { events } => run(store, &config, events).await,
        Command::Export => {
            let snapshot = store.export_to(&config.store.archive()).await?;
            info!("exported {} guilds", snapshot.servers.len());
            store.close().await?;
            Ok(())
        }
        Command::Import { file } => {
            let snapshot = SnapshotArchive::read(&file)
                .await
                .with_context(|| format!("unable to read snapshot {}", file.display()))?;
            let backup = store
                .import_all(&snapshot, &config.store.archive())
                .await?;
            info!("previous content saved to {}", backup.display());
            store.close().await?;
            Ok(())
        }
        Command::Show => {
            for line in store.summary().await? {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

async fn run(store: DocumentStore, config: &Config, events: Option<PathBuf>) -> anyhow::Result<()> {
    info!("Starting guildbot {}...", env!("CARGO_PKG_VERSION"));

    let upstream = Arc::new(DiscordClient::new(&config.discord.api_url));
    let bot = Bot::new(Arc::new(store), upstream, &BuiltinCommands).await?;
    bot.boot().await?;

    match events {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("unable to open event file {}", path.display()))?;
            bot.run(BufReader::new(file)).await;
        }
        None => bot.run(BufReader::new(tokio::io::stdin())).await,
    }

    bot.close().await
}
