//! Configuration file structures for the bot.
//!
//! The configuration is a YAML file, every value of which can be overridden by
//! an environment variable prefixed with `GUILDBOT_` (`__` separates nested
//! keys). Missing values take their defaults.
//!
//! ```yaml
//! store:
//!   # Store file
//!   path: ./data/store.json
//!   # Directory receiving the timestamped backups
//!   backup_dir: ./data/backup
//!   # Latest snapshot, rewritten by every export and import
//!   latest_snapshot: ./data/db.json
//!
//! discord:
//!   # Base URL of the platform REST API
//!   api_url: https://discord.com/api/v10
//! ```
//!
//! ```bash
//! export GUILDBOT_STORE__PATH="/var/lib/guildbot/store.json"
//! export GUILDBOT_DISCORD__API_URL="http://localhost:8080/api"
//! ```
//!
//! Secrets (bot token, application id, API tokens) are not part of this file:
//! they live in the core configuration document of the store.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::store::SnapshotArchive;

/// Prefix of the environment variables overriding the file.
const ENV_PREFIX: &str = "GUILDBOT_";

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Config {
    /// Document store settings
    pub store: Store,
    /// Platform settings
    pub discord: Discord,
}

/// Document store settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Store {
    /// Store file, created on the first write.
    pub path: PathBuf,

    /// Directory receiving the `db_<date>_<millis>.json` backups written before
    /// every import and by every export.
    pub backup_dir: PathBuf,

    /// Snapshot rewritten after every import and export.
    pub latest_snapshot: PathBuf,
}

impl Default for Store {
    fn default() -> Self {
        Store {
            path: PathBuf::from("./data/store.json"),
            backup_dir: PathBuf::from("./data/backup"),
            latest_snapshot: PathBuf::from("./data/db.json"),
        }
    }
}

impl Store {
    /// Returns the archive writing snapshots to the configured locations.
    pub fn archive(&self) -> SnapshotArchive {
        SnapshotArchive::new(&self.backup_dir, &self.latest_snapshot)
    }
}

/// Platform settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Discord {
    /// Base URL of the REST API.
    ///
    /// # Examples
    ///
    /// - `https://discord.com/api/v10`
    /// - `http://localhost:8080/api` for a local relay
    pub api_url: String,
}

impl Default for Discord {
    fn default() -> Self {
        Discord {
            api_url: "https://discord.com/api/v10".to_string(),
        }
    }
}

impl Config {
    /// Loads the configuration from a YAML file and the environment.
    ///
    /// Values are merged in this order, later sources winning: defaults, the
    /// file at `path` (ignored if missing), `GUILDBOT_` environment variables.
    ///
    /// # Errors
    ///
    /// Fails if the file or a variable holds a value of the wrong type.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }
}
