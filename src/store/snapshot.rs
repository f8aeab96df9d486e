//! Whole-store export and import.
//!
//! A [`Snapshot`] groups the core configuration, the games list and every guild
//! configuration into a single JSON document. Snapshots never carry revisions:
//! they are meant to be reloaded into a fresh store.
//!
//! # File Layout
//!
//! ```text
//! <backup_dir>/db_<YYYYMMDD>_<unix millis>.json   written before every import
//! <latest_path> (db.json)                          written after every export/import
//! ```

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::store::{
    CoreConfig, DOC_CONFIG, DOC_GAMES, DocumentStore, GamesList, GuildConfig, StoreError,
    Versioned,
};

/// Revision-free copy of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Core configuration, if one was stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<CoreConfig>,
    /// Games list, if one was stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub games: Option<GamesList>,
    /// Every guild configuration
    #[serde(default)]
    pub servers: Vec<GuildEntry>,
}

/// A guild configuration together with its guild id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildEntry {
    /// Guild id, used as the document key
    #[serde(rename = "_id")]
    pub id: String,
    /// The guild configuration
    #[serde(flatten)]
    pub config: GuildConfig,
}

impl Snapshot {
    /// Checks that the snapshot can be imported as a whole.
    ///
    /// Guild ids must be non-empty, unique and distinct from the singleton
    /// keys, and at most one guild may be the default guild.
    pub fn validate(&self) -> Result<(), StoreError> {
        let mut ids = HashSet::new();
        let mut default_guild: Option<&str> = None;

        for server in &self.servers {
            if server.id.trim().is_empty() {
                return Err(StoreError::InvalidSnapshot(
                    "guild entry without id".to_string(),
                ));
            }
            if server.id == DOC_CONFIG || server.id == DOC_GAMES {
                return Err(StoreError::InvalidSnapshot(format!(
                    "guild id {} is reserved",
                    server.id
                )));
            }
            if !ids.insert(server.id.as_str()) {
                return Err(StoreError::InvalidSnapshot(format!(
                    "guild {} appears twice",
                    server.id
                )));
            }
            if server.config.is_default_guild() {
                if let Some(existing) = default_guild {
                    return Err(StoreError::DefaultGuildConflict {
                        existing: existing.to_string(),
                        rejected: server.id.clone(),
                    });
                }
                default_guild = Some(server.id.as_str());
            }
        }

        Ok(())
    }
}

/// Location of the snapshot files written around imports and exports.
#[derive(Debug, Clone)]
pub struct SnapshotArchive {
    /// Directory receiving timestamped backups
    backup_dir: PathBuf,
    /// Fixed-name snapshot for quick reload
    latest_path: PathBuf,
}

impl SnapshotArchive {
    /// Creates an archive writing backups in `backup_dir` and the latest
    /// snapshot at `latest_path`.
    pub fn new(backup_dir: impl Into<PathBuf>, latest_path: impl Into<PathBuf>) -> Self {
        SnapshotArchive {
            backup_dir: backup_dir.into(),
            latest_path: latest_path.into(),
        }
    }

    /// Returns the backup file name for a given instant.
    ///
    /// ```text
    /// db_20260419_1776600000000.json
    /// ```
    pub fn backup_file_name(now: DateTime<Local>) -> String {
        format!("db_{}_{}.json", now.format("%Y%m%d"), now.timestamp_millis())
    }

    /// Writes a timestamped backup and returns its path.
    pub async fn write_backup(&self, snapshot: &Snapshot) -> Result<PathBuf, StoreError> {
        let path = self
            .backup_dir
            .join(Self::backup_file_name(Local::now()));
        write_snapshot(&path, snapshot).await?;
        info!("created backup file {}", path.display());
        Ok(path)
    }

    /// Writes the fixed-name snapshot and returns its path.
    pub async fn write_latest(&self, snapshot: &Snapshot) -> Result<PathBuf, StoreError> {
        write_snapshot(&self.latest_path, snapshot).await?;
        info!("created reload file {}", self.latest_path.display());
        Ok(self.latest_path.clone())
    }

    /// Reads a snapshot file.
    pub async fn read(path: impl AsRef<Path>) -> Result<Snapshot, StoreError> {
        let serialized = fs::read_to_string(path.as_ref()).await?;
        Ok(serde_json::from_str(&serialized)?)
    }
}

async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut serialized = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut serialized, formatter);
    snapshot.serialize(&mut serializer)?;

    fs::write(path, serialized).await?;
    Ok(())
}

impl DocumentStore {
    /// Groups every known document into a [`Snapshot`], without revisions.
    pub async fn export_all(&self) -> Result<Snapshot, StoreError> {
        let mut snapshot = Snapshot::default();

        for document in self.documents().await {
            match document.key.as_str() {
                DOC_CONFIG => snapshot.config = Some(serde_json::from_value(document.doc)?),
                DOC_GAMES => snapshot.games = Some(serde_json::from_value(document.doc)?),
                _ if GuildConfig::is_guild_scoped(&document.doc) => {
                    snapshot.servers.push(GuildEntry {
                        id: document.key.clone(),
                        config: serde_json::from_value(document.doc)?,
                    })
                }
                key => debug!("skipping unknown document {} in export", key),
            }
        }

        debug!("exported {} guilds", snapshot.servers.len());
        Ok(snapshot)
    }

    /// Exports the store and writes both a backup and the latest snapshot.
    pub async fn export_to(&self, archive: &SnapshotArchive) -> Result<Snapshot, StoreError> {
        let snapshot = self.export_all().await?;
        archive.write_backup(&snapshot).await?;
        archive.write_latest(&snapshot).await?;
        Ok(snapshot)
    }

    /// Replaces the store content with `snapshot`.
    ///
    /// The sequence is:
    /// 1. validate the snapshot
    /// 2. write a timestamped backup of the current content
    /// 3. delete every guild configuration
    /// 4. write the core configuration and the games list
    /// 5. write each guild configuration
    /// 6. write the latest snapshot of the resulting store
    ///
    /// Nothing is modified before the backup exists.
    ///
    /// # Returns
    ///
    /// The path of the backup written in step 2.
    pub async fn import_all(
        &self,
        snapshot: &Snapshot,
        archive: &SnapshotArchive,
    ) -> Result<PathBuf, StoreError> {
        snapshot.validate()?;

        let backup_path = archive.write_backup(&self.export_all().await?).await?;

        for existing in self.guild_configs().await? {
            if let Some(rev) = &existing.rev {
                self.remove(&existing.key, rev).await?;
            }
        }

        if let Some(config) = &snapshot.config {
            self.save(DOC_CONFIG, Versioned::new(DOC_CONFIG, config.clone()))
                .await?;
        }
        if let Some(games) = &snapshot.games {
            self.save(DOC_GAMES, Versioned::new(DOC_GAMES, games.clone()))
                .await?;
        }
        for server in &snapshot.servers {
            self.save(&server.id, Versioned::new(&server.id, server.config.clone()))
                .await?;
        }

        archive.write_latest(&self.export_all().await?).await?;
        info!("imported {} guilds", snapshot.servers.len());

        Ok(backup_path)
    }
}
