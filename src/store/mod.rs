//! Revisioned document store for the bot configuration.
//!
//! This module provides the persistence layer shared by every other part of the
//! bot. Documents are stored as `(key, revision, payload)` triples and every write
//! is checked against the current revision of its key.
//!
//! # Document Kinds
//!
//! - [`CoreConfig`] - singleton under [`DOC_CONFIG`], holds the upstream secret,
//!   the application id and the shared API tokens
//! - [`GamesList`] - singleton under [`DOC_GAMES`], the list of game names
//! - [`GuildConfig`] - one per guild, keyed by the guild id and marked with
//!   `isServerConfig = true`
//!
//! # Optimistic Concurrency
//!
//! ```text
//! save(key, doc without rev) → read current rev → compare_and_swap(key, rev, body)
//! save(key, doc with rev)    →                    compare_and_swap(key, rev, body)
//! ```
//!
//! A write whose revision does not match the stored one fails with
//! [`StoreError::Conflict`] and leaves the store untouched. Only the latest
//! revision of each key is kept.
//!
//! # Snapshots
//!
//! [`DocumentStore::export_all`] groups every known document into a [`Snapshot`]
//! without revisions, and [`DocumentStore::import_all`] reloads one after
//! writing a backup of the current content through a [`SnapshotArchive`].
//!
//! # Examples
//!
//! ```no_run
//! use guildbot::store::{DocumentStore, GuildConfig, Versioned};
//!
//! # async fn example() -> Result<(), guildbot::store::StoreError> {
//! let store = DocumentStore::open("./data/store.json").await?;
//! let config = store.get("1234", Some(GuildConfig::default())).await?;
//! store.save("1234", Versioned::new("1234", config.doc)).await?;
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

mod document_store;
mod documents;
mod guild_configs;
mod snapshot;

pub use crate::store::document_store::{DocumentStore, Revision, Versioned};
pub use crate::store::documents::{
    CoreConfig, DOC_CONFIG, DOC_GAMES, GamesList, GuildConfig, LOG_CHANNEL,
};
pub use crate::store::snapshot::{GuildEntry, Snapshot, SnapshotArchive};

/// Errors returned by the document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No document exists under the key and no default was supplied.
    #[error("document {0} not found")]
    NotFound(String),

    /// The revision attached to a write is not the current one.
    ///
    /// The caller must fetch the latest document and retry; the write was not
    /// applied.
    #[error("revision conflict on {key}: expected {expected:?}, found {actual:?}")]
    Conflict {
        /// Key of the rejected write
        key: String,
        /// Revision the write was based on
        expected: Option<Revision>,
        /// Revision currently stored
        actual: Option<Revision>,
    },

    /// A second guild configuration tried to become the default guild.
    #[error("guild {rejected} cannot be the default guild, {existing} already is")]
    DefaultGuildConflict {
        /// Guild already flagged as default
        existing: String,
        /// Guild whose write was rejected
        rejected: String,
    },

    /// A snapshot is malformed and was not imported.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Reading or writing a file failed.
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
