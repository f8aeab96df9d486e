//! File-backed document store with per-key revisions.
//!
//! This module provides the [`DocumentStore`], the single entry point for reading
//! and writing persisted documents. The whole store is kept in memory and flushed
//! to a JSON file after every successful write.

use std::{
    collections::BTreeMap,
    fmt,
    hash::{DefaultHasher, Hash, Hasher},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{fs, sync::Mutex};

use crate::store::StoreError;

/// Opaque revision token of a stored document.
///
/// Rendered as `<sequence>-<hash>`. The sequence advances on every write of a
/// key. The hash covers the body and a per-write salt, so a key that is removed
/// and written again with the same body never gets a previous token back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Builds the revision following `previous` for the given body and salt.
    fn next(previous: Option<&Revision>, body: &Value, salt: u64) -> Self {
        let sequence = previous.map_or(1, |rev| rev.sequence() + 1);
        let mut hasher = DefaultHasher::new();
        body.to_string().hash(&mut hasher);
        salt.hash(&mut hasher);
        Revision(format!("{}-{:016x}", sequence, hasher.finish()))
    }

    /// Returns the write sequence number of this revision.
    pub fn sequence(&self) -> u64 {
        self.0
            .split('-')
            .next()
            .and_then(|sequence| sequence.parse().ok())
            .unwrap_or(0)
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document together with its key and the revision it was read at.
///
/// A `Versioned` without revision is either new or meant to be written on top
/// of whatever revision is current, see [`DocumentStore::save`].
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// Key of the document
    pub key: String,
    /// Revision the document was read at, if any
    pub rev: Option<Revision>,
    /// Document payload
    pub doc: T,
}

impl<T> Versioned<T> {
    /// Wraps a document that carries no revision.
    pub fn new(key: impl Into<String>, doc: T) -> Self {
        Versioned {
            key: key.into(),
            rev: None,
            doc,
        }
    }
}

/// Latest revision of a key as written in the store file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    rev: Revision,
    body: Value,
}

type Documents = BTreeMap<String, StoredDocument>;

/// Key/document store with optimistic concurrency.
///
/// All access goes through an internal async mutex, so the store can be shared
/// behind an `Arc` between the bootstrapper and command handlers. Every write
/// is persisted before it is acknowledged; if persisting fails the in-memory
/// state is rolled back.
///
/// # Examples
///
/// ```no_run
/// use guildbot::store::{DocumentStore, GamesList, DOC_GAMES, Versioned};
///
/// # async fn example() -> Result<(), guildbot::store::StoreError> {
/// let store = DocumentStore::open("./data/store.json").await?;
/// let mut games = store.get(DOC_GAMES, Some(GamesList::default())).await?;
/// games.doc.add("Factorio");
/// store.save(DOC_GAMES, games).await?;
/// # Ok(())
/// # }
/// ```
pub struct DocumentStore {
    /// Store file, `None` for in-memory stores
    path: Option<PathBuf>,
    /// Latest revision of every document, by key
    documents: Mutex<Documents>,
    /// Mixed into every new revision, seeded randomly per opened store
    salt: AtomicU64,
}

impl DocumentStore {
    /// Opens the store persisted at `path`.
    ///
    /// A missing file opens an empty store; the file is created on the first
    /// write.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let documents: Documents = match fs::read_to_string(&path).await {
            Ok(serialized) => serde_json::from_str(&serialized)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "no store found at {}, starting with an empty store",
                    path.display()
                );
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "opened store {} with {} documents",
            path.display(),
            documents.len()
        );

        Ok(DocumentStore {
            path: Some(path),
            documents: Mutex::new(documents),
            salt: AtomicU64::new(rand::random()),
        })
    }

    /// Creates an empty store that is never written to disk.
    pub fn in_memory() -> Self {
        DocumentStore {
            path: None,
            documents: Mutex::new(BTreeMap::new()),
            salt: AtomicU64::new(rand::random()),
        }
    }

    /// Flushes the store and releases it.
    pub async fn close(self) -> Result<(), StoreError> {
        let documents = self.documents.lock().await;
        self.persist(&documents).await?;
        info!("closed store");
        Ok(())
    }

    /// Returns the current document under `key`.
    ///
    /// If the key is absent and `default` is supplied, the default is written
    /// at the initial revision and returned. The lookup and the creation happen
    /// under the same lock.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the key is absent and no default is given
    /// - [`StoreError::Serialization`] if the stored body does not decode as `T`
    pub async fn get<T>(&self, key: &str, default: Option<T>) -> Result<Versioned<T>, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut documents = self.documents.lock().await;

        if let Some(stored) = documents.get(key) {
            return Ok(Versioned {
                key: key.to_string(),
                rev: Some(stored.rev.clone()),
                doc: serde_json::from_value(stored.body.clone())?,
            });
        }

        let Some(doc) = default else {
            return Err(StoreError::NotFound(key.to_string()));
        };

        debug!("document {} not found, creating it", key);
        let body = serde_json::to_value(&doc)?;
        let rev = self.swap_locked(&mut documents, key, None, body).await?;

        Ok(Versioned {
            key: key.to_string(),
            rev: Some(rev),
            doc,
        })
    }

    /// Writes `document` under `key`.
    ///
    /// A document without revision is based on the latest stored revision,
    /// which is read and attached before writing. A document with a revision
    /// must match the stored one.
    ///
    /// # Returns
    ///
    /// The written document carrying its new revision.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] if the attached revision is stale or the key
    /// was removed meanwhile. Nothing is written in that case.
    pub async fn save<T>(&self, key: &str, document: Versioned<T>) -> Result<Versioned<T>, StoreError>
    where
        T: Serialize,
    {
        self.save_guarded(key, document, |_| Ok(())).await
    }

    /// Same as [`save`](Self::save), after `guard` accepted the stored
    /// documents. The guard and the write run under the same lock.
    pub(crate) async fn save_guarded<T, F>(
        &self,
        key: &str,
        document: Versioned<T>,
        guard: F,
    ) -> Result<Versioned<T>, StoreError>
    where
        T: Serialize,
        F: FnOnce(&mut dyn Iterator<Item = (&str, &Value)>) -> Result<(), StoreError>,
    {
        let mut documents = self.documents.lock().await;
        guard(&mut documents.iter().map(|(key, stored)| (key.as_str(), &stored.body)))?;

        let expected = match document.rev {
            Some(rev) => Some(rev),
            None => documents.get(key).map(|stored| stored.rev.clone()),
        };
        let body = serde_json::to_value(&document.doc)?;
        let rev = self
            .swap_locked(&mut documents, key, expected.as_ref(), body)
            .await?;

        Ok(Versioned {
            key: key.to_string(),
            rev: Some(rev),
            doc: document.doc,
        })
    }

    /// Writes `body` under `key` if the current revision equals `expected`.
    ///
    /// `expected = None` means the key must not exist yet.
    pub async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Revision>,
        body: Value,
    ) -> Result<Revision, StoreError> {
        let mut documents = self.documents.lock().await;
        self.swap_locked(&mut documents, key, expected, body).await
    }

    /// Deletes the document under `key` if its revision is still `rev`.
    pub async fn remove(&self, key: &str, rev: &Revision) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().await;
        Self::check_revision(&documents, key, Some(rev))?;
        self.apply(&mut documents, key, None).await?;
        debug!("removed document {}", key);
        Ok(())
    }

    /// Returns every stored document as raw JSON, ordered by key.
    pub async fn documents(&self) -> Vec<Versioned<Value>> {
        self.documents
            .lock()
            .await
            .iter()
            .map(|(key, stored)| Versioned {
                key: key.clone(),
                rev: Some(stored.rev.clone()),
                doc: stored.body.clone(),
            })
            .collect()
    }

    async fn swap_locked(
        &self,
        documents: &mut Documents,
        key: &str,
        expected: Option<&Revision>,
        body: Value,
    ) -> Result<Revision, StoreError> {
        Self::check_revision(documents, key, expected)?;

        let salt = self.salt.fetch_add(1, Ordering::Relaxed);
        let rev = Revision::next(expected, &body, salt);
        let stored = StoredDocument {
            rev: rev.clone(),
            body,
        };
        self.apply(documents, key, Some(stored)).await?;
        debug!("wrote document {} at revision {}", key, rev);

        Ok(rev)
    }

    fn check_revision(
        documents: &Documents,
        key: &str,
        expected: Option<&Revision>,
    ) -> Result<(), StoreError> {
        let actual = documents.get(key).map(|stored| &stored.rev);
        if actual != expected {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: expected.cloned(),
                actual: actual.cloned(),
            });
        }
        Ok(())
    }

    /// Replaces (or deletes) one entry and persists, rolling back on failure.
    async fn apply(
        &self,
        documents: &mut Documents,
        key: &str,
        next: Option<StoredDocument>,
    ) -> Result<(), StoreError> {
        let previous = match next {
            Some(stored) => documents.insert(key.to_string(), stored),
            None => documents.remove(key),
        };

        if let Err(e) = self.persist(documents).await {
            match previous {
                Some(stored) => documents.insert(key.to_string(), stored),
                None => documents.remove(key),
            };
            return Err(e);
        }

        Ok(())
    }

    async fn persist(&self, documents: &Documents) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write next to the store and rename so a crash never leaves half a file
        let serialized = serde_json::to_string(documents)?;
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, serialized).await?;
        fs::rename(&tmp_path, path).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::store::{CoreConfig, GamesList, GuildConfig};

    #[tokio::test]
    async fn test_get_missing_without_default_is_not_found() {
        let store = DocumentStore::in_memory();

        let result = store.get::<GuildConfig>("1234", None).await;
        assert!(matches!(result, Err(StoreError::NotFound(key)) if key == "1234"));
    }

    #[tokio::test]
    async fn test_get_missing_with_default_creates_document() {
        let store = DocumentStore::in_memory();

        let created = store
            .get("1234", Some(GuildConfig::default()))
            .await
            .unwrap();
        assert_eq!(created.rev.as_ref().unwrap().sequence(), 1);

        let fetched = store.get::<GuildConfig>("1234", None).await.unwrap();
        assert_eq!(fetched.rev, created.rev);
        assert_eq!(fetched.doc, GuildConfig::default());
    }

    #[tokio::test]
    async fn test_get_existing_ignores_default() {
        let store = DocumentStore::in_memory();
        let mut games = GamesList::default();
        games.add("Factorio");
        store.save("games", Versioned::new("games", games)).await.unwrap();

        let fetched = store
            .get("games", Some(GamesList::default()))
            .await
            .unwrap();
        assert_eq!(fetched.doc.game_names, vec!["Factorio"]);
    }

    #[tokio::test]
    async fn test_sequential_blind_saves_never_conflict() {
        let store = DocumentStore::in_memory();

        let first = store
            .save("config", Versioned::new("config", CoreConfig::default()))
            .await
            .unwrap();
        let second = store
            .save(
                "config",
                Versioned::new(
                    "config",
                    CoreConfig {
                        client_id: "42".to_string(),
                        ..CoreConfig::default()
                    },
                ),
            )
            .await
            .unwrap();

        assert_eq!(first.rev.unwrap().sequence(), 1);
        assert_eq!(second.rev.unwrap().sequence(), 2);

        let fetched = store.get::<CoreConfig>("config", None).await.unwrap();
        assert_eq!(fetched.doc.client_id, "42");
    }

    #[tokio::test]
    async fn test_save_with_stale_revision_conflicts() {
        let store = DocumentStore::in_memory();

        let first = store
            .save("games", Versioned::new("games", GamesList::default()))
            .await
            .unwrap();
        let stale_rev = first.rev.clone();
        store.save("games", first).await.unwrap();

        let mut games = GamesList::default();
        games.add("Stale");
        let result = store
            .save(
                "games",
                Versioned {
                    key: "games".to_string(),
                    rev: stale_rev,
                    doc: games,
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));

        // The rejected write left nothing behind
        let fetched = store.get::<GamesList>("games", None).await.unwrap();
        assert!(fetched.doc.game_names.is_empty());
        assert_eq!(fetched.rev.unwrap().sequence(), 2);
    }

    #[tokio::test]
    async fn test_save_with_revision_on_missing_key_conflicts() {
        let store = DocumentStore::in_memory();
        let created = store
            .save("games", Versioned::new("games", GamesList::default()))
            .await
            .unwrap();

        let result = store
            .save(
                "other",
                Versioned {
                    key: "other".to_string(),
                    rev: created.rev,
                    doc: GamesList::default(),
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::Conflict { actual: None, .. })));
    }

    #[tokio::test]
    async fn test_compare_and_swap_requires_absent_key_without_revision() {
        let store = DocumentStore::in_memory();

        let rev = store
            .compare_and_swap("key", None, json!({ "a": 1 }))
            .await
            .unwrap();
        let result = store.compare_and_swap("key", None, json!({ "a": 2 })).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));

        let next = store
            .compare_and_swap("key", Some(&rev), json!({ "a": 2 }))
            .await
            .unwrap();
        assert!(next.sequence() > rev.sequence());
    }

    #[tokio::test]
    async fn test_remove_checks_revision() {
        let store = DocumentStore::in_memory();
        let first = store
            .save("1234", Versioned::new("1234", GuildConfig::default()))
            .await
            .unwrap();
        let second = store.save("1234", first.clone()).await.unwrap();

        let result = store.remove("1234", first.rev.as_ref().unwrap()).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));

        store
            .remove("1234", second.rev.as_ref().unwrap())
            .await
            .unwrap();
        assert!(store.documents().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_keeps_only_latest_revision() {
        let store = DocumentStore::in_memory();
        for _ in 0..3 {
            store
                .save("games", Versioned::new("games", GamesList::default()))
                .await
                .unwrap();
        }

        let documents = store.documents().await;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].rev.as_ref().unwrap().sequence(), 3);
    }

    #[tokio::test]
    async fn test_reopen_restores_documents_and_revisions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("store.json");

        let store = DocumentStore::open(&path).await.unwrap();
        let saved = store
            .save("1234", Versioned::new("1234", GuildConfig::default()))
            .await
            .unwrap();
        store.close().await.unwrap();

        let reopened = DocumentStore::open(&path).await.unwrap();
        let fetched = reopened.get::<GuildConfig>("1234", None).await.unwrap();
        assert_eq!(fetched.rev, saved.rev);
    }

    #[tokio::test]
    async fn test_open_corrupted_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{ not json").await.unwrap();

        let result = DocumentStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }

    #[test]
    fn test_revision_sequence_advances() {
        let body = json!({});
        let first = Revision::next(None, &body, 0);
        let second = Revision::next(Some(&first), &body, 1);

        assert_eq!(first.sequence(), 1);
        assert_eq!(second.sequence(), 2);
        assert_ne!(first, second);
        assert!(second.as_str().starts_with("2-"));
    }

    #[tokio::test]
    async fn test_recreated_key_never_reuses_revision() {
        let store = DocumentStore::in_memory();

        let first = store
            .save("games", Versioned::new("games", GamesList::default()))
            .await
            .unwrap();
        let first_rev = first.rev.unwrap();
        store.remove("games", &first_rev).await.unwrap();

        let second = store
            .save("games", Versioned::new("games", GamesList::default()))
            .await
            .unwrap();
        let second_rev = second.rev.unwrap();

        assert_eq!(second_rev.sequence(), 1);
        assert_ne!(first_rev, second_rev);

        // A holder of the old token cannot touch the new document
        let result = store.remove("games", &first_rev).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let store = DocumentStore::open(&path).await.unwrap();

        let mut games = GamesList::default();
        games.add("Factorio");
        let saved = store
            .save("games", Versioned::new("games", games))
            .await
            .unwrap();
        let saved_rev = saved.rev.clone().unwrap();

        // A directory where the temporary file goes makes every write fail
        let blocker = path.with_extension("tmp");
        std::fs::create_dir(&blocker).unwrap();

        let mut games = saved.doc.clone();
        games.add("Satisfactory");
        let result = store
            .save("games", Versioned::new("games", games.clone()))
            .await;
        assert!(matches!(result, Err(StoreError::Io(_))));

        let result = store.remove("games", &saved_rev).await;
        assert!(matches!(result, Err(StoreError::Io(_))));

        let fetched = store.get::<GamesList>("games", None).await.unwrap();
        assert_eq!(fetched.rev.as_ref(), Some(&saved_rev));
        assert_eq!(fetched.doc.game_names, vec!["Factorio"]);

        // Once writable again, the store continues from the kept revision
        std::fs::remove_dir(&blocker).unwrap();
        let saved = store
            .save("games", Versioned::new("games", games))
            .await
            .unwrap();
        assert_eq!(saved.rev.unwrap().sequence(), 2);
    }

    #[tokio::test]
    async fn test_rejecting_guard_writes_nothing() {
        let store = DocumentStore::in_memory();
        store
            .save("games", Versioned::new("games", GamesList::default()))
            .await
            .unwrap();

        let result = store
            .save_guarded("config", Versioned::new("config", CoreConfig::default()), |documents| {
                assert_eq!(documents.map(|(key, _)| key).collect::<Vec<_>>(), vec!["games"]);
                Err(StoreError::NotFound("games".to_string()))
            })
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(store.documents().await.len(), 1);
    }
}
