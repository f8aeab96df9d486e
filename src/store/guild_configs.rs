//! Guild configuration queries on top of the document store.

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::store::{DocumentStore, GuildConfig, StoreError, Versioned};

fn is_default_guild_body(body: &Value) -> bool {
    GuildConfig::is_guild_scoped(body)
        && GuildConfig::deserialize(body).is_ok_and(|config| config.is_default_guild())
}

impl DocumentStore {
    /// Returns every guild configuration in the store, ordered by guild id.
    ///
    /// Guild documents are recognised by their `isServerConfig` marker, the
    /// singletons are skipped.
    pub async fn guild_configs(&self) -> Result<Vec<Versioned<GuildConfig>>, StoreError> {
        let mut configs = Vec::new();

        for document in self.documents().await {
            if !GuildConfig::is_guild_scoped(&document.doc) {
                continue;
            }
            configs.push(Versioned {
                key: document.key,
                rev: document.rev,
                doc: serde_json::from_value(document.doc)?,
            });
        }

        Ok(configs)
    }

    /// Saves a guild configuration, refusing a second default guild.
    ///
    /// The check for an existing default guild and the write happen under the
    /// store lock, so two concurrent saves cannot both flag a default.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DefaultGuildConflict`] if `config` is flagged default
    ///   while another guild already is
    /// - any error of [`DocumentStore::save`]
    pub async fn save_guild_config(
        &self,
        guild_id: &str,
        config: Versioned<GuildConfig>,
    ) -> Result<Versioned<GuildConfig>, StoreError> {
        if !config.doc.is_default_guild() {
            debug!("saving config of guild {}", guild_id);
            return self.save(guild_id, config).await;
        }

        debug!("saving config of default guild {}", guild_id);
        self.save_guarded(guild_id, config, |documents| {
            let existing = documents
                .filter(|(key, _)| *key != guild_id)
                .find(|(_, body)| is_default_guild_body(body));
            match existing {
                Some((existing, _)) => {
                    warn!(
                        "rejecting default flag on guild {}, guild {} is already the default",
                        guild_id, existing
                    );
                    Err(StoreError::DefaultGuildConflict {
                        existing: existing.to_string(),
                        rejected: guild_id.to_string(),
                    })
                }
                None => Ok(()),
            }
        })
        .await
    }

    /// Describes each stored guild configuration on one line.
    ///
    /// Used at startup and by the `show` command to check what was loaded.
    pub async fn summary(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .guild_configs()
            .await?
            .iter()
            .map(|config| {
                format!(
                    "guild {}{}: channels={} roles={} tokens={}",
                    config.key,
                    if config.doc.is_default_guild() {
                        " (default)"
                    } else {
                        ""
                    },
                    config.doc.channels.len(),
                    config.doc.roles.len(),
                    config.doc.tokens.len(),
                )
            })
            .collect())
    }
}
