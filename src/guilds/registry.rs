//! In-memory map of guild contexts.
//!
//! This module provides the [`GuildRegistry`], explicitly constructed at boot and
//! shared behind an `Arc`. Contexts are stored as `Arc<GuildContext>` and replaced
//! wholesale, so a reader never observes a half-built context.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::{debug, info, warn};

use crate::{
    guilds::{GuildContext, GuildError},
    store::{CoreConfig, DocumentStore, GuildConfig},
    upstream::Upstream,
};

type ContextMap = HashMap<String, Arc<GuildContext>>;

/// Registry of every reachable guild.
///
/// # Thread Safety
///
/// The map sits behind a [`RwLock`] that is never held across an `.await`:
/// [`GuildRegistry::lookup`] is a plain in-memory read and never suspends.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use guildbot::guilds::GuildRegistry;
/// use guildbot::store::{CoreConfig, DocumentStore};
/// use guildbot::upstream::DiscordClient;
///
/// # async fn example() -> anyhow::Result<()> {
/// let store = DocumentStore::open("./data/store.json").await?;
/// let connection = Arc::new(DiscordClient::new("https://discord.com/api/v10"));
/// let registry = GuildRegistry::new(CoreConfig::default());
///
/// registry.register("1234", connection)?;
/// registry.load_config("1234", &store).await?;
/// assert!(registry.lookup("1234").unwrap().is_loaded());
/// # Ok(())
/// # }
/// ```
pub struct GuildRegistry {
    /// Core configuration holding the shared API tokens
    core: CoreConfig,
    /// Registered contexts, by guild id
    guilds: RwLock<ContextMap>,
}

impl GuildRegistry {
    /// Creates an empty registry falling back to `core` for shared tokens.
    pub fn new(core: CoreConfig) -> Self {
        GuildRegistry {
            core,
            guilds: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the core configuration.
    pub fn core_config(&self) -> &CoreConfig {
        &self.core
    }

    /// Creates or replaces the context of a guild, without configuration.
    ///
    /// # Errors
    ///
    /// [`GuildError::InvalidGuild`] if `guild_id` is empty.
    pub fn register(
        &self,
        guild_id: &str,
        connection: Arc<dyn Upstream>,
    ) -> Result<Arc<GuildContext>, GuildError> {
        if guild_id.trim().is_empty() {
            return Err(GuildError::InvalidGuild(guild_id.to_string()));
        }

        let context = Arc::new(GuildContext::new(guild_id, connection));
        self.write()
            .insert(guild_id.to_string(), Arc::clone(&context));
        debug!("registered guild {}", guild_id);

        Ok(context)
    }

    /// Loads the configuration of a registered guild.
    ///
    /// The configuration is read from the store, created with defaults if
    /// missing. Channel and role lookups are then resolved through the guild's
    /// connection; if the platform cannot list them the lookups stay empty and
    /// the guild is still loaded.
    ///
    /// # Errors
    ///
    /// - [`GuildError::NotFound`] if [`GuildRegistry::register`] was not called
    /// - [`GuildError::Store`] if the store cannot provide the configuration
    pub async fn load_config(
        &self,
        guild_id: &str,
        store: &DocumentStore,
    ) -> Result<Arc<GuildContext>, GuildError> {
        let context = self
            .lookup(guild_id)
            .ok_or_else(|| GuildError::NotFound(guild_id.to_string()))?;

        let config = store
            .get(guild_id, Some(GuildConfig::default()))
            .await?
            .doc;

        let channels = context
            .connection
            .list_channels(guild_id)
            .await
            .unwrap_or_else(|e| {
                warn!("unable to list channels of guild {}: {:?}", guild_id, e);
                Vec::new()
            });
        let roles = context
            .connection
            .list_roles(guild_id)
            .await
            .unwrap_or_else(|e| {
                warn!("unable to list roles of guild {}: {:?}", guild_id, e);
                Vec::new()
            });

        let loaded = Arc::new(context.with_config(config, &channels, &roles));
        self.write()
            .insert(guild_id.to_string(), Arc::clone(&loaded));
        info!("loaded config of guild {}", guild_id);

        Ok(loaded)
    }

    /// Returns the context of a guild.
    pub fn lookup(&self, guild_id: &str) -> Option<Arc<GuildContext>> {
        self.read().get(guild_id).cloned()
    }

    /// Resolves an API token for a guild.
    ///
    /// The guild's own token wins; otherwise the shared token of the core
    /// configuration is used. Empty values count as absent.
    ///
    /// # Errors
    ///
    /// [`GuildError::TokenNotFound`] if neither defines the token.
    pub fn resolve_api_token(&self, guild_id: &str, token_name: &str) -> Result<String, GuildError> {
        let guild_token = self.lookup(guild_id).and_then(|context| {
            context
                .config
                .as_ref()
                .and_then(|config| config.tokens.get(token_name))
                .filter(|token| !token.is_empty())
                .cloned()
        });

        guild_token
            .or_else(|| {
                self.core
                    .tokens
                    .get(token_name)
                    .filter(|token| !token.is_empty())
                    .cloned()
            })
            .ok_or_else(|| GuildError::TokenNotFound {
                guild: guild_id.to_string(),
                token: token_name.to_string(),
            })
    }

    /// Returns the guild flagged as default, if any.
    ///
    /// A linear scan: registries hold a handful of guilds.
    pub fn default_guild(&self) -> Option<Arc<GuildContext>> {
        self.read()
            .values()
            .find(|context| context.is_default_guild())
            .cloned()
    }

    /// Removes the context of a guild.
    pub fn remove(&self, guild_id: &str) -> Option<Arc<GuildContext>> {
        let removed = self.write().remove(guild_id);
        if removed.is_some() {
            info!("removed guild {}", guild_id);
        }
        removed
    }

    /// Keeps only the guilds in `guild_ids` and returns the evicted ids.
    pub fn retain(&self, guild_ids: &[String]) -> Vec<String> {
        let mut guilds = self.write();
        let mut evicted: Vec<String> = guilds
            .keys()
            .filter(|id| !guild_ids.contains(id))
            .cloned()
            .collect();
        evicted.sort();

        for id in &evicted {
            guilds.remove(id);
            info!("evicted unreachable guild {}", id);
        }

        evicted
    }

    /// Returns the registered guild ids, sorted.
    pub fn guild_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of registered guilds.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if no guild is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, ContextMap> {
        self.guilds.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ContextMap> {
        self.guilds.write().unwrap_or_else(PoisonError::into_inner)
    }
}
