//! Bot lifecycle: boot sequence and event loop.
//!
//! This module provides the [`Bot`], which wires the store, the guild registry,
//! the command catalog and the dispatcher together.
//!
//! # Boot Sequence
//!
//! ```text
//! open store → read core config → load catalog → login
//!     → for each reachable guild, one at a time:
//!           register → load_config → publish commands
//!     → evict unreachable guilds → announce on the default guild
//!     → consume events
//! ```
//!
//! Errors before the guild loop are fatal. Inside the loop, a guild whose
//! configuration fails to load is logged against itself and skipped, and a
//! guild whose commands cannot be published is logged but kept. The remaining
//! guilds still load.
//! Guilds are processed sequentially to stay under the platform's command
//! registration rate limits.

use std::{pin::pin, sync::Arc};

use anyhow::Context;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::io::AsyncBufRead;

use crate::{
    commands::{CommandCatalog, CommandSource, Dispatcher},
    guilds::{GuildRegistry, log_error, log_info},
    store::{CoreConfig, DOC_CONFIG, DocumentStore},
    upstream::{Upstream, event_feed},
};

/// Message posted on the default guild once the boot sequence completes.
const BOOT_MESSAGE: &str = "🤖 Bot loaded 🤖";

/// A guild that could not be loaded or given its commands, with the reason.
pub type GuildFailure = (String, anyhow::Error);

/// The running bot.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use guildbot::bot::Bot;
/// # use guildbot::commands::BuiltinCommands;
/// # use guildbot::store::DocumentStore;
/// # use guildbot::upstream::DiscordClient;
/// # async fn example() -> anyhow::Result<()> {
/// let store = Arc::new(DocumentStore::open("./data/store.json").await?);
/// let upstream = Arc::new(DiscordClient::new("https://discord.com/api/v10"));
///
/// let bot = Bot::new(store, upstream, &BuiltinCommands).await?;
/// bot.boot().await?;
/// bot.run(tokio::io::BufReader::new(tokio::io::stdin())).await;
/// # Ok(())
/// # }
/// ```
pub struct Bot {
    /// Document store, shared with the registry on load
    store: Arc<DocumentStore>,
    /// Contexts of the reachable guilds
    registry: Arc<GuildRegistry>,
    /// Commands published to every guild
    catalog: Arc<CommandCatalog>,
    /// Platform connection
    upstream: Arc<dyn Upstream>,
    /// Routes incoming interactions
    dispatcher: Dispatcher,
}

impl Bot {
    /// Prepares the bot: reads the core configuration, loads the commands of
    /// `source` and logs in.
    ///
    /// # Errors
    ///
    /// Fails if the core configuration is missing, if two commands share a name
    /// or if the platform rejects the login.
    pub async fn new(
        store: Arc<DocumentStore>,
        upstream: Arc<dyn Upstream>,
        source: &dyn CommandSource,
    ) -> anyhow::Result<Self> {
        let core = store
            .get::<CoreConfig>(DOC_CONFIG, None)
            .await
            .context("core configuration is missing, import a snapshot first")?
            .doc;

        for line in store.summary().await? {
            info!("{}", line);
        }

        let catalog = Arc::new(CommandCatalog::load(source)?);

        upstream.login(&core.discord_token).await?;

        let registry = Arc::new(GuildRegistry::new(core));
        let dispatcher = Dispatcher::new(
            Arc::clone(&catalog),
            Arc::clone(&registry),
            Arc::clone(&upstream),
        );

        Ok(Bot {
            store,
            registry,
            catalog,
            upstream,
            dispatcher,
        })
    }

    /// Returns the guild registry.
    pub fn registry(&self) -> &Arc<GuildRegistry> {
        &self.registry
    }

    /// Loads every reachable guild, then announces the boot on the default
    /// guild.
    ///
    /// # Returns
    ///
    /// The guilds that failed to load or to receive their commands.
    pub async fn boot(&self) -> anyhow::Result<Vec<GuildFailure>> {
        let failures = self.reconcile().await?;
        if !failures.is_empty() {
            warn!("{} guilds failed to load", failures.len());
        }

        log_info(self.registry.default_guild().as_deref(), BOOT_MESSAGE).await;
        info!("bot ready with {} guilds", self.registry.len());

        Ok(failures)
    }

    /// Aligns the registry with the guilds the bot can reach.
    ///
    /// Each guild is registered, configured and given the command set, one at a
    /// time. Guilds whose configuration fails to load are logged and left out
    /// of the registry, as are guilds no longer reachable. A guild whose
    /// command set is rejected is reported as a failure but stays registered.
    ///
    /// # Errors
    ///
    /// Fails only if the reachable guilds cannot be listed.
    pub async fn reconcile(&self) -> anyhow::Result<Vec<GuildFailure>> {
        let guilds = self
            .upstream
            .fetch_guilds()
            .await
            .context("unable to list reachable guilds")?;
        let client_id = self.registry.core_config().client_id.clone();

        let mut failures = Vec::new();
        let mut loaded = Vec::new();
        for guild in &guilds {
            if let Err(e) = self.load_guild(&guild.id).await {
                log_error(
                    self.registry.lookup(&guild.id).as_deref(),
                    &format!("unable to load guild {} ({}): {:#}", guild.id, guild.name, e),
                )
                .await;
                failures.push((guild.id.clone(), e));
                continue;
            }
            loaded.push(guild.id.clone());

            // A loaded guild stays registered even without its command set
            if let Err(e) = self
                .catalog
                .publish(self.upstream.as_ref(), &client_id, &guild.id)
                .await
            {
                let e = anyhow::Error::from(e);
                log_error(self.registry.lookup(&guild.id).as_deref(), &format!("{:#}", e)).await;
                failures.push((guild.id.clone(), e));
            }
        }

        let evicted = self.registry.retain(&loaded);
        debug!(
            "reconciled {} guilds, {} failed, {} evicted",
            loaded.len(),
            failures.len(),
            evicted.len()
        );

        Ok(failures)
    }

    async fn load_guild(&self, guild_id: &str) -> anyhow::Result<()> {
        self.registry
            .register(guild_id, Arc::clone(&self.upstream))?;
        self.registry.load_config(guild_id, &self.store).await?;
        Ok(())
    }

    /// Consumes events until the feed ends.
    ///
    /// Events are handled one at a time: a handler completes before the next
    /// event is read.
    pub async fn run<R>(&self, reader: R)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut events = pin!(event_feed(reader));

        while let Some(event) = events.next().await {
            let Some(interaction) = event.into_interaction() else {
                info!("gateway session ready");
                continue;
            };

            let outcome = self.dispatcher.dispatch(interaction).await;
            debug!("interaction dispatched: {:?}", outcome);
        }

        info!("event feed closed");
    }

    /// Stops the bot and flushes the store.
    pub async fn close(self) -> anyhow::Result<()> {
        match Arc::try_unwrap(self.store) {
            Ok(store) => store.close().await?,
            Err(_) => warn!("store still in use, not closing it"),
        }
        Ok(())
    }
}
