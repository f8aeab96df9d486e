//! Guild registry and per-guild logging.
//!
//! This module keeps one [`GuildContext`] per reachable guild. A context bundles
//! the upstream connection handle with the guild configuration loaded from the
//! store and the channel/role lookups derived from it.
//!
//! # Lifecycle
//!
//! ```text
//! register(guild_id, connection) → context without configuration
//! load_config(guild_id, store)   → context with configuration and lookups (dispatch-ready)
//! lookup(guild_id)               → in-memory read on the dispatch path
//! retain(reachable ids)          → stale contexts evicted on reconciliation
//! ```
//!
//! - [`GuildRegistry`] - the map of contexts and the token resolution rules
//! - [`log_info`] and [`log_error`] - send messages to a guild's log channel,
//!   falling back to the process log

mod context;
mod logger;
mod registry;

pub use crate::guilds::context::{GuildContext, ResolvedChannel, ResolvedRole};
pub use crate::guilds::logger::{log_error, log_info};
pub use crate::guilds::registry::GuildRegistry;

use crate::store::StoreError;

/// Errors returned by the guild registry.
#[derive(Debug, thiserror::Error)]
pub enum GuildError {
    /// The guild id is empty or malformed.
    #[error("invalid guild id {0:?}")]
    InvalidGuild(String),

    /// No context is registered for the guild.
    #[error("guild {0} is not registered")]
    NotFound(String),

    /// Neither the guild nor the core configuration defines the token.
    #[error("token {token} is not configured for guild {guild} nor globally")]
    TokenNotFound {
        /// Guild the token was requested for
        guild: String,
        /// Requested token name
        token: String,
    },

    /// Loading the guild configuration failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
