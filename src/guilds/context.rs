//! Resolved state of one guild.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    store::{GuildConfig, LOG_CHANNEL},
    upstream::{ChannelStub, RoleStub, Upstream},
};

/// A platform channel matched to a logical channel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChannel {
    /// Platform channel id
    pub id: String,
    /// Platform channel name
    pub name: String,
}

/// A platform role matched to a logical role name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    /// Platform role id
    pub id: String,
    /// Platform role name
    pub name: String,
}

/// Everything known about a registered guild.
///
/// Contexts are never mutated: loading a configuration builds a new context
/// that replaces the previous one in the [`GuildRegistry`](crate::guilds::GuildRegistry).
#[derive(Clone)]
pub struct GuildContext {
    /// Guild id
    pub id: String,
    /// Connection the guild is reachable through
    pub connection: Arc<dyn Upstream>,
    /// Guild configuration, `None` until loaded
    pub config: Option<GuildConfig>,
    /// Logical channel name → resolved channel
    channels: HashMap<String, ResolvedChannel>,
    /// Logical role name → resolved role
    roles: HashMap<String, ResolvedRole>,
}

impl GuildContext {
    /// Creates a context without configuration.
    pub fn new(id: &str, connection: Arc<dyn Upstream>) -> Self {
        GuildContext {
            id: id.to_string(),
            connection,
            config: None,
            channels: HashMap::new(),
            roles: HashMap::new(),
        }
    }

    /// Returns a copy of this context holding `config` and the lookups
    /// resolved against the platform channels and roles.
    ///
    /// Configured names are matched case-insensitively; names with no
    /// matching platform entry are left unresolved.
    pub fn with_config(
        &self,
        config: GuildConfig,
        channels: &[ChannelStub],
        roles: &[RoleStub],
    ) -> Self {
        let resolved_channels = config
            .channels
            .iter()
            .filter_map(|(logical, platform_name)| {
                channels
                    .iter()
                    .find(|channel| channel.name.eq_ignore_ascii_case(platform_name))
                    .map(|channel| {
                        (
                            logical.clone(),
                            ResolvedChannel {
                                id: channel.id.clone(),
                                name: channel.name.clone(),
                            },
                        )
                    })
            })
            .collect();

        let resolved_roles = config
            .roles
            .iter()
            .filter_map(|(logical, platform_name)| {
                roles
                    .iter()
                    .find(|role| role.name.eq_ignore_ascii_case(platform_name))
                    .map(|role| {
                        (
                            logical.clone(),
                            ResolvedRole {
                                id: role.id.clone(),
                                name: role.name.clone(),
                            },
                        )
                    })
            })
            .collect();

        GuildContext {
            id: self.id.clone(),
            connection: Arc::clone(&self.connection),
            config: Some(config),
            channels: resolved_channels,
            roles: resolved_roles,
        }
    }

    /// Returns `true` once the configuration is loaded.
    pub fn is_loaded(&self) -> bool {
        self.config.is_some()
    }

    /// Returns `true` if the loaded configuration flags the default guild.
    pub fn is_default_guild(&self) -> bool {
        self.config
            .as_ref()
            .is_some_and(GuildConfig::is_default_guild)
    }

    /// Returns the channel configured under a logical name.
    pub fn channel(&self, logical: &str) -> Option<&ResolvedChannel> {
        self.channels.get(logical)
    }

    /// Returns the channel receiving this guild's log messages.
    pub fn log_channel(&self) -> Option<&ResolvedChannel> {
        self.channel(LOG_CHANNEL)
    }

    /// Returns the role configured under a logical name.
    pub fn role(&self, logical: &str) -> Option<&ResolvedRole> {
        self.roles.get(logical)
    }
}

impl fmt::Debug for GuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuildContext")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("channels", &self.channels)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}
