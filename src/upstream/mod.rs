//! Chat platform integration.
//!
//! This module defines the [`Upstream`] trait, the only way the rest of the bot
//! talks to the chat platform, together with the data it exchanges:
//!
//! - [`DiscordClient`] - implementation over the platform REST API
//! - [`Event`] and [`event_feed`] - inbound events read as JSON lines from a
//!   gateway relay
//! - [`CommandSchema`] - the wire shape of a registered command
//!
//! # Architecture
//!
//! ```text
//! gateway relay ──JSON lines──▶ event_feed ──▶ Bot::run ──▶ Dispatcher
//!                                                  │
//! platform REST ◀──────────── DiscordClient ◀──────┘ (login, guilds, commands, messages)
//! ```

mod discord;
mod events;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

pub use crate::upstream::discord::DiscordClient;
pub use crate::upstream::events::{
    CommandInvocation, ComponentInvocation, Event, Interaction, Member, event_feed,
};

/// A guild the bot account can reach.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GuildStub {
    /// Guild id
    pub id: String,
    /// Display name of the guild
    #[serde(default)]
    pub name: String,
}

/// A channel of a guild.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelStub {
    /// Channel id
    pub id: String,
    /// Channel name, matched case-insensitively against the configuration
    #[serde(default)]
    pub name: String,
}

/// A role of a guild.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RoleStub {
    /// Role id
    pub id: String,
    /// Role name, matched case-insensitively against the configuration
    #[serde(default)]
    pub name: String,
}

/// Application command definition as submitted to the platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSchema {
    /// Command name, as typed after `/`
    pub name: String,
    /// Short help text
    pub description: String,
    /// Command type, `1` for chat input commands
    #[serde(rename = "type")]
    pub kind: u8,
    /// Declared options
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionSchema>,
}

/// One option of a [`CommandSchema`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionSchema {
    /// Option type, see [`OptionKind`]
    #[serde(rename = "type")]
    pub kind: u8,
    /// Option name
    pub name: String,
    /// Short help text
    pub description: String,
    /// Whether the option must be supplied
    pub required: bool,
}

/// Option value types supported by the built-in commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Free text
    String,
    /// Whole number
    Integer,
    /// Yes or no
    Boolean,
}

impl OptionKind {
    /// Numeric code used by the platform.
    pub fn code(self) -> u8 {
        match self {
            OptionKind::String => 3,
            OptionKind::Integer => 4,
            OptionKind::Boolean => 5,
        }
    }
}

/// Operations the bot needs from the chat platform.
///
/// Implemented by [`DiscordClient`]; tests use the generated `MockUpstream`.
#[automock]
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Authenticates with the platform secret.
    async fn login(&self, secret: &str) -> anyhow::Result<()>;
    /// Lists the guilds the bot account can reach.
    async fn fetch_guilds(&self) -> anyhow::Result<Vec<GuildStub>>;
    /// Lists the channels of a guild.
    async fn list_channels(&self, guild_id: &str) -> anyhow::Result<Vec<ChannelStub>>;
    /// Lists the roles of a guild.
    async fn list_roles(&self, guild_id: &str) -> anyhow::Result<Vec<RoleStub>>;
    /// Posts a message in a channel.
    async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<()>;
    /// Replaces the whole command set registered for a guild.
    async fn put_guild_commands(
        &self,
        client_id: &str,
        guild_id: &str,
        commands: &[CommandSchema],
    ) -> anyhow::Result<()>;
    /// Answers a command invocation.
    async fn reply(&self, invocation: &CommandInvocation, content: &str) -> anyhow::Result<()>;
}
