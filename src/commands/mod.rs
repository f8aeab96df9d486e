//! Slash commands: definitions, catalog and dispatch.
//!
//! # Overview
//!
//! Commands are declared as [`CommandUnit`]s by a [`CommandSource`]. The
//! [`CommandCatalog`] takes the units following the `<name>_command` naming
//! convention, publishes their schemas to every guild, and the [`Dispatcher`]
//! routes each incoming interaction to the matching handler.
//!
//! ```text
//! CommandSource::units()
//!      │
//!      ▼
//! ┌────────────────┐   publish()   ┌───────────┐
//! │ CommandCatalog │ ────────────▶ │ platform  │
//! └────────────────┘               └───────────┘
//!      │ resolve()                      │
//!      ▼                                ▼
//! ┌────────────────┐   Interaction  ┌───────────┐
//! │   Dispatcher   │ ◀───────────── │ event feed│
//! └────────────────┘                └───────────┘
//!      │
//!      ▼
//! CommandHandler::execute()
//! ```
//!
//! # Module Organization
//!
//! - [`catalog`] - loading and publishing command descriptors
//! - [`dispatcher`] - routing interactions to handlers
//! - [`actions`] - the built-in `roll` and `time` commands

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use mockall::automock;

mod actions;
mod catalog;
mod dispatcher;

pub use crate::commands::actions::BuiltinCommands;
pub use crate::commands::catalog::CommandCatalog;
pub use crate::commands::dispatcher::{DispatchOutcome, Dispatcher};
use crate::{
    guilds::{GuildContext, GuildRegistry},
    upstream::{CommandInvocation, CommandSchema, OptionKind, OptionSchema, Upstream},
};

/// Platform type of chat input commands.
const CHAT_INPUT: u8 = 1;

/// Suffix a unit name must carry to be loaded as a command.
pub const COMMAND_UNIT_SUFFIX: &str = "_command";

/// Everything a handler can reach while executing.
#[derive(Clone)]
pub struct CommandContext {
    /// Context of the guild the command was invoked in, if registered
    pub guild: Option<Arc<GuildContext>>,
    /// Registry of every guild, for token resolution
    pub registry: Arc<GuildRegistry>,
    /// Connection used to answer the invocation
    pub upstream: Arc<dyn Upstream>,
}

/// Behavior of a command.
///
/// Handlers answer through [`CommandContext::upstream`]; an error is reported
/// to the guild's log channel by the [`Dispatcher`].
#[automock]
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Runs the command for one invocation.
    async fn execute(
        &self,
        invocation: &CommandInvocation,
        context: &CommandContext,
    ) -> anyhow::Result<()>;
}

/// One option declared by a command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOption {
    /// Option name
    pub name: String,
    /// Short help text
    pub description: String,
    /// Value type
    pub kind: OptionKind,
    /// Whether the option must be supplied
    pub required: bool,
}

impl CommandOption {
    /// Creates an optional option.
    pub fn optional(name: &str, description: &str, kind: OptionKind) -> Self {
        CommandOption {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: false,
        }
    }
}

/// A command: its declared shape and its handler.
#[derive(Clone)]
pub struct CommandDescriptor {
    /// Command name, unique within a catalog
    pub name: String,
    /// Short help text
    pub description: String,
    /// Declared options
    pub options: Vec<CommandOption>,
    /// Behavior
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandDescriptor {
    /// Returns the schema submitted to the platform for this command.
    pub fn schema(&self) -> CommandSchema {
        CommandSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            kind: CHAT_INPUT,
            options: self
                .options
                .iter()
                .map(|option| OptionSchema {
                    kind: option.kind.code(),
                    name: option.name.clone(),
                    description: option.description.clone(),
                    required: option.required,
                })
                .collect(),
        }
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A named unit exposing a command, as listed by a [`CommandSource`].
#[derive(Debug, Clone)]
pub struct CommandUnit {
    /// Unit name, `<name>_command` for units holding a command
    pub unit_name: String,
    /// Command held by the unit
    pub descriptor: CommandDescriptor,
}

/// Provider of command units.
pub trait CommandSource {
    /// Lists every available unit.
    fn units(&self) -> Vec<CommandUnit>;
}

/// Errors returned by the command catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Two units declare the same command name.
    #[error("command {0} is declared twice")]
    DuplicateCommand(String),

    /// The platform refused the command set of a guild.
    #[error("unable to publish commands to guild {guild}")]
    Publish {
        /// Guild the commands were published to
        guild: String,
        /// Platform error
        #[source]
        source: anyhow::Error,
    },
}
