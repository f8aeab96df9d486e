//! Interaction routing.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use log::debug;

use crate::{
    commands::{CommandCatalog, CommandContext},
    guilds::{GuildRegistry, log_error},
    upstream::{CommandInvocation, Interaction, Upstream},
};

/// What happened to a dispatched interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran successfully
    Handled,
    /// No command matches the invoked name
    Dropped,
    /// The handler returned an error or panicked, reported to the guild
    Failed,
    /// Component interactions are acknowledged but not acted upon
    Inert,
}

/// Routes interactions to the command handlers of a catalog.
///
/// A failing or panicking handler never stops the dispatcher: the error is
/// reported to the guild's log channel and the next interaction is processed
/// normally.
pub struct Dispatcher {
    catalog: Arc<CommandCatalog>,
    registry: Arc<GuildRegistry>,
    upstream: Arc<dyn Upstream>,
}

impl Dispatcher {
    /// Creates a dispatcher over a loaded catalog.
    pub fn new(
        catalog: Arc<CommandCatalog>,
        registry: Arc<GuildRegistry>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Dispatcher {
            catalog,
            registry,
            upstream,
        }
    }

    /// Dispatches one interaction.
    pub async fn dispatch(&self, interaction: Interaction) -> DispatchOutcome {
        match interaction {
            Interaction::Command(invocation) => self.dispatch_command(&invocation).await,
            Interaction::Component(invocation) => {
                debug!(
                    "ignoring component interaction {} in guild {:?}",
                    invocation.custom_id, invocation.guild_id
                );
                DispatchOutcome::Inert
            }
        }
    }

    async fn dispatch_command(&self, invocation: &CommandInvocation) -> DispatchOutcome {
        let Some(descriptor) = self.catalog.resolve(&invocation.command_name) else {
            debug!(
                "dropping unknown command {} in guild {:?}",
                invocation.command_name, invocation.guild_id
            );
            return DispatchOutcome::Dropped;
        };

        let guild = invocation
            .guild_id
            .as_deref()
            .and_then(|guild_id| self.registry.lookup(guild_id));
        let context = CommandContext {
            guild: guild.clone(),
            registry: Arc::clone(&self.registry),
            upstream: Arc::clone(&self.upstream),
        };

        debug!(
            "executing command {} in guild {:?}",
            descriptor.name, invocation.guild_id
        );
        let execution = AssertUnwindSafe(descriptor.handler.execute(invocation, &context));
        match execution.catch_unwind().await {
            Ok(Ok(())) => DispatchOutcome::Handled,
            Ok(Err(e)) => {
                log_error(
                    guild.as_deref(),
                    &format!("command {} failed: {:#}", descriptor.name, e),
                )
                .await;
                DispatchOutcome::Failed
            }
            Err(panic) => {
                log_error(
                    guild.as_deref(),
                    &format!(
                        "command {} panicked: {}",
                        descriptor.name,
                        panic_message(panic.as_ref())
                    ),
                )
                .await;
                DispatchOutcome::Failed
            }
        }
    }
}

/// Extracts the message of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        commands::{
            CommandDescriptor, CommandHandler, CommandSource, CommandUnit,
            MockCommandHandler,
        },
        store::{CoreConfig, DocumentStore, GuildConfig, Versioned},
        upstream::{ChannelStub, ComponentInvocation, MockUpstream},
    };

    struct Single(Arc<MockCommandHandler>);

    impl CommandSource for Single {
        fn units(&self) -> Vec<CommandUnit> {
            vec![CommandUnit {
                unit_name: "echo_command".to_string(),
                descriptor: CommandDescriptor {
                    name: "echo".to_string(),
                    description: "Echo".to_string(),
                    options: vec![],
                    handler: self.0.clone(),
                },
            }]
        }
    }

    /// Handler that panics instead of returning an error.
    struct Crash;

    #[async_trait::async_trait]
    impl CommandHandler for Crash {
        async fn execute(
            &self,
            _invocation: &CommandInvocation,
            _context: &CommandContext,
        ) -> anyhow::Result<()> {
            panic!("index out of range");
        }
    }

    struct WithCrash(Arc<MockCommandHandler>);

    impl CommandSource for WithCrash {
        fn units(&self) -> Vec<CommandUnit> {
            let mut units = Single(self.0.clone()).units();
            units.push(CommandUnit {
                unit_name: "crash_command".to_string(),
                descriptor: CommandDescriptor {
                    name: "crash".to_string(),
                    description: "Crash".to_string(),
                    options: vec![],
                    handler: Arc::new(Crash),
                },
            });
            units
        }
    }

    fn invocation(command_name: &str) -> CommandInvocation {
        CommandInvocation {
            id: "1".to_string(),
            token: "t".to_string(),
            guild_id: Some("42".to_string()),
            command_name: command_name.to_string(),
            options: BTreeMap::new(),
            member: None,
        }
    }

    fn dispatcher(handler: MockCommandHandler, upstream: MockUpstream) -> Dispatcher {
        let catalog = CommandCatalog::load(&Single(Arc::new(handler))).unwrap();
        let registry = Arc::new(GuildRegistry::new(CoreConfig::default()));
        Dispatcher::new(Arc::new(catalog), registry, Arc::new(upstream))
    }

    #[tokio::test]
    async fn test_dispatch_runs_handler() {
        let mut handler = MockCommandHandler::new();
        handler
            .expect_execute()
            .withf(|invocation, context| {
                invocation.command_name == "echo" && context.guild.is_none()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = dispatcher(handler, MockUpstream::new())
            .dispatch(Interaction::Command(invocation("echo")))
            .await;
        assert_eq!(outcome, DispatchOutcome::Handled);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_command_is_dropped() {
        let mut handler = MockCommandHandler::new();
        handler.expect_execute().times(0);
        let mut upstream = MockUpstream::new();
        upstream.expect_send_message().times(0);

        let outcome = dispatcher(handler, upstream)
            .dispatch(Interaction::Command(invocation("ban")))
            .await;
        assert_eq!(outcome, DispatchOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_dispatch_component_is_inert() {
        let mut handler = MockCommandHandler::new();
        handler.expect_execute().times(0);

        let outcome = dispatcher(handler, MockUpstream::new())
            .dispatch(Interaction::Component(ComponentInvocation {
                id: "2".to_string(),
                token: "t".to_string(),
                guild_id: Some("42".to_string()),
                custom_id: "video-select".to_string(),
                values: vec!["a".to_string()],
            }))
            .await;
        assert_eq!(outcome, DispatchOutcome::Inert);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_logged_to_guild() {
        let mut handler = MockCommandHandler::new();
        handler
            .expect_execute()
            .times(2)
            .returning(|_, _| Err(anyhow::anyhow!("boom")));

        let mut guild_connection = MockUpstream::new();
        guild_connection.expect_list_channels().returning(|_| {
            Ok(vec![ChannelStub {
                id: "7".to_string(),
                name: "bot-logs".to_string(),
            }])
        });
        guild_connection.expect_list_roles().returning(|_| Ok(vec![]));
        guild_connection
            .expect_send_message()
            .withf(|channel_id, content| {
                channel_id == "7" && content.starts_with("❗ command echo failed")
            })
            .times(2)
            .returning(|_, _| Ok(()));

        let store = DocumentStore::in_memory();
        let config = GuildConfig {
            channels: BTreeMap::from([("log".to_string(), "bot-logs".to_string())]),
            ..GuildConfig::default()
        };
        store.save("42", Versioned::new("42", config)).await.unwrap();

        let catalog = CommandCatalog::load(&Single(Arc::new(handler))).unwrap();
        let registry = Arc::new(GuildRegistry::new(CoreConfig::default()));
        registry.register("42", Arc::new(guild_connection)).unwrap();
        registry.load_config("42", &store).await.unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(catalog),
            registry,
            Arc::new(MockUpstream::new()),
        );

        // The dispatcher keeps going after a failure
        for _ in 0..2 {
            let outcome = dispatcher
                .dispatch(Interaction::Command(invocation("echo")))
                .await;
            assert_eq!(outcome, DispatchOutcome::Failed);
        }
    }

    #[tokio::test]
    async fn test_dispatch_panic_is_logged_and_loop_survives() {
        let mut handler = MockCommandHandler::new();
        handler
            .expect_execute()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut guild_connection = MockUpstream::new();
        guild_connection.expect_list_channels().returning(|_| {
            Ok(vec![ChannelStub {
                id: "7".to_string(),
                name: "bot-logs".to_string(),
            }])
        });
        guild_connection.expect_list_roles().returning(|_| Ok(vec![]));
        guild_connection
            .expect_send_message()
            .withf(|channel_id, content| {
                channel_id == "7"
                    && content.contains("command crash panicked: index out of range")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let store = DocumentStore::in_memory();
        let config = GuildConfig {
            channels: BTreeMap::from([("log".to_string(), "bot-logs".to_string())]),
            ..GuildConfig::default()
        };
        store.save("42", Versioned::new("42", config)).await.unwrap();

        let catalog = CommandCatalog::load(&WithCrash(Arc::new(handler))).unwrap();
        let registry = Arc::new(GuildRegistry::new(CoreConfig::default()));
        registry.register("42", Arc::new(guild_connection)).unwrap();
        registry.load_config("42", &store).await.unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(catalog),
            registry,
            Arc::new(MockUpstream::new()),
        );

        let outcome = dispatcher
            .dispatch(Interaction::Command(invocation("crash")))
            .await;
        assert_eq!(outcome, DispatchOutcome::Failed);

        let outcome = dispatcher
            .dispatch(Interaction::Command(invocation("echo")))
            .await;
        assert_eq!(outcome, DispatchOutcome::Handled);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&"owned".to_string()), "owned");
        assert_eq!(panic_message(&42), "unknown panic");
    }
}
