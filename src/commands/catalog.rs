//! Command catalog.
//!
//! The [`CommandCatalog`] is built once at boot from a [`CommandSource`] and is
//! read-only afterwards.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::{
    commands::{COMMAND_UNIT_SUFFIX, CatalogError, CommandDescriptor, CommandSource},
    upstream::{CommandSchema, Upstream},
};

/// Command descriptors, by command name.
#[derive(Debug, Default)]
pub struct CommandCatalog {
    commands: BTreeMap<String, CommandDescriptor>,
}

impl CommandCatalog {
    /// Builds a catalog from the units of `source`.
    ///
    /// Units whose name does not end with `_command` are skipped.
    ///
    /// # Errors
    ///
    /// [`CatalogError::DuplicateCommand`] if two units declare the same
    /// command name. No command is registered in that case.
    pub fn load(source: &dyn CommandSource) -> Result<Self, CatalogError> {
        let mut commands = BTreeMap::new();

        for unit in source.units() {
            if !unit.unit_name.ends_with(COMMAND_UNIT_SUFFIX) {
                debug!("skipping unit {}", unit.unit_name);
                continue;
            }

            let name = unit.descriptor.name.clone();
            if commands.insert(name.clone(), unit.descriptor).is_some() {
                return Err(CatalogError::DuplicateCommand(name));
            }
            debug!("loaded command {} from unit {}", name, unit.unit_name);
        }

        info!("loaded {} commands", commands.len());
        Ok(CommandCatalog { commands })
    }

    /// Replaces the command set registered for a guild with this catalog.
    ///
    /// # Errors
    ///
    /// [`CatalogError::Publish`] if the platform refuses the set.
    pub async fn publish(
        &self,
        upstream: &dyn Upstream,
        client_id: &str,
        guild_id: &str,
    ) -> Result<(), CatalogError> {
        let schemas: Vec<CommandSchema> = self
            .commands
            .values()
            .map(CommandDescriptor::schema)
            .collect();

        upstream
            .put_guild_commands(client_id, guild_id, &schemas)
            .await
            .map_err(|source| CatalogError::Publish {
                guild: guild_id.to_string(),
                source,
            })?;
        info!("published {} commands to guild {}", schemas.len(), guild_id);

        Ok(())
    }

    /// Returns the descriptor of a command.
    pub fn resolve(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    /// Returns the command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    /// Returns the number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if the catalog holds no command.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        commands::{BuiltinCommands, CommandUnit, MockCommandHandler},
        upstream::MockUpstream,
    };

    struct Units(Vec<(&'static str, &'static str)>);

    impl CommandSource for Units {
        fn units(&self) -> Vec<CommandUnit> {
            self.0
                .iter()
                .map(|(unit_name, command)| CommandUnit {
                    unit_name: unit_name.to_string(),
                    descriptor: CommandDescriptor {
                        name: command.to_string(),
                        description: format!("{} command", command),
                        options: vec![],
                        handler: Arc::new(MockCommandHandler::new()),
                    },
                })
                .collect()
        }
    }

    #[test]
    fn test_load_builtin_commands() {
        let catalog = CommandCatalog::load(&BuiltinCommands).unwrap();

        assert_eq!(catalog.names(), vec!["roll", "time"]);
        assert!(catalog.resolve("roll").is_some());
        assert!(catalog.resolve("ban").is_none());
    }

    #[test]
    fn test_load_skips_units_without_suffix() {
        let source = Units(vec![("ping_command", "ping"), ("helpers", "helpers")]);

        let catalog = CommandCatalog::load(&source).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.names(), vec!["ping"]);
    }

    #[test]
    fn test_load_duplicate_registers_none() {
        let source = Units(vec![("ping_command", "ping"), ("pong_command", "ping")]);

        let result = CommandCatalog::load(&source);
        assert!(matches!(
            result,
            Err(CatalogError::DuplicateCommand(name)) if name == "ping"
        ));
    }

    #[tokio::test]
    async fn test_publish_submits_full_set() {
        let catalog = CommandCatalog::load(&BuiltinCommands).unwrap();
        let mut upstream = MockUpstream::new();
        upstream
            .expect_put_guild_commands()
            .withf(|client_id, guild_id, commands| {
                client_id == "99"
                    && guild_id == "42"
                    && commands.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
                        == vec!["roll", "time"]
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        catalog.publish(&upstream, "99", "42").await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_failure_names_guild() {
        let catalog = CommandCatalog::load(&BuiltinCommands).unwrap();
        let mut upstream = MockUpstream::new();
        upstream
            .expect_put_guild_commands()
            .returning(|_, _, _| Err(anyhow::anyhow!("missing access")));

        let result = catalog.publish(&upstream, "99", "42").await;
        assert!(matches!(
            result,
            Err(CatalogError::Publish { guild, .. }) if guild == "42"
        ));
    }
}
