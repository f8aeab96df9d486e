//! Typed documents persisted in the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key of the [`CoreConfig`] singleton.
pub const DOC_CONFIG: &str = "config";
/// Key of the [`GamesList`] singleton.
pub const DOC_GAMES: &str = "games";
/// Logical name of the channel receiving a guild's log messages.
pub const LOG_CHANNEL: &str = "log";

/// Process-wide configuration stored under [`DOC_CONFIG`].
///
/// Secrets live in the store rather than in the configuration file so a
/// snapshot is enough to move a bot to another host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    /// Secret used to log in to the upstream platform
    #[serde(default, alias = "discordDevToken")]
    pub discord_token: String,
    /// Application id commands are registered under
    #[serde(default)]
    pub client_id: String,
    /// Shared API tokens, by token name
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

/// Game names the bot can display, stored under [`DOC_GAMES`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamesList {
    /// Display strings, without duplicates
    #[serde(default)]
    pub game_names: Vec<String>,
}

impl GamesList {
    /// Adds a game name unless it is already listed.
    ///
    /// Returns `true` when the name was added.
    pub fn add(&mut self, name: &str) -> bool {
        if self.game_names.iter().any(|existing| existing == name) {
            return false;
        }
        self.game_names.push(name.to_string());
        true
    }
}

/// Per-guild configuration, stored under the guild id.
///
/// The `isServerConfig` marker distinguishes guild documents from the
/// singletons when listing the whole store. At most one guild may carry the
/// default flag; [`DocumentStore::save_guild_config`](crate::store::DocumentStore::save_guild_config)
/// enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildConfig {
    /// Always `true` for guild documents
    #[serde(default = "guild_scoped")]
    pub is_server_config: bool,
    /// Whether this guild receives the boot notifications
    #[serde(
        default,
        alias = "isDefaultServer",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_default_guild: Option<bool>,
    /// Logical channel name → platform channel name
    #[serde(default)]
    pub channels: BTreeMap<String, String>,
    /// Logical role name → platform role name
    #[serde(default)]
    pub roles: BTreeMap<String, String>,
    /// API token overrides, by token name
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

fn guild_scoped() -> bool {
    true
}

impl Default for GuildConfig {
    fn default() -> Self {
        GuildConfig {
            is_server_config: true,
            is_default_guild: None,
            channels: BTreeMap::new(),
            roles: BTreeMap::new(),
            tokens: BTreeMap::new(),
        }
    }
}

impl GuildConfig {
    /// Returns `true` if the guild is flagged as the default guild.
    pub fn is_default_guild(&self) -> bool {
        self.is_default_guild.unwrap_or(false)
    }

    /// Returns `true` if a raw stored document is a guild configuration.
    pub fn is_guild_scoped(body: &Value) -> bool {
        body.get("isServerConfig")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_games_list_add_skips_duplicates() {
        let mut games = GamesList::default();

        assert!(games.add("Factorio"));
        assert!(games.add("Terraforming Mars"));
        assert!(!games.add("Factorio"));
        assert_eq!(games.game_names, vec!["Factorio", "Terraforming Mars"]);
    }

    #[test]
    fn test_guild_config_serializes_marker() {
        let value = serde_json::to_value(GuildConfig::default()).unwrap();

        assert_eq!(value["isServerConfig"], json!(true));
        assert!(value.get("isDefaultGuild").is_none());
        assert!(GuildConfig::is_guild_scoped(&value));
    }

    #[test]
    fn test_guild_config_reads_legacy_fields() {
        let value = json!({
            "isServerConfig": true,
            "isDefaultServer": true,
            "channels": { "log": "bot-logs" },
            "_rev": "3-abc"
        });

        let config: GuildConfig = serde_json::from_value(value).unwrap();
        assert!(config.is_default_guild());
        assert_eq!(config.channels.get(LOG_CHANNEL).unwrap(), "bot-logs");
        assert!(config.roles.is_empty());
    }

    #[test]
    fn test_core_config_reads_legacy_token_field() {
        let value = json!({
            "discordDevToken": "secret",
            "clientId": "42",
            "tokens": { "youtubeApiToken": "yt" }
        });

        let config: CoreConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.discord_token, "secret");
        assert_eq!(config.client_id, "42");
        assert_eq!(config.tokens.get("youtubeApiToken").unwrap(), "yt");
    }

    #[test]
    fn test_singletons_are_not_guild_scoped() {
        let core = serde_json::to_value(CoreConfig::default()).unwrap();
        let games = serde_json::to_value(GamesList::default()).unwrap();

        assert!(!GuildConfig::is_guild_scoped(&core));
        assert!(!GuildConfig::is_guild_scoped(&games));
    }
}
