//! HTTP client for the chat platform REST API.
//!
//! This module provides the [`DiscordClient`], the production [`Upstream`]
//! implementation. Every request carries the bot token given to
//! [`Upstream::login`].

use std::sync::{PoisonError, RwLock};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::upstream::{
    ChannelStub, CommandInvocation, CommandSchema, GuildStub, RoleStub, Upstream,
};

/// Interaction callback type answering with a channel message.
const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;

/// REST client for the chat platform.
///
/// # Examples
///
/// ```no_run
/// use guildbot::upstream::{DiscordClient, Upstream};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = DiscordClient::new("https://discord.com/api/v10");
/// client.login("bot-token").await?;
/// let guilds = client.fetch_guilds().await?;
/// println!("Reachable guilds: {:?}", guilds);
/// # Ok(())
/// # }
/// ```
pub struct DiscordClient {
    /// Base URL of the REST API, without trailing slash
    api_url: String,
    /// Bot token, set by a successful login
    token: RwLock<Option<String>>,
    /// HTTP client
    client: Client,
}

impl DiscordClient {
    /// Creates a client for the API at `api_url`.
    pub fn new(api_url: &str) -> Self {
        DiscordClient {
            api_url: api_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> anyhow::Result<RequestBuilder> {
        let token = self.token.read().unwrap_or_else(PoisonError::into_inner);
        let token = token
            .as_deref()
            .ok_or_else(|| anyhow!("not logged in to the platform"))?;
        Ok(request.header("Authorization", format!("Bot {}", token)))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let url = self.url(path);
        debug!("request GET {}", url);

        let response = self
            .authorized(self.client.get(&url))?
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response)
    }
}

#[async_trait]
impl Upstream for DiscordClient {
    /// Request `/users/@me` to check the token, then keep it for later calls.
    async fn login(&self, secret: &str) -> anyhow::Result<()> {
        let url = self.url("/users/@me");
        info!("logging in to the platform");

        self.client
            .get(&url)
            .header("Authorization", format!("Bot {}", secret))
            .send()
            .await?
            .error_for_status()
            .context("platform rejected the bot token")?;

        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(secret.to_string());
        info!("logged in");

        Ok(())
    }

    /// Request `/users/@me/guilds`.
    async fn fetch_guilds(&self) -> anyhow::Result<Vec<GuildStub>> {
        let guilds: Vec<GuildStub> = self.get_json("/users/@me/guilds").await?;
        info!("fetched {} guilds", guilds.len());
        Ok(guilds)
    }

    /// Request `/guilds/{guild_id}/channels`.
    async fn list_channels(&self, guild_id: &str) -> anyhow::Result<Vec<ChannelStub>> {
        self.get_json(&format!("/guilds/{}/channels", guild_id))
            .await
    }

    /// Request `/guilds/{guild_id}/roles`.
    async fn list_roles(&self, guild_id: &str) -> anyhow::Result<Vec<RoleStub>> {
        self.get_json(&format!("/guilds/{}/roles", guild_id)).await
    }

    /// Post to `/channels/{channel_id}/messages`.
    async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<()> {
        let url = self.url(&format!("/channels/{}/messages", channel_id));
        debug!("request POST {}", url);

        self.authorized(self.client.post(&url))?
            .json(&json!({ "content": content }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    /// Put the full command set to `/applications/{client_id}/guilds/{guild_id}/commands`.
    async fn put_guild_commands(
        &self,
        client_id: &str,
        guild_id: &str,
        commands: &[CommandSchema],
    ) -> anyhow::Result<()> {
        let url = self.url(&format!(
            "/applications/{}/guilds/{}/commands",
            client_id, guild_id
        ));
        debug!("request PUT {} with {} commands", url, commands.len());

        self.authorized(self.client.put(&url))?
            .json(commands)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    /// Post to `/interactions/{id}/{token}/callback`.
    async fn reply(&self, invocation: &CommandInvocation, content: &str) -> anyhow::Result<()> {
        let url = self.url(&format!(
            "/interactions/{}/{}/callback",
            invocation.id, invocation.token
        ));
        debug!("request POST {}", url);

        // Interaction callbacks are authenticated by the token in the path
        self.client
            .post(&url)
            .json(&json!({
                "type": CHANNEL_MESSAGE_WITH_SOURCE,
                "data": { "content": content }
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
