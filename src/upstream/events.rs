//! Inbound events and the JSON-lines feed they arrive on.
//!
//! The gateway connection itself lives outside the bot: a relay writes one JSON
//! object per line, for example
//!
//! ```text
//! {"type":"ready"}
//! {"type":"command","id":"1","token":"t","guild_id":"42","command_name":"roll","options":{"max":6}}
//! {"type":"component","id":"2","token":"t","guild_id":"42","custom_id":"video-select","values":["a"]}
//! ```

use std::collections::BTreeMap;

use futures::{Stream, stream};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// An event delivered by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The gateway session is established
    Ready,
    /// A user invoked a command
    Command(CommandInvocation),
    /// A user interacted with a message component (menu, button)
    Component(ComponentInvocation),
}

impl Event {
    /// Returns the interaction carried by this event, if any.
    pub fn into_interaction(self) -> Option<Interaction> {
        match self {
            Event::Ready => None,
            Event::Command(invocation) => Some(Interaction::Command(invocation)),
            Event::Component(invocation) => Some(Interaction::Component(invocation)),
        }
    }
}

/// An interaction routed by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    /// Routed by command name
    Command(CommandInvocation),
    /// Routed by component id
    Component(ComponentInvocation),
}

/// A command invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandInvocation {
    /// Interaction id
    pub id: String,
    /// Token used to answer the interaction
    pub token: String,
    /// Guild the command was invoked in, `None` in direct messages
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Invoked command name
    pub command_name: String,
    /// Option values, by option name
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
    /// Invoking member
    #[serde(default)]
    pub member: Option<Member>,
}

impl CommandInvocation {
    /// Returns an integer option, if supplied.
    pub fn integer_option(&self, name: &str) -> Option<i64> {
        self.options.get(name).and_then(Value::as_i64)
    }

    /// Returns the name to address the invoking member with.
    pub fn member_name(&self) -> &str {
        self.member
            .as_ref()
            .map_or("someone", |member| member.display_name.as_str())
    }
}

/// A member of a guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// User id
    pub id: String,
    /// Name displayed in the guild
    pub display_name: String,
}

/// A component (menu or button) interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInvocation {
    /// Interaction id
    pub id: String,
    /// Token used to answer the interaction
    pub token: String,
    /// Guild the component lives in
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Identifier given to the component when it was sent
    pub custom_id: String,
    /// Selected values, for menus
    #[serde(default)]
    pub values: Vec<String>,
}

/// Turns a line-oriented reader into a stream of events.
///
/// Blank lines are ignored and malformed lines are logged and skipped. The
/// stream ends with the reader or on the first read error.
pub fn event_feed<R>(reader: R) -> impl Stream<Item = Event>
where
    R: AsyncBufRead + Unpin,
{
    stream::unfold(reader.lines(), |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Event>(&line) {
                        Ok(event) => {
                            debug!("received event {:?}", event);
                            return Some((event, lines));
                        }
                        Err(e) => warn!("skipping malformed event: {}", e),
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    error!("failed to read event feed: {}", e);
                    return None;
                }
            }
        }
    })
}
