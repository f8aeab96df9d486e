//! Time command handler.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};

use crate::{
    commands::{CommandContext, CommandDescriptor, CommandHandler},
    upstream::CommandInvocation,
};

struct Time;

/// Returns the `time` command.
pub fn descriptor() -> CommandDescriptor {
    CommandDescriptor {
        name: "time".to_string(),
        description: "Print the time".to_string(),
        options: vec![],
        handler: Arc::new(Time),
    }
}

fn format_time<Tz: TimeZone>(now: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%H:%M:%S").to_string()
}

#[async_trait]
impl CommandHandler for Time {
    async fn execute(
        &self,
        invocation: &CommandInvocation,
        context: &CommandContext,
    ) -> anyhow::Result<()> {
        context
            .upstream
            .reply(invocation, &format_time(Local::now()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::{guilds::GuildRegistry, store::CoreConfig, upstream::MockUpstream};

    #[test]
    fn test_format_time() {
        let now = Utc.with_ymd_and_hms(2026, 4, 19, 7, 5, 9).unwrap();
        assert_eq!(format_time(now), "07:05:09");
    }

    #[tokio::test]
    async fn test_execute_replies_with_time() {
        let mut upstream = MockUpstream::new();
        upstream
            .expect_reply()
            .withf(|_, content| {
                content.len() == 8 && content.split(':').all(|part| part.parse::<u8>().is_ok())
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let context = CommandContext {
            guild: None,
            registry: Arc::new(GuildRegistry::new(CoreConfig::default())),
            upstream: Arc::new(upstream),
        };
        let invocation = CommandInvocation {
            id: "1".to_string(),
            token: "t".to_string(),
            guild_id: None,
            command_name: "time".to_string(),
            options: BTreeMap::new(),
            member: None,
        };

        descriptor()
            .handler
            .execute(&invocation, &context)
            .await
            .unwrap();
    }
}
