//! Messages sent to a guild's log channel.
//!
//! Each guild may configure a `log` channel. Messages about that guild go there
//! when the channel resolves; otherwise, or when sending fails, they are written
//! to the process log instead so nothing is lost.

use log::{error, info, warn};

use crate::guilds::GuildContext;

/// Prefix marking error messages in log channels.
const ERROR_PREFIX: &str = "❗";

/// Logs an informational message for a guild.
pub async fn log_info(guild: Option<&GuildContext>, message: &str) {
    let Some(guild) = guild else {
        warn!("unable to locate guild for message: {}", message);
        return;
    };

    if !send_to_log_channel(guild, message).await {
        info!("[guild {}] {}", guild.id, message);
    }
}

/// Logs an error message for a guild.
pub async fn log_error(guild: Option<&GuildContext>, message: &str) {
    let Some(guild) = guild else {
        error!("unable to locate guild for error: {}", message);
        return;
    };

    let message = format!("{} {}", ERROR_PREFIX, message);
    if !send_to_log_channel(guild, &message).await {
        error!("[guild {}] {}", guild.id, message);
    }
}

/// Returns `true` if the message reached the guild's log channel.
async fn send_to_log_channel(guild: &GuildContext, message: &str) -> bool {
    let Some(channel) = guild.log_channel() else {
        return false;
    };

    match guild.connection.send_message(&channel.id, message).await {
        Ok(()) => true,
        Err(e) => {
            error!(
                "unable to log to channel {} of guild {}: {:?}",
                channel.name, guild.id, e
            );
            false
        }
    }
}
