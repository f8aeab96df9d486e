//! Built-in command handlers.
//!
//! - [`roll`] - random number in a range
//! - [`time`] - current local time

mod roll;
mod time;

use crate::commands::{CommandSource, CommandUnit};

/// Source listing the commands shipped with the bot.
pub struct BuiltinCommands;

impl CommandSource for BuiltinCommands {
    fn units(&self) -> Vec<CommandUnit> {
        vec![
            CommandUnit {
                unit_name: "roll_command".to_string(),
                descriptor: roll::descriptor(),
            },
            CommandUnit {
                unit_name: "time_command".to_string(),
                descriptor: time::descriptor(),
            },
        ]
    }
}
