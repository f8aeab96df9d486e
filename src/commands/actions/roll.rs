//! Roll command handler.
//!
//! Rolls a random integer between `min` and `max`, both included. Missing
//! bounds default to 1 and 100; reversed bounds are swapped.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use rand::Rng;

use crate::{
    commands::{CommandContext, CommandDescriptor, CommandHandler, CommandOption},
    upstream::{CommandInvocation, OptionKind},
};

const DEFAULT_MIN: i64 = 1;
const DEFAULT_MAX: i64 = 100;

struct Roll;

/// Returns the `roll` command.
pub fn descriptor() -> CommandDescriptor {
    CommandDescriptor {
        name: "roll".to_string(),
        description: "Roll a random number between 1 and 100 (or supply a custom range)"
            .to_string(),
        options: vec![
            CommandOption::optional("min", "Enter a minimum", OptionKind::Integer),
            CommandOption::optional("max", "Enter a maximum", OptionKind::Integer),
        ],
        handler: Arc::new(Roll),
    }
}

/// Returns the ordered bounds of a roll.
fn bounds(min: Option<i64>, max: Option<i64>) -> (i64, i64) {
    let min = min.unwrap_or(DEFAULT_MIN);
    let max = max.unwrap_or(DEFAULT_MAX);
    if min <= max { (min, max) } else { (max, min) }
}

fn roll<R: Rng>(rng: &mut R, min: i64, max: i64) -> i64 {
    rng.gen_range(min..=max)
}

fn format_roll(member: &str, min: i64, max: i64, result: i64) -> String {
    format!("Rolling ({}-{})\n{} rolls: {}", min, max, member, result)
}

#[async_trait]
impl CommandHandler for Roll {
    async fn execute(
        &self,
        invocation: &CommandInvocation,
        context: &CommandContext,
    ) -> anyhow::Result<()> {
        let (min, max) = bounds(
            invocation.integer_option("min"),
            invocation.integer_option("max"),
        );
        let result = roll(&mut rand::thread_rng(), min, max);
        debug!("rolled {} in ({}, {})", result, min, max);

        context
            .upstream
            .reply(
                invocation,
                &format_roll(invocation.member_name(), min, max, result),
            )
            .await
    }
}
