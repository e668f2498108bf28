//! Ping command for bot health check.

use super::{respond, Command, Reply};
use crate::types::{Context, Error};

pub(crate) fn ping_reply() -> Reply {
    Reply::Text("Pong! 🏓".to_string())
}

/// Simple ping command to check if the bot is responsive.
#[poise::command(slash_command)]
pub async fn ping(context: Context<'_>) -> Result<(), Error> {
    respond(context, Command::Ping).await
}
