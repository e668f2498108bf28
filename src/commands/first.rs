//! Leaderboards for the daily first-message game.

use super::{
    respond, stats_channel, Command, EmbedReply, Invocation, Reply, DEFAULT_LEADERBOARD_LIMIT,
};
use crate::error::Result;
use crate::first::stats;
use crate::types::{Context, Data, Error};
use poise::serenity_prelude as serenity;

const JUICE_BOARD_SIZE: usize = 5;

fn name_or_mention(invocation: &Invocation, user_id: u64) -> String {
    invocation
        .name_of(user_id)
        .unwrap_or_else(|| format!("<@{}>", user_id))
}

pub(crate) async fn leaderboard_reply(
    data: &Data,
    invocation: &Invocation,
    limit: usize,
) -> Result<Reply> {
    let channel_id = stats_channel(data, invocation);
    let claims = data.timed("claim store", data.tracker.history(channel_id)).await?;

    let board = stats::leaderboard(&claims);
    if board.is_empty() {
        return Ok(Reply::Text("Nobody has gotten a first yet!".to_string()));
    }

    let lines: Vec<String> = board
        .iter()
        .take(limit)
        .enumerate()
        .map(|(rank, (user_id, wins))| format!("**{}.** <@{}>: {}", rank + 1, user_id, wins))
        .collect();

    let mut embed = EmbedReply::new("First Leaderboard").description(format!(
        "Count of daily 1st wins\n\n{}",
        lines.join("\n")
    ));
    if let Some((user_id, streak)) = stats::current_streak(&claims) {
        embed = embed.footer(format!(
            "Most recent: {} 🔥 {} days",
            name_or_mention(invocation, user_id),
            streak
        ));
    }

    Ok(embed.into())
}

pub(crate) async fn first_stats_reply(
    data: &Data,
    invocation: &Invocation,
    user: Option<u64>,
) -> Result<Reply> {
    let user_id = user.unwrap_or(invocation.user_id);
    let channel_id = stats_channel(data, invocation);
    let claims = data.timed("claim store", data.tracker.history(channel_id)).await?;

    let Some(user_stats) = stats::user_stats(&claims, user_id, data.tracker.timezone()) else {
        return Ok(Reply::Text(format!("<@{}> has never gotten a first!", user_id)));
    };

    let mut embed = EmbedReply::new(name_or_mention(invocation, user_id))
        .description("Your server statistics")
        .field("Score", format!("{} 🏆", user_stats.score), true)
        .field("Juice", format!("{} 🧃", user_stats.juice as u64), true)
        .field("Longest streak", format!("{} days 🔥", user_stats.longest_streak), true);

    let avatar = invocation
        .guild
        .as_ref()
        .and_then(|g| g.member(user_id))
        .and_then(|m| m.avatar_url.clone());
    if let Some(url) = avatar {
        embed = embed.thumbnail(url);
    }

    Ok(embed.into())
}

pub(crate) async fn juice_reply(data: &Data, invocation: &Invocation) -> Result<Reply> {
    let channel_id = stats_channel(data, invocation);
    let claims = data.timed("claim store", data.tracker.history(channel_id)).await?;
    let timezone = data.tracker.timezone();

    let board = stats::juice_board(&claims, timezone);
    if board.is_empty() {
        return Ok(Reply::Text("Nobody has gotten a first yet!".to_string()));
    }

    let mut embed = EmbedReply::new("Juice Board 🧃")
        .description("Total minutes between _1st and midnight");
    for (user_id, juice) in board.iter().take(JUICE_BOARD_SIZE) {
        embed = embed.field(
            name_or_mention(invocation, *user_id),
            (*juice as u64).to_string(),
            false,
        );
    }
    if let Some((user_id, minutes)) = stats::juice_high_score(&claims, timezone) {
        embed = embed.footer(format!(
            "1-Day Highscore: {}🧃{} mins",
            name_or_mention(invocation, user_id),
            minutes as u64
        ));
    }

    Ok(embed.into())
}

/// Show who has been first most often.
#[poise::command(slash_command, rename = "daily-leaderboard")]
pub async fn daily_leaderboard(
    context: Context<'_>,
    #[description = "How many places to show"]
    #[min = 1]
    #[max = 25]
    limit: Option<u8>,
) -> std::result::Result<(), Error> {
    let limit = limit.map(usize::from).unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    respond(context, Command::DailyLeaderboard { limit }).await
}

/// Score, juice and longest streak for one user.
#[poise::command(slash_command, rename = "first-stats")]
pub async fn first_stats(
    context: Context<'_>,
    #[description = "User to look up (defaults to you)"] user: Option<serenity::User>,
) -> std::result::Result<(), Error> {
    let user = user.map(|u| u.id.get());
    respond(context, Command::FirstStats { user }).await
}

/// Total minutes between midnight and each first, per user.
#[poise::command(slash_command)]
pub async fn juice(context: Context<'_>) -> std::result::Result<(), Error> {
    respond(context, Command::Juice).await
}
