//! Server, member, channel and emoji information.
//!
//! `server-info` also refreshes the member/emoji/channel snapshot tables the
//! analytics dashboard joins against.

use super::invocation::{format_timestamp, snowflake_created_at};
use super::{respond, stats_channel, Command, EmbedReply, Invocation, Reply, DEFAULT_EMOJI_LIMIT};
use crate::database::{ChannelRow, EmojiRow, MemberRow};
use crate::error::{BotError, Result};
use crate::first::stats;
use crate::recorder::EventKind;
use crate::types::{Context, Data, Error};
use poise::serenity_prelude as serenity;

fn guild_required(invocation: &Invocation) -> Result<&super::GuildSnapshot> {
    invocation
        .guild
        .as_ref()
        .ok_or_else(|| {
            BotError::InvalidArguments("This command only works inside a server".to_string())
        })
}

pub(crate) async fn server_info_reply(data: &Data, invocation: &Invocation) -> Result<Reply> {
    let guild = guild_required(invocation)?;

    let members: Vec<MemberRow> = guild
        .members
        .iter()
        .map(|m| MemberRow {
            id: m.id,
            user_name: m.user_name.clone(),
            display_name: m.display_name.clone(),
            avatar: m.avatar_url.clone(),
            created_at: format_timestamp(snowflake_created_at(m.id)),
        })
        .collect();
    let emojis: Vec<EmojiRow> = guild
        .emojis
        .iter()
        .map(|e| EmojiRow {
            id: e.id,
            name: e.name.clone(),
            guild_id: guild.id,
            url: e.url.clone(),
            created_at: format_timestamp(snowflake_created_at(e.id)),
        })
        .collect();
    let channels: Vec<ChannelRow> = guild
        .channels
        .iter()
        .map(|c| ChannelRow {
            id: c.id,
            name: c.name.clone(),
            created_at: format_timestamp(snowflake_created_at(c.id)),
        })
        .collect();

    let repo = data.snapshot_repository();
    let members_written = data.timed("database", repo.upsert_members(members)).await?;
    let emojis_written = data.timed("database", repo.upsert_emojis(emojis)).await?;
    let channels_written = data.timed("database", repo.upsert_channels(channels)).await?;
    tracing::info!(
        guild_id = guild.id,
        members = members_written,
        emojis = emojis_written,
        channels = channels_written,
        "Guild snapshot updated"
    );

    let embed = EmbedReply::new(&guild.name)
        .field("Created", format_timestamp(snowflake_created_at(guild.id)), false)
        .field("Members", guild.member_count.to_string(), true)
        .field("Channels", guild.channels.len().to_string(), true)
        .field("Emojis", guild.emojis.len().to_string(), true)
        .footer(format!(
            "Snapshot updated: {} members, {} emojis, {} channels",
            members_written, emojis_written, channels_written
        ));

    Ok(embed.into())
}

pub(crate) async fn member_info_reply(
    data: &Data,
    invocation: &Invocation,
    user: Option<u64>,
) -> Result<Reply> {
    let user_id = user.unwrap_or(invocation.user_id);
    let member = invocation.guild.as_ref().and_then(|g| g.member(user_id));

    let name = match invocation.name_of(user_id) {
        Some(name) => name,
        None => data
            .timed("database", data.snapshot_repository().member_name(user_id))
            .await?
            .unwrap_or_else(|| format!("User {}", user_id)),
    };

    let messages = data
        .timed("database", data.event_repository().count(EventKind::Message, Some(user_id), None))
        .await?;
    let claims = data
        .timed("claim store", data.tracker.history(stats_channel(data, invocation)))
        .await?;
    let firsts = stats::leaderboard(&claims)
        .into_iter()
        .find(|(id, _)| *id == user_id)
        .map(|(_, wins)| wins)
        .unwrap_or(0);

    let mut embed = EmbedReply::new(name)
        .description(format!("<@{}>", user_id))
        .field("Account created", format_timestamp(snowflake_created_at(user_id)), true);
    if let Some(joined) = member.and_then(|m| m.joined_at) {
        embed = embed.field("Joined", format_timestamp(joined), true);
    }
    embed = embed
        .field("Messages recorded", messages.to_string(), true)
        .field("Firsts", format!("{} 🏆", firsts), true);
    if let Some(url) = member.and_then(|m| m.avatar_url.clone()) {
        embed = embed.thumbnail(url);
    }

    Ok(embed.into())
}

pub(crate) async fn emoji_stats_reply(data: &Data, limit: usize) -> Result<Reply> {
    let usage = data
        .timed("database", data.event_repository().top_emojis(limit))
        .await?;

    if usage.is_empty() {
        return Ok(Reply::Text("No custom emojis recorded yet.".to_string()));
    }

    let lines: Vec<String> = usage
        .iter()
        .enumerate()
        .map(|(rank, emoji)| {
            format!(
                "**{}.** <:{}:{}> `{}`: {} uses",
                rank + 1,
                emoji.name,
                emoji.emoji_id,
                emoji.name,
                emoji.uses
            )
        })
        .collect();

    Ok(EmbedReply::new("Emoji Stats")
        .description(lines.join("\n"))
        .into())
}

pub(crate) async fn channel_info_reply(
    data: &Data,
    invocation: &Invocation,
    channel: Option<u64>,
) -> Result<Reply> {
    let channel_id = channel.unwrap_or(invocation.channel_id);
    let title = invocation
        .guild
        .as_ref()
        .and_then(|g| g.channel(channel_id))
        .map(|c| format!("#{}", c.name))
        .unwrap_or_else(|| format!("Channel {}", channel_id));

    let messages = data
        .timed(
            "database",
            data.event_repository().count(EventKind::Message, None, Some(channel_id)),
        )
        .await?;

    let mut embed = EmbedReply::new(title)
        .description(format!("<#{}>", channel_id))
        .field("Created", format_timestamp(snowflake_created_at(channel_id)), true)
        .field("Messages recorded", messages.to_string(), true);

    if data.eligibility.is_game_channel(channel_id) {
        let today = data.tracker.day_of(invocation.now);
        let claim = data
            .timed("claim store", data.tracker.claim_for_day(channel_id, today))
            .await?;
        let value = match claim {
            Some(claim) => format!(
                "<@{}> at {}",
                claim.user_id,
                claim.claimed_at.with_timezone(&data.tracker.timezone()).format("%H:%M:%S")
            ),
            None => "Nobody yet".to_string(),
        };
        embed = embed.field("First today", value, false);
    }

    Ok(embed.into())
}

/// Show server details and refresh the stored member, emoji and channel lists.
#[poise::command(slash_command, rename = "server-info", guild_only)]
pub async fn server_info(context: Context<'_>) -> std::result::Result<(), Error> {
    respond(context, Command::ServerInfo).await
}

/// Show details about a member.
#[poise::command(slash_command, rename = "member-info")]
pub async fn member_info(
    context: Context<'_>,
    #[description = "Member to look up (defaults to you)"] user: Option<serenity::User>,
) -> std::result::Result<(), Error> {
    let user = user.map(|u| u.id.get());
    respond(context, Command::MemberInfo { user }).await
}

/// Most used custom emojis.
#[poise::command(slash_command, rename = "emoji-stats")]
pub async fn emoji_stats(
    context: Context<'_>,
    #[description = "How many emojis to show"]
    #[min = 1]
    #[max = 25]
    limit: Option<u8>,
) -> std::result::Result<(), Error> {
    let limit = limit.map(usize::from).unwrap_or(DEFAULT_EMOJI_LIMIT);
    respond(context, Command::EmojiStats { limit }).await
}

/// Show details about a channel.
#[poise::command(slash_command, rename = "channel-info")]
pub async fn channel_info(
    context: Context<'_>,
    #[description = "Channel to look up (defaults to this one)"] channel: Option<serenity::Channel>,
) -> std::result::Result<(), Error> {
    let channel = channel.map(|c| c.id().get());
    respond(context, Command::ChannelInfo { channel }).await
}
