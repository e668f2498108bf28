//! Who invoked a command, where, and what the guild looked like at the time.
//!
//! Everything is copied out of the serenity cache up front so handlers never
//! hold a cache reference across an await.

use crate::types::Context;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;

/// Milliseconds between the Unix epoch and the first second of 2015.
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Creation time encoded in a Discord snowflake.
pub fn snowflake_created_at(id: u64) -> DateTime<Utc> {
    let ms = (id >> 22) as i64 + DISCORD_EPOCH_MS;
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Format used for dates in embeds and snapshot rows.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberSnapshot {
    pub id: u64,
    pub user_name: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
    pub is_bot: bool,
}

impl MemberSnapshot {
    /// Nickname if set, user name otherwise.
    pub fn shown_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.user_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiSnapshot {
    pub id: u64,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GuildSnapshot {
    pub id: u64,
    pub name: String,
    /// Reported member count; may exceed `members.len()` on large guilds
    pub member_count: u64,
    pub members: Vec<MemberSnapshot>,
    pub channels: Vec<ChannelSnapshot>,
    pub emojis: Vec<EmojiSnapshot>,
}

impl GuildSnapshot {
    pub fn from_guild(guild: &serenity::Guild) -> Self {
        let members = guild
            .members
            .values()
            .map(|member| MemberSnapshot {
                id: member.user.id.get(),
                user_name: member.user.name.clone(),
                display_name: member.nick.clone().or_else(|| member.user.global_name.clone()),
                avatar_url: member.user.avatar_url(),
                joined_at: member
                    .joined_at
                    .and_then(|ts| DateTime::from_timestamp(ts.unix_timestamp(), 0)),
                is_bot: member.user.bot,
            })
            .collect();

        let channels = guild
            .channels
            .values()
            .map(|channel| ChannelSnapshot {
                id: channel.id.get(),
                name: channel.name.clone(),
            })
            .collect();

        let emojis = guild
            .emojis
            .values()
            .map(|emoji| EmojiSnapshot {
                id: emoji.id.get(),
                name: emoji.name.clone(),
                url: emoji.url(),
            })
            .collect();

        Self {
            id: guild.id.get(),
            name: guild.name.clone(),
            member_count: guild.member_count,
            members,
            channels,
            emojis,
        }
    }

    pub fn member(&self, user_id: u64) -> Option<&MemberSnapshot> {
        self.members.iter().find(|m| m.id == user_id)
    }

    pub fn channel(&self, channel_id: u64) -> Option<&ChannelSnapshot> {
        self.channels.iter().find(|c| c.id == channel_id)
    }
}

/// The caller of a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub user_id: u64,
    pub user_name: String,
    pub channel_id: u64,
    pub guild: Option<GuildSnapshot>,
    pub now: DateTime<Utc>,
}

impl Invocation {
    pub fn new(user_id: u64, user_name: impl Into<String>, channel_id: u64) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            channel_id,
            guild: None,
            now: Utc::now(),
        }
    }

    pub fn in_guild(mut self, guild: GuildSnapshot) -> Self {
        self.guild = Some(guild);
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn from_context(ctx: Context<'_>) -> Self {
        let guild = ctx.guild().map(|guild| GuildSnapshot::from_guild(&guild));
        Self {
            user_id: ctx.author().id.get(),
            user_name: ctx.author().name.clone(),
            channel_id: ctx.channel_id().get(),
            guild,
            now: Utc::now(),
        }
    }

    /// Best known name for `user_id` in this guild.
    pub fn name_of(&self, user_id: u64) -> Option<String> {
        if user_id == self.user_id {
            if let Some(member) = self.guild.as_ref().and_then(|g| g.member(user_id)) {
                return Some(member.shown_name().to_string());
            }
            return Some(self.user_name.clone());
        }
        self.guild
            .as_ref()
            .and_then(|g| g.member(user_id))
            .map(|m| m.shown_name().to_string())
    }
}
