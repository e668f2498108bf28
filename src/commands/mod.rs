//! Discord bot commands.
//!
//! Every command is a [`Command`] variant. Poise handles slash-command
//! routing, but each wrapper funnels into [`execute`] so validation, timeouts
//! and error replies behave the same whichever way a command arrives.
//! [`dispatch`] resolves a command from its name and raw arguments.

pub mod ai;
pub mod first;
pub mod invocation;
pub mod ping;
pub mod reply;
pub mod server;

pub use invocation::{GuildSnapshot, Invocation};
pub use reply::{EmbedReply, Reply};

use crate::error::Result;
use crate::recorder::{record_best_effort, EventKind, EventRecord};
use crate::types::{Context, Data, Error};
use serde_json::json;
use std::fmt;

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 5;
pub const DEFAULT_EMOJI_LIMIT: usize = 10;
pub const MAX_LIST_LIMIT: usize = 25;
pub const MAX_CHAT_PROMPT: usize = 2000;
pub const MAX_IMAGE_PROMPT: usize = 1000;

/// A fully parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ServerInfo,
    MemberInfo { user: Option<u64> },
    EmojiStats { limit: usize },
    ChannelInfo { channel: Option<u64> },
    DailyLeaderboard { limit: usize },
    Chat { prompt: String },
    Image { prompt: String },
    FirstStats { user: Option<u64> },
    Juice,
    ClearChat,
    Ping,
}

/// Why a raw invocation could not be turned into a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    NotFound(String),
    InvalidArguments(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "Unknown command: {}", name),
            Self::InvalidArguments(msg) => write!(f, "Invalid arguments: {}", msg),
        }
    }
}

impl From<ParseError> for Reply {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::NotFound(name) => Reply::NotFound(name),
            ParseError::InvalidArguments(msg) => Reply::InvalidArguments(msg),
        }
    }
}

impl Command {
    /// Every registered command name.
    pub const NAMES: [&'static str; 11] = [
        "server-info",
        "member-info",
        "emoji-stats",
        "channel-info",
        "daily-leaderboard",
        "chat",
        "image",
        "first-stats",
        "juice",
        "clear-chat",
        "ping",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ServerInfo => "server-info",
            Self::MemberInfo { .. } => "member-info",
            Self::EmojiStats { .. } => "emoji-stats",
            Self::ChannelInfo { .. } => "channel-info",
            Self::DailyLeaderboard { .. } => "daily-leaderboard",
            Self::Chat { .. } => "chat",
            Self::Image { .. } => "image",
            Self::FirstStats { .. } => "first-stats",
            Self::Juice => "juice",
            Self::ClearChat => "clear-chat",
            Self::Ping => "ping",
        }
    }

    /// Parse a command from its name and whitespace-separated arguments.
    pub fn parse(name: &str, args: &[&str]) -> std::result::Result<Self, ParseError> {
        let command = match name {
            "server-info" => {
                no_args(name, args)?;
                Self::ServerInfo
            }
            "member-info" => Self::MemberInfo {
                user: optional_id(name, args, &["<@!", "<@"])?,
            },
            "emoji-stats" => Self::EmojiStats {
                limit: optional_limit(name, args, DEFAULT_EMOJI_LIMIT)?,
            },
            "channel-info" => Self::ChannelInfo {
                channel: optional_id(name, args, &["<#"])?,
            },
            "daily-leaderboard" => Self::DailyLeaderboard {
                limit: optional_limit(name, args, DEFAULT_LEADERBOARD_LIMIT)?,
            },
            "chat" => Self::Chat {
                prompt: args.join(" "),
            },
            "image" => Self::Image {
                prompt: args.join(" "),
            },
            "first-stats" => Self::FirstStats {
                user: optional_id(name, args, &["<@!", "<@"])?,
            },
            "juice" => {
                no_args(name, args)?;
                Self::Juice
            }
            "clear-chat" => {
                no_args(name, args)?;
                Self::ClearChat
            }
            "ping" => {
                no_args(name, args)?;
                Self::Ping
            }
            other => return Err(ParseError::NotFound(other.to_string())),
        };

        command.validate()?;
        Ok(command)
    }

    /// Range and length checks shared by both entry points.
    pub fn validate(&self) -> std::result::Result<(), ParseError> {
        match self {
            Self::EmojiStats { limit } | Self::DailyLeaderboard { limit } => {
                if !(1..=MAX_LIST_LIMIT).contains(limit) {
                    return Err(ParseError::InvalidArguments(format!(
                        "limit must be between 1 and {}",
                        MAX_LIST_LIMIT
                    )));
                }
            }
            Self::Chat { prompt } => check_prompt(prompt, MAX_CHAT_PROMPT)?,
            Self::Image { prompt } => check_prompt(prompt, MAX_IMAGE_PROMPT)?,
            _ => {}
        }
        Ok(())
    }

    /// Commands that wait on a hosted model and need a deferred reply.
    pub fn is_slow(&self) -> bool {
        matches!(self, Self::Chat { .. } | Self::Image { .. })
    }
}

fn no_args(name: &str, args: &[&str]) -> std::result::Result<(), ParseError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(ParseError::InvalidArguments(format!("{} takes no arguments", name)))
    }
}

fn optional_id(
    name: &str,
    args: &[&str],
    prefixes: &[&str],
) -> std::result::Result<Option<u64>, ParseError> {
    match args {
        [] => Ok(None),
        [raw] => parse_id(raw, prefixes).map(Some).ok_or_else(|| {
            ParseError::InvalidArguments(format!("'{}' is not a valid id or mention", raw))
        }),
        _ => Err(ParseError::InvalidArguments(format!("{} takes at most one argument", name))),
    }
}

/// Accept a raw snowflake or a mention such as `<@123>` or `<#123>`.
fn parse_id(raw: &str, prefixes: &[&str]) -> Option<u64> {
    let inner = prefixes
        .iter()
        .find_map(|prefix| raw.strip_prefix(prefix).and_then(|rest| rest.strip_suffix('>')))
        .unwrap_or(raw);
    inner.parse::<u64>().ok()
}

fn optional_limit(
    name: &str,
    args: &[&str],
    default: usize,
) -> std::result::Result<usize, ParseError> {
    match args {
        [] => Ok(default),
        [raw] => raw
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidArguments(format!("'{}' is not a number", raw))),
        _ => Err(ParseError::InvalidArguments(format!("{} takes at most one argument", name))),
    }
}

fn check_prompt(prompt: &str, max: usize) -> std::result::Result<(), ParseError> {
    let len = prompt.trim().chars().count();
    if len == 0 {
        Err(ParseError::InvalidArguments("prompt cannot be empty".to_string()))
    } else if len > max {
        Err(ParseError::InvalidArguments(format!(
            "prompt too long: {} characters (max {})",
            len, max
        )))
    } else {
        Ok(())
    }
}

/// Resolve `name` and run it.
///
/// Never panics: unknown names, bad arguments and collaborator failures all
/// come back as a [`Reply`].
pub async fn dispatch(data: &Data, invocation: &Invocation, name: &str, args: &[&str]) -> Reply {
    match Command::parse(name, args) {
        Ok(command) => execute(data, invocation, command).await,
        Err(e) => {
            tracing::debug!(command = name, error = %e, "Rejected command");
            e.into()
        }
    }
}

/// Run an already parsed command.
pub async fn execute(data: &Data, invocation: &Invocation, command: Command) -> Reply {
    if let Err(e) = command.validate() {
        return e.into();
    }

    let name = command.name();
    tracing::debug!(command = name, user_id = invocation.user_id, "Executing command");

    let event = EventRecord::new(invocation.user_id, EventKind::Command, invocation.now)
        .in_channel(invocation.channel_id)
        .with_payload(json!({ "name": name }));
    record_best_effort(data.recorder.as_ref(), event).await;

    match run_command(data, invocation, command).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(command = name, error = %e, "Command failed");
            e.into()
        }
    }
}

async fn run_command(data: &Data, invocation: &Invocation, command: Command) -> Result<Reply> {
    match command {
        Command::ServerInfo => server::server_info_reply(data, invocation).await,
        Command::MemberInfo { user } => server::member_info_reply(data, invocation, user).await,
        Command::EmojiStats { limit } => server::emoji_stats_reply(data, limit).await,
        Command::ChannelInfo { channel } => {
            server::channel_info_reply(data, invocation, channel).await
        }
        Command::DailyLeaderboard { limit } => {
            first::leaderboard_reply(data, invocation, limit).await
        }
        Command::FirstStats { user } => first::first_stats_reply(data, invocation, user).await,
        Command::Juice => first::juice_reply(data, invocation).await,
        Command::Chat { prompt } => ai::chat_reply(data, invocation, &prompt).await,
        Command::Image { prompt } => ai::image_reply(data, invocation, &prompt).await,
        Command::ClearChat => ai::clear_chat_reply(data, invocation).await,
        Command::Ping => Ok(ping::ping_reply()),
    }
}

/// Shared body of every slash-command wrapper.
pub(crate) async fn respond(ctx: Context<'_>, command: Command) -> std::result::Result<(), Error> {
    let invocation = Invocation::from_context(ctx);
    if command.is_slow() {
        ctx.defer().await?;
    }
    let reply = execute(ctx.data(), &invocation, command).await;
    ctx.send(reply.into_create_reply()).await?;
    Ok(())
}

/// Channel whose claim history backs the first-game commands.
///
/// The invoking channel when it is a game channel, else the first configured one.
pub(crate) fn stats_channel(data: &Data, invocation: &Invocation) -> u64 {
    if data.eligibility.is_game_channel(invocation.channel_id) {
        invocation.channel_id
    } else {
        data.eligibility
            .channels
            .first()
            .copied()
            .unwrap_or(invocation.channel_id)
    }
}

/// Whether `user_id` passes an allow list. An empty list allows everyone.
pub(crate) fn is_allowed(allowed: &[u64], user_id: u64) -> bool {
    allowed.is_empty() || allowed.contains(&user_id)
}

/// All slash commands, in registration order.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        server::server_info(),
        server::member_info(),
        server::emoji_stats(),
        server::channel_info(),
        first::daily_leaderboard(),
        ai::chat(),
        ai::image(),
        first::first_stats(),
        first::juice(),
        ai::clear_chat(),
        ping::ping(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            Command::parse("dance", &[]),
            Err(ParseError::NotFound("dance".to_string()))
        );
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            Command::parse("member-info", &["<@!42>"]),
            Ok(Command::MemberInfo { user: Some(42) })
        );
        assert_eq!(
            Command::parse("channel-info", &["<#7>"]),
            Ok(Command::ChannelInfo { channel: Some(7) })
        );
        assert_eq!(
            Command::parse("daily-leaderboard", &[]),
            Ok(Command::DailyLeaderboard { limit: DEFAULT_LEADERBOARD_LIMIT })
        );
        assert_eq!(
            Command::parse("chat", &["hello", "there"]),
            Ok(Command::Chat { prompt: "hello there".to_string() })
        );
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        let invalid = |name: &str, args: &[&str]| {
            matches!(Command::parse(name, args), Err(ParseError::InvalidArguments(_)))
        };

        assert!(invalid("ping", &["extra"]));
        assert!(invalid("emoji-stats", &["0"]));
        assert!(invalid("emoji-stats", &["26"]));
        assert!(invalid("daily-leaderboard", &["lots"]));
        assert!(invalid("member-info", &["<@abc>"]));
        assert!(invalid("member-info", &["1", "2"]));
        assert!(invalid("chat", &[]));
        assert!(invalid("chat", &["   "]));
        let long = "x".repeat(MAX_IMAGE_PROMPT + 1);
        assert!(invalid("image", &[long.as_str()]));
    }

    #[test]
    fn test_names_match_variants() {
        let commands = [
            Command::ServerInfo,
            Command::MemberInfo { user: None },
            Command::EmojiStats { limit: 1 },
            Command::ChannelInfo { channel: None },
            Command::DailyLeaderboard { limit: 1 },
            Command::Chat { prompt: "x".to_string() },
            Command::Image { prompt: "x".to_string() },
            Command::FirstStats { user: None },
            Command::Juice,
            Command::ClearChat,
            Command::Ping,
        ];
        let names: Vec<&str> = commands.iter().map(Command::name).collect();
        assert_eq!(names, Command::NAMES.to_vec());
    }

    #[test]
    fn test_allow_list() {
        assert!(is_allowed(&[], 1));
        assert!(is_allowed(&[1, 2], 2));
        assert!(!is_allowed(&[1, 2], 3));
    }
}
