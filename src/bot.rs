//! Gateway wiring: framework setup and the event handler.

use crate::commands;
use crate::commands::invocation::snowflake_created_at;
use crate::config::Config;
use crate::database::Database;
use crate::error::Result;
use crate::first::{win_message, ClaimResult};
use crate::recorder::{extract_custom_emojis, record_best_effort, EventKind, EventRecord};
use crate::types::{Data, Error};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use serde_json::json;

/// The parts of a gateway message the bot reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub message_id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    pub is_bot: bool,
    pub is_webhook: bool,
    pub content: String,
}

impl From<&serenity::Message> for IncomingMessage {
    fn from(message: &serenity::Message) -> Self {
        Self {
            message_id: message.id.get(),
            channel_id: message.channel_id.get(),
            author_id: message.author.id.get(),
            is_bot: message.author.bot,
            is_webhook: message.webhook_id.is_some(),
            content: message.content.clone(),
        }
    }
}

/// An edit to a previously sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEdit {
    pub message_id: u64,
    pub channel_id: u64,
    /// Missing when the gateway did not include the author
    pub author_id: Option<u64>,
    pub is_bot: bool,
    pub is_webhook: bool,
    /// Missing when the edit did not change the text (embeds, pins)
    pub content: Option<String>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl From<&serenity::MessageUpdateEvent> for MessageEdit {
    fn from(event: &serenity::MessageUpdateEvent) -> Self {
        Self {
            message_id: event.id.get(),
            channel_id: event.channel_id.get(),
            author_id: event.author.as_ref().map(|author| author.id.get()),
            is_bot: event.author.as_ref().is_some_and(|author| author.bot),
            is_webhook: matches!(event.webhook_id, Some(Some(_))),
            content: event.content.clone(),
            edited_at: event
                .edited_timestamp
                .and_then(|ts| DateTime::from_timestamp(ts.unix_timestamp(), 0)),
        }
    }
}

/// Record a message and let it play the first-message game.
///
/// Returns the announcement to post when the message wins its day. Bot and
/// webhook messages are neither recorded nor eligible.
pub async fn handle_message(data: &Data, message: &IncomingMessage) -> Result<Option<String>> {
    if message.is_bot || message.is_webhook {
        return Ok(None);
    }

    // Snowflake time has millisecond precision, unlike the gateway timestamp
    let sent_at = snowflake_created_at(message.message_id);

    let event = EventRecord::new(message.author_id, EventKind::Message, sent_at)
        .in_channel(message.channel_id)
        .with_payload(json!({ "message_id": message.message_id, "content": message.content }));
    record_best_effort(data.recorder.as_ref(), event).await;

    for (name, id) in extract_custom_emojis(&message.content) {
        let event = EventRecord::new(message.author_id, EventKind::Emoji, sent_at)
            .in_channel(message.channel_id)
            .with_payload(json!({ "name": name, "id": id }));
        record_best_effort(data.recorder.as_ref(), event).await;
    }

    let eligible = data.eligibility.is_eligible(
        message.channel_id,
        message.author_id,
        message.is_bot,
        message.is_webhook,
    );
    if !eligible {
        return Ok(None);
    }

    // Not under `timed`: a committed claim is always announced. SQLite's busy
    // timeout bounds the wait.
    let result = data
        .tracker
        .observe(message.channel_id, message.author_id, sent_at)
        .await?;

    Ok(match result {
        ClaimResult::Won(claim) => Some(win_message(claim.user_id)),
        ClaimResult::AlreadyClaimed(_) => None,
    })
}

/// Record an edit with its new text.
///
/// Edits are analytics only and never touch the day's claim.
pub async fn handle_edit(data: &Data, edit: &MessageEdit) {
    let (Some(author_id), Some(content)) = (edit.author_id, &edit.content) else {
        return;
    };
    if edit.is_bot || edit.is_webhook {
        return;
    }

    let edited_at = edit.edited_at.unwrap_or_else(Utc::now);
    let event = EventRecord::new(author_id, EventKind::Edit, edited_at)
        .in_channel(edit.channel_id)
        .with_payload(json!({ "message_id": edit.message_id, "content": content }));
    record_best_effort(data.recorder.as_ref(), event).await;
}

/// Poise event handler.
pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> std::result::Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            tracing::info!(user = %data_about_bot.user.name, "Connected to Discord");
        }
        serenity::FullEvent::Message { new_message } => {
            match handle_message(data, &IncomingMessage::from(new_message)).await {
                Ok(Some(announcement)) => {
                    new_message.channel_id.say(&ctx.http, announcement).await?;
                }
                Ok(None) => {}
                // A failed claim store means nobody won; the message itself is fine
                Err(e) => tracing::warn!(error = %e, "Failed to observe message"),
            }
        }
        serenity::FullEvent::MessageUpdate { event, .. } => {
            handle_edit(data, &MessageEdit::from(event)).await;
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            let event = EventRecord::new(new_member.user.id.get(), EventKind::Join, Utc::now())
                .with_payload(json!({ "guild_id": new_member.guild_id.get() }));
            record_best_effort(data.recorder.as_ref(), event).await;
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            let event = EventRecord::new(user.id.get(), EventKind::Leave, Utc::now())
                .with_payload(json!({ "guild_id": guild_id.get() }));
            record_best_effort(data.recorder.as_ref(), event).await;
        }
        _ => {}
    }
    Ok(())
}

pub async fn run() -> std::result::Result<(), Error> {
    let config = Config::from_env()?;

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    // Initialize DB (creates file and tables if needed)
    let db = Database::open(config.db_path.clone()).await?;
    tracing::info!(
        db_path = %config.db_path,
        timezone = %config.reference_timezone,
        chat = config.chat.is_some(),
        image = config.image.is_some(),
        upstream_timeout_secs = config.upstream_timeout.as_secs(),
        request_timeout_secs = config.request_timeout.as_secs(),
        "Configuration loaded"
    );

    let token = config.discord_token.clone();
    let http_client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |context, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(context, &framework.options().commands).await?;
                tracing::info!(
                    commands = framework.options().commands.len(),
                    "Slash commands registered"
                );
                Ok(Data::new(config, db, http_client))
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents).framework(framework).await?;

    client.start().await?;

    Ok(())
}
