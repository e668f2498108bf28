//! Type definitions and aliases for the bot.
//!
//! This module contains shared types used throughout the application.

use crate::config::Config;
use crate::database::{Database, EventRepository, SnapshotRepository};
use crate::error::{BotError, Result};
use crate::first::{DailyTracker, Eligibility};
use crate::llm::{
    ChatHistory, ChatService, ImageService, OpenAiChat, OpenAiImage, QuotaLimiter, ToolRegistry,
};
use crate::recorder::EventRecorder;
use std::future::Future;
use std::sync::Arc;

/// Bot application data shared across all commands.
///
/// This data is accessible in all command handlers through the context.
pub struct Data {
    pub config: Config,
    pub db: Database,
    /// HTTP client for making API requests
    pub http_client: reqwest::Client,
    pub recorder: Arc<dyn EventRecorder>,
    pub tracker: DailyTracker,
    pub eligibility: Eligibility,
    /// `None` when no chat API key is configured
    pub chat: Option<ChatService>,
    /// `None` when no image API key is configured
    pub image: Option<ImageService>,
}

impl Data {
    /// Wire every service from configuration.
    ///
    /// The event recorder and claim store both write to `db`.
    pub fn new(config: Config, db: Database, http_client: reqwest::Client) -> Self {
        let recorder: Arc<dyn EventRecorder> = Arc::new(db.events());
        let tracker = DailyTracker::new(
            Arc::new(db.claims()),
            Arc::clone(&recorder),
            config.reference_timezone,
        );
        let eligibility = Eligibility::new(
            config.first_channel_ids.clone(),
            config.excluded_user_ids.clone(),
        );

        let chat = config.chat.clone().map(|adapter| {
            ChatService::new(
                Arc::new(OpenAiChat::new(http_client.clone(), adapter)),
                ToolRegistry::new(http_client.clone(), config.weather_api_key.clone()),
                QuotaLimiter::new("chat", config.chat_quota),
                ChatHistory::new(config.chat_system_prompt.clone(), config.chat_history_limit),
                Arc::clone(&recorder),
                config.upstream_timeout,
            )
        });

        let image = config.image.clone().map(|adapter| {
            ImageService::new(
                Arc::new(OpenAiImage::new(http_client.clone(), adapter)),
                QuotaLimiter::new("image", config.image_quota),
                Arc::clone(&recorder),
                config.upstream_timeout,
            )
        });

        Self {
            config,
            db,
            http_client,
            recorder,
            tracker,
            eligibility,
            chat,
            image,
        }
    }

    /// Replace the chat service, e.g. with one backed by a different model.
    pub fn with_chat(mut self, chat: ChatService) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_image(mut self, image: ImageService) -> Self {
        self.image = Some(image);
        self
    }

    /// Create a new event repository for analytics queries.
    pub fn event_repository(&self) -> EventRepository {
        self.db.events()
    }

    /// Create a new snapshot repository for guild state.
    pub fn snapshot_repository(&self) -> SnapshotRepository {
        self.db.snapshots()
    }

    /// Run a collaborator call under the configured upstream timeout.
    pub async fn timed<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.upstream_timeout;
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| {
                BotError::Timeout(format!(
                    "{} did not answer within {}s",
                    what,
                    timeout.as_secs()
                ))
            })?
    }
}

/// Error type for bot commands (maintains compatibility with poise).
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Command context type alias for easier usage.
pub type Context<'a> = poise::Context<'a, Data, Error>;
