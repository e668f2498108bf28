//! Configuration management for dinkbot.
//!
//! This module handles loading and validating environment variables and application settings.
//! Values are read once at startup; the resulting [`Config`] is never mutated afterwards.

use crate::error::{BotError, Result};
use chrono_tz::Tz;
use std::env;
use std::time::Duration;

const DEFAULT_TIMEZONE: &str = "America/New_York";
const DEFAULT_CHAT_BASE_URL: &str = "https://api.x.ai/v1";
const DEFAULT_CHAT_MODEL: &str = "grok-3-mini";
const DEFAULT_IMAGE_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
/// HTTP attempts that should fit in one upstream timeout by default.
const REQUEST_ATTEMPTS: u32 = 3;
const DEFAULT_SYSTEM_PROMPT: &str =
    "Talk like a surfer, stoner bro who is always chill and relaxed";
const MISSING_TOKEN: &str = "Missing DISCORD_TOKEN environment variable. \
    Set it in your environment or create a .env file (never commit this file).";

/// Connection settings for one hosted model API.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub api_key: String,
    /// Base URL of an OpenAI-compatible API, without trailing slash
    pub base_url: String,
    pub model: String,
}

/// Upper bound on adapter invocations per user within a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    pub max_calls: u32,
    pub window: Duration,
}

/// Configuration for the application, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token
    pub discord_token: String,
    /// Path to SQLite database file
    pub db_path: String,
    /// Timezone whose midnight starts a new day for the first-message game
    pub reference_timezone: Tz,
    /// Channels where the first-message game runs; empty means every channel
    pub first_channel_ids: Vec<u64>,
    /// Accounts that never win the first-message game
    pub excluded_user_ids: Vec<u64>,
    /// Chat completion API, disabled when no key is configured
    pub chat: Option<AdapterConfig>,
    pub chat_system_prompt: String,
    /// Maximum number of messages kept in the chat history, system prompt included
    pub chat_history_limit: usize,
    /// Image generation API, disabled when no key is configured
    pub image: Option<AdapterConfig>,
    pub chat_quota: QuotaConfig,
    pub image_quota: QuotaConfig,
    /// Users allowed to chat; empty means everyone
    pub chat_allowed_users: Vec<u64>,
    /// Users allowed to generate images; empty means everyone
    pub image_allowed_users: Vec<u64>,
    /// Timeout applied to every external call, retries included
    pub upstream_timeout: Duration,
    /// Timeout of a single HTTP attempt; shorter than `upstream_timeout` so retries fit
    pub request_timeout: Duration,
    /// RapidAPI key for the weather tool
    pub weather_api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This will attempt to load a .env file if present using dotenv,
    /// then read required environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required environment variable is missing or invalid.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dinkbot::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load configuration");
    /// println!("Day boundary timezone: {}", config.reference_timezone);
    /// ```
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors - it's optional)
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// `from_env` passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let discord_token =
            get("DISCORD_TOKEN").ok_or_else(|| BotError::Config(MISSING_TOKEN.to_string()))?;

        let db_path = match get("DB_PATH") {
            Some(path) => path,
            None => Self::default_db_path()?,
        };

        let reference_timezone = Self::parse_timezone(
            get("REFERENCE_TIMEZONE").as_deref().unwrap_or(DEFAULT_TIMEZONE),
        )?;

        let id_list = |key: &str| Self::parse_id_list(key, get(key));
        let first_channel_ids = id_list("FIRST_CHANNEL_IDS")?;
        let excluded_user_ids = id_list("EXCLUDED_USER_IDS")?;
        let chat_allowed_users = id_list("CHAT_ALLOWED_USERS")?;
        let image_allowed_users = id_list("IMAGE_ALLOWED_USERS")?;

        let chat = match get("CHAT_API_KEY") {
            Some(api_key) => {
                let base_url = get("CHAT_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_CHAT_BASE_URL.to_string());
                Self::validate_base_url("CHAT_API_BASE_URL", &base_url)?;
                Some(AdapterConfig {
                    api_key,
                    base_url: base_url.trim_end_matches('/').to_string(),
                    model: get("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
                })
            }
            None => None,
        };

        let image = match get("IMAGE_API_KEY") {
            Some(api_key) => {
                let base_url = get("IMAGE_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_IMAGE_BASE_URL.to_string());
                Self::validate_base_url("IMAGE_API_BASE_URL", &base_url)?;
                Some(AdapterConfig {
                    api_key,
                    base_url: base_url.trim_end_matches('/').to_string(),
                    model: get("IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
                })
            }
            None => None,
        };

        let chat_quota = QuotaConfig {
            max_calls: Self::parse_positive("CHAT_QUOTA_MAX", get("CHAT_QUOTA_MAX"), 30)?,
            window: Duration::from_secs(Self::parse_positive(
                "CHAT_QUOTA_WINDOW_SECS",
                get("CHAT_QUOTA_WINDOW_SECS"),
                86_400,
            )?),
        };
        let image_quota = QuotaConfig {
            max_calls: Self::parse_positive("IMAGE_QUOTA_MAX", get("IMAGE_QUOTA_MAX"), 5)?,
            window: Duration::from_secs(Self::parse_positive(
                "IMAGE_QUOTA_WINDOW_SECS",
                get("IMAGE_QUOTA_WINDOW_SECS"),
                86_400,
            )?),
        };

        let chat_history_limit: usize =
            Self::parse_positive("CHAT_HISTORY_LIMIT", get("CHAT_HISTORY_LIMIT"), 20)?;
        if chat_history_limit < 2 {
            return Err(BotError::Config(
                "CHAT_HISTORY_LIMIT must leave room for the system prompt and one message"
                    .to_string(),
            ));
        }

        let upstream_timeout = Duration::from_secs(Self::parse_positive(
            "UPSTREAM_TIMEOUT_SECS",
            get("UPSTREAM_TIMEOUT_SECS"),
            30,
        )?);

        let request_timeout = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(Self::parse_positive(
                "REQUEST_TIMEOUT_SECS",
                Some(raw),
                1,
            )?),
            None => (upstream_timeout / REQUEST_ATTEMPTS).max(Duration::from_secs(1)),
        };
        if request_timeout > upstream_timeout {
            return Err(BotError::Config(
                "REQUEST_TIMEOUT_SECS must not exceed UPSTREAM_TIMEOUT_SECS".to_string(),
            ));
        }

        Ok(Self {
            discord_token,
            db_path,
            reference_timezone,
            first_channel_ids,
            excluded_user_ids,
            chat,
            chat_system_prompt: get("CHAT_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            chat_history_limit,
            image,
            chat_quota,
            image_quota,
            chat_allowed_users,
            image_allowed_users,
            upstream_timeout,
            request_timeout,
            weather_api_key: get("WEATHER_API_KEY"),
        })
    }

    /// Default database location: `./data/dinkbot.db`.
    fn default_db_path() -> Result<String> {
        let mut path = env::current_dir()
            .map_err(|e| BotError::Config(
                format!("Failed to determine current directory: {}", e)
            ))?;

        path.push("data");
        path.push("dinkbot.db");

        path.into_os_string()
            .into_string()
            .map_err(|os_str| BotError::Config(
                format!("Database path contains invalid Unicode: {:?}", os_str)
            ))
    }

    fn parse_timezone(name: &str) -> Result<Tz> {
        name.trim().parse::<Tz>().map_err(|e| BotError::Config(
            format!("Invalid REFERENCE_TIMEZONE '{}': {}", name, e)
        ))
    }

    /// Parse a comma-separated list of Discord snowflakes.
    fn parse_id_list(name: &str, raw: Option<String>) -> Result<Vec<u64>> {
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };

        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u64>().map_err(|_| BotError::Config(
                    format!("Invalid id '{}' in {}", s, name)
                ))
            })
            .collect()
    }

    fn parse_positive<T>(name: &str, raw: Option<String>, default: T) -> Result<T>
    where
        T: std::str::FromStr + PartialOrd + Default,
    {
        let Some(raw) = raw else {
            return Ok(default);
        };

        match raw.trim().parse::<T>() {
            Ok(value) if value > T::default() => Ok(value),
            _ => Err(BotError::Config(
                format!("{} must be a positive integer, got '{}'", name, raw)
            )),
        }
    }

    /// Validate the base URL format using proper URL parsing.
    fn validate_base_url(name: &str, url_str: &str) -> Result<()> {
        use url::Url;

        let parsed_url = Url::parse(url_str)
            .map_err(|e| BotError::Config(
                format!("Invalid {} '{}': {}", name, url_str, e)
            ))?;

        let scheme = parsed_url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(BotError::Config(
                format!("{} must use http:// or https:// scheme, got: '{}'", name, scheme)
            ));
        }

        if parsed_url.host_str().is_none() {
            return Err(BotError::Config(
                format!("{} must contain a valid host: '{}'", name, url_str)
            ));
        }

        Ok(())
    }
}
