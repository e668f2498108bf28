//! What a command answers, independent of how Discord renders it.

use crate::error::BotError;
use crate::llm::truncate_reply;
use poise::serenity_prelude as serenity;

/// Accent color used on every embed.
pub const EMBED_COLOR: u32 = 0x4d4170;

/// Plain description of an embed.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedReply {
    pub title: String,
    pub description: Option<String>,
    /// `(name, value, inline)`
    pub fields: Vec<(String, String, bool)>,
    pub footer: Option<String>,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
}

impl EmbedReply {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            fields: Vec::new(),
            footer: None,
            thumbnail: None,
            image: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        inline: bool,
    ) -> Self {
        self.fields.push((name.into(), value.into(), inline));
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(url.into());
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    /// Value of the first field called `name`.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _, _)| field == name)
            .map(|(_, value, _)| value.as_str())
    }

    fn to_embed(&self) -> serenity::CreateEmbed {
        let mut embed = serenity::CreateEmbed::new()
            .title(&self.title)
            .color(EMBED_COLOR);

        if let Some(description) = &self.description {
            embed = embed.description(description);
        }
        for (name, value, inline) in &self.fields {
            embed = embed.field(name, value, *inline);
        }
        if let Some(footer) = &self.footer {
            embed = embed.footer(serenity::CreateEmbedFooter::new(footer));
        }
        if let Some(url) = &self.thumbnail {
            embed = embed.thumbnail(url);
        }
        if let Some(url) = &self.image {
            embed = embed.image(url);
        }
        embed
    }
}

/// Outcome of a dispatched command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Embed(EmbedReply),
    /// No command is registered under the requested name
    NotFound(String),
    InvalidArguments(String),
    /// A collaborator failed or did not answer in time
    UpstreamUnavailable(String),
    QuotaExceeded(String),
    /// The caller is not on the command's allow list
    Denied(String),
}

impl Reply {
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Text(_) | Self::Embed(_))
    }

    /// Text shown for non-embed replies, cut to Discord's message limit.
    pub fn text(&self) -> Option<String> {
        let text = match self {
            Self::Text(text) => text.clone(),
            Self::Embed(_) => return None,
            Self::NotFound(name) => format!("❌ Unknown command `{}`.", name),
            Self::InvalidArguments(msg) => format!("❌ {}", msg),
            Self::UpstreamUnavailable(msg) => {
                format!("❌ Service unavailable, try again later. ({})", msg)
            }
            Self::QuotaExceeded(msg) => format!("⏳ {}", msg),
            Self::Denied(msg) => format!("🚫 {}", msg),
        };
        Some(truncate_reply(&text))
    }

    /// Render for poise.
    ///
    /// Errors are flagged ephemeral. Discord ignores the flag once the
    /// response was deferred publicly, so errors of slow commands stay visible
    /// in the channel.
    pub fn into_create_reply(self) -> poise::CreateReply {
        let reply = poise::CreateReply::default().ephemeral(self.is_error());
        match self {
            Self::Embed(embed) => reply.embed(embed.to_embed()),
            other => reply.content(other.text().unwrap_or_default()),
        }
    }
}

impl From<BotError> for Reply {
    fn from(err: BotError) -> Self {
        match err {
            BotError::InvalidArguments(msg) => Self::InvalidArguments(msg),
            BotError::QuotaExceeded(msg) => Self::QuotaExceeded(msg),
            BotError::Timeout(msg) | BotError::Unavailable(msg) | BotError::Upstream(msg) => {
                Self::UpstreamUnavailable(msg)
            }
            other => Self::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<EmbedReply> for Reply {
    fn from(embed: EmbedReply) -> Self {
        Self::Embed(embed)
    }
}
