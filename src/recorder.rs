//! Event records for the analytics dashboard.
//!
//! The bot only appends; reading the records back is the dashboard's job,
//! apart from the few aggregate queries the analytics commands need.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    /// A message was edited; never affects the first-message game
    Edit,
    Command,
    Claim,
    Emoji,
    Join,
    Leave,
    Chat,
    Image,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Edit => "edit",
            Self::Command => "command",
            Self::Claim => "claim",
            Self::Emoji => "emoji",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Chat => "chat",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single append-only event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Discord user id of whoever caused the event
    pub actor_id: u64,
    pub channel_id: Option<u64>,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: Option<serde_json::Value>,
}

impl EventRecord {
    pub fn new(actor_id: u64, kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            actor_id,
            channel_id: None,
            kind,
            timestamp,
            payload: None,
        }
    }

    pub fn in_channel(mut self, channel_id: u64) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Sink for event records.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Append one record.
    async fn record(&self, event: EventRecord) -> Result<()>;
}

/// Record an event, logging instead of failing.
///
/// Used on paths where a lost analytics row must never hold up the reply.
pub async fn record_best_effort(recorder: &dyn EventRecorder, event: EventRecord) {
    let kind = event.kind;
    if let Err(e) = recorder.record(event).await {
        tracing::warn!(kind = %kind, error = %e, "Failed to record event");
    }
}

/// Custom emoji tags (`<:name:id>` and `<a:name:id>`) found in message content.
///
/// Returns `(name, id)` pairs in order of appearance.
pub fn extract_custom_emojis(content: &str) -> Vec<(String, u64)> {
    let mut found = Vec::new();
    let mut rest = content;

    while let Some(start) = rest.find('<') {
        rest = &rest[start + 1..];
        let Some(end) = rest.find('>') else {
            break;
        };
        let inner = &rest[..end];
        let inner = inner.strip_prefix('a').unwrap_or(inner);

        if let Some(tag) = inner.strip_prefix(':') {
            if let Some((name, id)) = tag.split_once(':') {
                let valid_name = !name.is_empty()
                    && name.chars().all(|c| c.is_alphanumeric() || c == '_');
                if let (true, Ok(id)) = (valid_name, id.parse::<u64>()) {
                    found.push((name.to_string(), id));
                    rest = &rest[end + 1..];
                }
            }
        }
    }

    found
}
