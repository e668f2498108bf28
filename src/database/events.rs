//! Event log repository.

use super::{to_sql_id, with_connection};
use crate::error::Result;
use crate::recorder::{EventKind, EventRecord, EventRecorder};
use async_trait::async_trait;
use rusqlite::params;

/// How often a custom emoji was used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiUsage {
    pub name: String,
    pub emoji_id: u64,
    pub uses: u64,
}

/// Repository for the append-only `events` table.
#[derive(Debug, Clone)]
pub struct EventRepository {
    db_path: String,
}

impl EventRepository {
    /// Create a new event repository.
    pub fn new(db_path: String) -> Self {
        Self { db_path }
    }

    /// Count events of `kind`, optionally narrowed to one actor and/or channel.
    pub async fn count(
        &self,
        kind: EventKind,
        actor_id: Option<u64>,
        channel_id: Option<u64>,
    ) -> Result<u64> {
        with_connection(&self.db_path, move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM events
                 WHERE kind = ?1
                   AND (?2 IS NULL OR actor_id = ?2)
                   AND (?3 IS NULL OR channel_id = ?3)",
                params![kind.as_str(), actor_id.map(to_sql_id), channel_id.map(to_sql_id)],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    /// Most used custom emojis, most uses first.
    pub async fn top_emojis(&self, limit: usize) -> Result<Vec<EmojiUsage>> {
        with_connection(&self.db_path, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT json_extract(payload, '$.name') AS name,
                        json_extract(payload, '$.id') AS emoji_id,
                        COUNT(*) AS uses
                 FROM events
                 WHERE kind = ?1 AND payload IS NOT NULL
                 GROUP BY emoji_id
                 ORDER BY uses DESC, name ASC
                 LIMIT ?2",
            )?;

            let rows = stmt.query_map(params![EventKind::Emoji.as_str(), limit as i64], |row| {
                Ok(EmojiUsage {
                    name: row.get(0)?,
                    emoji_id: row.get::<_, i64>(1)? as u64,
                    uses: row.get::<_, i64>(2)? as u64,
                })
            })?;

            let mut usage = Vec::new();
            for row in rows {
                usage.push(row?);
            }
            Ok(usage)
        })
        .await
    }
}

#[async_trait]
impl EventRecorder for EventRepository {
    async fn record(&self, event: EventRecord) -> Result<()> {
        with_connection(&self.db_path, move |conn| {
            let payload = event.payload.as_ref().map(serde_json::to_string).transpose()?;
            conn.execute(
                "INSERT INTO events (actor_id, channel_id, kind, occurred_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    to_sql_id(event.actor_id),
                    event.channel_id.map(to_sql_id),
                    event.kind.as_str(),
                    event.timestamp.to_rfc3339(),
                    payload,
                ],
            )?;
            Ok(())
        })
        .await
    }
}
