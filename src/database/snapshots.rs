//! Guild snapshots (members, emojis, channels) kept for dashboard joins.

use super::{to_sql_id, with_connection};
use crate::error::Result;
use rusqlite::params;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRow {
    pub id: u64,
    pub user_name: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    /// Account creation time, `YYYY-MM-DD HH:MM:SS` UTC
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiRow {
    pub id: u64,
    pub name: String,
    pub guild_id: u64,
    pub url: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRow {
    pub id: u64,
    pub name: String,
    pub created_at: String,
}

/// Upserts guild state into the `members`, `emojis` and `channels` tables.
#[derive(Debug, Clone)]
pub struct SnapshotRepository {
    db_path: String,
}

impl SnapshotRepository {
    pub fn new(db_path: String) -> Self {
        Self { db_path }
    }

    /// Insert or update members. Returns the number of rows written.
    pub async fn upsert_members(&self, members: Vec<MemberRow>) -> Result<usize> {
        with_connection(&self.db_path, move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO members (id, user_name, display_name, avatar, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                        user_name = excluded.user_name,
                        display_name = excluded.display_name,
                        avatar = excluded.avatar,
                        created_at = excluded.created_at",
                )?;
                for m in &members {
                    stmt.execute(params![
                        to_sql_id(m.id),
                        m.user_name,
                        m.display_name,
                        m.avatar,
                        m.created_at
                    ])?;
                }
            }
            tx.commit()?;
            Ok(members.len())
        })
        .await
    }

    /// Insert or update emojis. Returns the number of rows written.
    pub async fn upsert_emojis(&self, emojis: Vec<EmojiRow>) -> Result<usize> {
        with_connection(&self.db_path, move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO emojis (id, emoji_name, guild_id, url, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                        emoji_name = excluded.emoji_name,
                        guild_id = excluded.guild_id,
                        url = excluded.url,
                        created_at = excluded.created_at",
                )?;
                for e in &emojis {
                    stmt.execute(params![
                        to_sql_id(e.id),
                        e.name,
                        to_sql_id(e.guild_id),
                        e.url,
                        e.created_at
                    ])?;
                }
            }
            tx.commit()?;
            Ok(emojis.len())
        })
        .await
    }

    /// Insert or update channels. Returns the number of rows written.
    pub async fn upsert_channels(&self, channels: Vec<ChannelRow>) -> Result<usize> {
        with_connection(&self.db_path, move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO channels (id, channel_name, created_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET
                        channel_name = excluded.channel_name,
                        created_at = excluded.created_at",
                )?;
                for c in &channels {
                    stmt.execute(params![to_sql_id(c.id), c.name, c.created_at])?;
                }
            }
            tx.commit()?;
            Ok(channels.len())
        })
        .await
    }

    /// Stored user name for a member, if any.
    pub async fn member_name(&self, id: u64) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;

        with_connection(&self.db_path, move |conn| {
            let name = conn
                .query_row(
                    "SELECT user_name FROM members WHERE id = ?1",
                    params![to_sql_id(id)],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(name)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::setup_test_db;

    fn member(id: u64, name: &str) -> MemberRow {
        MemberRow {
            id,
            user_name: name.to_string(),
            display_name: None,
            avatar: Some(format!("https://cdn.discordapp.com/avatars/{}/abc.webp?size=128", id)),
            created_at: "2016-01-01 00:00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_members_updates_existing_rows() {
        let (_temp_dir, db) = setup_test_db().await;
        let repo = db.snapshots();

        assert_eq!(repo.upsert_members(vec![member(1, "old"), member(2, "bob")]).await.unwrap(), 2);
        repo.upsert_members(vec![member(1, "new")]).await.unwrap();

        assert_eq!(repo.member_name(1).await.unwrap().as_deref(), Some("new"));
        assert_eq!(repo.member_name(2).await.unwrap().as_deref(), Some("bob"));
        assert_eq!(repo.member_name(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_emojis_and_channels() {
        let (_temp_dir, db) = setup_test_db().await;
        let repo = db.snapshots();

        let emojis = vec![EmojiRow {
            id: 11,
            name: "pepega".to_string(),
            guild_id: 5,
            url: "https://cdn.discordapp.com/emojis/11.png".to_string(),
            created_at: "2020-01-01 00:00:00".to_string(),
        }];
        assert_eq!(repo.upsert_emojis(emojis.clone()).await.unwrap(), 1);
        assert_eq!(repo.upsert_emojis(emojis).await.unwrap(), 1);

        let channels = vec![
            ChannelRow {
                id: 1,
                name: "general".to_string(),
                created_at: "2016-01-01 00:00:00".to_string(),
            },
            ChannelRow {
                id: 2,
                name: "memes".to_string(),
                created_at: "2017-01-01 00:00:00".to_string(),
            },
        ];
        assert_eq!(repo.upsert_channels(channels).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_snapshots() {
        let (_temp_dir, db) = setup_test_db().await;
        assert_eq!(db.snapshots().upsert_channels(Vec::new()).await.unwrap(), 0);
    }
}
