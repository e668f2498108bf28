//! SQLite-backed claim store for the first-message game.

use super::{from_sql_id, to_sql_id, with_connection};
use crate::error::{BotError, Result};
use crate::first::{ClaimResult, ClaimStore, DailyClaim};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Claims persisted in the `daily_claims` table.
///
/// Uniqueness of `(channel_id, day)` is enforced by the schema; a writer that
/// loses the race gets a constraint violation, which is turned into
/// [`ClaimResult::AlreadyClaimed`].
#[derive(Debug, Clone)]
pub struct SqliteClaimStore {
    db_path: String,
}

impl SqliteClaimStore {
    pub fn new(db_path: String) -> Self {
        Self { db_path }
    }
}

fn row_to_claim(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, i64, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_claim(
    (channel_id, day, user_id, claimed_at): (i64, String, i64, String),
) -> Result<DailyClaim> {
    let day = NaiveDate::parse_from_str(&day, DAY_FORMAT)
        .map_err(|e| BotError::Persistence(format!("Invalid claim day '{}': {}", day, e)))?;
    let claimed_at = DateTime::parse_from_rfc3339(&claimed_at)
        .map_err(|e| {
            BotError::Persistence(format!("Invalid claim timestamp '{}': {}", claimed_at, e))
        })?
        .with_timezone(&Utc);

    Ok(DailyClaim {
        channel_id: from_sql_id(channel_id),
        day,
        user_id: from_sql_id(user_id),
        claimed_at,
    })
}

fn select_claim(conn: &Connection, channel_id: u64, day: NaiveDate) -> Result<Option<DailyClaim>> {
    let row = conn
        .query_row(
            "SELECT channel_id, day, user_id, claimed_at FROM daily_claims
             WHERE channel_id = ?1 AND day = ?2",
            params![to_sql_id(channel_id), day.format(DAY_FORMAT).to_string()],
            row_to_claim,
        )
        .optional()?;

    row.map(decode_claim).transpose()
}

#[async_trait]
impl ClaimStore for SqliteClaimStore {
    async fn claim_if_absent(&self, claim: DailyClaim) -> Result<ClaimResult> {
        with_connection(&self.db_path, move |conn| {
            let inserted = conn.execute(
                "INSERT INTO daily_claims (channel_id, day, user_id, claimed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    to_sql_id(claim.channel_id),
                    claim.day.format(DAY_FORMAT).to_string(),
                    to_sql_id(claim.user_id),
                    claim.claimed_at.to_rfc3339(),
                ],
            );

            match inserted {
                Ok(_) => Ok(ClaimResult::Won(claim)),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    let existing =
                        select_claim(conn, claim.channel_id, claim.day)?.ok_or_else(|| {
                            BotError::Persistence(
                                "Claim vanished after constraint violation".to_string(),
                            )
                        })?;
                    Ok(ClaimResult::AlreadyClaimed(existing))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get(&self, channel_id: u64, day: NaiveDate) -> Result<Option<DailyClaim>> {
        with_connection(&self.db_path, move |conn| select_claim(conn, channel_id, day)).await
    }

    async fn history(&self, channel_id: u64) -> Result<Vec<DailyClaim>> {
        with_connection(&self.db_path, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT channel_id, day, user_id, claimed_at FROM daily_claims
                 WHERE channel_id = ?1 ORDER BY day",
            )?;

            let rows = stmt.query_map(params![to_sql_id(channel_id)], row_to_claim)?;

            let mut claims = Vec::new();
            for row in rows {
                claims.push(decode_claim(row?)?);
            }
            Ok(claims)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::setup_test_db;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn claim(channel_id: u64, day: u32, user_id: u64) -> DailyClaim {
        DailyClaim {
            channel_id,
            day: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            user_id,
            claimed_at: Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_claim_if_absent() {
        let (_temp_dir, db) = setup_test_db().await;
        let store = db.claims();

        let first = store.claim_if_absent(claim(1, 1, 100)).await.unwrap();
        assert_eq!(first, ClaimResult::Won(claim(1, 1, 100)));

        let second = store.claim_if_absent(claim(1, 1, 200)).await.unwrap();
        assert_eq!(second, ClaimResult::AlreadyClaimed(claim(1, 1, 100)));

        // Other channel, same day
        assert!(store.claim_if_absent(claim(2, 1, 200)).await.unwrap().is_won());
    }

    #[tokio::test]
    async fn test_get_and_history() {
        let (_temp_dir, db) = setup_test_db().await;
        let store = db.claims();

        store.claim_if_absent(claim(1, 3, 30)).await.unwrap();
        store.claim_if_absent(claim(1, 1, 10)).await.unwrap();
        store.claim_if_absent(claim(1, 2, 20)).await.unwrap();
        store.claim_if_absent(claim(9, 1, 90)).await.unwrap();

        let history = store.history(1).await.unwrap();
        let users: Vec<u64> = history.iter().map(|c| c.user_id).collect();
        assert_eq!(users, vec![10, 20, 30]);

        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        assert_eq!(store.get(1, day).await.unwrap(), Some(claim(1, 2, 20)));
        assert_eq!(store.get(2, day).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_writers_produce_one_winner() {
        let (_temp_dir, db) = setup_test_db().await;
        let store = Arc::new(db.claims());

        let handles: Vec<_> = (0..8u64)
            .map(|user| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.claim_if_absent(claim(5, 1, user)).await.unwrap() })
            })
            .collect();

        let mut won = 0;
        for handle in handles {
            if handle.await.unwrap().is_won() {
                won += 1;
            }
        }
        assert_eq!(won, 1);
        assert_eq!(store.history(5).await.unwrap().len(), 1);
    }
}
