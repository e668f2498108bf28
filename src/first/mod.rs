//! The daily "first message" game.
//!
//! The first eligible message in a game channel after midnight (in the
//! configured reference timezone) wins the day. Claim state lives in a
//! [`ClaimStore`] injected at construction; the tracker itself holds none.

pub mod stats;

use crate::error::{BotError, Result};
use crate::recorder::{record_best_effort, EventKind, EventRecord, EventRecorder};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The recorded winner of one channel-day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyClaim {
    pub channel_id: u64,
    /// Calendar day in the reference timezone
    pub day: NaiveDate,
    pub user_id: u64,
    pub claimed_at: DateTime<Utc>,
}

/// Outcome of observing a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    /// The message was the first of the day; the new claim is returned.
    Won(DailyClaim),
    /// Someone already claimed the day; the existing claim is returned.
    AlreadyClaimed(DailyClaim),
}

impl ClaimResult {
    pub fn is_won(&self) -> bool {
        matches!(self, Self::Won(_))
    }

    pub fn claim(&self) -> &DailyClaim {
        match self {
            Self::Won(claim) | Self::AlreadyClaimed(claim) => claim,
        }
    }
}

/// Per-channel claim state.
///
/// `claim_if_absent` is the critical section of the game: implementations must
/// guarantee that concurrent callers for the same `(channel_id, day)` see
/// exactly one `Won`.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn claim_if_absent(&self, claim: DailyClaim) -> Result<ClaimResult>;

    async fn get(&self, channel_id: u64, day: NaiveDate) -> Result<Option<DailyClaim>>;

    /// All claims for a channel, oldest day first.
    async fn history(&self, channel_id: u64) -> Result<Vec<DailyClaim>>;
}

/// In-process claim store.
#[derive(Debug, Default)]
pub struct MemoryClaimStore {
    claims: Mutex<HashMap<(u64, NaiveDate), DailyClaim>>,
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(u64, NaiveDate), DailyClaim>>> {
        self.claims
            .lock()
            .map_err(|_| BotError::Persistence("claim store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn claim_if_absent(&self, claim: DailyClaim) -> Result<ClaimResult> {
        let mut claims = self.lock()?;
        match claims.get(&(claim.channel_id, claim.day)) {
            Some(existing) => Ok(ClaimResult::AlreadyClaimed(existing.clone())),
            None => {
                claims.insert((claim.channel_id, claim.day), claim.clone());
                Ok(ClaimResult::Won(claim))
            }
        }
    }

    async fn get(&self, channel_id: u64, day: NaiveDate) -> Result<Option<DailyClaim>> {
        Ok(self.lock()?.get(&(channel_id, day)).cloned())
    }

    async fn history(&self, channel_id: u64) -> Result<Vec<DailyClaim>> {
        let mut claims: Vec<DailyClaim> = self
            .lock()?
            .values()
            .filter(|c| c.channel_id == channel_id)
            .cloned()
            .collect();
        claims.sort_by_key(|c| c.day);
        Ok(claims)
    }
}

/// Who may play, and where.
#[derive(Debug, Clone, Default)]
pub struct Eligibility {
    /// Game channels; empty means every channel
    pub channels: Vec<u64>,
    /// Accounts that never win
    pub excluded_users: Vec<u64>,
}

impl Eligibility {
    pub fn new(channels: Vec<u64>, excluded_users: Vec<u64>) -> Self {
        Self {
            channels,
            excluded_users,
        }
    }

    pub fn is_game_channel(&self, channel_id: u64) -> bool {
        self.channels.is_empty() || self.channels.contains(&channel_id)
    }

    /// Bots, webhooks and excluded accounts never reach the tracker.
    pub fn is_eligible(
        &self,
        channel_id: u64,
        user_id: u64,
        is_bot: bool,
        is_webhook: bool,
    ) -> bool {
        !is_bot
            && !is_webhook
            && !self.excluded_users.contains(&user_id)
            && self.is_game_channel(channel_id)
    }
}

/// Decides the daily winner per channel.
pub struct DailyTracker {
    store: Arc<dyn ClaimStore>,
    recorder: Arc<dyn EventRecorder>,
    timezone: Tz,
}

impl DailyTracker {
    pub fn new(store: Arc<dyn ClaimStore>, recorder: Arc<dyn EventRecorder>, timezone: Tz) -> Self {
        Self {
            store,
            recorder,
            timezone,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Calendar day of `timestamp` in the reference timezone.
    pub fn day_of(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        timestamp.with_timezone(&self.timezone).date_naive()
    }

    /// Observe an eligible message and decide whether it wins its day.
    ///
    /// A win is recorded as a `claim` event. Recording is best-effort: a
    /// recorder failure is logged and the claim stands.
    ///
    /// # Errors
    ///
    /// Returns an error only if the claim store itself fails, in which case
    /// nobody has won.
    pub async fn observe(
        &self,
        channel_id: u64,
        user_id: u64,
        timestamp: DateTime<Utc>,
    ) -> Result<ClaimResult> {
        let claim = DailyClaim {
            channel_id,
            day: self.day_of(timestamp),
            user_id,
            claimed_at: timestamp,
        };

        let result = self.store.claim_if_absent(claim).await?;

        if let ClaimResult::Won(claim) = &result {
            tracing::info!(channel_id, user_id, day = %claim.day, "First of the day claimed");
            let event = EventRecord::new(user_id, EventKind::Claim, timestamp)
                .in_channel(channel_id)
                .with_payload(json!({ "day": claim.day.to_string() }));
            record_best_effort(self.recorder.as_ref(), event).await;
        }

        Ok(result)
    }

    pub async fn claim_for_day(
        &self,
        channel_id: u64,
        day: NaiveDate,
    ) -> Result<Option<DailyClaim>> {
        self.store.get(channel_id, day).await
    }

    pub async fn history(&self, channel_id: u64) -> Result<Vec<DailyClaim>> {
        self.store.history(channel_id).await
    }
}

/// Announcement posted for a win.
pub fn win_message(user_id: u64) -> String {
    format!("<@{}> is first today! 🥳", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRecorder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventRecorder for CountingRecorder {
        async fn record(&self, event: EventRecord) -> Result<()> {
            assert_eq!(event.kind, EventKind::Claim);
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BotError::Persistence("database is gone".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn eastern(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        chrono_tz::America::New_York
            .with_ymd_and_hms(y, m, d, h, min, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn tracker_with(recorder: Arc<CountingRecorder>) -> DailyTracker {
        DailyTracker::new(
            Arc::new(MemoryClaimStore::new()),
            recorder,
            chrono_tz::America::New_York,
        )
    }

    #[tokio::test]
    async fn test_first_message_wins_then_day_rolls_over() {
        let recorder = Arc::new(CountingRecorder::default());
        let tracker = tracker_with(recorder.clone());

        let first = tracker.observe(1, 100, eastern(2024, 5, 1, 8, 0, 0)).await.unwrap();
        assert!(first.is_won());

        let second = tracker.observe(1, 200, eastern(2024, 5, 1, 8, 5, 0)).await.unwrap();
        match second {
            ClaimResult::AlreadyClaimed(claim) => assert_eq!(claim.user_id, 100),
            other => panic!("expected AlreadyClaimed, got {:?}", other),
        }

        let next_day = tracker.observe(1, 300, eastern(2024, 5, 2, 0, 1, 0)).await.unwrap();
        assert!(next_day.is_won());
        assert_eq!(next_day.claim().day, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());

        assert_eq!(recorder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_midnight_boundary_uses_reference_timezone() {
        let tracker = tracker_with(Arc::new(CountingRecorder::default()));

        let before = tracker.observe(1, 100, eastern(2024, 5, 1, 23, 59, 59)).await.unwrap();
        let after = tracker.observe(1, 200, eastern(2024, 5, 2, 0, 0, 1)).await.unwrap();
        assert!(before.is_won());
        assert!(after.is_won());

        // 02:00 UTC is still the previous evening in New York
        let utc_early = Utc.with_ymd_and_hms(2024, 5, 3, 2, 0, 0).unwrap();
        assert_eq!(tracker.day_of(utc_early), NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        let late = tracker.observe(1, 300, utc_early).await.unwrap();
        assert_eq!(late, ClaimResult::AlreadyClaimed(after.claim().clone()));
    }

    #[tokio::test]
    async fn test_channels_are_independent() {
        let tracker = tracker_with(Arc::new(CountingRecorder::default()));
        let ts = eastern(2024, 5, 1, 9, 0, 0);

        assert!(tracker.observe(1, 100, ts).await.unwrap().is_won());
        assert!(tracker.observe(2, 200, ts).await.unwrap().is_won());
        assert_eq!(tracker.history(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recorder_failure_keeps_claim() {
        let recorder = Arc::new(CountingRecorder {
            fail: true,
            ..Default::default()
        });
        let tracker = tracker_with(recorder.clone());
        let ts = eastern(2024, 5, 1, 8, 0, 0);

        assert!(tracker.observe(1, 100, ts).await.unwrap().is_won());
        let again = tracker.observe(1, 200, ts).await.unwrap();
        assert_eq!(again.claim().user_id, 100);
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_observers_yield_one_winner() {
        let tracker = Arc::new(tracker_with(Arc::new(CountingRecorder::default())));
        let ts = eastern(2024, 5, 1, 0, 0, 1);

        let handles: Vec<_> = (0..32u64)
            .map(|user| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move { tracker.observe(7, user, ts).await.unwrap() })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let winners: Vec<_> = results.iter().filter(|r| r.is_won()).collect();
        assert_eq!(winners.len(), 1);
        let winner = winners[0].claim().user_id;
        assert!(results.iter().all(|r| r.claim().user_id == winner));
    }

    #[test]
    fn test_eligibility() {
        let rules = Eligibility::new(vec![10], vec![99]);

        assert!(rules.is_eligible(10, 1, false, false));
        assert!(!rules.is_eligible(11, 1, false, false));
        assert!(!rules.is_eligible(10, 99, false, false));
        assert!(!rules.is_eligible(10, 1, true, false));
        assert!(!rules.is_eligible(10, 1, false, true));

        let everywhere = Eligibility::default();
        assert!(everywhere.is_eligible(12345, 1, false, false));
    }
}
