//! Scores derived from a channel's claim history.
//!
//! All functions expect claims ordered oldest day first, as returned by
//! [`ClaimStore::history`](super::ClaimStore::history).

use super::DailyClaim;
use chrono::Timelike;
use chrono_tz::Tz;
use std::collections::HashMap;

/// One user's totals.
#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub score: usize,
    pub juice: f64,
    pub longest_streak: usize,
}

/// Number of wins per user, most wins first. Ties go to the lower user id.
pub fn leaderboard(claims: &[DailyClaim]) -> Vec<(u64, usize)> {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for claim in claims {
        *counts.entry(claim.user_id).or_default() += 1;
    }

    let mut board: Vec<(u64, usize)> = counts.into_iter().collect();
    board.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    board
}

/// The most recent winner and how many claims in a row they hold.
pub fn current_streak(claims: &[DailyClaim]) -> Option<(u64, usize)> {
    let last = claims.last()?.user_id;
    let run = claims.iter().rev().take_while(|c| c.user_id == last).count();
    Some((last, run))
}

/// Longest run of consecutive claims held by `user_id`.
pub fn longest_streak(claims: &[DailyClaim], user_id: u64) -> usize {
    let mut best = 0;
    let mut run = 0;
    for claim in claims {
        if claim.user_id == user_id {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

/// Minutes between local midnight and the claim.
pub fn juice_minutes(claim: &DailyClaim, timezone: Tz) -> f64 {
    let local = claim.claimed_at.with_timezone(&timezone);
    f64::from(local.hour() * 60 + local.minute()) + f64::from(local.second()) / 60.0
}

/// Total juice per user, highest first.
pub fn juice_board(claims: &[DailyClaim], timezone: Tz) -> Vec<(u64, f64)> {
    let mut totals: HashMap<u64, f64> = HashMap::new();
    for claim in claims {
        *totals.entry(claim.user_id).or_default() += juice_minutes(claim, timezone);
    }

    let mut board: Vec<(u64, f64)> = totals.into_iter().collect();
    board.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    board
}

/// The single latest claim of the day ever made.
pub fn juice_high_score(claims: &[DailyClaim], timezone: Tz) -> Option<(u64, f64)> {
    claims
        .iter()
        .map(|c| (c.user_id, juice_minutes(c, timezone)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// Totals for one user, or `None` if they never won.
pub fn user_stats(claims: &[DailyClaim], user_id: u64, timezone: Tz) -> Option<UserStats> {
    let mine: Vec<&DailyClaim> = claims.iter().filter(|c| c.user_id == user_id).collect();
    if mine.is_empty() {
        return None;
    }

    Some(UserStats {
        score: mine.len(),
        juice: mine.iter().map(|c| juice_minutes(c, timezone)).sum(),
        longest_streak: longest_streak(claims, user_id),
    })
}
