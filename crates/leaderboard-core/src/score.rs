use std::cmp::Ordering;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Upper bound (inclusive) for a submitted score.
pub const MAX_SCORE: u32 = 1_000_000;

/// A user's single, immutable score submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub user_id: UserId,
    pub username: String,
    pub score: u32,
    pub submitted_at: DateTime<Utc>,
}

impl ScoreRecord {
    /// Build a record stamped with the current time, at microsecond
    /// precision so it survives a round trip through storage unchanged.
    pub fn new(user_id: UserId, username: impl Into<String>, score: u32) -> Self {
        Self {
            user_id,
            username: username.into(),
            score,
            submitted_at: Utc::now().trunc_subsecs(6),
        }
    }
}

/// Leaderboard order: highest score first, earliest submission wins ties.
/// User id is the last resort so the order is total.
pub fn standing_order(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// One ranked row of a leaderboard snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub username: String,
    pub score: u32,
    pub submitted_at: DateTime<Utc>,
}

/// Rank records that are already in standing order (1-based ranks).
pub fn rank_entries(records: &[ScoreRecord]) -> Vec<LeaderboardEntry> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| LeaderboardEntry {
            rank: i as u32 + 1,
            username: r.username.clone(),
            score: r.score,
            submitted_at: r.submitted_at,
        })
        .collect()
}
