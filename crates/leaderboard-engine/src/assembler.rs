use chrono::{DateTime, Utc};

use leaderboard_core::score::rank_entries;
use leaderboard_core::{Notification, ScoreRecord};

/// Notifications produced by one accepted submission, in delivery order:
/// HighScore (only when strictly above `high_score_threshold`), NewPlayer,
/// then a LeaderboardSnapshot when standings could be read.
///
/// All notifications share `now` as their timestamp.
pub fn assemble(
    record: &ScoreRecord,
    standings: Option<&[ScoreRecord]>,
    high_score_threshold: u32,
    now: DateTime<Utc>,
) -> Vec<Notification> {
    let mut out = Vec::with_capacity(3);
    if record.score > high_score_threshold {
        out.push(Notification::high_score(&record.username, record.score).at(now));
    }
    out.push(Notification::new_player(&record.username).at(now));
    if let Some(rows) = standings {
        out.push(Notification::leaderboard_snapshot(rank_entries(rows)).at(now));
    }
    out
}

#[cfg(test)]
mod tests {
    use leaderboard_core::{NotificationBody, NotificationKind, UserId};

    use super::*;

    fn record(score: u32) -> ScoreRecord {
        ScoreRecord::new(UserId::from_raw("u1"), "alice", score)
    }

    fn kinds(ns: &[Notification]) -> Vec<NotificationKind> {
        ns.iter().map(Notification::kind).collect()
    }

    #[test]
    fn high_score_comes_first() {
        let r = record(5000);
        let standings = vec![r.clone()];
        let out = assemble(&r, Some(standings.as_slice()), 1000, Utc::now());
        assert_eq!(
            kinds(&out),
            [
                NotificationKind::HighScore,
                NotificationKind::NewPlayer,
                NotificationKind::LeaderboardSnapshot
            ]
        );
    }

    #[test]
    fn threshold_is_strict() {
        let r = record(1000);
        let out = assemble(&r, Some(&[][..]), 1000, Utc::now());
        assert_eq!(
            kinds(&out),
            [NotificationKind::NewPlayer, NotificationKind::LeaderboardSnapshot]
        );
    }

    #[test]
    fn missing_standings_skips_snapshot() {
        let r = record(1);
        let out = assemble(&r, None, 1000, Utc::now());
        assert_eq!(kinds(&out), [NotificationKind::NewPlayer]);
    }

    #[test]
    fn shared_timestamp_and_ranked_snapshot() {
        let now = Utc::now();
        let top = ScoreRecord::new(UserId::from_raw("u0"), "bob", 9000);
        let r = record(5000);
        let standings = vec![top, r.clone()];
        let out = assemble(&r, Some(standings.as_slice()), 1000, now);

        assert!(out.iter().all(|n| n.timestamp == now));
        let NotificationBody::LeaderboardSnapshot(snap) = &out[2].body else {
            panic!("expected snapshot, got {:?}", out[2].kind());
        };
        assert_eq!(snap.entries.len(), 2);
        assert_eq!(snap.entries[0].username, "bob");
        assert_eq!(snap.entries[1].rank, 2);
    }
}
