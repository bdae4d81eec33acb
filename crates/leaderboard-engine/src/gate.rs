//! One-score-per-user submission enforcement.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use leaderboard_core::{ScoreRecord, SubmissionOutcome, UserId};
use leaderboard_store::{PutOutcome, ScoreStore, StoreError};
use leaderboard_telemetry::MetricsRecorder;

use crate::assembler::assemble;
use crate::broadcast::NotificationPublisher;
use crate::config::LeaderboardConfig;

/// Validates submissions, commits them with a conditional write, and fires
/// notifications for the ones that commit.
pub struct SubmissionGate {
    store: Arc<dyn ScoreStore>,
    publisher: Arc<dyn NotificationPublisher>,
    config: LeaderboardConfig,
    metrics: Arc<MetricsRecorder>,
}

impl SubmissionGate {
    pub fn new(
        store: Arc<dyn ScoreStore>,
        publisher: Arc<dyn NotificationPublisher>,
        config: LeaderboardConfig,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &LeaderboardConfig {
        &self.config
    }

    /// Submit a user's one and only score.
    ///
    /// Out-of-range scores are rejected before the store is touched. The
    /// write is `put_if_absent`, so two racing submissions for the same user
    /// cannot both be accepted. Notifications are sent only after a commit
    /// and their failures never change the outcome.
    #[instrument(skip_all, fields(user_id = %user_id, raw_score = score))]
    pub fn submit(&self, user_id: &UserId, username: &str, score: i64) -> SubmissionOutcome {
        let outcome = self.decide(user_id, username, score);
        let kind = outcome.reason.kind();
        self.metrics
            .counter_inc("submissions_total", &[("outcome", kind)], 1);

        match &outcome.record {
            Some(record) => {
                info!(username, score = record.score, "score accepted");
                self.after_commit(record);
            }
            None if outcome.reason.is_retryable() => {
                warn!(reason = kind, "submission failed")
            }
            None => debug!(reason = kind, "submission rejected"),
        }
        outcome
    }

    fn decide(&self, user_id: &UserId, username: &str, score: i64) -> SubmissionOutcome {
        let Some(value) = u32::try_from(score)
            .ok()
            .filter(|v| *v <= self.config.max_score)
        else {
            return SubmissionOutcome::invalid_score(score);
        };

        match self.store.get_by_user_id(user_id) {
            Ok(Some(existing)) => return SubmissionOutcome::already_submitted(existing.score),
            Ok(None) => {}
            Err(e) => return store_failure(e),
        }

        let record = ScoreRecord::new(user_id.clone(), username, value);
        match self.store.put_if_absent(&record) {
            Ok(PutOutcome::Inserted) => SubmissionOutcome::accepted(record),
            Ok(PutOutcome::Conflict) => {
                // lost a race with a concurrent submission for this user
                debug!("conditional write conflicted, re-reading");
                match self.store.get_by_user_id(user_id) {
                    Ok(Some(existing)) => SubmissionOutcome::already_submitted(existing.score),
                    Ok(None) => store_failure(StoreError::Unavailable(
                        "write conflicted but no record is visible".into(),
                    )),
                    Err(e) => store_failure(e),
                }
            }
            Err(e) => store_failure(e),
        }
    }

    /// Post-commit hook. Runs inline; every failure is logged and swallowed.
    fn after_commit(&self, record: &ScoreRecord) {
        let standings = match self.store.top_n(self.config.top_n) {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(error = %e, "could not read standings, skipping leaderboard snapshot");
                None
            }
        };

        for notification in assemble(
            record,
            standings.as_deref(),
            self.config.high_score_threshold,
            Utc::now(),
        ) {
            let target = self.config.target_for(notification.kind());
            if let Err(e) = self.publisher.publish(&target, &notification) {
                self.metrics.counter_inc(
                    "publish_errors_total",
                    &[("kind", notification.kind().as_str())],
                    1,
                );
                warn!(kind = %notification.kind(), error = %e, "failed to publish notification");
            }
        }
    }
}

fn store_failure(e: StoreError) -> SubmissionOutcome {
    SubmissionOutcome::store_failure(e.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use leaderboard_core::{Notification, NotificationBody, NotificationKind, SubmissionReason};
    use leaderboard_store::{Database, MemoryScoreStore, ScoreRepo};

    use super::*;
    use crate::broadcast::{DeliveryReport, Target};
    use crate::error::BroadcastError;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<(Target, Notification)>>,
    }

    impl RecordingPublisher {
        fn kinds(&self) -> Vec<NotificationKind> {
            self.sent.lock().iter().map(|(_, n)| n.kind()).collect()
        }

        fn clear(&self) {
            self.sent.lock().clear();
        }
    }

    impl NotificationPublisher for RecordingPublisher {
        fn publish(
            &self,
            target: &Target,
            notification: &Notification,
        ) -> Result<DeliveryReport, BroadcastError> {
            self.sent.lock().push((target.clone(), notification.clone()));
            Ok(DeliveryReport::default())
        }
    }

    struct FailingPublisher;

    impl NotificationPublisher for FailingPublisher {
        fn publish(&self, _: &Target, _: &Notification) -> Result<DeliveryReport, BroadcastError> {
            let bad = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
            Err(BroadcastError::Encode(bad))
        }
    }

    /// Store that fails every call and counts how often it was touched.
    #[derive(Default)]
    struct DownStore {
        calls: AtomicUsize,
    }

    impl DownStore {
        fn fail<T>(&self) -> Result<T, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    impl ScoreStore for DownStore {
        fn get_by_user_id(&self, _: &UserId) -> Result<Option<ScoreRecord>, StoreError> {
            self.fail()
        }
        fn put_if_absent(&self, _: &ScoreRecord) -> Result<PutOutcome, StoreError> {
            self.fail()
        }
        fn top_n(&self, _: usize) -> Result<Vec<ScoreRecord>, StoreError> {
            self.fail()
        }
    }

    /// First read misses even though a record exists, as if another writer
    /// committed between our read and our write.
    struct StaleFirstRead {
        inner: MemoryScoreStore,
        stale: AtomicBool,
    }

    impl ScoreStore for StaleFirstRead {
        fn get_by_user_id(&self, user_id: &UserId) -> Result<Option<ScoreRecord>, StoreError> {
            if self.stale.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.get_by_user_id(user_id)
        }
        fn put_if_absent(&self, record: &ScoreRecord) -> Result<PutOutcome, StoreError> {
            self.inner.put_if_absent(record)
        }
        fn top_n(&self, n: usize) -> Result<Vec<ScoreRecord>, StoreError> {
            self.inner.top_n(n)
        }
    }

    /// Writes work but standings cannot be read.
    struct NoStandings(MemoryScoreStore);

    impl ScoreStore for NoStandings {
        fn get_by_user_id(&self, user_id: &UserId) -> Result<Option<ScoreRecord>, StoreError> {
            self.0.get_by_user_id(user_id)
        }
        fn put_if_absent(&self, record: &ScoreRecord) -> Result<PutOutcome, StoreError> {
            self.0.put_if_absent(record)
        }
        fn top_n(&self, _: usize) -> Result<Vec<ScoreRecord>, StoreError> {
            Err(StoreError::Unavailable("read replica down".into()))
        }
    }

    fn gate_with(
        store: Arc<dyn ScoreStore>,
    ) -> (SubmissionGate, Arc<RecordingPublisher>, Arc<MetricsRecorder>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let metrics = Arc::new(MetricsRecorder::new());
        let gate = SubmissionGate::new(
            store,
            publisher.clone(),
            LeaderboardConfig::default(),
            Arc::clone(&metrics),
        );
        (gate, publisher, metrics)
    }

    fn sqlite_gate() -> (SubmissionGate, Arc<RecordingPublisher>, Arc<ScoreRepo>) {
        let repo = Arc::new(ScoreRepo::new(Database::in_memory().unwrap()));
        let (gate, publisher, _) = gate_with(repo.clone());
        (gate, publisher, repo)
    }

    fn u(id: &str) -> UserId {
        UserId::from_raw(id)
    }

    #[test]
    fn first_high_score_emits_all_three() {
        let (gate, publisher, _) = sqlite_gate();

        let outcome = gate.submit(&u("u1"), "alice", 1500);
        assert!(outcome.accepted);
        assert_eq!(outcome.reason, SubmissionReason::Accepted);
        assert_eq!(outcome.record.as_ref().unwrap().score, 1500);

        assert_eq!(
            publisher.kinds(),
            [
                NotificationKind::HighScore,
                NotificationKind::NewPlayer,
                NotificationKind::LeaderboardSnapshot
            ]
        );
        let sent = publisher.sent.lock();
        assert_eq!(sent[0].0, Target::All);
        assert_eq!(sent[1].0, Target::All);
        assert_eq!(sent[2].0, Target::Room("leaderboard".into()));
        let NotificationBody::LeaderboardSnapshot(snap) = &sent[2].1.body else {
            panic!("expected snapshot");
        };
        assert_eq!(snap.entries.len(), 1);
        assert_eq!(snap.entries[0].username, "alice");
        assert_eq!(snap.entries[0].score, 1500);
    }

    #[test]
    fn second_submission_is_rejected_without_write_or_broadcast() {
        let (gate, publisher, repo) = sqlite_gate();
        assert!(gate.submit(&u("u1"), "alice", 1500).accepted);
        publisher.clear();

        let second = gate.submit(&u("u1"), "alice", 2000);
        assert!(!second.accepted);
        assert_eq!(second.existing_score(), Some(1500));
        assert!(second.record.is_none());
        assert!(publisher.kinds().is_empty());

        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(repo.get_by_user_id(&u("u1")).unwrap().unwrap().score, 1500);
    }

    #[test]
    fn ordinary_score_has_no_high_score() {
        let (gate, publisher, _) = sqlite_gate();
        assert!(gate.submit(&u("u2"), "bob", 500).accepted);
        assert_eq!(
            publisher.kinds(),
            [NotificationKind::NewPlayer, NotificationKind::LeaderboardSnapshot]
        );
    }

    #[test]
    fn out_of_range_never_touches_the_store() {
        let store = Arc::new(DownStore::default());
        let (gate, publisher, metrics) = gate_with(store.clone());

        for bad in [-1, 1_000_001, i64::MIN, i64::MAX] {
            let outcome = gate.submit(&u("u1"), "alice", bad);
            assert_eq!(outcome.reason, SubmissionReason::InvalidScore { score: bad });
            assert!(!outcome.reason.is_retryable());
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert!(publisher.kinds().is_empty());
        assert_eq!(
            metrics.counter_get("submissions_total", &[("outcome", "invalid_score")]),
            4
        );
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let (gate, _, _) = sqlite_gate();
        assert!(gate.submit(&u("zero"), "z", 0).accepted);
        assert!(gate.submit(&u("max"), "m", 1_000_000).accepted);
    }

    #[test]
    fn store_outage_is_retryable_and_silent() {
        let (gate, publisher, _) = gate_with(Arc::new(DownStore::default()));
        let outcome = gate.submit(&u("u1"), "alice", 10);
        assert!(!outcome.accepted);
        assert!(outcome.reason.is_retryable());
        assert!(matches!(outcome.reason, SubmissionReason::StoreFailure { .. }));
        assert!(publisher.kinds().is_empty());
    }

    #[test]
    fn conflict_after_stale_read_reports_existing_score() {
        let inner = MemoryScoreStore::new();
        inner
            .put_if_absent(&ScoreRecord::new(u("u1"), "alice", 700))
            .unwrap();
        let store = Arc::new(StaleFirstRead {
            inner,
            stale: AtomicBool::new(true),
        });
        let (gate, publisher, _) = gate_with(store.clone());

        let outcome = gate.submit(&u("u1"), "alice", 900);
        assert_eq!(outcome.existing_score(), Some(700));
        assert!(publisher.kinds().is_empty());
        assert_eq!(store.inner.get_by_user_id(&u("u1")).unwrap().unwrap().score, 700);
    }

    #[test]
    fn publisher_failure_does_not_fail_submission() {
        let metrics = Arc::new(MetricsRecorder::new());
        let gate = SubmissionGate::new(
            Arc::new(MemoryScoreStore::new()),
            Arc::new(FailingPublisher),
            LeaderboardConfig::default(),
            Arc::clone(&metrics),
        );
        let outcome = gate.submit(&u("u1"), "alice", 5000);
        assert!(outcome.accepted);
        assert_eq!(
            metrics.counter_get("publish_errors_total", &[("kind", "HighScore")]),
            1
        );
    }

    #[test]
    fn unreadable_standings_skip_only_the_snapshot() {
        let (gate, publisher, _) = gate_with(Arc::new(NoStandings(MemoryScoreStore::new())));
        assert!(gate.submit(&u("u1"), "alice", 5000).accepted);
        assert_eq!(
            publisher.kinds(),
            [NotificationKind::HighScore, NotificationKind::NewPlayer]
        );
    }

    // A rejected duplicate could arguably refresh the leaderboard for
    // watchers. It does not: rejections are silent.
    #[test]
    fn rejected_duplicate_does_not_broadcast_snapshot() {
        let (gate, publisher, _) = sqlite_gate();
        gate.submit(&u("u1"), "alice", 10);
        publisher.clear();
        gate.submit(&u("u1"), "alice", 20);
        assert!(!publisher
            .kinds()
            .contains(&NotificationKind::LeaderboardSnapshot));
    }

    #[test]
    fn racing_submissions_accept_exactly_one() {
        let repo = Arc::new(ScoreRepo::new(Database::in_memory().unwrap()));
        let (gate, publisher, _) = gate_with(repo.clone());
        let gate = Arc::new(gate);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.submit(&u("racer"), "racer", 100 + i))
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<_> = outcomes.iter().filter(|o| o.accepted).collect();
        assert_eq!(winners.len(), 1);
        let kept = winners[0].record.as_ref().unwrap().score;
        for loser in outcomes.iter().filter(|o| !o.accepted) {
            assert_eq!(loser.existing_score(), Some(kept));
        }
        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(
            publisher
                .kinds()
                .iter()
                .filter(|k| **k == NotificationKind::NewPlayer)
                .count(),
            1
        );
    }

    #[test]
    fn distinct_users_all_accepted_concurrently() {
        let store = Arc::new(MemoryScoreStore::new());
        let (gate, _, metrics) = gate_with(store.clone());
        let gate = Arc::new(gate);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.submit(&u(&format!("u{i}")), "p", i))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap().accepted);
        }
        assert_eq!(store.len(), 8);
        assert_eq!(
            metrics.counter_get("submissions_total", &[("outcome", "accepted")]),
            8
        );
    }
}
