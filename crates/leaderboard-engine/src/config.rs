use leaderboard_core::{NotificationKind, MAX_SCORE};

use crate::broadcast::Target;

/// Tunables for the submission and broadcast path.
#[derive(Clone, Debug)]
pub struct LeaderboardConfig {
    /// Entries carried by a leaderboard snapshot.
    pub top_n: usize,
    /// Scores strictly above this trigger a HighScore notification.
    pub high_score_threshold: u32,
    /// Inclusive upper bound for an accepted score.
    pub max_score: u32,
    /// Room that receives leaderboard snapshots.
    pub leaderboard_room: String,
    /// Per-connection outbound queue depth.
    pub max_send_queue: usize,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            high_score_threshold: 1000,
            max_score: MAX_SCORE,
            leaderboard_room: "leaderboard".to_string(),
            max_send_queue: 256,
        }
    }
}

impl LeaderboardConfig {
    /// Where a notification of this kind is delivered.
    pub fn target_for(&self, kind: NotificationKind) -> Target {
        match kind {
            NotificationKind::LeaderboardSnapshot => Target::Room(self.leaderboard_room.clone()),
            NotificationKind::HighScore | NotificationKind::NewPlayer | NotificationKind::Custom => {
                Target::All
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_go_to_leaderboard_room() {
        let config = LeaderboardConfig::default();
        assert_eq!(
            config.target_for(NotificationKind::LeaderboardSnapshot),
            Target::Room("leaderboard".into())
        );
        assert_eq!(config.target_for(NotificationKind::HighScore), Target::All);
        assert_eq!(config.target_for(NotificationKind::NewPlayer), Target::All);
    }
}
