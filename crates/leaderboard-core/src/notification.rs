use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::score::LeaderboardEntry;

/// Notification discriminant as it appears on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum NotificationKind {
    HighScore,
    NewPlayer,
    LeaderboardSnapshot,
    Custom,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighScore => "HighScore",
            Self::NewPlayer => "NewPlayer",
            Self::LeaderboardSnapshot => "LeaderboardSnapshot",
            Self::Custom => "Custom",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HighScorePayload {
    pub username: String,
    pub score: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewPlayerPayload {
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaderboardSnapshotPayload {
    pub entries: Vec<LeaderboardEntry>,
}

/// Kind-specific payload. Serialized untagged; the kind goes alongside it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NotificationBody {
    HighScore(HighScorePayload),
    NewPlayer(NewPlayerPayload),
    LeaderboardSnapshot(LeaderboardSnapshotPayload),
    Custom(serde_json::Value),
}

/// A transient event pushed to live subscribers. Never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub timestamp: DateTime<Utc>,
    pub body: NotificationBody,
}

impl Notification {
    pub fn new(body: NotificationBody) -> Self {
        Self {
            timestamp: Utc::now(),
            body,
        }
    }

    pub fn high_score(username: impl Into<String>, score: u32) -> Self {
        Self::new(NotificationBody::HighScore(HighScorePayload {
            username: username.into(),
            score,
        }))
    }

    pub fn new_player(username: impl Into<String>) -> Self {
        Self::new(NotificationBody::NewPlayer(NewPlayerPayload {
            username: username.into(),
        }))
    }

    pub fn leaderboard_snapshot(entries: Vec<LeaderboardEntry>) -> Self {
        Self::new(NotificationBody::LeaderboardSnapshot(
            LeaderboardSnapshotPayload { entries },
        ))
    }

    pub fn custom(payload: serde_json::Value) -> Self {
        Self::new(NotificationBody::Custom(payload))
    }

    /// Pin the timestamp, mostly for deterministic tests.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn kind(&self) -> NotificationKind {
        match self.body {
            NotificationBody::HighScore(_) => NotificationKind::HighScore,
            NotificationBody::NewPlayer(_) => NotificationKind::NewPlayer,
            NotificationBody::LeaderboardSnapshot(_) => NotificationKind::LeaderboardSnapshot,
            NotificationBody::Custom(_) => NotificationKind::Custom,
        }
    }

    /// Serialize to the wire JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for Notification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            kind: NotificationKind,
            timestamp: String,
            payload: &'a NotificationBody,
        }

        Wire {
            kind: self.kind(),
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            payload: &self.body,
        }
        .serialize(serializer)
    }
}
