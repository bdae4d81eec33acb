pub mod ids;
pub mod notification;
pub mod outcome;
pub mod score;

pub use ids::{ConnectionId, UserId};
pub use notification::{Notification, NotificationBody, NotificationKind};
pub use outcome::{SubmissionOutcome, SubmissionReason};
pub use score::{LeaderboardEntry, ScoreRecord, MAX_SCORE};
