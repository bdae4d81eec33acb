use serde::Serialize;

use crate::score::ScoreRecord;

/// Why a submission was accepted or rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum SubmissionReason {
    Accepted,
    /// The user already has a score on record; carries it for display.
    #[serde(rename_all = "camelCase")]
    AlreadySubmitted { existing_score: u32 },
    /// Out of range. Carries the raw value that was rejected.
    InvalidScore { score: i64 },
    /// The store could not be read or written. Safe to retry.
    StoreFailure { message: String },
}

impl SubmissionReason {
    /// Only store failures are worth retrying; the rest are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreFailure { .. })
    }

    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::AlreadySubmitted { .. } => "already_submitted",
            Self::InvalidScore { .. } => "invalid_score",
            Self::StoreFailure { .. } => "store_failure",
        }
    }
}

/// Result of one pass through the submission gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub accepted: bool,
    #[serde(flatten)]
    pub reason: SubmissionReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<ScoreRecord>,
}

impl SubmissionOutcome {
    pub fn accepted(record: ScoreRecord) -> Self {
        Self {
            accepted: true,
            reason: SubmissionReason::Accepted,
            record: Some(record),
        }
    }

    pub fn already_submitted(existing_score: u32) -> Self {
        Self::rejected(SubmissionReason::AlreadySubmitted { existing_score })
    }

    pub fn invalid_score(score: i64) -> Self {
        Self::rejected(SubmissionReason::InvalidScore { score })
    }

    pub fn store_failure(message: impl Into<String>) -> Self {
        Self::rejected(SubmissionReason::StoreFailure {
            message: message.into(),
        })
    }

    fn rejected(reason: SubmissionReason) -> Self {
        Self {
            accepted: false,
            reason,
            record: None,
        }
    }

    /// Existing score when the user had already submitted.
    pub fn existing_score(&self) -> Option<u32> {
        match self.reason {
            SubmissionReason::AlreadySubmitted { existing_score } => Some(existing_score),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;

    #[test]
    fn accepted_carries_record() {
        let record = ScoreRecord::new(UserId::from_raw("u1"), "alice", 1500);
        let outcome = SubmissionOutcome::accepted(record.clone());
        assert!(outcome.accepted);
        assert_eq!(outcome.reason, SubmissionReason::Accepted);
        assert_eq!(outcome.record, Some(record));
    }

    #[test]
    fn rejections_have_no_record() {
        for outcome in [
            SubmissionOutcome::already_submitted(10),
            SubmissionOutcome::invalid_score(-1),
            SubmissionOutcome::store_failure("disk full"),
        ] {
            assert!(!outcome.accepted);
            assert!(outcome.record.is_none());
        }
    }

    #[test]
    fn only_store_failure_is_retryable() {
        assert!(SubmissionOutcome::store_failure("x").reason.is_retryable());
        assert!(!SubmissionOutcome::already_submitted(1).reason.is_retryable());
        assert!(!SubmissionOutcome::invalid_score(-5).reason.is_retryable());
        assert!(!SubmissionReason::Accepted.is_retryable());
    }

    #[test]
    fn duplicate_serializes_with_existing_score() {
        let json = serde_json::to_value(SubmissionOutcome::already_submitted(1500)).unwrap();
        assert_eq!(json["accepted"], false);
        assert_eq!(json["reason"], "alreadySubmitted");
        assert_eq!(json["existingScore"], 1500);
        assert!(json.get("record").is_none());
    }

    #[test]
    fn existing_score_only_for_duplicates() {
        assert_eq!(SubmissionOutcome::already_submitted(42).existing_score(), Some(42));
        assert_eq!(SubmissionOutcome::invalid_score(-1).existing_score(), None);
    }
}
