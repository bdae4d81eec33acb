//! HTTP handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use leaderboard_core::{SubmissionOutcome, SubmissionReason};

use crate::server::AppState;

/// Largest `limit` accepted by the leaderboard endpoint.
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

/// Seconds a client should wait before retrying after a store failure.
const RETRY_AFTER_SECS: &str = "1";

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// HTTP status for a submission outcome.
pub fn outcome_status(outcome: &SubmissionOutcome) -> StatusCode {
    match outcome.reason {
        SubmissionReason::Accepted => StatusCode::CREATED,
        SubmissionReason::AlreadySubmitted { .. } => StatusCode::CONFLICT,
        SubmissionReason::InvalidScore { .. } => StatusCode::BAD_REQUEST,
        SubmissionReason::StoreFailure { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Integer `score` field. Integers past `i64::MAX` saturate, which the gate
/// rejects as out of range.
fn parse_score(body: &serde_json::Value) -> Option<i64> {
    let score = body.get("score")?;
    score
        .as_i64()
        .or_else(|| score.as_u64().map(|_| i64::MAX))
}

/// `POST /api/scores` with body `{"score": n}`.
pub async fn submit_score(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let identity = match state.auth.authenticate(&headers) {
        Ok(identity) => identity,
        Err(e) => return error_response(e.status(), e.to_string()),
    };
    let Some(score) = parse_score(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "score must be an integer");
    };

    // Store I/O and the post-commit broadcast run off the async workers.
    let service = Arc::clone(&state.service);
    let outcome = match tokio::task::spawn_blocking(move || {
        service.submit_score(&identity.user_id, &identity.username, score)
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "submission task failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "submission failed");
        }
    };

    let status = outcome_status(&outcome);
    if outcome.reason.is_retryable() {
        (
            status,
            [(header::RETRY_AFTER, RETRY_AFTER_SECS)],
            Json(outcome),
        )
            .into_response()
    } else {
        (status, Json(outcome)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

/// `GET /api/leaderboard?limit=n`
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(state.service.config().top_n)
        .clamp(1, MAX_LEADERBOARD_LIMIT);
    let service = Arc::clone(&state.service);
    match tokio::task::spawn_blocking(move || service.leaderboard(limit)).await {
        Ok(Ok(entries)) => Json(json!({ "entries": entries })).into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "leaderboard read failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS)],
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "leaderboard task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "leaderboard read failed")
        }
    }
}

/// `GET /api/stats`
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.get_stats())
}

/// `GET /api/metrics`
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.metrics().snapshot())
}

#[derive(Debug, Deserialize)]
pub struct BroadcastBody {
    pub payload: serde_json::Value,
}

/// `POST /api/admin/broadcast` pushes a custom notification to everyone.
/// Admin role required.
pub async fn admin_broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BroadcastBody>,
) -> Response {
    let admin = match state.auth.authorize_admin(&headers) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "admin broadcast refused");
            return error_response(e.status(), e.to_string());
        }
    };
    let report = state.service.push_custom(body.payload);
    tracing::info!(
        admin = %admin.user_id,
        delivered = report.delivered,
        failed = report.failed,
        "admin broadcast"
    );
    Json(report).into_response()
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "connectedClients": state.service.get_stats().connected_clients,
    }))
}

#[cfg(test)]
mod tests {
    use leaderboard_core::{ScoreRecord, UserId};

    use super::*;

    #[test]
    fn outcome_status_mapping() {
        let record = ScoreRecord::new(UserId::from_raw("u1"), "alice", 5);
        assert_eq!(outcome_status(&SubmissionOutcome::accepted(record)), StatusCode::CREATED);
        assert_eq!(
            outcome_status(&SubmissionOutcome::already_submitted(5)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            outcome_status(&SubmissionOutcome::invalid_score(-1)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            outcome_status(&SubmissionOutcome::store_failure("down")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn score_must_be_an_integer() {
        assert_eq!(parse_score(&json!({ "score": 42 })), Some(42));
        assert_eq!(parse_score(&json!({ "score": -3 })), Some(-3));
        assert_eq!(parse_score(&json!({ "score": 1.5 })), None);
        assert_eq!(parse_score(&json!({ "score": "42" })), None);
        assert_eq!(parse_score(&json!({})), None);
    }

    #[test]
    fn oversized_integer_saturates_into_invalid_range() {
        assert_eq!(parse_score(&json!({ "score": u64::MAX })), Some(i64::MAX));
    }
}
