//! Study endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use srs_core::{Grade, ReviewEvent};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::AppState;

/// POST /api/users/{user_id}/sessions
pub async fn start_session(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<StudySessionResponse>> {
    let mut session = state.orchestrator.start_session(user_id, Utc::now()).await?;

    let items = session.by_ref().collect();
    Ok(Json(StudySessionResponse {
        items,
        policy: session.policy,
        backlog: session.backlog,
        transition: session.transition,
    }))
}

/// POST /api/users/{user_id}/reviews
pub async fn submit_review(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<SubmitReviewRequest>,
) -> Result<Json<ReviewSummary>> {
    let event = ReviewEvent {
        item_id: payload.item_id,
        grade: Grade::from_value(payload.grade)?,
        reviewed_at: payload.reviewed_at.unwrap_or_else(Utc::now),
    };

    let summary = state.orchestrator.submit_review(user_id, event).await?;
    Ok(Json(summary))
}
