//! Scheduling mode endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::AppState;

/// GET /api/users/{user_id}/policy
pub async fn policy(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<SchedulingPolicy>> {
    Ok(Json(state.orchestrator.policy(user_id).await?))
}

/// POST /api/users/{user_id}/mode/recovery
pub async fn activate_recovery(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<ActivateRecoveryRequest>,
) -> Result<Json<ModeChangeResponse>> {
    let transition = state
        .orchestrator
        .activate_recovery(user_id, payload.days_to_spread)
        .await?;
    respond(&state, user_id, transition).await
}

/// POST /api/users/{user_id}/mode/cramming
pub async fn activate_cramming(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<ActivateCrammingRequest>,
) -> Result<Json<ModeChangeResponse>> {
    let transition = state
        .orchestrator
        .activate_cramming(user_id, payload.exam_date, Utc::now())
        .await?;
    respond(&state, user_id, transition).await
}

/// DELETE /api/users/{user_id}/mode
pub async fn deactivate(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ModeChangeResponse>> {
    let transition = state.orchestrator.deactivate_mode(user_id).await?;
    respond(&state, user_id, transition).await
}

/// PUT /api/users/{user_id}/preferences
pub async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<StudyPreferences>,
) -> Result<Json<SchedulingPolicy>> {
    let policy = state
        .orchestrator
        .update_preferences(user_id, payload, Utc::now())
        .await?;
    Ok(Json(policy))
}

async fn respond(
    state: &AppState,
    user_id: Uuid,
    transition: ModeTransition,
) -> Result<Json<ModeChangeResponse>> {
    let policy = state.orchestrator.policy(user_id).await?;
    Ok(Json(ModeChangeResponse { transition, policy }))
}
