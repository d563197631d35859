//! Backlog endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use srs_core::{compute_backlog, plan_recovery};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::AppState;

/// GET /api/backlog?total_due=&limit=
pub async fn compute(Query(query): Query<BacklogQuery>) -> Result<Json<BacklogStatus>> {
    Ok(Json(compute_backlog(query.total_due, query.limit)?))
}

/// GET /api/users/{user_id}/backlog
pub async fn for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserBacklogResponse>> {
    let now = Utc::now();
    let check = state.orchestrator.check_backlog(user_id, now).await?;
    let overdue = state.orchestrator.overdue_stats(user_id, now).await?;

    Ok(Json(UserBacklogResponse {
        backlog: check.backlog,
        overdue,
        transition: check.transition,
    }))
}

/// GET /api/users/{user_id}/recovery-plan?days=
pub async fn recovery_plan(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<RecoveryPlanQuery>,
) -> Result<Json<RecoveryPlan>> {
    let now = Utc::now();
    let check = state.orchestrator.check_backlog(user_id, now).await?;
    let plan = plan_recovery(check.backlog.total_due, query.days, now.date_naive())?;
    Ok(Json(plan))
}
