//! API request and response types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use srs_core::{
    BacklogStatus, ModeTransition, OverdueStats, RecoveryPlan, ReviewSummary, SchedulingPolicy,
    StudyPreferences,
};

/// Response for POST /api/users/{user_id}/sessions
#[derive(Debug, Serialize, Deserialize)]
pub struct StudySessionResponse {
    /// Item ids in the order they should be studied.
    pub items: Vec<Uuid>,
    pub policy: SchedulingPolicy,
    pub backlog: BacklogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<ModeTransition>,
}

/// Request body for POST /api/users/{user_id}/reviews
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitReviewRequest {
    pub item_id: Uuid,
    /// 1 = again, 2 = hard, 3 = good, 4 = easy
    pub grade: u8,
    /// Defaults to the time the request is handled.
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Response for GET /api/users/{user_id}/backlog
#[derive(Debug, Serialize, Deserialize)]
pub struct UserBacklogResponse {
    pub backlog: BacklogStatus,
    pub overdue: OverdueStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<ModeTransition>,
}

/// Query for GET /api/backlog
#[derive(Debug, Deserialize)]
pub struct BacklogQuery {
    pub total_due: u32,
    pub limit: u32,
}

/// Query for GET /api/users/{user_id}/recovery-plan
#[derive(Debug, Deserialize)]
pub struct RecoveryPlanQuery {
    pub days: u32,
}

/// Request body for POST /api/users/{user_id}/mode/recovery
#[derive(Debug, Serialize, Deserialize)]
pub struct ActivateRecoveryRequest {
    pub days_to_spread: u32,
}

/// Request body for POST /api/users/{user_id}/mode/cramming
#[derive(Debug, Serialize, Deserialize)]
pub struct ActivateCrammingRequest {
    pub exam_date: NaiveDate,
}

/// Response for mode commands
#[derive(Debug, Serialize, Deserialize)]
pub struct ModeChangeResponse {
    pub transition: ModeTransition,
    pub policy: SchedulingPolicy,
}
