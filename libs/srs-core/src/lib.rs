//! Spaced-repetition scheduling core.
//!
//! Provides:
//! - Memory model (stability, difficulty, retrievability)
//! - Review scheduler with per-mode interval caps
//! - Backlog monitor, recovery plans and overdue statistics
//! - Mode controller (normal, recovery, cramming) and study intensity presets
//! - Review session orchestrator over a pluggable `ReviewStore`

pub mod backlog;
pub mod error;
pub mod memory;
pub mod mode;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod types;

pub use backlog::{
    compute_backlog, first_day_quota, plan_recovery, BacklogMonitor, BacklogSeverity,
    BacklogStatus, BacklogThresholds, DailyQuota, OverdueStats, RecoveryPlan,
    MAX_RECOVERY_PLAN_DAYS,
};
pub use error::{Result, SchedulingError, StoreError};
pub use memory::{MemoryModel, MemoryParameters, MemorySnapshot, MemoryUpdate};
pub use mode::{
    BacklogCheck, IntensityPresets, ModeConfig, ModeController, ModeTransition, TransitionReason,
};
pub use scheduler::{review_item, ReviewPreview, ScheduledReview, Scheduler, SchedulerConfig};
pub use session::{ReviewSummary, SessionConfig, SessionOrchestrator, StudySession, UserLocks};
pub use store::{InMemoryStore, ReviewStore, StoreResult};
pub use types::{
    Grade, ItemId, ItemKind, ItemState, ReviewEvent, ReviewableItem, SchedulingMode,
    SchedulingPolicy, StudyIntensity, StudyPreferences, UserId,
};
