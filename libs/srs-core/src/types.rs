//! Core types for the scheduling engine.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SchedulingError};

/// Identifier of a reviewable item.
pub type ItemId = Uuid;

/// Identifier of the learner owning a collection.
pub type UserId = Uuid;

/// Difficulty lower bound.
pub const MIN_DIFFICULTY: f64 = 1.0;

/// Difficulty upper bound.
pub const MAX_DIFFICULTY: f64 = 10.0;

/// What kind of content an item schedules. Content itself lives elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Flashcard,
    Question,
    ErrorEntry,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flashcard => "flashcard",
            Self::Question => "question",
            Self::ErrorEntry => "error_entry",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "flashcard" => Some(Self::Flashcard),
            "question" => Some(Self::Question),
            "error_entry" => Some(Self::ErrorEntry),
            _ => None,
        }
    }
}

/// Lifecycle stage of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    #[default]
    New,
    Learning,
    Review,
    Relearning,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Review => "review",
            Self::Relearning => "relearning",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "learning" => Some(Self::Learning),
            "review" => Some(Self::Review),
            "relearning" => Some(Self::Relearning),
            _ => None,
        }
    }
}

/// Grade given to a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Again,
    Hard,
    Good,
    Easy,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::Again, Grade::Hard, Grade::Good, Grade::Easy];

    /// Convert to the 4-point numeric value (1-4).
    pub fn to_value(self) -> u8 {
        match self {
            Self::Again => 1,
            Self::Hard => 2,
            Self::Good => 3,
            Self::Easy => 4,
        }
    }

    /// Parse a 4-point numeric value, rejecting anything outside 1-4.
    pub fn from_value(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Again),
            2 => Ok(Self::Hard),
            3 => Ok(Self::Good),
            4 => Ok(Self::Easy),
            other => Err(SchedulingError::InvalidInput(format!(
                "grade must be between 1 and 4, got {other}"
            ))),
        }
    }

    pub fn is_lapse(self) -> bool {
        self == Self::Again
    }
}

impl TryFrom<u8> for Grade {
    type Error = SchedulingError;

    fn try_from(value: u8) -> Result<Self> {
        Self::from_value(value)
    }
}

/// A single schedulable unit (flashcard, question or error-notebook entry).
///
/// The storage collaborator owns the durable record; the core only works on
/// transient copies and hands them back for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewableItem {
    pub id: ItemId,
    pub user_id: UserId,
    pub kind: ItemKind,
    pub state: ItemState,
    pub stability: f64,
    pub difficulty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub review_count: u32,
    pub lapse_count: u32,
    /// Non-AGAIN grades in a row since the last lapse.
    pub consecutive_successes: u32,
    /// Interval applied by the last review, in days.
    pub scheduled_days: u32,
    /// Optimistic concurrency token maintained by the store.
    pub version: u64,
}

impl ReviewableItem {
    /// A never-reviewed item, available from `created_at`.
    pub fn new(id: ItemId, user_id: UserId, kind: ItemKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            kind,
            state: ItemState::New,
            stability: 1.0,
            difficulty: 5.0,
            due_at: Some(created_at),
            last_reviewed_at: None,
            review_count: 0,
            lapse_count: 0,
            consecutive_successes: 0,
            scheduled_days: 0,
            version: 0,
        }
    }

    /// Due when `now` has reached `due_at`. NEW items without a due date are always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.due_at {
            Some(due) => now >= due,
            None => self.state == ItemState::New,
        }
    }

    /// Fractional days since the last review, 0 when never reviewed.
    pub fn elapsed_days(&self, now: DateTime<Utc>) -> f64 {
        self.last_reviewed_at
            .map(|last| now.signed_duration_since(last).num_seconds() as f64 / 86_400.0)
            .unwrap_or(0.0)
    }

    /// Whole days past due, 0 when not yet due.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        self.due_at
            .map(|due| now.signed_duration_since(due).num_days().max(0))
            .unwrap_or(0)
    }

    /// Check the invariants every scheduled item must hold.
    pub fn validate(&self) -> Result<()> {
        let corrupt = |reason: &str| {
            Err(SchedulingError::CorruptState {
                item_id: self.id,
                reason: reason.to_string(),
            })
        };

        if !self.stability.is_finite() || self.stability <= 0.0 {
            return corrupt(&format!("stability must be positive, got {}", self.stability));
        }
        if !self.difficulty.is_finite()
            || !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&self.difficulty)
        {
            return corrupt(&format!(
                "difficulty must be within [{MIN_DIFFICULTY}, {MAX_DIFFICULTY}], got {}",
                self.difficulty
            ));
        }
        if self.state != ItemState::New {
            if self.due_at.is_none() {
                return corrupt("reviewed item has no due date");
            }
            if self.last_reviewed_at.is_none() {
                return corrupt("reviewed item has no last review timestamp");
            }
        } else if self.last_reviewed_at.is_some() {
            return corrupt("new item already has a review timestamp");
        }
        Ok(())
    }
}

/// Input event for one review. Only its effect is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub item_id: ItemId,
    pub grade: Grade,
    pub reviewed_at: DateTime<Utc>,
}

/// Active scheduling mode and the data only that mode needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SchedulingMode {
    #[default]
    Normal,
    Recovery {
        spread_days: u32,
    },
    Cramming {
        exam_date: NaiveDate,
    },
}

impl SchedulingMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Recovery { .. } => "recovery",
            Self::Cramming { .. } => "cramming",
        }
    }
}

/// Study intensity preset. Each one trades review load against retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyIntensity {
    Cramming,
    Intensive,
    Balanced,
    Relaxed,
}

impl StudyIntensity {
    pub const ALL: [StudyIntensity; 4] = [
        StudyIntensity::Cramming,
        StudyIntensity::Intensive,
        StudyIntensity::Balanced,
        StudyIntensity::Relaxed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cramming => "cramming",
            Self::Intensive => "intensive",
            Self::Balanced => "balanced",
            Self::Relaxed => "relaxed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cramming" => Some(Self::Cramming),
            "intensive" => Some(Self::Intensive),
            "balanced" => Some(Self::Balanced),
            "relaxed" => Some(Self::Relaxed),
            _ => None,
        }
    }

    /// Recall probability at which items come due under this preset.
    pub fn target_retention(&self) -> f64 {
        match self {
            Self::Cramming => 0.95,
            Self::Intensive => 0.90,
            Self::Balanced => 0.85,
            Self::Relaxed => 0.80,
        }
    }
}

/// What a user asked for, kept across mode changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudyPreferences {
    /// Personal interval cap. Wins over the global and preset caps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_interval_days: Option<u32>,
    /// Intensity used outside of exam preparation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<StudyIntensity>,
}

impl StudyPreferences {
    pub fn is_empty(&self) -> bool {
        self.max_interval_days.is_none() && self.intensity.is_none()
    }
}

/// Per-user scheduling context. Passed explicitly into every scheduling call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingPolicy {
    #[serde(flatten)]
    pub mode: SchedulingMode,
    pub max_interval_days: u32,
    /// Active preset, if any. Drives the target retention of new intervals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<StudyIntensity>,
    #[serde(default, skip_serializing_if = "StudyPreferences::is_empty")]
    pub preferences: StudyPreferences,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self::normal(365)
    }
}

impl SchedulingPolicy {
    pub fn normal(max_interval_days: u32) -> Self {
        Self {
            mode: SchedulingMode::Normal,
            max_interval_days,
            intensity: None,
            preferences: StudyPreferences::default(),
        }
    }

    pub fn recovery_spread_days(&self) -> Option<u32> {
        match self.mode {
            SchedulingMode::Recovery { spread_days } => Some(spread_days),
            _ => None,
        }
    }

    pub fn exam_date(&self) -> Option<NaiveDate> {
        match self.mode {
            SchedulingMode::Cramming { exam_date } => Some(exam_date),
            _ => None,
        }
    }

    /// Interval cap in force at `at`. In cramming this also stops due dates
    /// from landing after the exam.
    pub fn effective_max_interval(&self, at: DateTime<Utc>) -> u32 {
        let cap = self.max_interval_days.max(1);
        match self.mode {
            SchedulingMode::Cramming { exam_date } => {
                let days_left = (exam_date - at.date_naive()).num_days();
                cap.min(days_left.clamp(1, u32::MAX as i64) as u32)
            }
            _ => cap,
        }
    }
}

/// Add whole days to a timestamp.
pub(crate) fn add_days(at: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    at + Duration::days(days as i64)
}
