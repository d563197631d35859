//! Backlog monitor.
//!
//! Classifies how far a learner's due reviews exceed their daily capacity and
//! proposes a way back. All functions are pure.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulingError};
use crate::types::{ItemKind, ReviewableItem};

/// Items overdue by more than this many days count as very overdue.
const VERY_OVERDUE_DAYS: i64 = 30;

/// Backlog severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogSeverity {
    Normal,
    Warning,
    Critical,
    Severe,
}

impl BacklogSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Severe => "severe",
        }
    }
}

/// Upper ratio bounds (inclusive) of each severity band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacklogThresholds {
    /// Ratios up to this are `normal`.
    pub warning: f64,
    /// Ratios up to this are `warning`.
    pub critical: f64,
    /// Ratios up to this are `critical`, anything above is `severe`.
    pub severe: f64,
}

impl Default for BacklogThresholds {
    fn default() -> Self {
        Self {
            warning: 1.0,
            critical: 1.5,
            severe: 3.0,
        }
    }
}

impl BacklogThresholds {
    pub fn validate(&self) -> Result<()> {
        if !(self.warning > 0.0 && self.warning < self.critical && self.critical < self.severe) {
            return Err(SchedulingError::InvalidConfig(
                "backlog thresholds must satisfy 0 < warning < critical < severe".to_string(),
            ));
        }
        Ok(())
    }

    pub fn classify(&self, ratio: f64) -> BacklogSeverity {
        if ratio <= self.warning {
            BacklogSeverity::Normal
        } else if ratio <= self.critical {
            BacklogSeverity::Warning
        } else if ratio <= self.severe {
            BacklogSeverity::Critical
        } else {
            BacklogSeverity::Severe
        }
    }
}

/// Snapshot of a learner's backlog. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogStatus {
    pub total_due: u32,
    pub limit: u32,
    pub backlog_ratio: f64,
    pub status: BacklogSeverity,
    /// Days needed at `limit` reviews per day, assuming nothing new becomes due.
    pub days_to_recover: u32,
    pub suggestions: Vec<String>,
}

impl BacklogStatus {
    pub fn is_over_capacity(&self) -> bool {
        self.total_due > self.limit
    }
}

#[derive(Debug, Clone, Default)]
pub struct BacklogMonitor {
    thresholds: BacklogThresholds,
}

impl BacklogMonitor {
    pub fn new(thresholds: BacklogThresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &BacklogThresholds {
        &self.thresholds
    }

    pub fn assess(&self, total_due: u32, limit: u32) -> Result<BacklogStatus> {
        if limit == 0 {
            return Err(SchedulingError::InvalidConfig(
                "daily review limit must be positive".to_string(),
            ));
        }

        let backlog_ratio = total_due as f64 / limit as f64;
        let status = self.thresholds.classify(backlog_ratio);
        let days_to_recover = total_due.div_ceil(limit);

        Ok(BacklogStatus {
            total_due,
            limit,
            backlog_ratio,
            status,
            days_to_recover,
            suggestions: suggestions_for(status, total_due, days_to_recover),
        })
    }
}

/// Classify a backlog with the default thresholds.
pub fn compute_backlog(total_due: u32, limit: u32) -> Result<BacklogStatus> {
    BacklogMonitor::default().assess(total_due, limit)
}

fn suggestions_for(status: BacklogSeverity, total_due: u32, days: u32) -> Vec<String> {
    match status {
        BacklogSeverity::Normal => {
            vec!["Your reviews are within your daily limit. Keep the routine going.".to_string()]
        }
        BacklogSeverity::Warning => vec![
            "Start with the most overdue items.".to_string(),
            "Introduce fewer new items until the backlog clears.".to_string(),
        ],
        BacklogSeverity::Critical => vec![
            "Start with the most overdue items.".to_string(),
            "Pause new items until the backlog clears.".to_string(),
            format!(
                "At your current limit the backlog clears in {days} days; recovery mode can spread it out."
            ),
        ],
        BacklogSeverity::Severe => vec![
            format!("Activate recovery mode to spread {total_due} due reviews over {days} days."),
            "Defer all new items until you are back under your daily limit.".to_string(),
            "Start with the most overdue items.".to_string(),
            "Consider raising your daily limit for a few days.".to_string(),
        ],
    }
}

/// One day of a recovery plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyQuota {
    pub date: NaiveDate,
    pub reviews: u32,
}

/// A backlog split evenly across a number of days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub total_due: u32,
    pub days: Vec<DailyQuota>,
}

impl RecoveryPlan {
    pub fn first_day_quota(&self) -> u32 {
        self.days.first().map(|d| d.reviews).unwrap_or(0)
    }
}

/// Longest recovery plan `plan_recovery` will lay out, ten years.
pub const MAX_RECOVERY_PLAN_DAYS: u32 = 3650;

/// Reviews due on the first day when `total_due` is spread over
/// `spread_days` days. Same split as `plan_recovery`, without building it.
pub fn first_day_quota(total_due: u32, spread_days: u32) -> Result<u32> {
    if spread_days == 0 {
        return Err(SchedulingError::InvalidInput(
            "recovery must spread over at least one day".to_string(),
        ));
    }
    Ok(total_due / spread_days + u32::from(total_due % spread_days > 0))
}

/// Spread `total_due` reviews over `spread_days` days starting at `start`.
/// Any remainder goes to the earliest days.
pub fn plan_recovery(total_due: u32, spread_days: u32, start: NaiveDate) -> Result<RecoveryPlan> {
    if spread_days == 0 {
        return Err(SchedulingError::InvalidInput(
            "recovery must spread over at least one day".to_string(),
        ));
    }
    if spread_days > MAX_RECOVERY_PLAN_DAYS {
        return Err(SchedulingError::InvalidInput(format!(
            "recovery plans cover at most {MAX_RECOVERY_PLAN_DAYS} days, got {spread_days}"
        )));
    }

    let base = total_due / spread_days;
    let remainder = total_due % spread_days;
    let days = (0..spread_days)
        .map(|i| {
            let date = start
                .checked_add_signed(Duration::days(i64::from(i)))
                .ok_or_else(|| {
                    SchedulingError::InvalidInput(format!(
                        "recovery plan from {start} runs past the last supported date"
                    ))
                })?;
            Ok(DailyQuota {
                date,
                reviews: base + u32::from(i < remainder),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RecoveryPlan { total_due, days })
}

/// Overdue breakdown for a collection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverdueStats {
    /// Items whose due date is before the start of today.
    pub total_overdue: u32,
    pub by_kind: BTreeMap<ItemKind, u32>,
    pub very_overdue: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_overdue_days: Option<i64>,
}

impl OverdueStats {
    pub fn collect<'a>(items: impl IntoIterator<Item = &'a ReviewableItem>, now: DateTime<Utc>) -> Self {
        let start_of_today = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);

        let mut stats = Self::default();
        for item in items {
            let Some(due) = item.due_at else { continue };
            if due >= start_of_today {
                continue;
            }
            let days = now.signed_duration_since(due).num_days();
            stats.total_overdue += 1;
            *stats.by_kind.entry(item.kind).or_insert(0) += 1;
            if days > VERY_OVERDUE_DAYS {
                stats.very_overdue += 1;
            }
            stats.oldest_overdue_days = Some(stats.oldest_overdue_days.map_or(days, |d| d.max(days)));
        }
        stats
    }
}
