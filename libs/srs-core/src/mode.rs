//! Mode controller.
//!
//! State machine over NORMAL, RECOVERY and CRAMMING. It only ever mutates the
//! `SchedulingPolicy` it is handed; callers own the policy and serialize
//! writes per user.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::backlog::{BacklogMonitor, BacklogStatus, BacklogThresholds};
use crate::error::{Result, SchedulingError};
use crate::types::{SchedulingMode, SchedulingPolicy, StudyIntensity, StudyPreferences};

/// Interval caps per intensity and the exam distances that pick each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensityPresets {
    pub cramming_max_interval_days: u32,
    pub intensive_max_interval_days: u32,
    pub balanced_max_interval_days: u32,
    pub relaxed_max_interval_days: u32,
    /// Exams at most this many days away select cramming.
    pub cramming_within_days: u32,
    pub intensive_within_days: u32,
    pub balanced_within_days: u32,
}

impl Default for IntensityPresets {
    fn default() -> Self {
        Self {
            cramming_max_interval_days: 15,
            intensive_max_interval_days: 30,
            balanced_max_interval_days: 40,
            relaxed_max_interval_days: 60,
            cramming_within_days: 15,
            intensive_within_days: 30,
            balanced_within_days: 90,
        }
    }
}

impl IntensityPresets {
    pub fn max_interval_days(&self, intensity: StudyIntensity) -> u32 {
        match intensity {
            StudyIntensity::Cramming => self.cramming_max_interval_days,
            StudyIntensity::Intensive => self.intensive_max_interval_days,
            StudyIntensity::Balanced => self.balanced_max_interval_days,
            StudyIntensity::Relaxed => self.relaxed_max_interval_days,
        }
    }

    /// Preset for an exam `days` away. Each bound is inclusive.
    pub fn for_days_until_exam(&self, days: i64) -> StudyIntensity {
        if days <= i64::from(self.cramming_within_days) {
            StudyIntensity::Cramming
        } else if days <= i64::from(self.intensive_within_days) {
            StudyIntensity::Intensive
        } else if days <= i64::from(self.balanced_within_days) {
            StudyIntensity::Balanced
        } else {
            StudyIntensity::Relaxed
        }
    }

    fn validate(&self) -> Result<()> {
        if StudyIntensity::ALL
            .iter()
            .any(|i| self.max_interval_days(*i) == 0)
        {
            return Err(SchedulingError::InvalidConfig(
                "preset interval caps must be positive".to_string(),
            ));
        }
        if self.cramming_within_days > self.intensive_within_days
            || self.intensive_within_days > self.balanced_within_days
        {
            return Err(SchedulingError::InvalidConfig(
                "preset exam distances must be ascending".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    /// Interval cap in NORMAL mode. Also the longest recovery spread.
    pub base_max_interval_days: u32,
    /// Lowest cap RECOVERY may set.
    pub min_recovery_cap_days: u32,
    pub presets: IntensityPresets,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            base_max_interval_days: 365,
            min_recovery_cap_days: 1,
            presets: IntensityPresets::default(),
        }
    }
}

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    RecoveryActivated,
    CrammingActivated,
    Deactivated,
    BacklogCleared,
    ExamPassed,
}

/// A completed mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeTransition {
    pub from: SchedulingMode,
    pub to: SchedulingMode,
    pub reason: TransitionReason,
}

/// Backlog assessment plus any automatic mode change it triggered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacklogCheck {
    pub backlog: BacklogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<ModeTransition>,
}

#[derive(Debug, Clone, Default)]
pub struct ModeController {
    config: ModeConfig,
    monitor: BacklogMonitor,
}

impl ModeController {
    pub fn new(config: ModeConfig, thresholds: BacklogThresholds) -> Result<Self> {
        if config.base_max_interval_days == 0 {
            return Err(SchedulingError::InvalidConfig(
                "base_max_interval_days must be positive".to_string(),
            ));
        }
        if config.min_recovery_cap_days > config.base_max_interval_days {
            return Err(SchedulingError::InvalidConfig(
                "min_recovery_cap_days cannot exceed base_max_interval_days".to_string(),
            ));
        }
        config.presets.validate()?;
        Ok(Self {
            config,
            monitor: BacklogMonitor::new(thresholds)?,
        })
    }

    pub fn config(&self) -> &ModeConfig {
        &self.config
    }

    pub fn monitor(&self) -> &BacklogMonitor {
        &self.monitor
    }

    /// Fresh NORMAL policy for a user seen for the first time.
    pub fn initial_policy(&self) -> SchedulingPolicy {
        SchedulingPolicy::normal(self.config.base_max_interval_days)
    }

    /// NORMAL -> RECOVERY. Caps intervals so reviewed items come back within
    /// the spread window.
    pub fn activate_recovery(
        &self,
        policy: &mut SchedulingPolicy,
        days_to_spread: u32,
    ) -> Result<ModeTransition> {
        if !matches!(policy.mode, SchedulingMode::Normal) {
            return Err(invalid(policy, "recovery can only start from normal mode"));
        }
        if days_to_spread == 0 {
            return Err(invalid(policy, "recovery must spread over at least one day"));
        }
        let longest = self.config.base_max_interval_days;
        if days_to_spread > longest {
            return Err(invalid(
                policy,
                &format!("recovery spreads over at most {longest} days, got {days_to_spread}"),
            ));
        }

        let cap = days_to_spread.max(self.config.min_recovery_cap_days);
        let intensity = policy.preferences.intensity;
        Ok(self.transition(
            policy,
            SchedulingMode::Recovery {
                spread_days: days_to_spread,
            },
            cap,
            intensity,
            TransitionReason::RecoveryActivated,
        ))
    }

    /// NORMAL/RECOVERY -> CRAMMING. The exam must still be ahead. The preset
    /// follows the distance to the exam.
    pub fn activate_cramming(
        &self,
        policy: &mut SchedulingPolicy,
        exam_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ModeTransition> {
        if matches!(policy.mode, SchedulingMode::Cramming { .. }) {
            return Err(invalid(policy, "cramming is already active"));
        }

        let days_left = (exam_date - now.date_naive()).num_days();
        if days_left <= 0 {
            return Err(invalid(
                policy,
                &format!("exam date {exam_date} is not in the future"),
            ));
        }

        let (intensity, cap) = self.exam_settings(&policy.preferences, days_left);
        Ok(self.transition(
            policy,
            SchedulingMode::Cramming { exam_date },
            cap,
            Some(intensity),
            TransitionReason::CrammingActivated,
        ))
    }

    /// RECOVERY/CRAMMING -> NORMAL on request.
    pub fn deactivate(&self, policy: &mut SchedulingPolicy) -> Result<ModeTransition> {
        if matches!(policy.mode, SchedulingMode::Normal) {
            return Err(invalid(policy, "no special mode is active"));
        }
        Ok(self.restore_normal(policy, TransitionReason::Deactivated))
    }

    /// Store new user preferences and re-derive the cap and preset of the
    /// active mode from them. A RECOVERY cap is left alone.
    pub fn set_preferences(
        &self,
        policy: &mut SchedulingPolicy,
        preferences: StudyPreferences,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let longest = self.config.base_max_interval_days;
        match preferences.max_interval_days {
            Some(0) => {
                return Err(SchedulingError::InvalidInput(
                    "preferred max interval must be at least one day".to_string(),
                ))
            }
            Some(days) if days > longest => {
                return Err(SchedulingError::InvalidInput(format!(
                    "preferred max interval cannot exceed {longest} days, got {days}"
                )))
            }
            _ => {}
        }

        policy.preferences = preferences;
        match policy.mode {
            SchedulingMode::Normal => {
                let (intensity, cap) = self.normal_settings(&preferences);
                policy.intensity = intensity;
                policy.max_interval_days = cap;
            }
            SchedulingMode::Recovery { .. } => policy.intensity = preferences.intensity,
            SchedulingMode::Cramming { exam_date } => self.follow_exam(policy, exam_date, now),
        }

        tracing::info!(
            mode = policy.mode.name(),
            preferred_max_interval_days = ?preferences.max_interval_days,
            preferred_intensity = ?preferences.intensity.map(|i| i.as_str()),
            max_interval_days = policy.max_interval_days,
            "study preferences updated"
        );
        Ok(())
    }

    /// Leave CRAMMING once the exam date has passed. Before that, move to
    /// the preset matching the days left.
    pub fn refresh(&self, policy: &mut SchedulingPolicy, now: DateTime<Utc>) -> Option<ModeTransition> {
        match policy.mode {
            SchedulingMode::Cramming { exam_date } if now.date_naive() > exam_date => {
                Some(self.restore_normal(policy, TransitionReason::ExamPassed))
            }
            SchedulingMode::Cramming { exam_date } => {
                self.follow_exam(policy, exam_date, now);
                None
            }
            _ => None,
        }
    }

    /// Assess the backlog and apply automatic transitions: RECOVERY ends when
    /// the due count is back within the limit, CRAMMING ends after the exam.
    pub fn observe_backlog(
        &self,
        policy: &mut SchedulingPolicy,
        total_due: u32,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<BacklogCheck> {
        let backlog = self.monitor.assess(total_due, limit)?;

        let transition = match policy.mode {
            SchedulingMode::Recovery { .. } if total_due <= limit => {
                Some(self.restore_normal(policy, TransitionReason::BacklogCleared))
            }
            _ => self.refresh(policy, now),
        };

        Ok(BacklogCheck {
            backlog,
            transition,
        })
    }

    /// NORMAL cap: the preferred cap, else the preferred preset's, else the base.
    fn normal_settings(&self, preferences: &StudyPreferences) -> (Option<StudyIntensity>, u32) {
        let base = self.config.base_max_interval_days;
        let cap = preferences
            .max_interval_days
            .or_else(|| {
                preferences
                    .intensity
                    .map(|i| self.config.presets.max_interval_days(i))
            })
            .unwrap_or(base);
        (preferences.intensity, cap.clamp(1, base))
    }

    /// Preset and cap for an exam `days_left` away. The preferred cap replaces
    /// the preset's; neither may reach past the exam.
    fn exam_settings(&self, preferences: &StudyPreferences, days_left: i64) -> (StudyIntensity, u32) {
        let presets = &self.config.presets;
        let intensity = presets.for_days_until_exam(days_left);
        let until_exam = days_left.clamp(1, i64::from(u32::MAX)) as u32;
        let cap = preferences
            .max_interval_days
            .unwrap_or_else(|| presets.max_interval_days(intensity))
            .min(self.config.base_max_interval_days)
            .min(until_exam)
            .max(1);
        (intensity, cap)
    }

    fn follow_exam(&self, policy: &mut SchedulingPolicy, exam_date: NaiveDate, now: DateTime<Utc>) {
        let days_left = (exam_date - now.date_naive()).num_days();
        let (intensity, cap) = self.exam_settings(&policy.preferences, days_left);
        if policy.intensity == Some(intensity) && policy.max_interval_days == cap {
            return;
        }

        policy.intensity = Some(intensity);
        policy.max_interval_days = cap;
        tracing::info!(
            %exam_date,
            days_left,
            intensity = intensity.as_str(),
            max_interval_days = cap,
            "exam preparation adjusted"
        );
    }

    fn restore_normal(&self, policy: &mut SchedulingPolicy, reason: TransitionReason) -> ModeTransition {
        let (intensity, cap) = self.normal_settings(&policy.preferences);
        self.transition(policy, SchedulingMode::Normal, cap, intensity, reason)
    }

    fn transition(
        &self,
        policy: &mut SchedulingPolicy,
        to: SchedulingMode,
        max_interval_days: u32,
        intensity: Option<StudyIntensity>,
        reason: TransitionReason,
    ) -> ModeTransition {
        let from = policy.mode;
        policy.mode = to;
        policy.max_interval_days = max_interval_days;
        policy.intensity = intensity;

        tracing::info!(
            from = from.name(),
            to = to.name(),
            reason = ?reason,
            max_interval_days,
            intensity = ?intensity.map(|i| i.as_str()),
            "scheduling mode changed"
        );

        ModeTransition { from, to, reason }
    }
}

fn invalid(policy: &SchedulingPolicy, reason: &str) -> SchedulingError {
    SchedulingError::InvalidTransition {
        from: policy.mode.name(),
        reason: reason.to_string(),
    }
}
