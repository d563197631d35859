//! Review scheduler.
//!
//! Runs the memory model for one review, turns the new stability into an
//! interval under the active policy and stamps the next due date.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulingError};
use crate::memory::{MemoryModel, MemoryParameters, MemorySnapshot, MemoryUpdate};
use crate::types::{
    add_days, Grade, ReviewableItem, SchedulingMode, SchedulingPolicy, StudyIntensity,
};

/// Shortest interval a HARD grade may receive, one more than AGAIN's.
const MIN_HARD_INTERVAL: u32 = 2;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub memory: MemoryParameters,
    pub normal_interval_factor: f64,
    pub recovery_interval_factor: f64,
    pub cramming_interval_factor: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            memory: MemoryParameters::default(),
            normal_interval_factor: 1.0,
            recovery_interval_factor: 1.0,
            cramming_interval_factor: 0.8,
        }
    }
}

/// Result of scheduling one review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledReview {
    /// Updated copy of the item, ready to persist.
    pub item: ReviewableItem,
    pub grade: Grade,
    pub interval_days: u32,
    pub retrievability: f64,
    pub elapsed_days: f64,
}

/// The four possible outcomes of reviewing an item right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewPreview {
    pub again: ScheduledReview,
    pub hard: ScheduledReview,
    pub good: ScheduledReview,
    pub easy: ScheduledReview,
}

impl ReviewPreview {
    pub fn get(&self, grade: Grade) -> &ScheduledReview {
        match grade {
            Grade::Again => &self.again,
            Grade::Hard => &self.hard,
            Grade::Good => &self.good,
            Grade::Easy => &self.easy,
        }
    }

    pub fn into_outcome(self, grade: Grade) -> ScheduledReview {
        match grade {
            Grade::Again => self.again,
            Grade::Hard => self.hard,
            Grade::Good => self.good,
            Grade::Easy => self.easy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    model: MemoryModel,
    normal_factor: f64,
    recovery_factor: f64,
    cramming_factor: f64,
}

impl Default for Scheduler {
    fn default() -> Self {
        let config = SchedulerConfig::default();
        Self {
            model: MemoryModel::default(),
            normal_factor: config.normal_interval_factor,
            recovery_factor: config.recovery_interval_factor,
            cramming_factor: config.cramming_interval_factor,
        }
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let factors = [
            config.normal_interval_factor,
            config.recovery_interval_factor,
            config.cramming_interval_factor,
        ];
        if factors.iter().any(|f| !f.is_finite() || *f <= 0.0) {
            return Err(SchedulingError::InvalidConfig(
                "interval factors must be positive".to_string(),
            ));
        }

        Ok(Self {
            model: MemoryModel::new(config.memory)?,
            normal_factor: config.normal_interval_factor,
            recovery_factor: config.recovery_interval_factor,
            cramming_factor: config.cramming_interval_factor,
        })
    }

    pub fn model(&self) -> &MemoryModel {
        &self.model
    }

    /// Multiplier turning stability into an interval under `mode`.
    pub fn interval_factor(&self, mode: &SchedulingMode) -> f64 {
        match mode {
            SchedulingMode::Normal => self.normal_factor,
            SchedulingMode::Recovery { .. } => self.recovery_factor,
            SchedulingMode::Cramming { .. } => self.cramming_factor,
        }
    }

    /// Multiplier for an intensity preset: the interval after which predicted
    /// recall drops to the preset's target retention, per day of stability.
    pub fn retention_factor(&self, intensity: Option<StudyIntensity>) -> f64 {
        match intensity {
            Some(intensity) => {
                -self.model.params().decay_divisor * intensity.target_retention().ln()
            }
            None => 1.0,
        }
    }

    /// Current retrievability of an item, 1.0 if it was never reviewed.
    pub fn retrievability(&self, item: &ReviewableItem, now: DateTime<Utc>) -> f64 {
        if item.last_reviewed_at.is_none() {
            return 1.0;
        }
        self.model.retrievability(item.elapsed_days(now), item.stability)
    }

    /// Schedule one review and return the updated item.
    pub fn review(
        &self,
        item: &ReviewableItem,
        grade: Grade,
        reviewed_at: DateTime<Utc>,
        policy: &SchedulingPolicy,
    ) -> Result<ScheduledReview> {
        let outcome = self.preview(item, reviewed_at, policy)?.into_outcome(grade);

        tracing::debug!(
            item_id = %item.id,
            grade = ?grade,
            from = item.state.as_str(),
            to = outcome.item.state.as_str(),
            stability = outcome.item.stability,
            interval_days = outcome.interval_days,
            "scheduled review"
        );

        Ok(outcome)
    }

    /// Compute the outcome for every grade. Intervals are ordered
    /// AGAIN < HARD < GOOD < EASY whenever the cap leaves room.
    pub fn preview(
        &self,
        item: &ReviewableItem,
        reviewed_at: DateTime<Utc>,
        policy: &SchedulingPolicy,
    ) -> Result<ReviewPreview> {
        item.validate()?;

        let elapsed_days = self.elapsed_days(item, reviewed_at);
        let snapshot = MemorySnapshot {
            stability: item.stability,
            difficulty: item.difficulty,
            state: item.state,
            consecutive_successes: item.consecutive_successes,
            elapsed_days,
        };

        let again = self.model.apply(&snapshot, Grade::Again)?;
        let hard = self.model.apply(&snapshot, Grade::Hard)?;
        let good = self.model.apply(&snapshot, Grade::Good)?;
        let easy = self.model.apply(&snapshot, Grade::Easy)?;

        let factor = self.interval_factor(&policy.mode) * self.retention_factor(policy.intensity);
        let cap = policy.effective_max_interval(reviewed_at);

        let hard_days = raw_interval(hard.stability, factor).max(MIN_HARD_INTERVAL);
        let good_days = raw_interval(good.stability, factor).max(hard_days.saturating_add(1));
        let easy_days = raw_interval(easy.stability, factor).max(good_days.saturating_add(1));

        let build = |grade, update, days: u32| {
            apply_update(item, grade, update, days.clamp(1, cap), reviewed_at, elapsed_days)
        };

        Ok(ReviewPreview {
            again: build(Grade::Again, again, 1),
            hard: build(Grade::Hard, hard, hard_days),
            good: build(Grade::Good, good, good_days),
            easy: build(Grade::Easy, easy, easy_days),
        })
    }

    fn elapsed_days(&self, item: &ReviewableItem, reviewed_at: DateTime<Utc>) -> f64 {
        if item.last_reviewed_at.is_none() {
            return 0.0;
        }
        let elapsed = item.elapsed_days(reviewed_at);
        if elapsed < 0.0 {
            tracing::warn!(
                item_id = %item.id,
                elapsed_days = elapsed,
                "review timestamp precedes last review, treating as same-day"
            );
            return 0.0;
        }
        elapsed
    }
}

/// Schedule one review with default parameters.
pub fn review_item(
    item: &ReviewableItem,
    grade: Grade,
    reviewed_at: DateTime<Utc>,
    policy: &SchedulingPolicy,
) -> Result<ScheduledReview> {
    Scheduler::default().review(item, grade, reviewed_at, policy)
}

fn raw_interval(stability: f64, factor: f64) -> u32 {
    (stability * factor).round().clamp(1.0, u32::MAX as f64) as u32
}

fn apply_update(
    item: &ReviewableItem,
    grade: Grade,
    update: MemoryUpdate,
    interval_days: u32,
    reviewed_at: DateTime<Utc>,
    elapsed_days: f64,
) -> ScheduledReview {
    let mut next = item.clone();
    next.stability = update.stability;
    next.difficulty = update.difficulty;
    next.state = update.state;
    next.consecutive_successes = update.consecutive_successes;
    next.review_count = item.review_count.saturating_add(1);
    if grade.is_lapse() {
        next.lapse_count = item.lapse_count.saturating_add(1);
    }
    next.last_reviewed_at = Some(reviewed_at);
    next.due_at = Some(add_days(reviewed_at, interval_days));
    next.scheduled_days = interval_days;

    ScheduledReview {
        item: next,
        grade,
        interval_days,
        retrievability: update.retrievability,
        elapsed_days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemKind, ItemState};
    use chrono::{Duration, NaiveDate, TimeZone};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, 8, 30, 0).unwrap()
    }

    fn review_item_with(stability: f64, difficulty: f64, elapsed_days: i64) -> ReviewableItem {
        let last = now() - Duration::days(elapsed_days);
        ReviewableItem {
            state: ItemState::Review,
            stability,
            difficulty,
            due_at: Some(last + Duration::days(stability.round() as i64)),
            last_reviewed_at: Some(last),
            review_count: 4,
            consecutive_successes: 3,
            scheduled_days: stability.round() as u32,
            ..ReviewableItem::new(Uuid::new_v4(), Uuid::new_v4(), ItemKind::Flashcard, last)
        }
    }

    #[test]
    fn good_review_of_mature_item() {
        let scheduler = Scheduler::default();
        let item = review_item_with(10.0, 5.0, 10);
        let policy = SchedulingPolicy::normal(365);

        let out = scheduler.review(&item, Grade::Good, now(), &policy).unwrap();

        assert!(out.item.stability > 12.0 && out.item.stability < 16.0);
        assert!(out.interval_days < 365);
        assert_eq!(out.interval_days, 15);
        assert_eq!(out.item.state, ItemState::Review);
        assert_eq!(out.item.review_count, 5);
        assert_eq!(out.item.lapse_count, 0);
        assert_eq!(out.item.due_at, Some(now() + Duration::days(15)));
        assert_eq!(out.item.last_reviewed_at, Some(now()));
    }

    #[test]
    fn again_always_schedules_one_day() {
        let scheduler = Scheduler::default();
        let policy = SchedulingPolicy::normal(365);
        for stability in [0.1, 1.0, 10.0, 200.0, 5_000.0] {
            let item = review_item_with(stability, 5.0, 30);
            let out = scheduler.review(&item, Grade::Again, now(), &policy).unwrap();
            assert_eq!(out.interval_days, 1, "stability {stability}");
            assert_eq!(out.item.state, ItemState::Relearning);
            assert_eq!(out.item.lapse_count, 1);
        }
    }

    #[test]
    fn intervals_strictly_ordered_by_grade() {
        let scheduler = Scheduler::default();
        let policy = SchedulingPolicy::normal(365);
        for stability in [0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 80.0] {
            for elapsed in [0, 1, 5, 20] {
                let item = review_item_with(stability, 6.0, elapsed);
                let preview = scheduler.preview(&item, now(), &policy).unwrap();
                let (a, h, g, e) = (
                    preview.again.interval_days,
                    preview.hard.interval_days,
                    preview.good.interval_days,
                    preview.easy.interval_days,
                );
                assert!(a < h && h < g && g < e, "s={stability} t={elapsed}: {a} {h} {g} {e}");
            }
        }
    }

    #[test]
    fn new_item_again_goes_to_learning() {
        let scheduler = Scheduler::default();
        let item = ReviewableItem::new(Uuid::new_v4(), Uuid::new_v4(), ItemKind::Question, now());

        let out = scheduler
            .review(&item, Grade::Again, now(), &SchedulingPolicy::default())
            .unwrap();

        assert_eq!(out.item.state, ItemState::Learning);
        assert_eq!(out.interval_days, 1);
        assert_eq!(out.elapsed_days, 0.0);
        assert_eq!(out.item.review_count, 1);
    }

    #[test]
    fn new_item_first_intervals() {
        let scheduler = Scheduler::default();
        let item = ReviewableItem::new(Uuid::new_v4(), Uuid::new_v4(), ItemKind::ErrorEntry, now());
        let preview = scheduler
            .preview(&item, now(), &SchedulingPolicy::default())
            .unwrap();

        assert_eq!(preview.again.interval_days, 1);
        assert_eq!(preview.hard.interval_days, 2);
        assert_eq!(preview.good.interval_days, 3);
        assert_eq!(preview.easy.interval_days, 5);
        for grade in Grade::ALL {
            assert_eq!(preview.get(grade).item.state, ItemState::Learning);
        }
    }

    #[test]
    fn corrupt_item_is_rejected() {
        let scheduler = Scheduler::default();
        let mut item = review_item_with(10.0, 5.0, 3);
        item.stability = -2.0;

        let err = scheduler
            .review(&item, Grade::Good, now(), &SchedulingPolicy::default())
            .unwrap_err();
        assert!(matches!(err, SchedulingError::CorruptState { item_id, .. } if item_id == item.id));
    }

    #[test]
    fn cap_limits_interval() {
        let scheduler = Scheduler::default();
        let item = review_item_with(300.0, 3.0, 300);
        let out = scheduler
            .review(&item, Grade::Easy, now(), &SchedulingPolicy::normal(30))
            .unwrap();
        assert_eq!(out.interval_days, 30);
    }

    #[test]
    fn cramming_never_schedules_past_exam() {
        let scheduler = Scheduler::default();
        let exam_date = NaiveDate::from_ymd_opt(2025, 5, 26).unwrap();
        let policy = SchedulingPolicy {
            mode: SchedulingMode::Cramming { exam_date },
            ..SchedulingPolicy::normal(6)
        };
        let item = review_item_with(40.0, 4.0, 40);

        let preview = scheduler.preview(&item, now(), &policy).unwrap();
        for grade in Grade::ALL {
            let due = preview.get(grade).item.due_at.unwrap();
            assert!(due.date_naive() <= exam_date, "{grade:?} due {due}");
        }
    }

    #[test]
    fn higher_retention_presets_review_sooner() {
        let scheduler = Scheduler::default();
        let item = review_item_with(30.0, 5.0, 30);

        let intervals: Vec<u32> = StudyIntensity::ALL
            .into_iter()
            .map(|intensity| {
                let policy = SchedulingPolicy {
                    intensity: Some(intensity),
                    ..SchedulingPolicy::normal(365)
                };
                scheduler
                    .review(&item, Grade::Good, now(), &policy)
                    .unwrap()
                    .interval_days
            })
            .collect();

        assert!(
            intervals.windows(2).all(|w| w[0] < w[1]),
            "intervals {intervals:?}"
        );
    }

    #[test]
    fn retention_factor_follows_forgetting_curve() {
        let scheduler = Scheduler::default();
        assert_eq!(scheduler.retention_factor(None), 1.0);

        // after factor * S days, predicted recall equals the target
        for intensity in StudyIntensity::ALL {
            let factor = scheduler.retention_factor(Some(intensity));
            let r = scheduler.model().retrievability(factor * 20.0, 20.0);
            assert!((r - intensity.target_retention()).abs() < 1e-9, "{intensity:?}");
        }
    }

    #[test]
    fn review_before_last_review_counts_as_same_day() {
        let scheduler = Scheduler::default();
        let mut item = review_item_with(5.0, 5.0, 0);
        item.last_reviewed_at = Some(now() + Duration::hours(2));

        let out = scheduler
            .review(&item, Grade::Good, now(), &SchedulingPolicy::default())
            .unwrap();
        assert_eq!(out.elapsed_days, 0.0);
        assert!((out.retrievability - 1.0).abs() < 1e-12);
    }

    #[test]
    fn review_matches_preview() {
        let scheduler = Scheduler::default();
        let item = review_item_with(7.0, 5.5, 9);
        let policy = SchedulingPolicy::default();
        let preview = scheduler.preview(&item, now(), &policy).unwrap();
        for grade in Grade::ALL {
            let out = scheduler.review(&item, grade, now(), &policy).unwrap();
            assert_eq!(&out, preview.get(grade));
        }
    }

    #[test]
    fn review_item_uses_defaults() {
        let item = review_item_with(10.0, 5.0, 10);
        let out = review_item(&item, Grade::Good, now(), &SchedulingPolicy::default()).unwrap();
        assert_eq!(out.interval_days, 15);
    }

    #[test]
    fn rejects_non_positive_factor() {
        let config = SchedulerConfig {
            cramming_interval_factor: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            Scheduler::new(config),
            Err(SchedulingError::InvalidConfig(_))
        ));
    }
}
