//! Memory model.
//!
//! DSR model in the FSRS family:
//! - Difficulty (D): item resistance to stabilization, 1-10
//! - Stability (S): memory half-life proxy in days
//! - Retrievability (R): probability of recall, R = exp(-t / (9 * S))
//!
//! Everything here is pure. Callers pass elapsed time in; nothing reads the clock.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulingError};
use crate::types::{Grade, ItemState, MAX_DIFFICULTY, MIN_DIFFICULTY};

/// Tunable constants of the memory model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryParameters {
    /// Divisor in the decay exponent, `R = exp(-t / (decay_divisor * S))`.
    pub decay_divisor: f64,
    /// Stability after the first review, indexed by grade (again, hard, good, easy).
    pub initial_stability: [f64; 4],
    /// D0 for a GOOD first review.
    pub initial_difficulty: f64,
    /// D0(G) = initial_difficulty - difficulty_slope * (G - 3)
    pub difficulty_slope: f64,
    /// Per-review difficulty shift, scaled by (G - 3).
    pub difficulty_step: f64,
    /// Weight pulling difficulty back toward D0.
    pub mean_reversion: f64,
    pub recall_growth: f64,
    pub stability_damping: f64,
    pub retrievability_weight: f64,
    /// Floor on the recall increment so same-day successes still grow stability.
    pub min_recall_gain: f64,
    pub hard_multiplier: f64,
    pub good_multiplier: f64,
    pub easy_multiplier: f64,
    pub forget_scale: f64,
    pub forget_difficulty_exp: f64,
    pub forget_stability_exp: f64,
    pub forget_retrievability_weight: f64,
    pub min_stability: f64,
    /// Consecutive non-AGAIN grades (first review included) to leave LEARNING.
    pub learning_graduation: u32,
    /// Consecutive non-AGAIN grades to leave RELEARNING.
    pub relearning_graduation: u32,
}

impl Default for MemoryParameters {
    fn default() -> Self {
        Self {
            decay_divisor: 9.0,
            initial_stability: [0.4, 2.0, 3.0, 5.0],
            initial_difficulty: 5.0,
            difficulty_slope: 0.9,
            difficulty_step: 0.8,
            mean_reversion: 0.02,
            recall_growth: 0.75,
            stability_damping: 0.10,
            retrievability_weight: 0.5,
            min_recall_gain: 0.1,
            hard_multiplier: 0.5,
            good_multiplier: 1.0,
            easy_multiplier: 1.5,
            forget_scale: 1.0,
            forget_difficulty_exp: 0.3,
            forget_stability_exp: 0.3,
            forget_retrievability_weight: 1.0,
            min_stability: 0.1,
            learning_graduation: 2,
            relearning_graduation: 1,
        }
    }
}

impl MemoryParameters {
    /// Reject parameter sets that would break positivity or grade ordering.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SchedulingError::InvalidConfig(msg.to_string()));

        if !(self.decay_divisor > 0.0) {
            return invalid("decay_divisor must be positive");
        }
        if !(self.min_stability > 0.0) {
            return invalid("min_stability must be positive");
        }
        if self.initial_stability.iter().any(|s| !(*s > 0.0)) {
            return invalid("initial stabilities must be positive");
        }
        if !self.initial_stability.windows(2).all(|w| w[0] < w[1]) {
            return invalid("initial stabilities must increase with grade");
        }
        if !(0.0 < self.hard_multiplier
            && self.hard_multiplier < self.good_multiplier
            && self.good_multiplier < self.easy_multiplier)
        {
            return invalid("grade multipliers must satisfy 0 < hard < good < easy");
        }
        if !(self.min_recall_gain > 0.0) {
            return invalid("min_recall_gain must be positive");
        }
        if !(0.0..=1.0).contains(&self.mean_reversion) {
            return invalid("mean_reversion must be within [0, 1]");
        }
        if self.learning_graduation == 0 || self.relearning_graduation == 0 {
            return invalid("graduation thresholds must be at least 1");
        }
        Ok(())
    }
}

/// Memory-relevant slice of an item before a review.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySnapshot {
    pub stability: f64,
    pub difficulty: f64,
    pub state: ItemState,
    pub consecutive_successes: u32,
    pub elapsed_days: f64,
}

/// Memory state after a review.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUpdate {
    pub stability: f64,
    pub difficulty: f64,
    pub state: ItemState,
    pub consecutive_successes: u32,
    /// Retrievability at the moment of review.
    pub retrievability: f64,
}

/// Pure stability/difficulty transition function.
#[derive(Debug, Clone, Default)]
pub struct MemoryModel {
    params: MemoryParameters,
}

impl MemoryModel {
    pub fn new(params: MemoryParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &MemoryParameters {
        &self.params
    }

    /// Apply one graded review to a memory snapshot.
    pub fn apply(&self, snapshot: &MemorySnapshot, grade: Grade) -> Result<MemoryUpdate> {
        if !snapshot.elapsed_days.is_finite() || snapshot.elapsed_days < 0.0 {
            return Err(SchedulingError::InvalidInput(format!(
                "elapsed days must be a non-negative number, got {}",
                snapshot.elapsed_days
            )));
        }
        if !snapshot.stability.is_finite() || snapshot.stability <= 0.0 {
            return Err(SchedulingError::InvalidInput(format!(
                "stability must be positive, got {}",
                snapshot.stability
            )));
        }

        if snapshot.state == ItemState::New {
            return Ok(self.first_review(grade));
        }

        let r = self.retrievability(snapshot.elapsed_days, snapshot.stability);
        let difficulty = self.next_difficulty(snapshot.difficulty, grade);

        let (stability, consecutive_successes) = if grade.is_lapse() {
            let s = self.next_stability_forget(snapshot.stability, snapshot.difficulty, r);
            (s, 0)
        } else {
            let s = self.next_stability_recall(snapshot.stability, snapshot.difficulty, r, grade);
            (s, snapshot.consecutive_successes.saturating_add(1))
        };

        Ok(MemoryUpdate {
            stability,
            difficulty,
            state: self.next_state(snapshot.state, grade, consecutive_successes),
            consecutive_successes,
            retrievability: r,
        })
    }

    /// R = exp(-t / (decay_divisor * S))
    pub fn retrievability(&self, elapsed_days: f64, stability: f64) -> f64 {
        if stability <= 0.0 {
            return 0.0;
        }
        (-elapsed_days.max(0.0) / (self.params.decay_divisor * stability)).exp()
    }

    fn first_review(&self, grade: Grade) -> MemoryUpdate {
        let consecutive_successes = if grade.is_lapse() { 0 } else { 1 };
        MemoryUpdate {
            stability: self.initial_stability(grade),
            difficulty: self.initial_difficulty(grade),
            state: ItemState::Learning,
            consecutive_successes,
            retrievability: 1.0,
        }
    }

    fn initial_stability(&self, grade: Grade) -> f64 {
        let index = (grade.to_value() - 1) as usize;
        self.params.initial_stability[index].max(self.params.min_stability)
    }

    /// D0(G) = initial_difficulty - slope * (G - 3)
    fn initial_difficulty(&self, grade: Grade) -> f64 {
        let g = grade.to_value() as f64;
        clamp_difficulty(self.params.initial_difficulty - self.params.difficulty_slope * (g - 3.0))
    }

    /// D' = w * D0(G) + (1 - w) * D - step * (G - 3)
    fn next_difficulty(&self, current: f64, grade: Grade) -> f64 {
        let g = grade.to_value() as f64;
        let w = self.params.mean_reversion;
        let reverted = w * self.initial_difficulty(grade) + (1.0 - w) * current;
        clamp_difficulty(reverted - self.params.difficulty_step * (g - 3.0))
    }

    /// S' = S * (1 + m(G) * max(e^growth * (11 - D) * S^(-damping) * (e^(w * (1 - R)) - 1), floor))
    fn next_stability_recall(&self, stability: f64, difficulty: f64, r: f64, grade: Grade) -> f64 {
        let p = &self.params;
        let d_factor = (11.0 - difficulty).max(0.1);
        let s_decay = stability.powf(-p.stability_damping);
        let r_factor = (p.retrievability_weight * (1.0 - r)).exp() - 1.0;
        let gain = (p.recall_growth.exp() * d_factor * s_decay * r_factor).max(p.min_recall_gain);

        let multiplier = match grade {
            Grade::Hard => p.hard_multiplier,
            Grade::Easy => p.easy_multiplier,
            _ => p.good_multiplier,
        };

        (stability * (1.0 + multiplier * gain)).max(p.min_stability)
    }

    /// S' = scale * D^(-a) * ((S + 1)^b - 1) * e^(w * (1 - R)), never above S.
    fn next_stability_forget(&self, stability: f64, difficulty: f64, r: f64) -> f64 {
        let p = &self.params;
        let d_factor = difficulty.max(MIN_DIFFICULTY).powf(-p.forget_difficulty_exp);
        let s_factor = (stability + 1.0).powf(p.forget_stability_exp) - 1.0;
        let r_factor = (p.forget_retrievability_weight * (1.0 - r)).exp();

        let new_s = p.forget_scale * d_factor * s_factor * r_factor;
        new_s.max(p.min_stability).min(stability)
    }

    fn next_state(&self, current: ItemState, grade: Grade, successes: u32) -> ItemState {
        match (current, grade) {
            (ItemState::New | ItemState::Learning, Grade::Again) => ItemState::Learning,
            (ItemState::Review | ItemState::Relearning, Grade::Again) => ItemState::Relearning,
            (ItemState::New, _) => ItemState::Learning,
            (ItemState::Learning, _) if successes >= self.params.learning_graduation => {
                ItemState::Review
            }
            (ItemState::Learning, _) => ItemState::Learning,
            (ItemState::Relearning, _) if successes >= self.params.relearning_graduation => {
                ItemState::Review
            }
            (ItemState::Relearning, _) => ItemState::Relearning,
            (ItemState::Review, _) => ItemState::Review,
        }
    }
}

fn clamp_difficulty(d: f64) -> f64 {
    d.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn review_snapshot(stability: f64, difficulty: f64, elapsed_days: f64) -> MemorySnapshot {
        MemorySnapshot {
            stability,
            difficulty,
            state: ItemState::Review,
            consecutive_successes: 3,
            elapsed_days,
        }
    }

    #[test]
    fn retrievability_formula() {
        let model = MemoryModel::default();

        let r = model.retrievability(0.0, 10.0);
        assert!((r - 1.0).abs() < 1e-12);

        // At t = 9 * S, R = 1/e
        let r = model.retrievability(90.0, 10.0);
        assert!((r - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn good_review_after_ten_days() {
        let model = MemoryModel::default();
        let update = model
            .apply(&review_snapshot(10.0, 5.0, 10.0), Grade::Good)
            .unwrap();

        assert!(
            update.stability > 12.0 && update.stability < 16.0,
            "stability was {}",
            update.stability
        );
        assert_eq!(update.state, ItemState::Review);
        assert_eq!(update.consecutive_successes, 4);
    }

    #[test]
    fn stability_stays_positive_everywhere() {
        let model = MemoryModel::default();
        let stabilities = [0.1, 0.5, 1.0, 10.0, 365.0, 10_000.0];
        let difficulties = [1.0, 5.0, 10.0];
        let elapsed = [0.0, 0.5, 1.0, 30.0, 1_000.0, 100_000.0];

        for &s in &stabilities {
            for &d in &difficulties {
                for &t in &elapsed {
                    for grade in Grade::ALL {
                        let update = model.apply(&review_snapshot(s, d, t), grade).unwrap();
                        assert!(update.stability > 0.0, "s={s} d={d} t={t} {grade:?}");
                        assert!(update.stability.is_finite());
                    }
                }
            }
        }
    }

    #[test]
    fn lapse_reduces_stability() {
        let model = MemoryModel::default();
        let update = model
            .apply(&review_snapshot(10.0, 5.0, 10.0), Grade::Again)
            .unwrap();
        assert!(update.stability < 10.0);
        assert_eq!(update.state, ItemState::Relearning);
        assert_eq!(update.consecutive_successes, 0);
    }

    #[test]
    fn lapse_never_raises_tiny_stability() {
        let model = MemoryModel::default();
        for t in [0.0, 1.0, 30.0] {
            let update = model
                .apply(&review_snapshot(0.05, 5.0, t), Grade::Again)
                .unwrap();
            assert!(update.stability <= 0.05, "t={t} s={}", update.stability);
            assert!(update.stability > 0.0);
        }
    }

    #[test]
    fn lower_retrievability_gives_bigger_boost() {
        let model = MemoryModel::default();
        let early = model.apply(&review_snapshot(10.0, 5.0, 2.0), Grade::Good).unwrap();
        let late = model.apply(&review_snapshot(10.0, 5.0, 40.0), Grade::Good).unwrap();
        assert!(late.retrievability < early.retrievability);
        assert!(late.stability > early.stability);
    }

    #[test]
    fn grade_multipliers_order_stability() {
        let model = MemoryModel::default();
        for elapsed in [0.0, 3.0, 10.0, 60.0] {
            let snap = review_snapshot(8.0, 6.0, elapsed);
            let hard = model.apply(&snap, Grade::Hard).unwrap().stability;
            let good = model.apply(&snap, Grade::Good).unwrap().stability;
            let easy = model.apply(&snap, Grade::Easy).unwrap().stability;
            assert!(hard > 8.0);
            assert!(hard < good && good < easy, "elapsed={elapsed}");
        }
    }

    #[test]
    fn difficulty_moves_with_grade() {
        let model = MemoryModel::default();
        let snap = review_snapshot(5.0, 5.0, 5.0);
        assert!(model.apply(&snap, Grade::Easy).unwrap().difficulty < 5.0);
        assert!(model.apply(&snap, Grade::Hard).unwrap().difficulty > 5.0);
        assert!(model.apply(&snap, Grade::Again).unwrap().difficulty > 5.0);
    }

    #[test]
    fn difficulty_clamped_to_bounds() {
        let model = MemoryModel::default();
        let mut snap = review_snapshot(5.0, 10.0, 5.0);
        for _ in 0..50 {
            let update = model.apply(&snap, Grade::Again).unwrap();
            assert!(update.difficulty <= MAX_DIFFICULTY);
            snap.difficulty = update.difficulty;
        }
        let mut snap = review_snapshot(5.0, 1.0, 5.0);
        for _ in 0..50 {
            let update = model.apply(&snap, Grade::Easy).unwrap();
            assert!(update.difficulty >= MIN_DIFFICULTY);
            snap.difficulty = update.difficulty;
        }
    }

    #[test]
    fn new_item_always_enters_learning() {
        let model = MemoryModel::default();
        let snap = MemorySnapshot {
            stability: 1.0,
            difficulty: 5.0,
            state: ItemState::New,
            consecutive_successes: 0,
            elapsed_days: 0.0,
        };
        for grade in Grade::ALL {
            let update = model.apply(&snap, grade).unwrap();
            assert_eq!(update.state, ItemState::Learning);
        }
        assert_eq!(model.apply(&snap, Grade::Again).unwrap().consecutive_successes, 0);
        assert_eq!(model.apply(&snap, Grade::Good).unwrap().consecutive_successes, 1);
    }

    #[test]
    fn learning_graduates_after_threshold() {
        let model = MemoryModel::default();
        let snap = MemorySnapshot {
            stability: 3.0,
            difficulty: 5.0,
            state: ItemState::Learning,
            consecutive_successes: 1,
            elapsed_days: 3.0,
        };
        assert_eq!(model.apply(&snap, Grade::Good).unwrap().state, ItemState::Review);

        let fresh = MemorySnapshot {
            consecutive_successes: 0,
            ..snap
        };
        assert_eq!(model.apply(&fresh, Grade::Good).unwrap().state, ItemState::Learning);
        assert_eq!(model.apply(&snap, Grade::Again).unwrap().state, ItemState::Learning);
    }

    #[test]
    fn relearning_returns_to_review() {
        let model = MemoryModel::default();
        let snap = MemorySnapshot {
            stability: 1.0,
            difficulty: 6.0,
            state: ItemState::Relearning,
            consecutive_successes: 0,
            elapsed_days: 1.0,
        };
        assert_eq!(model.apply(&snap, Grade::Hard).unwrap().state, ItemState::Review);
        assert_eq!(model.apply(&snap, Grade::Again).unwrap().state, ItemState::Relearning);
    }

    #[test]
    fn rejects_negative_elapsed() {
        let model = MemoryModel::default();
        let err = model
            .apply(&review_snapshot(5.0, 5.0, -1.0), Grade::Good)
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidInput(_)));
    }

    #[test]
    fn parameters_validate() {
        assert!(MemoryParameters::default().validate().is_ok());

        let bad = MemoryParameters {
            hard_multiplier: 2.0,
            ..Default::default()
        };
        assert!(matches!(
            MemoryModel::new(bad),
            Err(SchedulingError::InvalidConfig(_))
        ));

        let bad = MemoryParameters {
            decay_divisor: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
