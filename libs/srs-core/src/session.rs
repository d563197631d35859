//! Review session orchestrator.
//!
//! Ties the store, scheduler and mode controller together for one user:
//! builds prioritized study sessions, records graded reviews with bounded
//! retry on write races, and runs mode commands under a per-user lock.

use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::backlog::{first_day_quota, BacklogStatus, OverdueStats};
use crate::error::{Result, SchedulingError};
use crate::mode::{BacklogCheck, ModeController, ModeTransition};
use crate::scheduler::{ScheduledReview, Scheduler};
use crate::store::ReviewStore;
use crate::types::{
    Grade, ItemId, ItemState, ReviewEvent, ReviewableItem, SchedulingMode, SchedulingPolicy,
    StudyPreferences, UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Reviews per day the learner is willing to do.
    pub daily_limit: u32,
    /// Attempts per review before a write race is reported to the caller.
    pub max_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            daily_limit: 200,
            max_attempts: 3,
        }
    }
}

/// One async lock per user. Policy writes for different users never wait on each other.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    /// Wait for the user's lock. Locks nobody holds or waits on are dropped
    /// from the map on the way in.
    pub async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|id, lock| *id == user_id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(user_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Users with a tracked lock.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A finite, prioritized pass over due items. Consumed once.
#[derive(Debug)]
pub struct StudySession {
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub policy: SchedulingPolicy,
    pub backlog: BacklogStatus,
    pub transition: Option<ModeTransition>,
    queue: std::vec::IntoIter<ItemId>,
}

impl StudySession {
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl Iterator for StudySession {
    type Item = ItemId;

    fn next(&mut self) -> Option<ItemId> {
        self.queue.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.queue.size_hint()
    }
}

impl ExactSizeIterator for StudySession {}

/// What a recorded review did to the item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewSummary {
    pub item_id: ItemId,
    pub grade: Grade,
    pub state: ItemState,
    pub stability: f64,
    pub difficulty: f64,
    pub due_at: Option<DateTime<Utc>>,
    pub interval_days: u32,
    pub retrievability: f64,
    pub review_count: u32,
    pub lapse_count: u32,
    pub version: u64,
    pub attempts: u32,
}

impl ReviewSummary {
    fn new(scheduled: ScheduledReview, version: u64, attempts: u32) -> Self {
        let item = scheduled.item;
        Self {
            item_id: item.id,
            grade: scheduled.grade,
            state: item.state,
            stability: item.stability,
            difficulty: item.difficulty,
            due_at: item.due_at,
            interval_days: scheduled.interval_days,
            retrievability: scheduled.retrievability,
            review_count: item.review_count,
            lapse_count: item.lapse_count,
            version,
            attempts,
        }
    }
}

pub struct SessionOrchestrator {
    store: Arc<dyn ReviewStore>,
    scheduler: Scheduler,
    modes: ModeController,
    config: SessionConfig,
    locks: UserLocks,
}

impl SessionOrchestrator {
    pub fn new(
        store: Arc<dyn ReviewStore>,
        scheduler: Scheduler,
        modes: ModeController,
        config: SessionConfig,
    ) -> Result<Self> {
        if config.daily_limit == 0 {
            return Err(SchedulingError::InvalidConfig(
                "daily_limit must be positive".to_string(),
            ));
        }
        if config.max_attempts == 0 {
            return Err(SchedulingError::InvalidConfig(
                "max_attempts must be positive".to_string(),
            ));
        }
        Ok(Self {
            store,
            scheduler,
            modes,
            config,
            locks: UserLocks::default(),
        })
    }

    pub fn with_defaults(store: Arc<dyn ReviewStore>) -> Self {
        Self {
            store,
            scheduler: Scheduler::default(),
            modes: ModeController::default(),
            config: SessionConfig::default(),
            locks: UserLocks::default(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn modes(&self) -> &ModeController {
        &self.modes
    }

    /// Build today's session: most overdue first, then least likely
    /// remembered. Sized by the daily limit, or by the first day of the
    /// recovery plan while RECOVERY is active.
    pub async fn start_session(&self, user_id: UserId, now: DateTime<Utc>) -> Result<StudySession> {
        let _guard = self.locks.acquire(user_id).await;

        let mut policy = self.load_policy(user_id).await?;
        let items = self.load_valid_due(user_id, now).await?;
        let total_due = count(items.len());

        let before = policy;
        let check = self
            .modes
            .observe_backlog(&mut policy, total_due, self.config.daily_limit, now)?;
        if policy != before {
            self.store.save_policy(user_id, &policy).await?;
        }

        let size = match policy.mode {
            SchedulingMode::Recovery { spread_days } => first_day_quota(total_due, spread_days)?,
            _ => self.config.daily_limit,
        };

        let queue: Vec<ItemId> = self
            .prioritize(items, now)
            .into_iter()
            .take(size as usize)
            .map(|item| item.id)
            .collect();

        tracing::info!(
            user_id = %user_id,
            mode = policy.mode.name(),
            total_due,
            session_size = queue.len(),
            status = check.backlog.status.as_str(),
            "study session started"
        );

        Ok(StudySession {
            user_id,
            started_at: now,
            policy,
            backlog: check.backlog,
            transition: check.transition,
            queue: queue.into_iter(),
        })
    }

    /// Grade one item and persist the result. Exactly one write lands per
    /// call; a write race reloads and retries up to `max_attempts`.
    pub async fn submit_review(&self, user_id: UserId, event: ReviewEvent) -> Result<ReviewSummary> {
        let mut policy = self.load_policy(user_id).await?;
        self.modes.refresh(&mut policy, event.reviewed_at);

        let mut attempts = 0;
        loop {
            attempts += 1;

            let item = self
                .store
                .load_item(user_id, event.item_id)
                .await?
                .ok_or(SchedulingError::NotFound(event.item_id))?;

            let scheduled = match self
                .scheduler
                .review(&item, event.grade, event.reviewed_at, &policy)
            {
                Ok(scheduled) => scheduled,
                Err(err @ SchedulingError::CorruptState { .. }) => {
                    self.quarantine(user_id, item.id, &err).await;
                    return Err(err);
                }
                Err(err) => return Err(err),
            };

            match self.store.persist(&scheduled.item).await {
                Ok(version) => return Ok(ReviewSummary::new(scheduled, version, attempts)),
                Err(err) => {
                    let err = SchedulingError::from(err);
                    if err.is_retryable() && attempts < self.config.max_attempts {
                        tracing::warn!(
                            item_id = %event.item_id,
                            attempt = attempts,
                            "concurrent write detected, retrying review"
                        );
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Current policy, NORMAL for users without one.
    pub async fn policy(&self, user_id: UserId) -> Result<SchedulingPolicy> {
        self.load_policy(user_id).await
    }

    pub async fn activate_recovery(&self, user_id: UserId, days_to_spread: u32) -> Result<ModeTransition> {
        self.update_policy(user_id, |modes, policy| {
            modes.activate_recovery(policy, days_to_spread)
        })
        .await
    }

    pub async fn activate_cramming(
        &self,
        user_id: UserId,
        exam_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ModeTransition> {
        self.update_policy(user_id, |modes, policy| {
            modes.activate_cramming(policy, exam_date, now)
        })
        .await
    }

    pub async fn deactivate_mode(&self, user_id: UserId) -> Result<ModeTransition> {
        self.update_policy(user_id, |modes, policy| modes.deactivate(policy))
            .await
    }

    /// Replace the user's study preferences and return the resulting policy.
    pub async fn update_preferences(
        &self,
        user_id: UserId,
        preferences: StudyPreferences,
        now: DateTime<Utc>,
    ) -> Result<SchedulingPolicy> {
        let _guard = self.locks.acquire(user_id).await;

        let mut policy = self.load_policy(user_id).await?;
        self.modes.set_preferences(&mut policy, preferences, now)?;
        self.store.save_policy(user_id, &policy).await?;
        Ok(policy)
    }

    /// Assess the user's backlog and apply any automatic mode change.
    pub async fn check_backlog(&self, user_id: UserId, now: DateTime<Utc>) -> Result<BacklogCheck> {
        let _guard = self.locks.acquire(user_id).await;

        let mut policy = self.load_policy(user_id).await?;
        let items = self.load_valid_due(user_id, now).await?;

        let before = policy;
        let check = self.modes.observe_backlog(
            &mut policy,
            count(items.len()),
            self.config.daily_limit,
            now,
        )?;
        if policy != before {
            self.store.save_policy(user_id, &policy).await?;
        }
        Ok(check)
    }

    pub async fn overdue_stats(&self, user_id: UserId, now: DateTime<Utc>) -> Result<OverdueStats> {
        let items = self.store.load_due_items(user_id, now).await?;
        Ok(OverdueStats::collect(&items, now))
    }

    async fn update_policy<F>(&self, user_id: UserId, change: F) -> Result<ModeTransition>
    where
        F: FnOnce(&ModeController, &mut SchedulingPolicy) -> Result<ModeTransition>,
    {
        let _guard = self.locks.acquire(user_id).await;

        let mut policy = self.load_policy(user_id).await?;
        let transition = change(&self.modes, &mut policy)?;
        self.store.save_policy(user_id, &policy).await?;
        Ok(transition)
    }

    async fn load_policy(&self, user_id: UserId) -> Result<SchedulingPolicy> {
        Ok(self
            .store
            .load_policy(user_id)
            .await?
            .unwrap_or_else(|| self.modes.initial_policy()))
    }

    async fn load_valid_due(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Vec<ReviewableItem>> {
        let items = self.store.load_due_items(user_id, now).await?;

        let mut valid = Vec::with_capacity(items.len());
        for item in items {
            match item.validate() {
                Ok(()) => valid.push(item),
                Err(err) => self.quarantine(user_id, item.id, &err).await,
            }
        }
        Ok(valid)
    }

    async fn quarantine(&self, user_id: UserId, item_id: ItemId, err: &SchedulingError) {
        tracing::error!(user_id = %user_id, item_id = %item_id, error = %err, "corrupt item excluded from scheduling");

        if let Err(mark_err) = self.store.mark_corrupt(user_id, item_id, &err.to_string()).await {
            tracing::error!(item_id = %item_id, error = %mark_err, "failed to flag corrupt item");
        }
    }

    fn prioritize(&self, items: Vec<ReviewableItem>, now: DateTime<Utc>) -> Vec<ReviewableItem> {
        let mut keyed: Vec<(i64, f64, ReviewableItem)> = items
            .into_iter()
            .map(|item| {
                let r = self.scheduler.retrievability(&item, now);
                (item.days_overdue(now), r, item)
            })
            .collect();

        keyed.sort_by(|a, b| {
            Reverse(a.0)
                .cmp(&Reverse(b.0))
                .then_with(|| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });

        keyed.into_iter().map(|(_, _, item)| item).collect()
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
