//! PostgreSQL storage for scheduling state

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

use srs_core::{
    ItemId, ItemKind, ItemState, ReviewStore, ReviewableItem, SchedulingMode, SchedulingPolicy,
    StoreError, StoreResult, StudyIntensity, StudyPreferences, UserId,
};

const ITEM_COLUMNS: &str = "id, user_id, kind, state, stability, difficulty, due_at, \
    last_reviewed_at, review_count, lapse_count, consecutive_successes, scheduled_days, version";

/// `ReviewStore` over a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    /// Connect to PostgreSQL and create connection pool
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Register a new item. Content lives with the caller; only scheduling state is stored.
    pub async fn insert_item(&self, item: &ReviewableItem) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reviewable_items
                (id, user_id, kind, state, stability, difficulty, due_at, last_reviewed_at,
                 review_count, lapse_count, consecutive_successes, scheduled_days, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(item.id)
        .bind(item.user_id)
        .bind(item.kind.as_str())
        .bind(item.state.as_str())
        .bind(item.stability)
        .bind(item.difficulty)
        .bind(item.due_at)
        .bind(item.last_reviewed_at)
        .bind(to_i32(item.review_count))
        .bind(to_i32(item.lapse_count))
        .bind(to_i32(item.consecutive_successes))
        .bind(to_i32(item.scheduled_days))
        .bind(to_i64(item.version))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    state: String,
    stability: f64,
    difficulty: f64,
    due_at: Option<DateTime<Utc>>,
    last_reviewed_at: Option<DateTime<Utc>>,
    review_count: i32,
    lapse_count: i32,
    consecutive_successes: i32,
    scheduled_days: i32,
    version: i64,
}

impl ItemRow {
    fn into_item(self) -> StoreResult<ReviewableItem> {
        let kind = ItemKind::from_str(&self.kind)
            .ok_or_else(|| StoreError::Backend(format!("unknown item kind '{}'", self.kind)))?;
        let state = ItemState::from_str(&self.state)
            .ok_or_else(|| StoreError::Backend(format!("unknown item state '{}'", self.state)))?;

        Ok(ReviewableItem {
            id: self.id,
            user_id: self.user_id,
            kind,
            state,
            stability: self.stability,
            difficulty: self.difficulty,
            due_at: self.due_at,
            last_reviewed_at: self.last_reviewed_at,
            review_count: to_u32(self.review_count),
            lapse_count: to_u32(self.lapse_count),
            consecutive_successes: to_u32(self.consecutive_successes),
            scheduled_days: to_u32(self.scheduled_days),
            version: u64::try_from(self.version).unwrap_or(0),
        })
    }
}

#[derive(Debug, FromRow)]
struct PolicyRow {
    mode: String,
    spread_days: Option<i32>,
    exam_date: Option<NaiveDate>,
    max_interval_days: i32,
    intensity: Option<String>,
    preferred_max_interval_days: Option<i32>,
    preferred_intensity: Option<String>,
}

impl PolicyRow {
    fn into_policy(self) -> StoreResult<SchedulingPolicy> {
        let mode = match (self.mode.as_str(), self.spread_days, self.exam_date) {
            ("normal", _, _) => SchedulingMode::Normal,
            ("recovery", Some(days), _) => SchedulingMode::Recovery {
                spread_days: to_u32(days),
            },
            ("cramming", _, Some(exam_date)) => SchedulingMode::Cramming { exam_date },
            (other, _, _) => {
                return Err(StoreError::Backend(format!(
                    "incomplete scheduling policy row for mode '{other}'"
                )))
            }
        };

        Ok(SchedulingPolicy {
            mode,
            max_interval_days: to_u32(self.max_interval_days),
            intensity: intensity(self.intensity)?,
            preferences: StudyPreferences {
                max_interval_days: self.preferred_max_interval_days.map(to_u32),
                intensity: intensity(self.preferred_intensity)?,
            },
        })
    }
}

fn intensity(column: Option<String>) -> StoreResult<Option<StudyIntensity>> {
    column
        .map(|name| {
            StudyIntensity::from_str(&name)
                .ok_or_else(|| StoreError::Backend(format!("unknown study intensity '{name}'")))
        })
        .transpose()
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn load_due_items(
        &self,
        user_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<ReviewableItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM reviewable_items
            WHERE user_id = $1
              AND corrupt_reason IS NULL
              AND (due_at <= $2 OR (due_at IS NULL AND state = 'new'))
            "#
        ))
        .bind(user_id)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(ItemRow::into_item).collect()
    }

    async fn load_item(
        &self,
        user_id: UserId,
        item_id: ItemId,
    ) -> StoreResult<Option<ReviewableItem>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM reviewable_items WHERE id = $1 AND user_id = $2"
        ))
        .bind(item_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(ItemRow::into_item).transpose()
    }

    async fn persist(&self, item: &ReviewableItem) -> StoreResult<u64> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE reviewable_items
            SET state = $3,
                stability = $4,
                difficulty = $5,
                due_at = $6,
                last_reviewed_at = $7,
                review_count = $8,
                lapse_count = $9,
                consecutive_successes = $10,
                scheduled_days = $11,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND version = $12
            RETURNING version
            "#,
        )
        .bind(item.id)
        .bind(item.user_id)
        .bind(item.state.as_str())
        .bind(item.stability)
        .bind(item.difficulty)
        .bind(item.due_at)
        .bind(item.last_reviewed_at)
        .bind(to_i32(item.review_count))
        .bind(to_i32(item.lapse_count))
        .bind(to_i32(item.consecutive_successes))
        .bind(to_i32(item.scheduled_days))
        .bind(to_i64(item.version))
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        if let Some(version) = version {
            return Ok(u64::try_from(version).unwrap_or(0));
        }

        // No row matched: tell a stale version apart from a missing item
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reviewable_items WHERE id = $1 AND user_id = $2)",
        )
        .bind(item.id)
        .bind(item.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        if exists {
            Err(StoreError::VersionConflict(item.id))
        } else {
            Err(StoreError::NotFound(item.id))
        }
    }

    async fn load_policy(&self, user_id: UserId) -> StoreResult<Option<SchedulingPolicy>> {
        let row = sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT mode, spread_days, exam_date, max_interval_days,
                   intensity, preferred_max_interval_days, preferred_intensity
            FROM scheduling_policies
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(PolicyRow::into_policy).transpose()
    }

    async fn save_policy(&self, user_id: UserId, policy: &SchedulingPolicy) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduling_policies
                (user_id, mode, spread_days, exam_date, max_interval_days,
                 intensity, preferred_max_interval_days, preferred_intensity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                mode = EXCLUDED.mode,
                spread_days = EXCLUDED.spread_days,
                exam_date = EXCLUDED.exam_date,
                max_interval_days = EXCLUDED.max_interval_days,
                intensity = EXCLUDED.intensity,
                preferred_max_interval_days = EXCLUDED.preferred_max_interval_days,
                preferred_intensity = EXCLUDED.preferred_intensity,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(policy.mode.name())
        .bind(policy.recovery_spread_days().map(to_i32))
        .bind(policy.exam_date())
        .bind(to_i32(policy.max_interval_days))
        .bind(policy.intensity.map(|i| i.as_str()))
        .bind(policy.preferences.max_interval_days.map(to_i32))
        .bind(policy.preferences.intensity.map(|i| i.as_str()))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn mark_corrupt(
        &self,
        user_id: UserId,
        item_id: ItemId,
        reason: &str,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE reviewable_items
            SET corrupt_reason = $3, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(item_id)
        .bind(user_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(item_id));
        }
        Ok(())
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_row(mode: &str, spread_days: Option<i32>, exam_date: Option<NaiveDate>) -> PolicyRow {
        PolicyRow {
            mode: mode.to_string(),
            spread_days,
            exam_date,
            max_interval_days: 30,
            intensity: None,
            preferred_max_interval_days: None,
            preferred_intensity: None,
        }
    }

    #[test]
    fn test_policy_row_recovery() {
        let policy = policy_row("recovery", Some(7), None).into_policy().unwrap();
        assert_eq!(policy.mode, SchedulingMode::Recovery { spread_days: 7 });
        assert_eq!(policy.max_interval_days, 30);
    }

    #[test]
    fn test_policy_row_cramming_requires_exam_date() {
        assert!(policy_row("cramming", None, None).into_policy().is_err());

        let exam = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let policy = policy_row("cramming", None, Some(exam)).into_policy().unwrap();
        assert_eq!(policy.exam_date(), Some(exam));
    }

    #[test]
    fn test_policy_row_intensity_and_preferences() {
        let row = PolicyRow {
            intensity: Some("balanced".to_string()),
            preferred_max_interval_days: Some(45),
            preferred_intensity: Some("relaxed".to_string()),
            ..policy_row("normal", None, None)
        };
        let policy = row.into_policy().unwrap();
        assert_eq!(policy.intensity, Some(StudyIntensity::Balanced));
        assert_eq!(policy.preferences.max_interval_days, Some(45));
        assert_eq!(policy.preferences.intensity, Some(StudyIntensity::Relaxed));

        let row = PolicyRow {
            intensity: Some("leisurely".to_string()),
            ..policy_row("normal", None, None)
        };
        assert!(matches!(row.into_policy(), Err(StoreError::Backend(_))));
    }

    #[test]
    fn test_item_row_rejects_unknown_kind() {
        let row = ItemRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: "deck".to_string(),
            state: "new".to_string(),
            stability: 1.0,
            difficulty: 5.0,
            due_at: None,
            last_reviewed_at: None,
            review_count: 0,
            lapse_count: 0,
            consecutive_successes: 0,
            scheduled_days: 0,
            version: 0,
        };
        assert!(matches!(row.into_item(), Err(StoreError::Backend(_))));
    }

    #[test]
    fn test_negative_counters_clamp_to_zero() {
        assert_eq!(to_u32(-4), 0);
        assert_eq!(to_i32(u32::MAX), i32::MAX);
    }
}
