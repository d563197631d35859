//! Storage contract between the scheduling core and its persistence layer.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{ItemId, ReviewableItem, SchedulingPolicy, UserId};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Capabilities the core needs from whatever owns the durable records.
///
/// Implementations must give at most one concurrent writer per item:
/// `persist` only succeeds when the stored version still equals
/// `item.version`, and reports `StoreError::VersionConflict` otherwise.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Items of `user_id` due at `as_of`, excluding items flagged corrupt.
    async fn load_due_items(
        &self,
        user_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<ReviewableItem>>;

    async fn load_item(&self, user_id: UserId, item_id: ItemId)
        -> StoreResult<Option<ReviewableItem>>;

    /// Write `item` if nobody else has since it was loaded. Returns the new version.
    async fn persist(&self, item: &ReviewableItem) -> StoreResult<u64>;

    async fn load_policy(&self, user_id: UserId) -> StoreResult<Option<SchedulingPolicy>>;

    async fn save_policy(&self, user_id: UserId, policy: &SchedulingPolicy) -> StoreResult<()>;

    /// Exclude an item from automatic scheduling until repaired.
    async fn mark_corrupt(&self, user_id: UserId, item_id: ItemId, reason: &str)
        -> StoreResult<()>;
}

#[derive(Debug, Clone)]
struct StoredItem {
    item: ReviewableItem,
    corrupt: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    items: HashMap<ItemId, StoredItem>,
    policies: HashMap<UserId, SchedulingPolicy>,
}

/// Process-local store. Used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an item, keeping its version as given.
    pub fn insert(&self, item: ReviewableItem) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.items.insert(
            item.id,
            StoredItem {
                item,
                corrupt: None,
            },
        );
        Ok(())
    }

    pub fn get(&self, item_id: ItemId) -> StoreResult<Option<ReviewableItem>> {
        Ok(self.lock()?.items.get(&item_id).map(|s| s.item.clone()))
    }

    pub fn corrupt_reason(&self, item_id: ItemId) -> StoreResult<Option<String>> {
        Ok(self
            .lock()?
            .items
            .get(&item_id)
            .and_then(|s| s.corrupt.clone()))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ReviewStore for InMemoryStore {
    async fn load_due_items(
        &self,
        user_id: UserId,
        as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<ReviewableItem>> {
        let inner = self.lock()?;
        Ok(inner
            .items
            .values()
            .filter(|s| s.corrupt.is_none())
            .filter(|s| s.item.user_id == user_id && s.item.is_due(as_of))
            .map(|s| s.item.clone())
            .collect())
    }

    async fn load_item(
        &self,
        user_id: UserId,
        item_id: ItemId,
    ) -> StoreResult<Option<ReviewableItem>> {
        let inner = self.lock()?;
        Ok(inner
            .items
            .get(&item_id)
            .filter(|s| s.item.user_id == user_id)
            .map(|s| s.item.clone()))
    }

    async fn persist(&self, item: &ReviewableItem) -> StoreResult<u64> {
        let mut inner = self.lock()?;
        let stored = inner
            .items
            .get_mut(&item.id)
            .filter(|s| s.item.user_id == item.user_id)
            .ok_or(StoreError::NotFound(item.id))?;

        if stored.item.version != item.version {
            return Err(StoreError::VersionConflict(item.id));
        }

        let version = item.version + 1;
        stored.item = ReviewableItem {
            version,
            ..item.clone()
        };
        Ok(version)
    }

    async fn load_policy(&self, user_id: UserId) -> StoreResult<Option<SchedulingPolicy>> {
        Ok(self.lock()?.policies.get(&user_id).copied())
    }

    async fn save_policy(&self, user_id: UserId, policy: &SchedulingPolicy) -> StoreResult<()> {
        self.lock()?.policies.insert(user_id, *policy);
        Ok(())
    }

    async fn mark_corrupt(
        &self,
        user_id: UserId,
        item_id: ItemId,
        reason: &str,
    ) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let stored = inner
            .items
            .get_mut(&item_id)
            .filter(|s| s.item.user_id == user_id)
            .ok_or(StoreError::NotFound(item_id))?;
        stored.corrupt = Some(reason.to_string());
        Ok(())
    }
}
