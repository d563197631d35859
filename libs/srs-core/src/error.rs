//! Error types for srs-core.

use thiserror::Error;

use crate::types::ItemId;

/// Result type alias using SchedulingError.
pub type Result<T> = std::result::Result<T, SchedulingError>;

/// Errors raised while scheduling reviews or changing modes.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// Malformed grade, timestamp or argument. A caller bug; never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Non-positive capacity limit or similar configuration mistake.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A stored item violates its invariants. It is excluded from
    /// auto-scheduling until repaired by hand.
    #[error("corrupt state for item {item_id}: {reason}")]
    CorruptState { item_id: ItemId, reason: String },

    /// The mode controller refused a mode change. State is unchanged.
    #[error("invalid transition from {from}: {reason}")]
    InvalidTransition { from: &'static str, reason: String },

    /// Another writer persisted the item first. Safe to retry with fresh state.
    #[error("item {0} was modified concurrently")]
    ConcurrentModification(ItemId),

    #[error("item {0} not found")]
    NotFound(ItemId),

    #[error("storage error: {0}")]
    Storage(String),
}

impl SchedulingError {
    /// Only persistence races are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}

/// Errors reported by a storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version conflict on item {0}")]
    VersionConflict(ItemId),

    #[error("item {0} not found")]
    NotFound(ItemId),

    #[error("{0}")]
    Backend(String),
}

impl From<StoreError> for SchedulingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict(id) => Self::ConcurrentModification(id),
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Backend(msg) => Self::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn version_conflict_becomes_retryable() {
        let id = Uuid::new_v4();
        let err: SchedulingError = StoreError::VersionConflict(id).into();
        assert!(matches!(err, SchedulingError::ConcurrentModification(got) if got == id));
        assert!(err.is_retryable());
    }

    #[test]
    fn corrupt_state_is_not_retryable() {
        let err = SchedulingError::CorruptState {
            item_id: Uuid::nil(),
            reason: "stability must be positive".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "corrupt state for item 00000000-0000-0000-0000-000000000000: stability must be positive"
        );
    }

    #[test]
    fn backend_error_maps_to_storage() {
        let err: SchedulingError = StoreError::Backend("connection reset".to_string()).into();
        assert_eq!(err.to_string(), "storage error: connection reset");
    }
}
