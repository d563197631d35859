//! Common test utilities for integration tests.
//!
//! `TestContext` runs the full router over an in-memory store, so these
//! tests need no external services. The PostgreSQL store has its own
//! ignored tests in `pg_store.rs`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use srs_core::{InMemoryStore, ItemKind, ItemState, ReviewableItem};
use uuid::Uuid;

use srs_backend::config::Config;
use srs_backend::{router, AppState};

/// Test context holding the store behind the router.
pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    app: Router,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_env(&[])
    }

    /// Build the app as if `vars` were set in the environment.
    pub fn with_env(vars: &[(&str, &str)]) -> Self {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::from_lookup(|key| {
            vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .expect("valid test config");

        let store = Arc::new(InMemoryStore::new());
        let state = AppState::new(store.clone(), &config).expect("valid app state");

        Self {
            store,
            app: router(state),
        }
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.app.clone()).expect("test server")
    }

    /// Store a reviewed item that has been due for `days_overdue` days.
    pub fn seed_due(&self, user_id: Uuid, days_overdue: i64, stability: f64) -> ReviewableItem {
        self.seed_due_kind(user_id, ItemKind::Flashcard, days_overdue, stability)
    }

    pub fn seed_due_kind(
        &self,
        user_id: Uuid,
        kind: ItemKind,
        days_overdue: i64,
        stability: f64,
    ) -> ReviewableItem {
        let due = Utc::now() - Duration::days(days_overdue) - Duration::minutes(1);
        let mut item = ReviewableItem::new(Uuid::new_v4(), user_id, kind, due);
        item.state = ItemState::Review;
        item.stability = stability;
        item.last_reviewed_at = Some(due - Duration::days(stability.round() as i64));
        item.review_count = 2;
        item.scheduled_days = stability.round() as u32;

        self.store.insert(item.clone()).expect("insert item");
        item
    }

    /// Store a never-reviewed item.
    pub fn seed_new(&self, user_id: Uuid) -> ReviewableItem {
        let item = ReviewableItem::new(
            Uuid::new_v4(),
            user_id,
            ItemKind::Question,
            Utc::now() - Duration::minutes(1),
        );
        self.store.insert(item.clone()).expect("insert item");
        item
    }
}
