//! Shared test infrastructure for access-core tests.
//!
//! - `setup()` - in-memory store with the standard cast and a fast retry policy
//! - `setup_test_db()` - Postgres store from `DATABASE_URL`, or `None` when unset
#![allow(dead_code)]

use std::time::Duration;

use stagegate::auth::roles::RoleResolver;
use stagegate::config::DEFAULT_ADMIN_GROUP;
use stagegate::models::{Actor, Level, Resource, ResourceKind, Role};
use stagegate::service::AccessService;
use stagegate::store::{MemoryStore, PgStore, RetryPolicy};
use stagegate::warnings::AlertQueue;

// ============================================================================
// TEST ACTORS
// ============================================================================

pub const GOD: &str = "prospero";
pub const OPS: &str = "ops";
pub const OWNER: &str = "miranda";
pub const EDITOR: &str = "ariel";
pub const VIEWER: &str = "caliban";
pub const STRANGER: &str = "trinculo";

pub fn actor(id: &str) -> Actor {
    match id {
        GOD => Actor::new(GOD, "Prospero", Role::God),
        OPS => Actor::new(OPS, "Stage Ops", Role::Viewer).with_group(DEFAULT_ADMIN_GROUP),
        OWNER => Actor::new(OWNER, "Miranda Lane", Role::Viewer),
        EDITOR => Actor::new(EDITOR, "Ariel Spirit", Role::Editor),
        VIEWER => Actor::new(VIEWER, "Caliban", Role::Viewer),
        other => Actor::new(other, "Trinculo Jester", Role::Viewer),
    }
}

/// A show owned by `OWNER`, with `VIEWER` granted viewer.
pub fn owned_show(id: &str) -> Resource {
    Resource::new(ResourceKind::Show, id)
        .owned_by(OWNER)
        .with_collaborator(VIEWER, Level::Viewer)
}

/// Retry policy that keeps failing tests fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_millis(50),
        retries: 1,
        backoff: Duration::from_millis(1),
    }
}

// ============================================================================
// IN-MEMORY SETUP
// ============================================================================

pub struct TestEnv {
    pub store: MemoryStore,
    pub alerts: AlertQueue,
    pub service: AccessService<MemoryStore>,
}

pub fn setup() -> TestEnv {
    let store = MemoryStore::new();
    for id in [GOD, OPS, OWNER, EDITOR, VIEWER, STRANGER] {
        store.insert_actor(actor(id));
    }
    let alerts = AlertQueue::new(16);
    let service = AccessService::new(store.clone(), RoleResolver::default(), fast_retry(), alerts.clone());
    TestEnv { store, alerts, service }
}

impl TestEnv {
    /// Insert `resource` and return the stored copy.
    pub async fn seed(&self, resource: Resource) -> Resource {
        let reference = resource.reference.clone();
        self.store.insert_resource(resource);
        self.service.load_resource(&reference).await.expect("seeded resource")
    }
}

// ============================================================================
// POSTGRES SETUP
// ============================================================================

/// Connect to `DATABASE_URL`, run migrations and clear all tables.
/// Returns `None` (test skipped) when no database is configured.
pub async fn setup_test_db() -> Option<PgStore> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping Postgres test");
        return None;
    };
    let pool = stagegate::db::init_pool(&url, 2).await.expect("Failed to connect to test DB");
    stagegate::db::run_migrations(&pool).await.expect("Failed to run migrations");
    sqlx::query("TRUNCATE comments, audit_entries, resource_writes, resource_collaborators, governed_resources, actors")
        .execute(&pool)
        .await
        .expect("Failed to reset tables");
    Some(PgStore::new(pool))
}
