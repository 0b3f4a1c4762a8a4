//! Persistence collaborators for the access core.
//!
//! The core reads actors and resources and appends audit/comment records
//! through these traits. Every call made by the core is wrapped in a
//! caller-supplied timeout ([`with_timeout`]) and, where the failure is
//! transient, a bounded exponential backoff ([`with_retry`]). Only calls that
//! are safe to repeat go through `with_retry`: reads, and appends keyed by a
//! writer-chosen id. Nothing here ever turns a failure into an implicit
//! success.

pub mod clock;
pub mod memory;
pub mod postgres;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::models::{
    Actor, ActorId, AuditEntry, AuditEntryPage, CommentEntry, Level, NewAuditEntry, NewComment,
    Resource, ResourceRef,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug)]
pub enum StoreError {
    /// The call did not finish within its deadline.
    Timeout(Duration),
    /// The backend failed (connection lost, query error).
    Backend(String),
    /// An optimistic write lost against a newer version.
    Conflict(ResourceRef),
    NotFound(String),
}

impl StoreError {
    /// Transient failures are retried with backoff; the rest are returned as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Backend(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Timeout(d) => write!(f, "store call timed out after {}ms", d.as_millis()),
            StoreError::Backend(e) => write!(f, "store backend error: {e}"),
            StoreError::Conflict(r) => write!(f, "version conflict on {r}"),
            StoreError::NotFound(what) => write!(f, "{what} not found"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Source of cached actor profiles.
#[allow(async_fn_in_trait)]
pub trait IdentityStore {
    async fn find_actor(&self, id: &ActorId) -> StoreResult<Option<Actor>>;
}

/// Ownership registry and collaborator grant table rows, one per resource.
///
/// Every write carries the `expected_version` it was computed from and
/// fails with [`StoreError::Conflict`] if the row has moved on. A
/// successful write bumps the version, records `write_id` in the same
/// commit and returns the new row. A writer that loses the acknowledgement
/// asks [`find_write`](Self::find_write) instead of writing again.
#[allow(async_fn_in_trait)]
pub trait ResourceStore {
    async fn find_resource(&self, reference: &ResourceRef) -> StoreResult<Option<Resource>>;

    /// Also drops any explicit grant `owner` held on the resource.
    async fn set_owner(
        &self,
        reference: &ResourceRef,
        expected_version: i64,
        write_id: &str,
        owner: &ActorId,
    ) -> StoreResult<Resource>;

    async fn put_collaborator(
        &self,
        reference: &ResourceRef,
        expected_version: i64,
        write_id: &str,
        actor: &ActorId,
        level: Level,
    ) -> StoreResult<Resource>;

    async fn remove_collaborator(
        &self,
        reference: &ResourceRef,
        expected_version: i64,
        write_id: &str,
        actor: &ActorId,
    ) -> StoreResult<Resource>;

    /// The current row if the write `write_id` committed against it.
    async fn find_write(
        &self,
        reference: &ResourceRef,
        write_id: &str,
    ) -> StoreResult<Option<Resource>>;

    /// Resources with no owner, oldest reference first.
    async fn find_degraded(&self, limit: i64) -> StoreResult<Vec<ResourceRef>>;

    async fn count_degraded(&self) -> StoreResult<i64>;
}

/// Append-only audit trail.
#[allow(async_fn_in_trait)]
pub trait AuditStore {
    /// Idempotent on `entry.id`: appending an id twice returns the first entry.
    async fn append_audit(&self, entry: NewAuditEntry) -> StoreResult<AuditEntry>;

    /// Newest first.
    async fn list_audit(
        &self,
        reference: &ResourceRef,
        page: i64,
        per_page: i64,
    ) -> StoreResult<AuditEntryPage>;
}

/// Append-only comment thread (bodies are editable in place).
#[allow(async_fn_in_trait)]
pub trait CommentStore {
    /// Idempotent on `comment.id`, like [`AuditStore::append_audit`].
    async fn append_comment(&self, comment: NewComment) -> StoreResult<CommentEntry>;

    async fn find_comment(
        &self,
        reference: &ResourceRef,
        comment_id: &str,
    ) -> StoreResult<Option<CommentEntry>>;

    async fn update_comment_text(
        &self,
        reference: &ResourceRef,
        comment_id: &str,
        text: &str,
    ) -> StoreResult<CommentEntry>;

    /// Thread order: creation time ascending, ties by id ascending.
    async fn list_comments(&self, reference: &ResourceRef) -> StoreResult<Vec<CommentEntry>>;
}

/// Everything the access core needs from persistence.
pub trait Store: IdentityStore + ResourceStore + AuditStore + CommentStore + Clone + 'static {}

impl<T> Store for T where T: IdentityStore + ResourceStore + AuditStore + CommentStore + Clone + 'static {}

/// Timeout and backoff applied at the collaborator boundary.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            timeout: Duration::from_millis(2000),
            retries: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Run one store call under a deadline.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Run a store call under the policy's deadline, retrying transient failures
/// with exponential backoff. Non-transient errors return immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 0;
    let mut delay = policy.backoff;
    loop {
        match with_timeout(policy.timeout, op()).await {
            Err(e) if e.is_transient() && attempt < policy.retries => {
                attempt += 1;
                log::warn!("{what}: attempt {attempt} failed ({e}), retrying in {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) if e.is_transient() => {
                log::error!("{what}: giving up after {} attempts: {e}", attempt + 1);
                return Err(e);
            }
            other => return other,
        }
    }
}

/// Generate an opaque record id: `<prefix>_<24 hex chars>`.
pub fn new_id(prefix: &str) -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 12] = rng.random();
    format!("{prefix}_{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let calls = Cell::new(0);
        let result = with_retry(&fast_policy(3), "flaky", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 { Err(StoreError::Backend("down".into())) } else { Ok(n) }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let calls = Cell::new(0);
        let result: StoreResult<()> = with_retry(&fast_policy(2), "down", || {
            calls.set(calls.get() + 1);
            async { Err(StoreError::Backend("down".into())) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn conflicts_are_not_retried() {
        let calls = Cell::new(0);
        let reference = ResourceRef::new(crate::models::ResourceKind::Show, "s1");
        let result: StoreResult<()> = with_retry(&fast_policy(3), "write", || {
            calls.set(calls.get() + 1);
            let r = reference.clone();
            async move { Err(StoreError::Conflict(r)) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let result: StoreResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = new_id("cmt");
        let b = new_id("cmt");
        assert!(a.starts_with("cmt_"));
        assert_eq!(a.len(), 4 + 24);
        assert_ne!(a, b);
    }
}
