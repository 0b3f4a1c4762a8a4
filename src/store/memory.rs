use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::clock::MonotonicClock;
use super::{
    AuditStore, CommentStore, IdentityStore, ResourceStore, StoreError, StoreResult,
};
use crate::models::{
    Actor, ActorId, AuditEntry, AuditEntryPage, CommentEntry, Level, NewAuditEntry, NewComment,
    Resource, ResourceRef, comment,
};

#[derive(Default)]
struct State {
    actors: HashMap<ActorId, Actor>,
    resources: BTreeMap<ResourceRef, Resource>,
    audit: Vec<AuditEntry>,
    comments: Vec<CommentEntry>,
    /// Committed versioned writes by write id.
    writes: HashMap<String, ResourceRef>,
    fail_audit_writes: bool,
    lost_acks: u32,
    offline: bool,
    latency: Option<Duration>,
}

impl State {
    /// Called after a write has been applied. Swallows the acknowledgement
    /// while lost acks are pending.
    fn acknowledge(&mut self) -> StoreResult<()> {
        if self.lost_acks == 0 {
            return Ok(());
        }
        self.lost_acks -= 1;
        Err(StoreError::Backend("connection reset after commit".to_string()))
    }
}

/// In-process store with the same semantics as the Postgres store.
///
/// A single lock serialises all writes, so per-resource ordering falls out
/// of lock order. Failure injection switches let callers exercise the
/// unavailable, audit-loss and lost-acknowledgement paths.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    clock: Arc<MonotonicClock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_actor(&self, actor: Actor) {
        self.lock().actors.insert(actor.id.clone(), actor);
    }

    pub fn insert_resource(&self, resource: Resource) {
        self.lock().resources.insert(resource.reference.clone(), resource);
    }

    /// Every audit entry in append order.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.lock().audit.clone()
    }

    pub fn set_fail_audit_writes(&self, fail: bool) {
        self.lock().fail_audit_writes = fail;
    }

    /// The next `count` writes (resource writes, audit and comment appends)
    /// are applied and then reported as a backend error.
    pub fn lose_acks(&self, count: u32) {
        self.lock().lost_acks = count;
    }

    /// Every comment in append order.
    pub fn comments(&self) -> Vec<CommentEntry> {
        self.lock().comments.clone()
    }

    /// When offline, every call fails with a backend error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Delay applied before every call, to trip caller timeouts.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    async fn enter(&self) -> StoreResult<()> {
        let (latency, offline) = {
            let state = self.lock();
            (state.latency, state.offline)
        };
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
        if offline {
            return Err(StoreError::Backend("memory store offline".to_string()));
        }
        Ok(())
    }

    fn write_resource(
        &self,
        reference: &ResourceRef,
        expected_version: i64,
        write_id: &str,
        apply: impl FnOnce(&mut Resource),
    ) -> StoreResult<Resource> {
        let mut state = self.lock();
        let resource = state
            .resources
            .get_mut(reference)
            .ok_or_else(|| StoreError::NotFound(format!("resource {reference}")))?;
        if resource.version != expected_version {
            return Err(StoreError::Conflict(reference.clone()));
        }
        apply(resource);
        resource.version += 1;
        let updated = resource.clone();
        state.writes.insert(write_id.to_string(), reference.clone());
        state.acknowledge()?;
        Ok(updated)
    }
}

impl IdentityStore for MemoryStore {
    async fn find_actor(&self, id: &ActorId) -> StoreResult<Option<Actor>> {
        self.enter().await?;
        Ok(self.lock().actors.get(id).cloned())
    }
}

impl ResourceStore for MemoryStore {
    async fn find_resource(&self, reference: &ResourceRef) -> StoreResult<Option<Resource>> {
        self.enter().await?;
        Ok(self.lock().resources.get(reference).cloned())
    }

    async fn set_owner(
        &self,
        reference: &ResourceRef,
        expected_version: i64,
        write_id: &str,
        owner: &ActorId,
    ) -> StoreResult<Resource> {
        self.enter().await?;
        self.write_resource(reference, expected_version, write_id, |r| {
            r.collaborators.remove(owner);
            r.owner_id = Some(owner.clone());
        })
    }

    async fn put_collaborator(
        &self,
        reference: &ResourceRef,
        expected_version: i64,
        write_id: &str,
        actor: &ActorId,
        level: Level,
    ) -> StoreResult<Resource> {
        self.enter().await?;
        self.write_resource(reference, expected_version, write_id, |r| {
            r.collaborators.insert(actor.clone(), level);
        })
    }

    async fn remove_collaborator(
        &self,
        reference: &ResourceRef,
        expected_version: i64,
        write_id: &str,
        actor: &ActorId,
    ) -> StoreResult<Resource> {
        self.enter().await?;
        self.write_resource(reference, expected_version, write_id, |r| {
            r.collaborators.remove(actor);
        })
    }

    async fn find_write(
        &self,
        reference: &ResourceRef,
        write_id: &str,
    ) -> StoreResult<Option<Resource>> {
        self.enter().await?;
        let state = self.lock();
        Ok(match state.writes.get(write_id) {
            Some(written) if written == reference => state.resources.get(reference).cloned(),
            _ => None,
        })
    }

    async fn find_degraded(&self, limit: i64) -> StoreResult<Vec<ResourceRef>> {
        self.enter().await?;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self
            .lock()
            .resources
            .values()
            .filter(|r| r.is_degraded())
            .take(limit)
            .map(|r| r.reference.clone())
            .collect())
    }

    async fn count_degraded(&self) -> StoreResult<i64> {
        self.enter().await?;
        let count = self.lock().resources.values().filter(|r| r.is_degraded()).count();
        Ok(count as i64)
    }
}

impl AuditStore for MemoryStore {
    async fn append_audit(&self, entry: NewAuditEntry) -> StoreResult<AuditEntry> {
        self.enter().await?;
        let mut state = self.lock();
        if state.fail_audit_writes {
            return Err(StoreError::Backend("audit table unavailable".to_string()));
        }
        if let Some(existing) = state.audit.iter().find(|e| e.id == entry.id) {
            return Ok(existing.clone());
        }
        let stored = AuditEntry {
            id: entry.id,
            resource: entry.resource,
            user_id: entry.user_id,
            user_name: entry.user_name,
            timestamp: self.clock.now(),
            details: entry.details,
        };
        state.audit.push(stored.clone());
        state.acknowledge()?;
        Ok(stored)
    }

    async fn list_audit(
        &self,
        reference: &ResourceRef,
        page: i64,
        per_page: i64,
    ) -> StoreResult<AuditEntryPage> {
        self.enter().await?;
        let (page, per_page) = AuditEntryPage::clamp(page, per_page);
        let mut matching: Vec<AuditEntry> = self
            .lock()
            .audit
            .iter()
            .filter(|e| &e.resource == reference)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));

        let total_count = matching.len() as i64;
        let entries = matching
            .into_iter()
            .skip(usize::try_from(AuditEntryPage::offset(page, per_page)).unwrap_or(usize::MAX))
            .take(per_page as usize)
            .collect();
        Ok(AuditEntryPage {
            entries,
            page,
            per_page,
            total_count,
            total_pages: AuditEntryPage::total_pages(total_count, per_page),
        })
    }
}

impl CommentStore for MemoryStore {
    async fn append_comment(&self, new: NewComment) -> StoreResult<CommentEntry> {
        self.enter().await?;
        let mut state = self.lock();
        if let Some(existing) = state.comments.iter().find(|c| c.id == new.id) {
            return Ok(existing.clone());
        }
        let stored = CommentEntry {
            id: new.id,
            resource: new.resource,
            user_id: new.user_id,
            user_name: new.user_name,
            user_avatar_initials: new.user_avatar_initials,
            text: new.text,
            created_at: self.clock.now(),
        };
        state.comments.push(stored.clone());
        state.acknowledge()?;
        Ok(stored)
    }

    async fn find_comment(
        &self,
        reference: &ResourceRef,
        comment_id: &str,
    ) -> StoreResult<Option<CommentEntry>> {
        self.enter().await?;
        Ok(self
            .lock()
            .comments
            .iter()
            .find(|c| &c.resource == reference && c.id == comment_id)
            .cloned())
    }

    async fn update_comment_text(
        &self,
        reference: &ResourceRef,
        comment_id: &str,
        text: &str,
    ) -> StoreResult<CommentEntry> {
        self.enter().await?;
        let mut state = self.lock();
        let comment = state
            .comments
            .iter_mut()
            .find(|c| &c.resource == reference && c.id == comment_id)
            .ok_or_else(|| StoreError::NotFound(format!("comment {comment_id}")))?;
        comment.text = text.to_string();
        Ok(comment.clone())
    }

    async fn list_comments(&self, reference: &ResourceRef) -> StoreResult<Vec<CommentEntry>> {
        self.enter().await?;
        let mut thread: Vec<CommentEntry> = self
            .lock()
            .comments
            .iter()
            .filter(|c| &c.resource == reference)
            .cloned()
            .collect();
        comment::sort_thread(&mut thread);
        Ok(thread)
    }
}
