//! Engine-mediated writes to the ownership registry and grant table.
//!
//! Callers hand in the `Resource` snapshot they read. Every write is
//! checked by the policy engine against that snapshot and committed only if
//! the row still has the snapshot's version; a lost race surfaces as
//! `Conflict`, which [`retry_on_conflict`] turns into a bounded
//! re-read-and-retry loop.
//!
//! A write whose acknowledgement is lost is never simply replayed. Each
//! write carries an id the store commits with it, and the service asks the
//! store about that id before trying again. A committed write always goes
//! on to its audit entry and is never re-planned into a no-op.

use std::future::Future;

use serde::Serialize;

use crate::audit::{AuditRecorder, Audited};
use crate::auth::grants;
use crate::auth::ownership;
use crate::auth::policy::{Action, Decision, DenyReason, PolicyEngine};
use crate::auth::roles::RoleResolver;
use crate::comments::CommentLog;
use crate::config::AppConfig;
use crate::errors::{AccessError, Denial};
use crate::models::{
    Actor, ActorId, AuditDetails, AuditEntry, AuditEntryPage, CollaboratorChange, Level, Resource,
    ResourceRef,
};
use crate::store::{RetryPolicy, Store, StoreError, StoreResult, new_id, with_retry, with_timeout};
use crate::warnings::{Alert, AlertQueue};

/// Counts from one ownership backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub assigned: usize,
    pub conflicts: usize,
    pub audit_failures: usize,
    pub errors: usize,
}

/// Shared application state, registered once as `web::Data<AppState<S>>`.
pub struct AppState<S> {
    pub service: AccessService<S>,
    pub config: AppConfig,
}

#[derive(Clone)]
pub struct AccessService<S> {
    store: S,
    engine: PolicyEngine,
    recorder: AuditRecorder<S>,
    comments: CommentLog<S>,
    retry: RetryPolicy,
    alerts: AlertQueue,
}

impl<S: Store> AccessService<S> {
    pub fn new(store: S, resolver: RoleResolver, retry: RetryPolicy, alerts: AlertQueue) -> Self {
        let engine = PolicyEngine::new(resolver);
        let recorder = AuditRecorder::new(store.clone(), retry, alerts.clone());
        let comments = CommentLog::new(store.clone(), engine.clone(), recorder.clone(), retry);
        AccessService { store, engine, recorder, comments, retry, alerts }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    pub fn recorder(&self) -> &AuditRecorder<S> {
        &self.recorder
    }

    pub fn comments(&self) -> &CommentLog<S> {
        &self.comments
    }

    pub fn alerts(&self) -> &AlertQueue {
        &self.alerts
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn decide(&self, actor: &Actor, resource: &Resource, action: Action) -> Decision {
        self.engine.decide(actor, resource, action)
    }

    pub async fn load_actor(&self, id: &ActorId) -> Result<Actor, AccessError> {
        let store = &self.store;
        with_retry(&self.retry, "actor lookup", move || store.find_actor(id))
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("actor {id}")))
    }

    pub async fn load_resource(&self, reference: &ResourceRef) -> Result<Resource, AccessError> {
        let store = &self.store;
        with_retry(&self.retry, "resource lookup", move || store.find_resource(reference))
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("resource {reference}")))
    }

    /// Load the resource and decide. An unreachable store fails closed as
    /// `Deny(Unavailable)`; an unknown resource is `NotFound`.
    pub async fn decide_for(
        &self,
        actor: &Actor,
        reference: &ResourceRef,
        action: Action,
    ) -> Result<Decision, AccessError> {
        match self.load_resource(reference).await {
            Ok(resource) => Ok(self.decide(actor, &resource, action)),
            Err(AccessError::Unavailable(e)) => {
                log::warn!("deny {} {action} on {reference}: {e}", actor.id);
                Ok(Decision::Deny(DenyReason::Unavailable))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn assign_owner(
        &self,
        resource: &Resource,
        new_owner: &ActorId,
        acting: &Actor,
    ) -> Result<Audited<Resource>, AccessError> {
        let Some(change) = ownership::plan_assignment(&self.engine, resource, new_owner, acting)? else {
            return Ok(Audited::unchanged(resource.clone()));
        };

        let store = &self.store;
        let reference = &resource.reference;
        let version = resource.version;
        let write_id = new_id("wr");
        let id = write_id.as_str();
        let updated = self
            .commit_write(reference, id, "owner write", acting, move || {
                store.set_owner(reference, version, id, new_owner)
            })
            .await?;
        log::info!(
            "owner of {reference} changed {:?} -> {} by {}",
            change.before.as_ref().map(ActorId::as_str),
            change.after,
            acting.id
        );

        let audit = self
            .recorder
            .record_status(
                reference,
                acting,
                AuditDetails::OwnershipChanged {
                    before: change.before,
                    after: change.after,
                    superseded_grant: change.superseded_grant,
                },
            )
            .await;
        Ok(Audited { value: updated, audit })
    }

    pub async fn grant(
        &self,
        resource: &Resource,
        acting: &Actor,
        target: &ActorId,
        level: Level,
    ) -> Result<Audited<Resource>, AccessError> {
        let Some(change) = grants::plan_grant(&self.engine, resource, acting, target, level)? else {
            return Ok(Audited::unchanged(resource.clone()));
        };

        let store = &self.store;
        let reference = &resource.reference;
        let version = resource.version;
        let write_id = new_id("wr");
        let id = write_id.as_str();
        let updated = self
            .commit_write(reference, id, "collaborator grant", acting, move || {
                store.put_collaborator(reference, version, id, target, level)
            })
            .await?;
        self.finish_collaborator_change(updated, acting, change).await
    }

    pub async fn revoke(
        &self,
        resource: &Resource,
        acting: &Actor,
        target: &ActorId,
    ) -> Result<Audited<Resource>, AccessError> {
        let Some(change) = grants::plan_revoke(&self.engine, resource, acting, target)? else {
            return Ok(Audited::unchanged(resource.clone()));
        };

        let store = &self.store;
        let reference = &resource.reference;
        let version = resource.version;
        let write_id = new_id("wr");
        let id = write_id.as_str();
        let updated = self
            .commit_write(reference, id, "collaborator revoke", acting, move || {
                store.remove_collaborator(reference, version, id, target)
            })
            .await?;
        self.finish_collaborator_change(updated, acting, change).await
    }

    /// Run a versioned write tagged `write_id`. After a transient failure
    /// the store is asked whether `write_id` committed: if it did, the
    /// committed row is returned; if not, the write is tried again within
    /// the retry policy. A `Conflict` on a repeat attempt is checked the
    /// same way, since the first attempt may have been the one that won.
    /// When the store cannot answer, the outcome is unknown: an alert is
    /// raised and the caller gets `Unavailable`, never a conflict to
    /// re-plan from.
    async fn commit_write<F, Fut>(
        &self,
        reference: &ResourceRef,
        write_id: &str,
        what: &str,
        acting: &Actor,
        mut write: F,
    ) -> Result<Resource, AccessError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<Resource>>,
    {
        let mut attempt = 0;
        let mut delay = self.retry.backoff;
        loop {
            let error = match with_timeout(self.retry.timeout, write()).await {
                Ok(updated) => return Ok(updated),
                Err(e) if e.is_transient() => e,
                Err(e @ StoreError::Conflict(_)) if attempt > 0 => e,
                Err(e) => return Err(e.into()),
            };

            let store = &self.store;
            let committed =
                with_retry(&self.retry, "write lookup", move || store.find_write(reference, write_id)).await;
            match committed {
                Ok(Some(updated)) => {
                    log::warn!("{what} {write_id} on {reference} reported '{error}' but had committed");
                    return Ok(updated);
                }
                Ok(None) if error.is_transient() && attempt < self.retry.retries => {
                    attempt += 1;
                    log::warn!(
                        "{what} on {reference}: attempt {attempt} failed ({error}), retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Ok(None) => return Err(error.into()),
                Err(lookup) => {
                    log::error!("{what} {write_id} on {reference}: {error}; lookup failed: {lookup}");
                    self.alerts.raise(Alert::write_outcome_unknown(
                        reference,
                        what,
                        write_id,
                        &acting.id,
                        &error.to_string(),
                    ));
                    return Err(AccessError::Unavailable(format!(
                        "{what} on {reference} has an unknown outcome: {error}"
                    )));
                }
            }
        }
    }

    async fn finish_collaborator_change(
        &self,
        updated: Resource,
        acting: &Actor,
        change: CollaboratorChange,
    ) -> Result<Audited<Resource>, AccessError> {
        log::info!("collaborators of {} changed by {}: {change:?}", updated.reference, acting.id);
        let audit = self
            .recorder
            .record_status(&updated.reference, acting, AuditDetails::ManageCollaborators(change))
            .await;
        Ok(Audited { value: updated, audit })
    }

    /// Record a mutation the application performed itself. The engine
    /// re-checks the governing action first, so entries only exist for
    /// allowed mutations.
    pub async fn record(
        &self,
        actor: &Actor,
        resource: &Resource,
        details: AuditDetails,
    ) -> Result<AuditEntry, AccessError> {
        self.engine.require(actor, resource, details.governing_action())?;
        self.recorder.record(&resource.reference, actor, details).await
    }

    /// Audit trail of a resource, for anyone who can read it.
    pub async fn activity(
        &self,
        actor: &Actor,
        resource: &Resource,
        page: i64,
        per_page: i64,
    ) -> Result<AuditEntryPage, AccessError> {
        self.engine.require(actor, resource, Action::Read)?;
        self.recorder.list(&resource.reference, page, per_page).await
    }

    /// Assign `new_owner` to up to `limit` degraded resources, each through
    /// the regular ownership path (one `ownership_changed` entry per claim).
    pub async fn backfill_owners(
        &self,
        acting: &Actor,
        new_owner: &ActorId,
        limit: i64,
    ) -> Result<BackfillReport, AccessError> {
        if !self.engine.resolver().is_superuser(acting) {
            return Err(AccessError::PermissionDenied(Denial::SuperuserOnly));
        }
        self.load_actor(new_owner).await?;

        let store = &self.store;
        let degraded = with_retry(&self.retry, "degraded scan", move || store.find_degraded(limit)).await?;

        let mut report = BackfillReport { scanned: degraded.len(), ..Default::default() };
        for reference in &degraded {
            let outcome = match self.load_resource(reference).await {
                Ok(resource) => self.assign_owner(&resource, new_owner, acting).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(done) => {
                    report.assigned += 1;
                    if done.audit.is_write_failed() {
                        report.audit_failures += 1;
                    }
                }
                Err(e) if e.is_conflict() => report.conflicts += 1,
                Err(e) => {
                    log::error!("Backfill of {reference} failed: {e}");
                    report.errors += 1;
                }
            }
        }
        log::info!(
            "Ownership backfill by {}: scanned={}, assigned={}, conflicts={}, audit_failures={}, errors={}",
            acting.id,
            report.scanned,
            report.assigned,
            report.conflicts,
            report.audit_failures,
            report.errors
        );
        Ok(report)
    }
}

/// Run `op` until it stops reporting `Conflict`, at most `retries` extra
/// times. `op` must re-read the resource on every call.
pub async fn retry_on_conflict<T, F, Fut>(retries: u32, mut op: F) -> Result<T, AccessError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AccessError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && attempt < retries => {
                attempt += 1;
                log::info!("{e} (retry {attempt}/{retries})");
            }
            other => return other,
        }
    }
}
