//! Audit trail recorder.
//!
//! Appends one immutable entry per approved mutation. Recording never
//! decides anything: by the time it runs, the mutation has happened. A
//! failed write is therefore reported as its own outcome
//! ([`AuditStatus::WriteFailed`] / [`AccessError::AuditWriteFailed`]) and
//! escalated to the alert queue, so the mutation's success is neither lost
//! nor silently left unaudited.

use serde::Serialize;

use crate::errors::AccessError;
use crate::models::{Actor, AuditDetails, AuditEntry, AuditEntryPage, NewAuditEntry, ResourceRef};
use crate::store::{AuditStore, RetryPolicy, new_id, with_retry};
use crate::warnings::{Alert, AlertQueue};

/// What happened to the audit entry of a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditStatus {
    Recorded { entry: AuditEntry },
    /// Nothing changed, so nothing was recorded.
    Unchanged,
    WriteFailed { error: String },
}

impl AuditStatus {
    pub fn entry(&self) -> Option<&AuditEntry> {
        match self {
            AuditStatus::Recorded { entry } => Some(entry),
            _ => None,
        }
    }

    pub fn is_write_failed(&self) -> bool {
        matches!(self, AuditStatus::WriteFailed { .. })
    }

    /// Value for the `Warning` response header when the trail has a gap.
    pub fn warning_header(&self) -> Option<String> {
        match self {
            AuditStatus::WriteFailed { error } => {
                Some(format!("199 stagegate \"audit write failed: {}\"", error.replace('"', "'")))
            }
            _ => None,
        }
    }
}

/// Result of a governed mutation together with its audit outcome.
#[derive(Debug, Clone)]
pub struct Audited<T> {
    pub value: T,
    pub audit: AuditStatus,
}

impl<T> Audited<T> {
    pub fn unchanged(value: T) -> Self {
        Audited { value, audit: AuditStatus::Unchanged }
    }
}

#[derive(Clone)]
pub struct AuditRecorder<S> {
    store: S,
    retry: RetryPolicy,
    alerts: AlertQueue,
}

impl<S: AuditStore> AuditRecorder<S> {
    pub fn new(store: S, retry: RetryPolicy, alerts: AlertQueue) -> Self {
        AuditRecorder { store, retry, alerts }
    }

    /// Append an entry for `actor` on `resource`. The display name is
    /// snapshotted now; later renames do not touch history.
    pub async fn record(
        &self,
        resource: &ResourceRef,
        actor: &Actor,
        details: AuditDetails,
    ) -> Result<AuditEntry, AccessError> {
        let tag = details.tag();
        // One id for every attempt: a retry after a lost ack finds the first entry.
        let new = NewAuditEntry {
            id: new_id("aud"),
            resource: resource.clone(),
            user_id: actor.id.clone(),
            user_name: Some(actor.display_name.clone()),
            details,
        };
        let store = &self.store;
        match with_retry(&self.retry, "audit append", move || store.append_audit(new.clone())).await {
            Ok(entry) => {
                log::info!("audit {} {tag} on {resource} by {}", entry.id, actor.id);
                Ok(entry)
            }
            Err(e) => {
                let error = e.to_string();
                self.alerts
                    .raise(Alert::audit_write_failed(resource, tag, &actor.id, &error));
                Err(AccessError::AuditWriteFailed(error))
            }
        }
    }

    /// [`record`](Self::record), folded into an [`AuditStatus`] for callers
    /// whose mutation already succeeded.
    pub async fn record_status(
        &self,
        resource: &ResourceRef,
        actor: &Actor,
        details: AuditDetails,
    ) -> AuditStatus {
        match self.record(resource, actor, details).await {
            Ok(entry) => AuditStatus::Recorded { entry },
            Err(AccessError::AuditWriteFailed(error)) => AuditStatus::WriteFailed { error },
            Err(e) => AuditStatus::WriteFailed { error: e.to_string() },
        }
    }

    /// Audit trail of one resource, newest first.
    pub async fn list(
        &self,
        resource: &ResourceRef,
        page: i64,
        per_page: i64,
    ) -> Result<AuditEntryPage, AccessError> {
        let store = &self.store;
        Ok(with_retry(&self.retry, "audit list", move || store.list_audit(resource, page, per_page)).await?)
    }
}
