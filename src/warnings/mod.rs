//! Operational alerts.
//!
//! Conditions the access core cannot fix on its own (lost audit writes,
//! unowned resources piling up) are raised here for operators instead of
//! being swallowed. The queue is bounded; when full, the oldest alert is
//! dropped and a log line records the drop.

pub mod generators;
pub mod scheduler;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ActorId, ResourceRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub severity: Severity,
    pub category: String,
    pub source_action: String,
    pub message: String,
    /// Deduplication key; at most one alert per (source_action, dedup) is kept.
    pub dedup: Option<String>,
    pub resource: Option<ResourceRef>,
    pub actor: Option<ActorId>,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    /// A governed mutation went through but its audit entry did not persist.
    pub fn audit_write_failed(resource: &ResourceRef, action_tag: &str, actor: &ActorId, error: &str) -> Self {
        Alert {
            id: crate::store::new_id("alr"),
            severity: Severity::High,
            category: "compliance".to_string(),
            source_action: "audit.write_failed".to_string(),
            message: format!("Unaudited '{action_tag}' on {resource} by {actor}: {error}"),
            dedup: None,
            resource: Some(resource.clone()),
            actor: Some(actor.clone()),
            raised_at: Utc::now(),
        }
    }

    /// A versioned write may have committed, but the store could not say.
    /// If it did, the change has no audit entry yet.
    pub fn write_outcome_unknown(
        resource: &ResourceRef,
        what: &str,
        write_id: &str,
        actor: &ActorId,
        error: &str,
    ) -> Self {
        Alert {
            id: crate::store::new_id("alr"),
            severity: Severity::High,
            category: "compliance".to_string(),
            source_action: "write.outcome_unknown".to_string(),
            message: format!("Outcome of {what} {write_id} on {resource} by {actor} unknown: {error}"),
            dedup: Some(write_id.to_string()),
            resource: Some(resource.clone()),
            actor: Some(actor.clone()),
            raised_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct AlertQueue {
    alerts: Arc<Mutex<VecDeque<Alert>>>,
    capacity: usize,
}

impl AlertQueue {
    pub fn new(capacity: usize) -> Self {
        AlertQueue {
            alerts: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Alert>> {
        self.alerts.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn raise(&self, alert: Alert) {
        log::warn!("[{}] {}", alert.source_action, alert.message);
        let mut alerts = self.lock();
        if alerts.len() >= self.capacity {
            if let Some(dropped) = alerts.pop_front() {
                log::warn!("Alert queue full, dropping oldest alert {}", dropped.id);
            }
        }
        alerts.push_back(alert);
    }

    /// Check if a deduplicated alert is already pending.
    pub fn exists(&self, source_action: &str, dedup: &str) -> bool {
        self.lock()
            .iter()
            .any(|a| a.source_action == source_action && a.dedup.as_deref() == Some(dedup))
    }

    /// Drop every pending alert raised by `source_action` (condition cleared).
    pub fn resolve(&self, source_action: &str) -> usize {
        let mut alerts = self.lock();
        let before = alerts.len();
        alerts.retain(|a| a.source_action != source_action);
        before - alerts.len()
    }

    /// Pending alerts, oldest first.
    pub fn pending(&self) -> Vec<Alert> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
