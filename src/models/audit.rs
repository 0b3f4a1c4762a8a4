use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::actor::ActorId;
use super::resource::{Level, ResourceRef};
use crate::auth::policy::Action;

/// One side of a collaborator-table change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum CollaboratorChange {
    Granted {
        target: ActorId,
        level: Level,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous: Option<Level>,
    },
    Revoked {
        target: ActorId,
        previous: Level,
    },
}

/// Detail payload of an audit entry, keyed by its action tag.
///
/// Serialises adjacently tagged, so an entry reads as
/// `{"type": "ownership_changed", "details": {"before": null, "after": "u1"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "snake_case")]
pub enum AuditDetails {
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fields: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra: Option<serde_json::Value>,
    },
    Delete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra: Option<serde_json::Value>,
    },
    ManageCollaborators(CollaboratorChange),
    OwnershipChanged {
        before: Option<ActorId>,
        after: ActorId,
        /// Explicit grant the new owner held; it is dropped by the transfer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        superseded_grant: Option<Level>,
    },
    CommentEdited {
        comment_id: String,
        before: String,
        after: String,
    },
}

impl AuditDetails {
    /// The `type` tag stored alongside the entry.
    pub fn tag(&self) -> &'static str {
        match self {
            AuditDetails::Update { .. } => "update",
            AuditDetails::Delete { .. } => "delete",
            AuditDetails::ManageCollaborators(_) => "manage_collaborators",
            AuditDetails::OwnershipChanged { .. } => "ownership_changed",
            AuditDetails::CommentEdited { .. } => "comment_edited",
        }
    }

    /// The policy action that must have been allowed for this entry to exist.
    pub fn governing_action(&self) -> Action {
        match self {
            AuditDetails::Update { .. } | AuditDetails::CommentEdited { .. } => Action::Update,
            AuditDetails::Delete { .. } => Action::Delete,
            AuditDetails::ManageCollaborators(_) => Action::ManageCollaborators,
            AuditDetails::OwnershipChanged { .. } => Action::AssignOwner,
        }
    }
}

/// Immutable record of an approved mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub resource: ResourceRef,
    pub user_id: ActorId,
    /// Display name at write time; later renames do not rewrite history.
    pub user_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub details: AuditDetails,
}

impl AuditEntry {
    pub fn action(&self) -> &'static str {
        self.details.tag()
    }
}

/// Audit entry before the store assigns its timestamp. The id is chosen by
/// the writer so a retried append lands at most once.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub id: String,
    pub resource: ResourceRef,
    pub user_id: ActorId,
    pub user_name: Option<String>,
    pub details: AuditDetails,
}

/// Pagination wrapper for audit listings, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntryPage {
    pub entries: Vec<AuditEntry>,
    pub page: i64,
    pub per_page: i64,
    pub total_count: i64,
    pub total_pages: i64,
}

impl AuditEntryPage {
    /// Highest page a listing will seek to; later pages are empty anyway.
    pub const MAX_PAGE: i64 = 1_000_000;

    /// Clamp caller-supplied paging the same way every listing does.
    pub fn clamp(page: i64, per_page: i64) -> (i64, i64) {
        (page.clamp(1, Self::MAX_PAGE), per_page.clamp(1, 100))
    }

    /// Rows to skip for an already clamped `(page, per_page)`.
    pub fn offset(page: i64, per_page: i64) -> i64 {
        (page - 1).saturating_mul(per_page)
    }

    pub fn total_pages(total_count: i64, per_page: i64) -> i64 {
        (total_count + per_page - 1) / per_page
    }
}
