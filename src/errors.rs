use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use std::fmt;

use crate::auth::policy::Action;
use crate::models::{ActorId, Level, ResourceRef};
use crate::store::StoreError;

/// Why a `PermissionDenied` was returned. Always safe to show to the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// The actor's effective level on the resource is below what the action needs.
    Insufficient { action: Action, required: Level, actual: Level },
    /// The owner's implicit `admin` is not a grant; only a transfer changes it.
    OwnerProtected { owner: ActorId },
    /// Operation restricted to god / system-administration actors.
    SuperuserOnly,
    /// On a degraded resource only the sole referencing actor may claim it, for themselves.
    SelfClaimOnly,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::Insufficient { action, required, actual } => write!(
                f,
                "'{action}' requires {required} but the effective level is {actual}"
            ),
            Denial::OwnerProtected { owner } => write!(
                f,
                "owner '{owner}' holds admin through ownership; transfer ownership to change it"
            ),
            Denial::SuperuserOnly => write!(f, "superuser privileges required"),
            Denial::SelfClaimOnly => write!(
                f,
                "an unowned resource can only be claimed by its sole referencing actor for themselves"
            ),
        }
    }
}

#[derive(Debug)]
pub enum AccessError {
    PermissionDenied(Denial),
    ResourceDegraded(ResourceRef),
    Conflict(ResourceRef),
    Unavailable(String),
    AuditWriteFailed(String),
    NotFound(String),
    Invalid(String),
}

impl AccessError {
    /// Stable machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::PermissionDenied(_) => "permission_denied",
            AccessError::ResourceDegraded(_) => "resource_degraded",
            AccessError::Conflict(_) => "conflict",
            AccessError::Unavailable(_) => "unavailable",
            AccessError::AuditWriteFailed(_) => "audit_write_failed",
            AccessError::NotFound(_) => "not_found",
            AccessError::Invalid(_) => "invalid",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AccessError::Conflict(_))
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::PermissionDenied(d) => write!(f, "Permission denied: {d}"),
            AccessError::ResourceDegraded(r) => {
                write!(f, "Resource {r} has no owner; only ownership assignment is permitted")
            }
            AccessError::Conflict(r) => {
                write!(f, "Resource {r} was modified concurrently; re-read and retry")
            }
            AccessError::Unavailable(e) => write!(f, "Dependency unavailable: {e}"),
            AccessError::AuditWriteFailed(e) => write!(f, "Audit write failed: {e}"),
            AccessError::NotFound(what) => write!(f, "Not found: {what}"),
            AccessError::Invalid(e) => write!(f, "Invalid request: {e}"),
        }
    }
}

impl std::error::Error for AccessError {}

impl From<StoreError> for AccessError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(r) => AccessError::Conflict(r),
            StoreError::NotFound(what) => AccessError::NotFound(what),
            StoreError::Timeout(_) | StoreError::Backend(_) => AccessError::Unavailable(e.to_string()),
        }
    }
}

impl ResponseError for AccessError {
    fn status_code(&self) -> StatusCode {
        match self {
            AccessError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AccessError::ResourceDegraded(_) => StatusCode::LOCKED,
            AccessError::Conflict(_) => StatusCode::CONFLICT,
            AccessError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AccessError::AuditWriteFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AccessError::NotFound(_) => StatusCode::NOT_FOUND,
            AccessError::Invalid(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Denials are expected outcomes, not system errors.
        match self {
            AccessError::PermissionDenied(_)
            | AccessError::ResourceDegraded(_)
            | AccessError::NotFound(_)
            | AccessError::Invalid(_) => log::debug!("{self}"),
            AccessError::Conflict(_) => log::info!("{self}"),
            AccessError::AuditWriteFailed(_) => log::warn!("{self}"),
            AccessError::Unavailable(_) => log::error!("{self}"),
        }
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        }))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Malformed { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "Missing required setting {key}"),
            ConfigError::Malformed { key, value } => {
                write!(f, "Setting {key} has malformed value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
