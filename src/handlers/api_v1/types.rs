//! Request and response bodies for the v1 JSON API.

use std::collections::HashMap;

use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditStatus, Audited};
use crate::auth::policy::{Action, Decision};
use crate::auth::validate;
use crate::errors::AccessError;
use crate::models::{ActorId, AuditEntryPage, Level, ResourceKind, ResourceRef};

#[derive(Serialize, Debug)]
pub struct PaginatedResponse<T: Serialize> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

#[derive(Deserialize, Debug)]
pub struct DecisionRequest {
    pub resource: ResourceRef,
    pub action: Action,
}

#[derive(Serialize, Debug)]
pub struct DecisionResponse {
    pub decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl From<Decision> for DecisionResponse {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Allow => DecisionResponse { decision: "allow", reason: None },
            Decision::Deny(reason) => DecisionResponse { decision: "deny", reason: Some(reason.code()) },
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct AssignOwnerRequest {
    pub owner_id: ActorId,
}

#[derive(Deserialize, Debug)]
pub struct GrantRequest {
    pub level: Level,
}

#[derive(Deserialize, Debug)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Deserialize, Debug)]
pub struct BackfillRequest {
    pub owner_id: ActorId,
    pub limit: Option<i64>,
}

/// A mutation's new state plus what happened to its audit entry.
#[derive(Serialize, Debug)]
pub struct MutationResponse<T: Serialize> {
    pub data: T,
    pub audit: AuditStatus,
}

/// 200 with the mutation result; a failed audit write adds a `Warning` header.
pub fn audited_response<T: Serialize>(audited: Audited<T>) -> HttpResponse {
    let mut response = HttpResponse::Ok();
    if let Some(warning) = audited.audit.warning_header() {
        response.insert_header(("Warning", warning));
    }
    response.json(MutationResponse { data: audited.value, audit: audited.audit })
}

/// Parse and validate the `{kind}/{id}` path segments.
pub fn resource_ref(kind: &str, id: &str) -> Result<ResourceRef, AccessError> {
    let kind: ResourceKind = kind.parse().map_err(AccessError::Invalid)?;
    if let Some(msg) = validate::validate_identifier(id, "Resource id") {
        return Err(AccessError::Invalid(msg));
    }
    Ok(ResourceRef::new(kind, id))
}

pub fn actor_id(id: &str) -> Result<ActorId, AccessError> {
    match validate::validate_identifier(id, "Actor id") {
        Some(msg) => Err(AccessError::Invalid(msg)),
        None => Ok(ActorId::new(id)),
    }
}

/// `page` (default 1, capped at [`AuditEntryPage::MAX_PAGE`]) and
/// `per_page` (default 25, at most 100).
pub fn page_params(query: &HashMap<String, String>) -> (i64, i64) {
    let page = query.get("page").and_then(|p| p.parse::<i64>().ok()).unwrap_or(1);
    let per_page = query.get("per_page").and_then(|p| p.parse::<i64>().ok()).unwrap_or(25);
    AuditEntryPage::clamp(page, per_page)
}
