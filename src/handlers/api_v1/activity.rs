use std::collections::HashMap;

use actix_web::{HttpResponse, web};

use super::types::{PaginatedResponse, page_params, resource_ref};
use crate::errors::AccessError;
use crate::models::{Actor, AuditDetails};
use crate::service::AppState;
use crate::store::Store;

/// GET /api/v1/resources/{kind}/{id}/activity - Audit trail, newest first.
/// Query params: page (default 1), per_page (default 25).
pub async fn list<S: Store>(
    state: web::Data<AppState<S>>,
    actor: web::ReqData<Actor>,
    path: web::Path<(String, String)>,
    query: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse, AccessError> {
    let (kind, id) = path.into_inner();
    let reference = resource_ref(&kind, &id)?;
    let (page, per_page) = page_params(&query);

    let resource = state.service.load_resource(&reference).await?;
    let trail = state.service.activity(&actor, &resource, page, per_page).await?;
    Ok(HttpResponse::Ok().json(PaginatedResponse {
        items: trail.entries,
        page: trail.page,
        per_page: trail.per_page,
        total: trail.total_count,
    }))
}

/// POST /api/v1/resources/{kind}/{id}/activity - Record an update or delete
/// the application performed on the resource.
/// Body: {"type": "update" | "delete", "details": {...}}.
pub async fn record<S: Store>(
    state: web::Data<AppState<S>>,
    actor: web::ReqData<Actor>,
    path: web::Path<(String, String)>,
    body: web::Json<AuditDetails>,
) -> Result<HttpResponse, AccessError> {
    let (kind, id) = path.into_inner();
    let reference = resource_ref(&kind, &id)?;
    let details = body.into_inner();

    // Ownership, grant and comment entries come only from their own endpoints.
    if !matches!(details, AuditDetails::Update { .. } | AuditDetails::Delete { .. }) {
        return Err(AccessError::Invalid(format!(
            "Activity type '{}' cannot be recorded directly",
            details.tag()
        )));
    }

    let resource = state.service.load_resource(&reference).await?;
    let entry = state.service.record(&actor, &resource, details).await?;
    Ok(HttpResponse::Created().json(entry))
}
