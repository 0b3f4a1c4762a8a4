use actix_web::{HttpResponse, web};

use super::types::{BackfillRequest, actor_id};
use crate::errors::{AccessError, Denial};
use crate::models::Actor;
use crate::service::AppState;
use crate::store::Store;

const DEFAULT_BACKFILL_LIMIT: i64 = 100;
const MAX_BACKFILL_LIMIT: i64 = 1000;

fn require_superuser<S: Store>(state: &AppState<S>, actor: &Actor) -> Result<(), AccessError> {
    if state.service.engine().resolver().is_superuser(actor) {
        Ok(())
    } else {
        Err(AccessError::PermissionDenied(Denial::SuperuserOnly))
    }
}

/// GET /api/v1/alerts - Pending operator alerts, oldest first.
pub async fn alerts<S: Store>(
    state: web::Data<AppState<S>>,
    actor: web::ReqData<Actor>,
) -> Result<HttpResponse, AccessError> {
    require_superuser(&state, &actor)?;
    Ok(HttpResponse::Ok().json(state.service.alerts().pending()))
}

/// POST /api/v1/admin/backfill-owners - Assign an owner to degraded resources.
/// Body: {owner_id, limit?}.
pub async fn backfill_owners<S: Store>(
    state: web::Data<AppState<S>>,
    actor: web::ReqData<Actor>,
    body: web::Json<BackfillRequest>,
) -> Result<HttpResponse, AccessError> {
    require_superuser(&state, &actor)?;
    let owner = actor_id(body.owner_id.as_str())?;
    let limit = body.limit.unwrap_or(DEFAULT_BACKFILL_LIMIT).clamp(1, MAX_BACKFILL_LIMIT);

    let report = state.service.backfill_owners(&actor, &owner, limit).await?;
    Ok(HttpResponse::Ok().json(report))
}
