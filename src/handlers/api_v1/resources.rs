use actix_web::{HttpResponse, web};

use super::types::{AssignOwnerRequest, GrantRequest, actor_id, audited_response, resource_ref};
use crate::auth::policy::Action;
use crate::errors::AccessError;
use crate::models::Actor;
use crate::service::{AppState, retry_on_conflict};
use crate::store::Store;

/// GET /api/v1/resources/{kind}/{id} - Ownership and grants, for readers.
pub async fn read<S: Store>(
    state: web::Data<AppState<S>>,
    actor: web::ReqData<Actor>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AccessError> {
    let (kind, id) = path.into_inner();
    let reference = resource_ref(&kind, &id)?;

    let resource = state.service.load_resource(&reference).await?;
    state.service.engine().require(&actor, &resource, Action::Read)?;
    Ok(HttpResponse::Ok().json(resource))
}

/// PUT /api/v1/resources/{kind}/{id}/owner - Assign or transfer ownership.
pub async fn assign_owner<S: Store>(
    state: web::Data<AppState<S>>,
    actor: web::ReqData<Actor>,
    path: web::Path<(String, String)>,
    body: web::Json<AssignOwnerRequest>,
) -> Result<HttpResponse, AccessError> {
    let (kind, id) = path.into_inner();
    let reference = resource_ref(&kind, &id)?;
    let new_owner = actor_id(body.owner_id.as_str())?;
    let actor = actor.into_inner();

    let service = &state.service;
    let (reference, new_owner, actor) = (&reference, &new_owner, &actor);
    let done = retry_on_conflict(state.config.conflict_retries, move || async move {
        let resource = service.load_resource(reference).await?;
        service.assign_owner(&resource, new_owner, actor).await
    })
    .await?;
    Ok(audited_response(done))
}

/// PUT /api/v1/resources/{kind}/{id}/collaborators/{actor_id} - Grant or change a level.
pub async fn grant<S: Store>(
    state: web::Data<AppState<S>>,
    actor: web::ReqData<Actor>,
    path: web::Path<(String, String, String)>,
    body: web::Json<GrantRequest>,
) -> Result<HttpResponse, AccessError> {
    let (kind, id, target) = path.into_inner();
    let reference = resource_ref(&kind, &id)?;
    let target = actor_id(&target)?;
    let level = body.level;
    let actor = actor.into_inner();

    let service = &state.service;
    let (reference, target, actor) = (&reference, &target, &actor);
    let done = retry_on_conflict(state.config.conflict_retries, move || async move {
        let resource = service.load_resource(reference).await?;
        service.grant(&resource, actor, target, level).await
    })
    .await?;
    Ok(audited_response(done))
}

/// DELETE /api/v1/resources/{kind}/{id}/collaborators/{actor_id} - Revoke a grant.
pub async fn revoke<S: Store>(
    state: web::Data<AppState<S>>,
    actor: web::ReqData<Actor>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, AccessError> {
    let (kind, id, target) = path.into_inner();
    let reference = resource_ref(&kind, &id)?;
    let target = actor_id(&target)?;
    let actor = actor.into_inner();

    let service = &state.service;
    let (reference, target, actor) = (&reference, &target, &actor);
    let done = retry_on_conflict(state.config.conflict_retries, move || async move {
        let resource = service.load_resource(reference).await?;
        service.revoke(&resource, actor, target).await
    })
    .await?;
    Ok(audited_response(done))
}
