use actix_web::{HttpResponse, web};

use super::types::{DecisionRequest, DecisionResponse, resource_ref};
use crate::errors::AccessError;
use crate::models::Actor;
use crate::service::AppState;
use crate::store::Store;

/// POST /api/v1/decisions - Ask whether the caller may perform an action.
/// Body: {resource: {kind, id}, action}. A deny is a normal 200 answer.
pub async fn decide<S: Store>(
    state: web::Data<AppState<S>>,
    actor: web::ReqData<Actor>,
    body: web::Json<DecisionRequest>,
) -> Result<HttpResponse, AccessError> {
    let request = body.into_inner();
    let reference = resource_ref(request.resource.kind.as_str(), &request.resource.id)?;

    let decision = state.service.decide_for(&actor, &reference, request.action).await?;
    if !decision.is_allow() {
        log::debug!("{} denied {} on {reference}: {decision:?}", actor.id, request.action);
    }
    Ok(HttpResponse::Ok().json(DecisionResponse::from(decision)))
}
