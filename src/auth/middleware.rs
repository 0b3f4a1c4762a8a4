use actix_web::{
    Error, HttpMessage, HttpResponse, ResponseError, web,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
};

use super::validate;
use crate::errors::AccessError;
use crate::models::ActorId;
use crate::service::AppState;
use crate::store::Store;

/// Header carrying the already-authenticated actor id.
pub const ACTOR_HEADER: &str = "X-Actor-Id";

fn unauthorized(req: ServiceRequest, message: &str) -> ServiceResponse {
    let body = serde_json::json!({ "error": message, "code": "unauthenticated" });
    req.into_response(HttpResponse::Unauthorized().json(body))
}

/// Middleware function that resolves the calling actor.
/// Answers 401 when the header is missing or names no known actor, and
/// 503 when the identity store cannot be reached. On success the `Actor`
/// is available to handlers as `web::ReqData<Actor>`.
pub async fn resolve_actor<S: Store, B: MessageBody + 'static>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let raw = req
        .headers()
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim()
        .to_string();

    if let Some(msg) = validate::validate_identifier(&raw, ACTOR_HEADER) {
        return Ok(unauthorized(req, &msg).map_into_right_body());
    }

    let Some(state) = req.app_data::<web::Data<AppState<S>>>().cloned() else {
        log::error!("resolve_actor mounted without application state");
        let response = AccessError::Unavailable("application state".to_string()).error_response();
        return Ok(req.into_response(response).map_into_right_body());
    };

    let id = ActorId::new(raw);
    match state.service.load_actor(&id).await {
        Ok(actor) => {
            req.extensions_mut().insert(actor);
            next.call(req).await.map(|res| res.map_into_left_body())
        }
        Err(AccessError::NotFound(_)) => {
            log::debug!("Unknown actor {id}");
            Ok(unauthorized(req, "Unknown actor").map_into_right_body())
        }
        Err(e) => {
            let response = e.error_response();
            Ok(req.into_response(response).map_into_right_body())
        }
    }
}
