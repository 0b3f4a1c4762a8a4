use actix_web::{HttpResponse, web};

use super::types::{CommentRequest, audited_response, resource_ref};
use crate::errors::AccessError;
use crate::models::Actor;
use crate::service::AppState;
use crate::store::Store;

/// GET /api/v1/resources/{kind}/{id}/comments - The thread, oldest first.
pub async fn list<S: Store>(
    state: web::Data<AppState<S>>,
    actor: web::ReqData<Actor>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AccessError> {
    let (kind, id) = path.into_inner();
    let reference = resource_ref(&kind, &id)?;

    let resource = state.service.load_resource(&reference).await?;
    let thread = state.service.comments().list(&actor, &resource).await?;
    Ok(HttpResponse::Ok().json(thread))
}

/// POST /api/v1/resources/{kind}/{id}/comments - Append a comment.
pub async fn create<S: Store>(
    state: web::Data<AppState<S>>,
    actor: web::ReqData<Actor>,
    path: web::Path<(String, String)>,
    body: web::Json<CommentRequest>,
) -> Result<HttpResponse, AccessError> {
    let (kind, id) = path.into_inner();
    let reference = resource_ref(&kind, &id)?;

    let resource = state.service.load_resource(&reference).await?;
    let comment = state.service.comments().append(&actor, &resource, &body.text).await?;
    Ok(HttpResponse::Created().json(comment))
}

/// PUT /api/v1/resources/{kind}/{id}/comments/{comment_id} - Edit a comment body.
pub async fn update<S: Store>(
    state: web::Data<AppState<S>>,
    actor: web::ReqData<Actor>,
    path: web::Path<(String, String, String)>,
    body: web::Json<CommentRequest>,
) -> Result<HttpResponse, AccessError> {
    let (kind, id, comment_id) = path.into_inner();
    let reference = resource_ref(&kind, &id)?;

    let resource = state.service.load_resource(&reference).await?;
    let edited = state
        .service
        .comments()
        .edit(&actor, &resource, &comment_id, &body.text)
        .await?;
    Ok(audited_response(edited))
}
