pub mod activity;
pub mod admin;
pub mod comments;
pub mod decisions;
pub mod resources;
pub mod types;

use actix_web::{
    Error, HttpMessage, ResponseError, web,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    http::Method,
    middleware::{Next, from_fn},
};

use crate::auth::middleware::resolve_actor;
use crate::errors::AccessError;
use crate::store::Store;

/// Mutating routes take their arguments as a JSON body; the caller is named
/// by `X-Actor-Id`, never by the body. POST and PUT must declare a JSON
/// media type (`application/json` or a `+json` suffix) and otherwise get
/// the API's usual `invalid` error. DELETE is exempt: revoking a grant
/// carries everything it needs in the path.
pub async fn require_json_body(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    if [Method::POST, Method::PUT].contains(req.method()) && !is_json(req.content_type()) {
        let err = AccessError::Invalid(format!("{} {} needs a JSON body", req.method(), req.path()));
        let response = err.error_response();
        return Ok(req.into_response(response).map_into_right_body());
    }
    next.call(req).await.map(|res| res.map_into_left_body())
}

fn is_json(content_type: &str) -> bool {
    content_type == "application/json" || content_type.ends_with("+json")
}

/// Configure API v1 routes for a store backend. Mount under `/api/v1`.
pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            .wrap(from_fn(resolve_actor::<S, _>))
            .wrap(from_fn(require_json_body))
            .route("/decisions", web::post().to(decisions::decide::<S>))
            .route("/alerts", web::get().to(admin::alerts::<S>))
            .route("/admin/backfill-owners", web::post().to(admin::backfill_owners::<S>))
            .service(
                web::scope("/resources/{kind}/{id}")
                    .route("", web::get().to(resources::read::<S>))
                    .route("/owner", web::put().to(resources::assign_owner::<S>))
                    .route("/collaborators/{actor_id}", web::put().to(resources::grant::<S>))
                    .route("/collaborators/{actor_id}", web::delete().to(resources::revoke::<S>))
                    .route("/comments", web::get().to(comments::list::<S>))
                    .route("/comments", web::post().to(comments::create::<S>))
                    .route("/comments/{comment_id}", web::put().to(comments::update::<S>))
                    .route("/activity", web::get().to(activity::list::<S>))
                    .route("/activity", web::post().to(activity::record::<S>)),
            ),
    );
}
