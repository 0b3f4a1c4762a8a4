//! HTTP tests for the `/api/v1` surface, backed by the in-memory store.

use actix_web::{App, http::StatusCode, test, web};
use serde_json::{Value, json};

use stagegate::config::AppConfig;
use stagegate::handlers::api_v1;
use stagegate::models::{Level, Resource, ResourceKind};
use stagegate::service::AppState;
use stagegate::store::MemoryStore;

mod common;
use common::*;

fn state(env: &TestEnv) -> web::Data<AppState<MemoryStore>> {
    web::Data::new(AppState {
        service: env.service.clone(),
        config: AppConfig::default(),
    })
}

macro_rules! app {
    ($env:expr) => {
        test::init_service(
            App::new()
                .app_data(state(&$env))
                .service(web::scope("/api/v1").configure(api_v1::configure::<MemoryStore>)),
        )
        .await
    };
}

#[actix_rt::test]
async fn test_missing_or_unknown_actor_is_unauthorized() {
    let env = setup();
    let app = app!(env);

    let req = test::TestRequest::get().uri("/api/v1/alerts").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/v1/alerts")
        .insert_header(("X-Actor-Id", "nobody"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_decision_endpoint() {
    let env = setup();
    env.seed(owned_show("tempest")).await;
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/v1/decisions")
        .insert_header(("X-Actor-Id", VIEWER))
        .set_json(json!({ "resource": { "kind": "show", "id": "tempest" }, "action": "read" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({ "decision": "allow" }));

    let req = test::TestRequest::post()
        .uri("/api/v1/decisions")
        .insert_header(("X-Actor-Id", VIEWER))
        .set_json(json!({ "resource": { "kind": "show", "id": "tempest" }, "action": "delete" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({ "decision": "deny", "reason": "insufficient_permission" }));
}

#[actix_rt::test]
async fn test_mutations_require_json() {
    let env = setup();
    env.seed(owned_show("tempest")).await;
    let app = app!(env);

    let req = test::TestRequest::put()
        .uri("/api/v1/resources/show/tempest/collaborators/trinculo")
        .insert_header(("X-Actor-Id", OWNER))
        .insert_header(("Content-Type", "application/x-www-form-urlencoded"))
        .set_payload("level=editor")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "invalid");

    let req = test::TestRequest::post()
        .uri("/api/v1/resources/show/tempest/comments")
        .insert_header(("X-Actor-Id", OWNER))
        .insert_header(("Content-Type", "application/merge-patch+json"))
        .set_payload(r#"{"text":"Cue 14 moves to the interval"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(env.store.audit_entries().is_empty());
}

#[actix_rt::test]
async fn test_grant_and_revoke_over_http() {
    let env = setup();
    env.seed(owned_show("tempest")).await;
    let app = app!(env);

    let req = test::TestRequest::put()
        .uri("/api/v1/resources/show/tempest/collaborators/trinculo")
        .insert_header(("X-Actor-Id", OWNER))
        .set_json(json!({ "level": "editor" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["collaborators"]["trinculo"], "editor");
    assert_eq!(body["audit"]["status"], "recorded");
    assert_eq!(body["audit"]["entry"]["type"], "manage_collaborators");

    let req = test::TestRequest::delete()
        .uri("/api/v1/resources/show/tempest/collaborators/trinculo")
        .insert_header(("X-Actor-Id", OWNER))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["data"]["collaborators"].get("trinculo").is_none());

    let req = test::TestRequest::put()
        .uri("/api/v1/resources/show/tempest/collaborators/trinculo")
        .insert_header(("X-Actor-Id", VIEWER))
        .set_json(json!({ "level": "admin" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(env.store.audit_entries().len(), 2);
}

#[actix_rt::test]
async fn test_degraded_resource_is_locked() {
    let env = setup();
    env.seed(Resource::new(ResourceKind::Container, "bin-5").with_collaborator(STRANGER, Level::Viewer))
        .await;
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/v1/resources/container/bin-5/comments")
        .insert_header(("X-Actor-Id", STRANGER))
        .set_json(json!({ "text": "Whose bin is this?" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::LOCKED);

    let req = test::TestRequest::put()
        .uri("/api/v1/resources/container/bin-5/owner")
        .insert_header(("X-Actor-Id", STRANGER))
        .set_json(json!({ "owner_id": STRANGER }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["ownerId"], STRANGER);
    assert_eq!(body["audit"]["entry"]["type"], "ownership_changed");
}

#[actix_rt::test]
async fn test_comments_and_activity_over_http() {
    let env = setup();
    env.seed(owned_show("tempest")).await;
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/v1/resources/show/tempest/comments")
        .insert_header(("X-Actor-Id", VIEWER))
        .set_json(json!({ "text": "Flying rig inspected" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let comment: Value = test::read_body_json(resp).await;
    assert_eq!(comment["userId"], VIEWER);

    let req = test::TestRequest::post()
        .uri("/api/v1/resources/show/tempest/activity")
        .insert_header(("X-Actor-Id", OWNER))
        .set_json(json!({ "type": "update", "details": { "summary": "Dates moved", "fields": ["opening"] } }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = test::TestRequest::post()
        .uri("/api/v1/resources/show/tempest/activity")
        .insert_header(("X-Actor-Id", OWNER))
        .set_json(json!({ "type": "ownership_changed", "details": { "before": null, "after": OWNER } }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri("/api/v1/resources/show/tempest/activity?page=1&per_page=10")
        .insert_header(("X-Actor-Id", VIEWER))
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["type"], "update");
    assert_eq!(page["items"][0]["userName"], "Miranda Lane");
}

#[actix_rt::test]
async fn test_alerts_and_backfill_are_superuser_only() {
    let env = setup();
    env.seed(Resource::new(ResourceKind::Container, "bin-6")).await;
    let app = app!(env);

    let req = test::TestRequest::get()
        .uri("/api/v1/alerts")
        .insert_header(("X-Actor-Id", OWNER))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/backfill-owners")
        .insert_header(("X-Actor-Id", OPS))
        .set_json(json!({ "owner_id": OWNER }))
        .to_request();
    let report: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report["assigned"], 1);

    let req = test::TestRequest::get()
        .uri("/api/v1/alerts")
        .insert_header(("X-Actor-Id", GOD))
        .to_request();
    let alerts: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(alerts, json!([]));
}

#[actix_rt::test]
async fn test_audit_failure_sets_warning_header() {
    let env = setup();
    env.seed(owned_show("tempest")).await;
    env.store.set_fail_audit_writes(true);
    let app = app!(env);

    let req = test::TestRequest::put()
        .uri("/api/v1/resources/show/tempest/collaborators/trinculo")
        .insert_header(("X-Actor-Id", OWNER))
        .set_json(json!({ "level": "viewer" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("Warning"));
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["audit"]["status"], "write_failed");
    assert_eq!(env.alerts.len(), 1);
}
