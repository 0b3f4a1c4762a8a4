use stagegate::auth::policy::{Action, Decision, DenyReason, PolicyEngine};
use stagegate::auth::roles::RoleResolver;
use stagegate::models::{Actor, Level, Resource, ResourceKind, ResourceRef, Role};

mod common;
use common::*;

fn deny_insufficient(decision: Decision) -> bool {
    matches!(decision, Decision::Deny(DenyReason::InsufficientPermission { .. }))
}

fn resources() -> Vec<Resource> {
    vec![
        owned_show("tempest"),
        Resource::new(ResourceKind::Task, "hang-lights").owned_by(OWNER).assigned(EDITOR),
        Resource::new(ResourceKind::Container, "bin-7"),
        Resource::new(ResourceKind::Container, "bin-8").with_collaborator(VIEWER, Level::Admin),
    ]
}

#[test]
fn test_superusers_are_allowed_everything() {
    let engine = PolicyEngine::default();
    for superuser in [actor(GOD), actor(OPS)] {
        for resource in resources() {
            for action in Action::ALL {
                assert_eq!(
                    engine.decide(&superuser, &resource, action),
                    Decision::Allow,
                    "{} {action} on {}",
                    superuser.id,
                    resource.reference
                );
            }
        }
    }
}

#[test]
fn test_custom_admin_group() {
    let engine = PolicyEngine::new(RoleResolver::new("stage-managers"));
    let sm = Actor::new("sm", "Stage Manager", Role::Viewer).with_group("stage-managers");
    let resource = Resource::new(ResourceKind::Container, "bin-7");
    assert_eq!(engine.decide(&sm, &resource, Action::Delete), Decision::Allow);
    // The default group means nothing under a custom configuration.
    assert_eq!(
        engine.decide(&actor(OPS), &resource, Action::Read),
        Decision::Deny(DenyReason::ResourceDegraded)
    );
}

#[test]
fn test_degraded_resource_denies_everything_but_self_claim() {
    let engine = PolicyEngine::default();
    let degraded = Resource::new(ResourceKind::Container, "bin-8").with_collaborator(VIEWER, Level::Admin);
    for id in [OWNER, EDITOR, VIEWER, STRANGER] {
        for action in Action::ALL {
            let decision = engine.decide(&actor(id), &degraded, action);
            if id == VIEWER && action == Action::AssignOwner {
                assert_eq!(decision, Decision::Allow);
            } else {
                assert_eq!(decision, Decision::Deny(DenyReason::ResourceDegraded), "{id} {action}");
            }
        }
    }
}

#[test]
fn test_grant_level_boundary() {
    let engine = PolicyEngine::default();
    let base = Resource::new(ResourceKind::Show, "tempest").owned_by(OWNER);
    let cases = [
        (Level::Viewer, Action::Read, Action::Update),
        (Level::Editor, Action::Update, Action::Delete),
    ];
    for (level, exact, above) in cases {
        let r = base.clone().with_collaborator(STRANGER, level);
        assert_eq!(engine.decide(&actor(STRANGER), &r, exact), Decision::Allow);
        assert!(deny_insufficient(engine.decide(&actor(STRANGER), &r, above)));
    }
    let r = base.with_collaborator(STRANGER, Level::Admin);
    for action in Action::ALL {
        assert_eq!(engine.decide(&actor(STRANGER), &r, action), Decision::Allow);
    }
}

#[test]
fn test_global_role_is_a_floor() {
    let engine = PolicyEngine::default();
    // Editor role with only a viewer grant still edits.
    let r = owned_show("tempest").with_collaborator(EDITOR, Level::Viewer);
    assert_eq!(engine.effective_level(&actor(EDITOR), &r), Level::Editor);
    assert_eq!(engine.decide(&actor(EDITOR), &r, Action::Update), Decision::Allow);
    assert_eq!(
        engine.decide(&actor(EDITOR), &r, Action::Delete),
        Decision::Deny(DenyReason::InsufficientPermission { required: Level::Admin, actual: Level::Editor })
    );
}

#[test]
fn test_owner_holds_admin() {
    let engine = PolicyEngine::default();
    let r = owned_show("tempest");
    for action in Action::ALL {
        assert_eq!(engine.decide(&actor(OWNER), &r, action), Decision::Allow);
    }
}

#[test]
fn test_assignee_may_update_but_not_delete() {
    let engine = PolicyEngine::default();
    let u = actor(STRANGER);
    let task = Resource::new(ResourceKind::Task, "paint-flats").owned_by(OWNER).assigned(STRANGER);
    assert_eq!(engine.decide(&u, &task, Action::Update), Decision::Allow);
    assert!(deny_insufficient(engine.decide(&u, &task, Action::Delete)));
    assert!(deny_insufficient(engine.decide(&u, &task, Action::ManageCollaborators)));
}

#[test]
fn test_organizations_do_not_raise_level() {
    let engine = PolicyEngine::default();
    let member = Actor::new("org-member", "Org Member", Role::Viewer).with_organization("globe-theatre");
    let r = owned_show("tempest");
    assert!(deny_insufficient(engine.decide(&member, &r, Action::Update)));
}

#[tokio::test]
async fn test_decide_for_unknown_resource_is_not_found() {
    let env = setup();
    let err = env
        .service
        .decide_for(&actor(OWNER), &ResourceRef::new(ResourceKind::Show, "missing"), Action::Read)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn test_decide_fails_closed_when_store_offline() {
    let env = setup();
    let show = env.seed(owned_show("tempest")).await;
    env.store.set_offline(true);
    let decision = env.service.decide_for(&actor(OWNER), &show.reference, Action::Read).await.unwrap();
    assert_eq!(decision, Decision::Deny(DenyReason::Unavailable));
}

#[tokio::test]
async fn test_decide_fails_closed_on_timeout() {
    let env = setup();
    let show = env.seed(owned_show("tempest")).await;
    env.store.set_latency(Some(std::time::Duration::from_millis(200)));
    let decision = env.service.decide_for(&actor(OWNER), &show.reference, Action::Read).await.unwrap();
    assert_eq!(decision, Decision::Deny(DenyReason::Unavailable));
}
