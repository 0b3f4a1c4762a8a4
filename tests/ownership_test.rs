use stagegate::audit::AuditStatus;
use stagegate::errors::{AccessError, Denial};
use stagegate::models::{ActorId, AuditDetails, Level, Resource, ResourceKind};

mod common;
use common::*;

#[tokio::test]
async fn test_sole_referencer_self_claim() {
    let env = setup();
    let x = actor(STRANGER);
    let bin = env
        .seed(Resource::new(ResourceKind::Container, "bin-3").with_collaborator(STRANGER, Level::Viewer))
        .await;

    let done = env.service.assign_owner(&bin, &x.id, &x).await.expect("self-claim");
    assert_eq!(done.value.owner_id, Some(x.id.clone()));
    assert_eq!(done.value.version, bin.version + 1);

    let entries = env.store.audit_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action(), "ownership_changed");
    assert_eq!(entries[0].resource, bin.reference);
    assert_eq!(
        entries[0].details,
        AuditDetails::OwnershipChanged {
            before: None,
            after: x.id.clone(),
            superseded_grant: Some(Level::Viewer),
        }
    );
    assert_eq!(done.audit, AuditStatus::Recorded { entry: entries[0].clone() });
}

#[tokio::test]
async fn test_self_claim_for_someone_else_is_denied() {
    let env = setup();
    let x = actor(STRANGER);
    let task = env
        .seed(Resource::new(ResourceKind::Task, "strike-set").assigned(STRANGER))
        .await;

    let err = env
        .service
        .assign_owner(&task, &ActorId::new(VIEWER), &x)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::PermissionDenied(Denial::SelfClaimOnly)));
    assert!(env.store.audit_entries().is_empty());
}

#[tokio::test]
async fn test_shared_degraded_resource_cannot_be_self_claimed() {
    let env = setup();
    let bin = env
        .seed(
            Resource::new(ResourceKind::Container, "bin-4")
                .with_collaborator(STRANGER, Level::Admin)
                .with_collaborator(VIEWER, Level::Viewer),
        )
        .await;
    let err = env
        .service
        .assign_owner(&bin, &ActorId::new(STRANGER), &actor(STRANGER))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::PermissionDenied(Denial::SelfClaimOnly)));
}

#[tokio::test]
async fn test_transfer_by_non_admin_is_denied() {
    let env = setup();
    let show = env.seed(owned_show("tempest")).await;
    for id in [VIEWER, EDITOR, STRANGER] {
        let err = env
            .service
            .assign_owner(&show, &ActorId::new(id), &actor(id))
            .await
            .unwrap_err();
        assert!(
            matches!(err, AccessError::PermissionDenied(Denial::Insufficient { .. })),
            "{id}: {err}"
        );
    }
    let stored = env.service.load_resource(&show.reference).await.unwrap();
    assert_eq!(stored.owner_id, Some(ActorId::new(OWNER)));
    assert!(env.store.audit_entries().is_empty());
}

#[tokio::test]
async fn test_owner_and_god_can_transfer() {
    let env = setup();
    let show = env.seed(owned_show("tempest")).await;

    let done = env
        .service
        .assign_owner(&show, &ActorId::new(EDITOR), &actor(OWNER))
        .await
        .unwrap();
    assert_eq!(done.value.owner_id, Some(ActorId::new(EDITOR)));

    let done = env
        .service
        .assign_owner(&done.value, &ActorId::new(VIEWER), &actor(GOD))
        .await
        .unwrap();
    assert_eq!(done.value.owner_id, Some(ActorId::new(VIEWER)));

    let entries = env.store.audit_entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[1].details,
        AuditDetails::OwnershipChanged {
            before: Some(ActorId::new(EDITOR)),
            after: ActorId::new(VIEWER),
            superseded_grant: Some(Level::Viewer),
        }
    );
    assert_eq!(entries[1].user_id, ActorId::new(GOD));
}

#[tokio::test]
async fn test_reassigning_same_owner_is_noop() {
    let env = setup();
    let show = env.seed(owned_show("tempest")).await;
    let done = env
        .service
        .assign_owner(&show, &ActorId::new(OWNER), &actor(OWNER))
        .await
        .unwrap();
    assert_eq!(done.audit, AuditStatus::Unchanged);
    assert_eq!(done.value.version, show.version);
    assert!(env.store.audit_entries().is_empty());
}

#[tokio::test]
async fn test_backfill_assigns_degraded_resources() {
    let env = setup();
    env.seed(Resource::new(ResourceKind::Container, "bin-1")).await;
    env.seed(Resource::new(ResourceKind::Container, "bin-2").with_collaborator(VIEWER, Level::Editor))
        .await;
    env.seed(owned_show("tempest")).await;

    let report = env
        .service
        .backfill_owners(&actor(OPS), &ActorId::new(OWNER), 10)
        .await
        .unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.assigned, 2);
    assert_eq!(report.conflicts + report.errors + report.audit_failures, 0);

    let entries = env.store.audit_entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.action() == "ownership_changed"));
}

#[tokio::test]
async fn test_backfill_requires_superuser() {
    let env = setup();
    let err = env
        .service
        .backfill_owners(&actor(OWNER), &ActorId::new(OWNER), 10)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::PermissionDenied(Denial::SuperuserOnly)));
}

#[tokio::test]
async fn test_backfill_rejects_unknown_owner() {
    let env = setup();
    let err = env
        .service
        .backfill_owners(&actor(GOD), &ActorId::new("nobody"), 10)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
}
