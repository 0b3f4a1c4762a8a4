//! Collaborator grant table rules.
//!
//! Grants are a mapping: re-granting overwrites the previous level. Both
//! grant and revoke require `manage_collaborators` (owner, `admin` on the
//! resource, or superuser). The owner holds `admin` through ownership and
//! never through a row here, so the owner cannot be granted or revoked;
//! only an ownership transfer changes the owner's level.

use super::policy::{Action, PolicyEngine};
use crate::errors::{AccessError, Denial};
use crate::models::{Actor, ActorId, CollaboratorChange, Level, Resource};

/// Validate a grant. `None` means the target already holds exactly `level`.
pub fn plan_grant(
    engine: &PolicyEngine,
    resource: &Resource,
    acting: &Actor,
    target: &ActorId,
    level: Level,
) -> Result<Option<CollaboratorChange>, AccessError> {
    engine.require(acting, resource, Action::ManageCollaborators)?;

    if resource.is_owner(target) {
        return Err(AccessError::PermissionDenied(Denial::OwnerProtected { owner: target.clone() }));
    }

    let previous = resource.collaborators.get(target).copied();
    if previous == Some(level) {
        return Ok(None);
    }
    Ok(Some(CollaboratorChange::Granted {
        target: target.clone(),
        level,
        previous,
    }))
}

/// Validate a revoke. `None` means the target holds no grant.
pub fn plan_revoke(
    engine: &PolicyEngine,
    resource: &Resource,
    acting: &Actor,
    target: &ActorId,
) -> Result<Option<CollaboratorChange>, AccessError> {
    engine.require(acting, resource, Action::ManageCollaborators)?;

    if resource.is_owner(target) {
        return Err(AccessError::PermissionDenied(Denial::OwnerProtected { owner: target.clone() }));
    }

    Ok(resource
        .collaborators
        .get(target)
        .map(|&previous| CollaboratorChange::Revoked { target: target.clone(), previous }))
}
