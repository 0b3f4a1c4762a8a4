//! Ownership registry rules.
//!
//! A resolved owner can only be replaced by an actor holding `admin` on the
//! resource (the owner included) or by a superuser. An unowned resource can
//! additionally be claimed by the one actor it references, for themselves.
//! A new owner's explicit grant is dropped with the transfer, so the next
//! transfer leaves them with nothing the table still remembers.

use super::policy::{Action, Decision, DenyReason, PolicyEngine};
use crate::errors::{AccessError, Denial};
use crate::models::{Actor, ActorId, Level, Resource};

/// Before/after owners of an approved assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerChange {
    pub before: Option<ActorId>,
    pub after: ActorId,
    pub superseded_grant: Option<Level>,
}

pub fn resolve_owner(resource: &Resource) -> Option<&ActorId> {
    resource.owner_id.as_ref()
}

/// True when `actor` is the only actor the resource row references.
pub fn is_sole_referencer(resource: &Resource, actor: &ActorId) -> bool {
    let referencing = resource.referencing_actors();
    referencing.len() == 1 && referencing.contains(actor)
}

/// Validate `assign_owner`. Returns `None` when `new_owner` already owns the
/// resource (nothing to write, nothing to audit).
pub fn plan_assignment(
    engine: &PolicyEngine,
    resource: &Resource,
    new_owner: &ActorId,
    acting: &Actor,
) -> Result<Option<OwnerChange>, AccessError> {
    match engine.decide(acting, resource, Action::AssignOwner) {
        Decision::Allow => {}
        Decision::Deny(DenyReason::ResourceDegraded) => {
            return Err(AccessError::PermissionDenied(Denial::SelfClaimOnly));
        }
        Decision::Deny(DenyReason::InsufficientPermission { required, actual }) => {
            return Err(AccessError::PermissionDenied(Denial::Insufficient {
                action: Action::AssignOwner,
                required,
                actual,
            }));
        }
        Decision::Deny(DenyReason::Unavailable) => {
            return Err(AccessError::Unavailable("ownership check".to_string()));
        }
    }

    // The self-claim path only ever assigns the claimant.
    if resource.is_degraded() && !engine.resolver().is_superuser(acting) && new_owner != &acting.id {
        return Err(AccessError::PermissionDenied(Denial::SelfClaimOnly));
    }

    if resolve_owner(resource) == Some(new_owner) {
        return Ok(None);
    }

    Ok(Some(OwnerChange {
        before: resource.owner_id.clone(),
        after: new_owner.clone(),
        superseded_grant: resource.collaborators.get(new_owner).copied(),
    }))
}
