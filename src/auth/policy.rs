//! Policy decision engine.
//!
//! `decide` is a pure function of the actor, the resource row (owner,
//! assignee, collaborator grants) and the role resolver's configuration.
//! Evaluation order:
//!
//! 1. superusers (god role or system-admin group) are always allowed;
//! 2. a degraded (unowned) resource only admits `assign_owner`, and only by
//!    the sole actor referencing it;
//! 3. effective level = max(explicit grant, `admin` for the owner, global floor);
//! 4. allowed iff effective level >= the action's required level;
//! 5. a task's assignee may additionally `update` that task.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ownership;
use super::roles::RoleResolver;
use crate::errors::{AccessError, Denial};
use crate::models::{Actor, Level, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Update,
    Delete,
    ManageCollaborators,
    AssignOwner,
    Comment,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::ManageCollaborators,
        Action::AssignOwner,
        Action::Comment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::ManageCollaborators => "manage_collaborators",
            Action::AssignOwner => "assign_owner",
            Action::Comment => "comment",
        }
    }

    pub fn required_level(self) -> Level {
        match self {
            Action::Read | Action::Comment => Level::Viewer,
            Action::Update => Level::Editor,
            Action::Delete | Action::ManageCollaborators | Action::AssignOwner => Level::Admin,
        }
    }

    /// Mutating actions are the ones that produce audit entries.
    pub fn is_mutating(self) -> bool {
        !matches!(self, Action::Read | Action::Comment)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("Unknown action '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    ResourceDegraded,
    InsufficientPermission { required: Level, actual: Level },
    /// A dependency did not answer in time; decisions fail closed.
    Unavailable,
}

impl DenyReason {
    pub fn code(self) -> &'static str {
        match self {
            DenyReason::ResourceDegraded => "resource_degraded",
            DenyReason::InsufficientPermission { .. } => "insufficient_permission",
            DenyReason::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allow(self) -> bool {
        self == Decision::Allow
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    resolver: RoleResolver,
}

impl PolicyEngine {
    pub fn new(resolver: RoleResolver) -> Self {
        PolicyEngine { resolver }
    }

    pub fn resolver(&self) -> &RoleResolver {
        &self.resolver
    }

    pub fn decide(&self, actor: &Actor, resource: &Resource, action: Action) -> Decision {
        if self.resolver.is_superuser(actor) {
            return Decision::Allow;
        }

        if resource.is_degraded() {
            return if action == Action::AssignOwner && ownership::is_sole_referencer(resource, &actor.id) {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::ResourceDegraded)
            };
        }

        let required = action.required_level();
        let actual = self.effective_level(actor, resource);
        if actual >= required {
            return Decision::Allow;
        }

        // Assignment grants editor-equivalent on update only, never delete or manage.
        if action == Action::Update && is_assignee(actor, resource) {
            return Decision::Allow;
        }

        Decision::Deny(DenyReason::InsufficientPermission { required, actual })
    }

    /// Highest applicable level: explicit grant, implicit `admin` for the owner,
    /// and the global role floor. Grants can raise but never lower the floor.
    pub fn effective_level(&self, actor: &Actor, resource: &Resource) -> Level {
        let Some(floor) = self.resolver.resource_floor(actor) else {
            return Level::Admin;
        };
        let owner = resource.is_owner(&actor.id).then_some(Level::Admin);
        let grant = resource.collaborators.get(&actor.id).copied();
        [Some(floor), owner, grant].into_iter().flatten().max().unwrap_or(floor)
    }

    /// `decide`, turned into the error taxonomy.
    pub fn require(&self, actor: &Actor, resource: &Resource, action: Action) -> Result<(), AccessError> {
        match self.decide(actor, resource, action) {
            Decision::Allow => {
                log::debug!("allow {} {action} on {}", actor.id, resource.reference);
                Ok(())
            }
            Decision::Deny(reason) => {
                log::debug!("deny {} {action} on {}: {}", actor.id, resource.reference, reason.code());
                Err(deny_to_error(reason, action, resource))
            }
        }
    }
}

fn is_assignee(actor: &Actor, resource: &Resource) -> bool {
    match resource.task_assignee() {
        Some(assignee) => assignee == &actor.id && !resource.is_owner(assignee),
        None => false,
    }
}

fn deny_to_error(reason: DenyReason, action: Action, resource: &Resource) -> AccessError {
    match reason {
        DenyReason::ResourceDegraded => AccessError::ResourceDegraded(resource.reference.clone()),
        DenyReason::InsufficientPermission { required, actual } => {
            AccessError::PermissionDenied(Denial::Insufficient { action, required, actual })
        }
        DenyReason::Unavailable => {
            AccessError::Unavailable(format!("could not evaluate {action} on {}", resource.reference))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceKind, Role};

    #[test]
    fn actions_parse_from_wire_names() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>(), Ok(action));
        }
        assert!("archive".parse::<Action>().is_err());
    }

    #[test]
    fn required_levels() {
        assert_eq!(Action::Read.required_level(), Level::Viewer);
        assert_eq!(Action::Comment.required_level(), Level::Viewer);
        assert_eq!(Action::Update.required_level(), Level::Editor);
        assert_eq!(Action::Delete.required_level(), Level::Admin);
        assert!(!Action::Comment.is_mutating());
        assert!(Action::AssignOwner.is_mutating());
    }

    #[test]
    fn effective_level_takes_the_maximum() {
        let engine = PolicyEngine::default();
        let editor = Actor::new("u1", "Miranda", Role::Editor);
        let show = Resource::new(ResourceKind::Show, "s1")
            .owned_by("o1")
            .with_collaborator("u1", Level::Viewer);
        // A lower grant never drags the global floor down.
        assert_eq!(engine.effective_level(&editor, &show), Level::Editor);

        let raised = show.clone().with_collaborator("u1", Level::Admin);
        assert_eq!(engine.effective_level(&editor, &raised), Level::Admin);

        let owner = Actor::new("o1", "Prospero", Role::Viewer);
        assert_eq!(engine.effective_level(&owner, &show), Level::Admin);
    }

    #[test]
    fn assignee_who_owns_gets_no_extra_rule() {
        let engine = PolicyEngine::default();
        let viewer = Actor::new("u1", "Caliban", Role::Viewer);
        let task = Resource::new(ResourceKind::Task, "t1").owned_by("u1").assigned("u1");
        assert!(!is_assignee(&viewer, &task));
        // Still allowed, via ownership.
        assert!(engine.decide(&viewer, &task, Action::Update).is_allow());
    }
}
