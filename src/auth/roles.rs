//! Role hierarchy resolution.
//!
//! An actor's global capability is its primary role, except that membership
//! in the system-administration group is an independent superuser signal:
//! either a `god` role or that group alone is enough to resolve to `god`.
//! Organization memberships are carried on the actor but do not contribute
//! to the global level.

use crate::config::DEFAULT_ADMIN_GROUP;
use crate::models::{Actor, Level, Role};

#[derive(Debug, Clone)]
pub struct RoleResolver {
    system_admin_group: String,
}

impl Default for RoleResolver {
    fn default() -> Self {
        RoleResolver::new(DEFAULT_ADMIN_GROUP)
    }
}

impl RoleResolver {
    pub fn new(system_admin_group: impl Into<String>) -> Self {
        RoleResolver { system_admin_group: system_admin_group.into() }
    }

    pub fn system_admin_group(&self) -> &str {
        &self.system_admin_group
    }

    /// Global capability level of the actor.
    pub fn global_level(&self, actor: &Actor) -> Role {
        if actor.role == Role::God || actor.in_group(&self.system_admin_group) {
            Role::God
        } else {
            actor.role
        }
    }

    pub fn is_superuser(&self, actor: &Actor) -> bool {
        self.global_level(actor) == Role::God
    }

    /// The floor the global role contributes to every resource.
    /// `None` means superuser: resource checks are never consulted.
    pub fn resource_floor(&self, actor: &Actor) -> Option<Level> {
        self.global_level(actor).as_level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn god_role_resolves_to_god() {
        let r = RoleResolver::default();
        let a = Actor::new("u1", "Puck", Role::God);
        assert_eq!(r.global_level(&a), Role::God);
        assert_eq!(r.resource_floor(&a), None);
    }

    #[test]
    fn admin_group_is_a_superuser_signal() {
        let r = RoleResolver::new("crew-admins");
        let a = Actor::new("u1", "Puck", Role::Viewer).with_group("crew-admins");
        assert!(r.is_superuser(&a));
        let b = Actor::new("u2", "Oberon", Role::Admin).with_group("lighting");
        assert_eq!(r.global_level(&b), Role::Admin);
        assert_eq!(r.resource_floor(&b), Some(Level::Admin));
    }

    #[test]
    fn organizations_do_not_raise_the_level() {
        let r = RoleResolver::default();
        let a = Actor::new("u1", "Titania", Role::Editor).with_organization("system-admins");
        assert_eq!(r.global_level(&a), Role::Editor);
    }
}
