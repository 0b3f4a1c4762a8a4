use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::resource::Level;

/// Opaque actor identifier as issued by the identity store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        ActorId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        ActorId(s.to_string())
    }
}

/// Global role, ordered `viewer < editor < admin < god`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Viewer,
    Editor,
    Admin,
    God,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Admin => "admin",
            Role::God => "god",
        }
    }

    /// Parse a stored role column. Missing or unrecognised values fall back to `viewer`.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("god") => Role::God,
            Some("admin") => Role::Admin,
            Some("editor") => Role::Editor,
            _ => Role::Viewer,
        }
    }

    /// The resource-level floor this global role contributes. `None` for `god`,
    /// which never goes through resource-level evaluation.
    pub fn as_level(self) -> Option<Level> {
        match self {
            Role::Viewer => Some(Level::Viewer),
            Role::Editor => Some(Level::Editor),
            Role::Admin => Some(Level::Admin),
            Role::God => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated identity, resolved from the identity store's cached profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: ActorId,
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub groups: BTreeSet<String>,
    #[serde(default)]
    pub organizations: BTreeSet<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Actor {
            id: ActorId::new(id),
            display_name: display_name.into(),
            role,
            groups: BTreeSet::new(),
            organizations: BTreeSet::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organizations.insert(org.into());
        self
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Compact initials for avatar rendering: first letter of up to two words.
    pub fn initials(&self) -> Option<String> {
        let initials: String = self
            .display_name
            .split_whitespace()
            .filter_map(|word| word.chars().find(|c| c.is_alphabetic()))
            .take(2)
            .flat_map(char::to_uppercase)
            .collect();
        if initials.is_empty() { None } else { Some(initials) }
    }
}
