use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::actor::ActorId;

/// The governed entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Show,
    Task,
    Container,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Show => "show",
            ResourceKind::Task => "task",
            ResourceKind::Container => "container",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "show" => Ok(ResourceKind::Show),
            "task" => Ok(ResourceKind::Task),
            "container" => Ok(ResourceKind::Container),
            other => Err(format!("Unknown resource kind '{other}'")),
        }
    }
}

/// Per-resource collaborator level, ordered `viewer < editor < admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Viewer,
    Editor,
    Admin,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Viewer => "viewer",
            Level::Editor => "editor",
            Level::Admin => "admin",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Level::Viewer),
            "editor" => Ok(Level::Editor),
            "admin" => Ok(Level::Admin),
            other => Err(format!("Unknown collaborator level '{other}'")),
        }
    }
}

/// Stable reference to a governed resource: `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        ResourceRef { kind, id: id.into() }
    }

    /// Single string key, used for per-resource locking.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Access-relevant view of a Show, Task or Container.
///
/// `version` is the optimistic-concurrency counter: every ownership or
/// collaborator write names the version it was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub reference: ResourceRef,
    pub owner_id: Option<ActorId>,
    pub assigned_to: Option<ActorId>,
    #[serde(default)]
    pub collaborators: BTreeMap<ActorId, Level>,
    #[serde(default)]
    pub version: i64,
}

impl Resource {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Resource {
            reference: ResourceRef::new(kind, id),
            owner_id: None,
            assigned_to: None,
            collaborators: BTreeMap::new(),
            version: 0,
        }
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner_id = Some(ActorId::new(owner));
        self
    }

    /// Only tasks carry an assignee; the call is ignored for other kinds.
    pub fn assigned(mut self, assignee: impl Into<String>) -> Self {
        if self.reference.kind == ResourceKind::Task {
            self.assigned_to = Some(ActorId::new(assignee));
        }
        self
    }

    pub fn with_collaborator(mut self, actor: impl Into<String>, level: Level) -> Self {
        self.collaborators.insert(ActorId::new(actor), level);
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.reference.kind
    }

    /// A resource without an owner is degraded until someone claims it.
    pub fn is_degraded(&self) -> bool {
        self.owner_id.is_none()
    }

    pub fn is_owner(&self, actor: &ActorId) -> bool {
        self.owner_id.as_ref() == Some(actor)
    }

    /// The assignee of a task, ignored on other kinds even if a legacy row carries one.
    pub fn task_assignee(&self) -> Option<&ActorId> {
        match self.reference.kind {
            ResourceKind::Task => self.assigned_to.as_ref(),
            _ => None,
        }
    }

    /// Every actor the resource row points at (owner, assignee, collaborators).
    pub fn referencing_actors(&self) -> BTreeSet<&ActorId> {
        let mut actors: BTreeSet<&ActorId> = self.collaborators.keys().collect();
        if let Some(owner) = &self.owner_id {
            actors.insert(owner);
        }
        if let Some(assignee) = self.task_assignee() {
            actors.insert(assignee);
        }
        actors
    }
}
