pub mod actor;
pub mod audit;
pub mod comment;
pub mod resource;

pub use actor::{Actor, ActorId, Role};
pub use audit::{AuditDetails, AuditEntry, AuditEntryPage, CollaboratorChange, NewAuditEntry};
pub use comment::{CommentEntry, NewComment};
pub use resource::{Level, Resource, ResourceKind, ResourceRef};
