use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::actor::ActorId;
use super::resource::ResourceRef;

/// A user-authored entry in a resource's discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEntry {
    pub id: String,
    pub resource: ResourceRef,
    pub user_id: ActorId,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar_initials: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Comment before the store assigns its timestamp; `id` is writer-chosen.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub id: String,
    pub resource: ResourceRef,
    pub user_id: ActorId,
    pub user_name: String,
    pub user_avatar_initials: Option<String>,
    pub text: String,
}

/// Sort comments into thread order: creation time, then id.
pub fn sort_thread(comments: &mut [CommentEntry]) {
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}
