//! Comment log: per-resource, append-only discussion threads.
//!
//! Appending needs `comment`; reading needs `read`. Comment ids are chosen
//! before the first attempt, so a retried append never doubles a comment. Editing needs `update`,
//! rewrites the body in place and leaves the history in the audit trail as
//! a `comment_edited` entry.

use crate::audit::{AuditRecorder, Audited};
use crate::auth::policy::{Action, PolicyEngine};
use crate::auth::validate;
use crate::errors::AccessError;
use crate::models::{Actor, AuditDetails, CommentEntry, NewComment, Resource};
use crate::store::{AuditStore, CommentStore, RetryPolicy, new_id, with_retry};

#[derive(Clone)]
pub struct CommentLog<S> {
    store: S,
    engine: PolicyEngine,
    recorder: AuditRecorder<S>,
    retry: RetryPolicy,
}

fn checked_text(text: &str) -> Result<&str, AccessError> {
    match validate::validate_comment_text(text) {
        Some(msg) => Err(AccessError::Invalid(msg)),
        None => Ok(text.trim()),
    }
}

impl<S: CommentStore + AuditStore> CommentLog<S> {
    pub fn new(store: S, engine: PolicyEngine, recorder: AuditRecorder<S>, retry: RetryPolicy) -> Self {
        CommentLog { store, engine, recorder, retry }
    }

    pub async fn append(
        &self,
        actor: &Actor,
        resource: &Resource,
        text: &str,
    ) -> Result<CommentEntry, AccessError> {
        self.engine.require(actor, resource, Action::Comment)?;
        let text = checked_text(text)?;

        let new = NewComment {
            id: new_id("cmt"),
            resource: resource.reference.clone(),
            user_id: actor.id.clone(),
            user_name: actor.display_name.clone(),
            user_avatar_initials: actor.initials(),
            text: text.to_string(),
        };
        let store = &self.store;
        let comment =
            with_retry(&self.retry, "comment append", move || store.append_comment(new.clone())).await?;
        log::info!("comment {} on {} by {}", comment.id, resource.reference, actor.id);
        Ok(comment)
    }

    pub async fn edit(
        &self,
        actor: &Actor,
        resource: &Resource,
        comment_id: &str,
        text: &str,
    ) -> Result<Audited<CommentEntry>, AccessError> {
        self.engine.require(actor, resource, Action::Update)?;
        let text = checked_text(text)?;
        let reference = &resource.reference;
        let store = &self.store;

        let existing = with_retry(&self.retry, "comment lookup", move || store.find_comment(reference, comment_id))
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("comment {comment_id} on {reference}")))?;
        if existing.text == text {
            return Ok(Audited::unchanged(existing));
        }

        let updated = with_retry(&self.retry, "comment edit", move || {
            store.update_comment_text(reference, comment_id, text)
        })
        .await?;

        let audit = self
            .recorder
            .record_status(
                reference,
                actor,
                AuditDetails::CommentEdited {
                    comment_id: comment_id.to_string(),
                    before: existing.text,
                    after: updated.text.clone(),
                },
            )
            .await;
        Ok(Audited { value: updated, audit })
    }

    /// The thread in order: creation time, then id.
    pub async fn list(&self, actor: &Actor, resource: &Resource) -> Result<Vec<CommentEntry>, AccessError> {
        self.engine.require(actor, resource, Action::Read)?;
        let reference = &resource.reference;
        let store = &self.store;
        Ok(with_retry(&self.retry, "comment list", move || store.list_comments(reference)).await?)
    }
}
