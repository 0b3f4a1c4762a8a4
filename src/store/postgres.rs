use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use super::{AuditStore, CommentStore, IdentityStore, ResourceStore, StoreError, StoreResult};
use crate::models::{
    Actor, ActorId, AuditDetails, AuditEntry, AuditEntryPage, CommentEntry, Level, NewAuditEntry,
    NewComment, Resource, ResourceKind, ResourceRef, Role,
};

/// Postgres-backed store. Cloning shares the pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ActorRow {
    id: String,
    display_name: String,
    role: Option<String>,
    groups: Vec<String>,
    organizations: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct ResourceRow {
    kind: String,
    id: String,
    owner_id: Option<String>,
    assigned_to: Option<String>,
    version: i64,
}

#[derive(sqlx::FromRow)]
struct CollaboratorRow {
    actor_id: String,
    level: String,
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: String,
    resource_kind: String,
    resource_id: String,
    user_id: String,
    user_name: Option<String>,
    recorded_at: DateTime<Utc>,
    details: serde_json::Value,
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: String,
    resource_kind: String,
    resource_id: String,
    user_id: String,
    user_name: String,
    user_avatar_initials: Option<String>,
    text: String,
    created_at: DateTime<Utc>,
}

const AUDIT_COLUMNS: &str =
    "id, resource_kind, resource_id, user_id, user_name, recorded_at, details";

const COMMENT_COLUMNS: &str =
    "id, resource_kind, resource_id, user_id, user_name, user_avatar_initials, text, created_at";

fn parse_ref(kind: &str, id: String) -> StoreResult<ResourceRef> {
    let kind: ResourceKind = kind.parse().map_err(StoreError::Backend)?;
    Ok(ResourceRef::new(kind, id))
}

impl From<ActorRow> for Actor {
    fn from(row: ActorRow) -> Self {
        Actor {
            id: ActorId(row.id),
            display_name: row.display_name,
            role: Role::from_stored(row.role.as_deref()),
            groups: row.groups.into_iter().collect(),
            organizations: row.organizations.into_iter().collect(),
        }
    }
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> StoreResult<Self> {
        let details: AuditDetails = serde_json::from_value(row.details)
            .map_err(|e| StoreError::Backend(format!("malformed audit details: {e}")))?;
        Ok(AuditEntry {
            id: row.id,
            resource: parse_ref(&row.resource_kind, row.resource_id)?,
            user_id: ActorId(row.user_id),
            user_name: row.user_name,
            timestamp: row.recorded_at,
            details,
        })
    }
}

impl TryFrom<CommentRow> for CommentEntry {
    type Error = StoreError;

    fn try_from(row: CommentRow) -> StoreResult<Self> {
        Ok(CommentEntry {
            id: row.id,
            resource: parse_ref(&row.resource_kind, row.resource_id)?,
            user_id: ActorId(row.user_id),
            user_name: row.user_name,
            user_avatar_initials: row.user_avatar_initials,
            text: row.text,
            created_at: row.created_at,
        })
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Refresh the cached profile of an actor.
    pub async fn upsert_actor(&self, actor: &Actor) -> StoreResult<()> {
        let groups: Vec<String> = actor.groups.iter().cloned().collect();
        let orgs: Vec<String> = actor.organizations.iter().cloned().collect();
        sqlx::query(
            "INSERT INTO actors (id, display_name, role, groups, organizations) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET display_name = EXCLUDED.display_name, \
                 role = EXCLUDED.role, groups = EXCLUDED.groups, \
                 organizations = EXCLUDED.organizations",
        )
        .bind(actor.id.as_str())
        .bind(&actor.display_name)
        .bind(actor.role.as_str())
        .bind(&groups)
        .bind(&orgs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Register a governed resource row with its collaborators (version starts at 0).
    pub async fn insert_resource(&self, resource: &Resource) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO governed_resources (kind, id, owner_id, assigned_to) VALUES ($1, $2, $3, $4)",
        )
        .bind(resource.reference.kind.as_str())
        .bind(&resource.reference.id)
        .bind(resource.owner_id.as_ref().map(ActorId::as_str))
        .bind(resource.task_assignee().map(ActorId::as_str))
        .execute(&mut *tx)
        .await?;
        for (actor, level) in &resource.collaborators {
            sqlx::query(
                "INSERT INTO resource_collaborators (kind, resource_id, actor_id, level) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(resource.reference.kind.as_str())
            .bind(&resource.reference.id)
            .bind(actor.as_str())
            .bind(level.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load(&self, reference: &ResourceRef) -> StoreResult<Option<Resource>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_on(&mut conn, reference).await
    }

    async fn load_on(
        conn: &mut PgConnection,
        reference: &ResourceRef,
    ) -> StoreResult<Option<Resource>> {
        let row = sqlx::query_as::<_, ResourceRow>(
            "SELECT kind, id, owner_id, assigned_to, version \
             FROM governed_resources WHERE kind = $1 AND id = $2",
        )
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .fetch_optional(&mut *conn)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let collaborators = sqlx::query_as::<_, CollaboratorRow>(
            "SELECT actor_id, level FROM resource_collaborators \
             WHERE kind = $1 AND resource_id = $2",
        )
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .fetch_all(&mut *conn)
        .await?;

        let mut resource = Resource {
            reference: parse_ref(&row.kind, row.id)?,
            owner_id: row.owner_id.map(ActorId),
            assigned_to: row.assigned_to.map(ActorId),
            collaborators: Default::default(),
            version: row.version,
        };
        for c in collaborators {
            let level: Level = c.level.parse().map_err(StoreError::Backend)?;
            resource.collaborators.insert(ActorId(c.actor_id), level);
        }
        Ok(Some(resource))
    }

    /// Read the written row inside `tx`, then commit. Nothing runs after
    /// the commit, so an error here means the write may or may not have landed.
    async fn finish_write(
        mut tx: Transaction<'_, Postgres>,
        reference: &ResourceRef,
    ) -> StoreResult<Resource> {
        let updated = Self::load_on(&mut tx, reference)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("resource {reference}")))?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Bump the version inside `tx` if it still matches and log `write_id`
    /// against the new version; otherwise report `Conflict` (row moved on)
    /// or `NotFound` (row gone).
    async fn claim_version(
        tx: &mut Transaction<'_, Postgres>,
        reference: &ResourceRef,
        expected_version: i64,
        write_id: &str,
    ) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE governed_resources SET version = version + 1 \
             WHERE kind = $1 AND id = $2 AND version = $3",
        )
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .bind(expected_version)
        .execute(&mut **tx)
        .await?;
        if updated.rows_affected() == 1 {
            sqlx::query(
                "INSERT INTO resource_writes (write_id, kind, resource_id, version) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(write_id)
            .bind(reference.kind.as_str())
            .bind(&reference.id)
            .bind(expected_version + 1)
            .execute(&mut **tx)
            .await?;
            return Ok(());
        }
        let exists: Option<(i64,)> = sqlx::query_as(
            "SELECT version FROM governed_resources WHERE kind = $1 AND id = $2",
        )
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .fetch_optional(&mut **tx)
        .await?;
        match exists {
            Some(_) => Err(StoreError::Conflict(reference.clone())),
            None => Err(StoreError::NotFound(format!("resource {reference}"))),
        }
    }

    /// Serialise appends to one resource's log for the rest of the transaction.
    async fn lock_log(
        tx: &mut Transaction<'_, Postgres>,
        log: &str,
        reference: &ResourceRef,
    ) -> StoreResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{log}:{}", reference.key()))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

impl IdentityStore for PgStore {
    async fn find_actor(&self, id: &ActorId) -> StoreResult<Option<Actor>> {
        let row = sqlx::query_as::<_, ActorRow>(
            "SELECT id, display_name, role, groups, organizations FROM actors WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Actor::from))
    }
}

impl ResourceStore for PgStore {
    async fn find_resource(&self, reference: &ResourceRef) -> StoreResult<Option<Resource>> {
        self.load(reference).await
    }

    async fn set_owner(
        &self,
        reference: &ResourceRef,
        expected_version: i64,
        write_id: &str,
        owner: &ActorId,
    ) -> StoreResult<Resource> {
        let mut tx = self.pool.begin().await?;
        Self::claim_version(&mut tx, reference, expected_version, write_id).await?;
        sqlx::query("UPDATE governed_resources SET owner_id = $3 WHERE kind = $1 AND id = $2")
            .bind(reference.kind.as_str())
            .bind(&reference.id)
            .bind(owner.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM resource_collaborators \
             WHERE kind = $1 AND resource_id = $2 AND actor_id = $3",
        )
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .bind(owner.as_str())
        .execute(&mut *tx)
        .await?;
        Self::finish_write(tx, reference).await
    }

    async fn put_collaborator(
        &self,
        reference: &ResourceRef,
        expected_version: i64,
        write_id: &str,
        actor: &ActorId,
        level: Level,
    ) -> StoreResult<Resource> {
        let mut tx = self.pool.begin().await?;
        Self::claim_version(&mut tx, reference, expected_version, write_id).await?;
        sqlx::query(
            "INSERT INTO resource_collaborators (kind, resource_id, actor_id, level) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (kind, resource_id, actor_id) DO UPDATE SET level = EXCLUDED.level",
        )
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .bind(actor.as_str())
        .bind(level.as_str())
        .execute(&mut *tx)
        .await?;
        Self::finish_write(tx, reference).await
    }

    async fn remove_collaborator(
        &self,
        reference: &ResourceRef,
        expected_version: i64,
        write_id: &str,
        actor: &ActorId,
    ) -> StoreResult<Resource> {
        let mut tx = self.pool.begin().await?;
        Self::claim_version(&mut tx, reference, expected_version, write_id).await?;
        sqlx::query(
            "DELETE FROM resource_collaborators \
             WHERE kind = $1 AND resource_id = $2 AND actor_id = $3",
        )
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .bind(actor.as_str())
        .execute(&mut *tx)
        .await?;
        Self::finish_write(tx, reference).await
    }

    async fn find_write(
        &self,
        reference: &ResourceRef,
        write_id: &str,
    ) -> StoreResult<Option<Resource>> {
        let logged: Option<(i64,)> = sqlx::query_as(
            "SELECT version FROM resource_writes \
             WHERE write_id = $1 AND kind = $2 AND resource_id = $3",
        )
        .bind(write_id)
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .fetch_optional(&self.pool)
        .await?;
        match logged {
            Some(_) => self.load(reference).await,
            None => Ok(None),
        }
    }

    async fn find_degraded(&self, limit: i64) -> StoreResult<Vec<ResourceRef>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT kind, id FROM governed_resources WHERE owner_id IS NULL \
             ORDER BY created_at, kind, id LIMIT $1",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|(kind, id)| parse_ref(&kind, id)).collect()
    }

    async fn count_degraded(&self) -> StoreResult<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM governed_resources WHERE owner_id IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }
}

impl AuditStore for PgStore {
    async fn append_audit(&self, entry: NewAuditEntry) -> StoreResult<AuditEntry> {
        let details = serde_json::to_value(&entry.details)
            .map_err(|e| StoreError::Backend(format!("unserialisable audit details: {e}")))?;

        let mut tx = self.pool.begin().await?;
        Self::lock_log(&mut tx, "audit", &entry.resource).await?;
        // Strictly after the resource's newest entry even if the server clock stepped back.
        let inserted = sqlx::query_as::<_, AuditRow>(&format!(
            "INSERT INTO audit_entries \
                 (id, resource_kind, resource_id, action, user_id, user_name, recorded_at, details) \
             SELECT $1, $2, $3, $4, $5, $6, \
                 GREATEST(clock_timestamp(), \
                     (SELECT MAX(recorded_at) + interval '1 microsecond' FROM audit_entries \
                      WHERE resource_kind = $2 AND resource_id = $3)), \
                 $7 \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {AUDIT_COLUMNS}"
        ))
        .bind(&entry.id)
        .bind(entry.resource.kind.as_str())
        .bind(&entry.resource.id)
        .bind(entry.details.tag())
        .bind(entry.user_id.as_str())
        .bind(entry.user_name.as_deref())
        .bind(details)
        .fetch_optional(&mut *tx)
        .await?;
        let row = match inserted {
            Some(row) => row,
            None => {
                sqlx::query_as::<_, AuditRow>(&format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_entries WHERE id = $1"
                ))
                .bind(&entry.id)
                .fetch_one(&mut *tx)
                .await?
            }
        };
        tx.commit().await?;
        row.try_into()
    }

    async fn list_audit(
        &self,
        reference: &ResourceRef,
        page: i64,
        per_page: i64,
    ) -> StoreResult<AuditEntryPage> {
        let (page, per_page) = AuditEntryPage::clamp(page, per_page);
        let offset = AuditEntryPage::offset(page, per_page);

        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM audit_entries WHERE resource_kind = $1 AND resource_id = $2",
        )
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_entries \
             WHERE resource_kind = $1 AND resource_id = $2 \
             ORDER BY recorded_at DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(AuditEntry::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(AuditEntryPage {
            entries,
            page,
            per_page,
            total_count: total.0,
            total_pages: AuditEntryPage::total_pages(total.0, per_page),
        })
    }
}

impl CommentStore for PgStore {
    async fn append_comment(&self, new: NewComment) -> StoreResult<CommentEntry> {
        let mut tx = self.pool.begin().await?;
        Self::lock_log(&mut tx, "comments", &new.resource).await?;
        let inserted = sqlx::query_as::<_, CommentRow>(&format!(
            "INSERT INTO comments \
                 (id, resource_kind, resource_id, user_id, user_name, user_avatar_initials, text, created_at) \
             SELECT $1, $2, $3, $4, $5, $6, $7, \
                 GREATEST(clock_timestamp(), \
                     (SELECT MAX(created_at) + interval '1 microsecond' FROM comments \
                      WHERE resource_kind = $2 AND resource_id = $3)) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(&new.id)
        .bind(new.resource.kind.as_str())
        .bind(&new.resource.id)
        .bind(new.user_id.as_str())
        .bind(&new.user_name)
        .bind(new.user_avatar_initials.as_deref())
        .bind(&new.text)
        .fetch_optional(&mut *tx)
        .await?;
        let row = match inserted {
            Some(row) => row,
            None => {
                sqlx::query_as::<_, CommentRow>(&format!(
                    "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
                ))
                .bind(&new.id)
                .fetch_one(&mut *tx)
                .await?
            }
        };
        tx.commit().await?;
        row.try_into()
    }

    async fn find_comment(
        &self,
        reference: &ResourceRef,
        comment_id: &str,
    ) -> StoreResult<Option<CommentEntry>> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments \
             WHERE resource_kind = $1 AND resource_id = $2 AND id = $3"
        ))
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CommentEntry::try_from).transpose()
    }

    async fn update_comment_text(
        &self,
        reference: &ResourceRef,
        comment_id: &str,
        text: &str,
    ) -> StoreResult<CommentEntry> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "UPDATE comments SET text = $4 \
             WHERE resource_kind = $1 AND resource_id = $2 AND id = $3 \
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .bind(comment_id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("comment {comment_id}")))?;
        row.try_into()
    }

    async fn list_comments(&self, reference: &ResourceRef) -> StoreResult<Vec<CommentEntry>> {
        let rows = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments \
             WHERE resource_kind = $1 AND resource_id = $2 \
             ORDER BY created_at, id"
        ))
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CommentEntry::try_from).collect()
    }
}
