use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};

use super::columns;
use super::store::ForumStore;
use crate::{
    models::{
        AncestorChain, Forum, ForumId, ForumPermissionOverride, GroupId, OverrideSubject, UserId,
    },
    Error, Result,
};

/// Forum hierarchy and forum-scoped override repository
#[derive(Clone)]
pub struct ForumRepository {
    pool: PgPool,
}

impl ForumRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_forum(row: &PgRow) -> Result<Forum> {
        Ok(Forum {
            id: row.try_get("id")?,
            parent_id: row.try_get("parent_id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_override(row: &PgRow) -> Result<ForumPermissionOverride> {
        let kind: String = row.try_get("kind")?;
        let subject_id: String = row.try_get("subject_id")?;
        let subject = match kind.as_str() {
            "group" => OverrideSubject::Group(GroupId(subject_id)),
            "user" => OverrideSubject::User(UserId(subject_id)),
            other => {
                return Err(Error::Internal(format!("Unknown override subject kind: {other}")))
            }
        };

        Ok(ForumPermissionOverride {
            forum_id: row.try_get("forum_id")?,
            subject,
            permissions: columns::read_set(row)?,
        })
    }

    fn id_strings(ids: &[ForumId]) -> Vec<String> {
        ids.iter().map(|id| id.0.clone()).collect()
    }
}

#[async_trait]
impl ForumStore for ForumRepository {
    async fn get(&self, id: &ForumId) -> Result<Option<Forum>> {
        let row = sqlx::query("SELECT id, parent_id, name, created_at FROM forums WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_forum).transpose()
    }

    async fn create(&self, forum: &Forum) -> Result<Forum> {
        let row = sqlx::query(
            "INSERT INTO forums (id, parent_id, name, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id, parent_id, name, created_at",
        )
        .bind(forum.id.as_str())
        .bind(forum.parent_id.as_ref().map(ForumId::as_str))
        .bind(&forum.name)
        .bind(forum.created_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_forum(&row)
    }

    async fn ancestors(&self, id: &ForumId) -> Result<AncestorChain> {
        // UNION (not UNION ALL) so a corrupted parent cycle terminates
        let rows = sqlx::query(
            "WITH RECURSIVE chain AS (
                SELECT id, parent_id, name, created_at
                FROM forums
                WHERE id = $1
                UNION
                SELECT f.id, f.parent_id, f.name, f.created_at
                FROM forums f
                JOIN chain c ON f.id = c.parent_id
             )
             SELECT id, parent_id, name, created_at FROM chain",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let forums = rows
            .iter()
            .map(Self::row_to_forum)
            .collect::<Result<Vec<_>>>()?;
        Ok(AncestorChain::from_unordered(id, forums))
    }

    async fn descendant_ids(&self, id: &ForumId) -> Result<Vec<ForumId>> {
        let ids = sqlx::query_scalar::<_, ForumId>(
            "WITH RECURSIVE tree AS (
                SELECT id FROM forums WHERE id = $1
                UNION
                SELECT f.id
                FROM forums f
                JOIN tree t ON f.parent_id = t.id
             )
             SELECT id FROM tree",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn set_parent(&self, id: &ForumId, parent_id: Option<ForumId>) -> Result<()> {
        let result = sqlx::query("UPDATE forums SET parent_id = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(parent_id.as_ref().map(ForumId::as_str))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Forum", id));
        }
        Ok(())
    }

    async fn overrides(
        &self,
        forum_ids: &[ForumId],
        user_id: &UserId,
        group_ids: &[GroupId],
    ) -> Result<Vec<ForumPermissionOverride>> {
        if forum_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT forum_id, group_id AS subject_id, 'group' AS kind, {cols}
             FROM forum_group_permissions
             WHERE forum_id = ANY($1) AND group_id = ANY($3)
             UNION ALL
             SELECT forum_id, user_id AS subject_id, 'user' AS kind, {cols}
             FROM forum_user_permissions
             WHERE forum_id = ANY($1) AND user_id = $2",
            cols = *columns::COLUMNS,
        );
        let group_ids: Vec<String> = group_ids.iter().map(|id| id.0.clone()).collect();
        let rows = sqlx::query(&sql)
            .bind(Self::id_strings(forum_ids))
            .bind(user_id.as_str())
            .bind(group_ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_override).collect()
    }

    async fn save_override(&self, entry: &ForumPermissionOverride) -> Result<()> {
        let (table, subject_column, subject_id) = match &entry.subject {
            OverrideSubject::Group(id) => ("forum_group_permissions", "group_id", id.as_str()),
            OverrideSubject::User(id) => ("forum_user_permissions", "user_id", id.as_str()),
        };
        let sql = format!(
            "INSERT INTO {table} (forum_id, {subject_column}, {cols})
             VALUES ($1, $2, {values})
             ON CONFLICT (forum_id, {subject_column}) DO UPDATE
             SET {excluded}",
            cols = *columns::COLUMNS,
            values = columns::placeholders(3),
            excluded = *columns::EXCLUDED_ASSIGNMENTS,
        );
        let query = sqlx::query(&sql)
            .bind(entry.forum_id.as_str())
            .bind(subject_id);
        columns::bind_set(query, &entry.permissions)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_override(&self, forum_id: &ForumId, subject: &OverrideSubject) -> Result<bool> {
        let (sql, subject_id) = match subject {
            OverrideSubject::Group(id) => (
                "DELETE FROM forum_group_permissions WHERE forum_id = $1 AND group_id = $2",
                id.as_str(),
            ),
            OverrideSubject::User(id) => (
                "DELETE FROM forum_user_permissions WHERE forum_id = $1 AND user_id = $2",
                id.as_str(),
            ),
        };
        let result = sqlx::query(sql)
            .bind(forum_id.as_str())
            .bind(subject_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn forums_with_group_override(&self, group_id: &GroupId) -> Result<Vec<ForumId>> {
        let ids = sqlx::query_scalar::<_, ForumId>(
            "SELECT forum_id FROM forum_group_permissions WHERE group_id = $1",
        )
        .bind(group_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
