use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::columns;
use super::store::{CacheProbe, ParsedPermissionStore};
use crate::{
    models::{ForumId, ParsedPermission, ResolvedPermissions, UserId},
    transaction::UnitOfWork,
    Result,
};

/// `parsed_permissions` table: one fully resolved row per (forum, user)
#[derive(Clone)]
pub struct ParsedPermissionRepository {
    pool: PgPool,
}

impl ParsedPermissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn upsert_sql() -> String {
        format!(
            "INSERT INTO parsed_permissions (forum_id, user_id, created_at, {cols})
             VALUES ($1, $2, $3, {values})
             ON CONFLICT (forum_id, user_id) DO UPDATE
             SET created_at = EXCLUDED.created_at, {excluded}",
            cols = *columns::COLUMNS,
            values = columns::placeholders(4),
            excluded = *columns::EXCLUDED_ASSIGNMENTS,
        )
    }
}

#[async_trait]
impl ParsedPermissionStore for ParsedPermissionRepository {
    async fn get(&self, forum_id: &ForumId, user_id: &UserId) -> Result<Option<ResolvedPermissions>> {
        let sql = format!(
            "SELECT {cols} FROM parsed_permissions WHERE forum_id = $1 AND user_id = $2",
            cols = *columns::COLUMNS,
        );
        let row = sqlx::query(&sql)
            .bind(forum_id.as_str())
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(columns::read_resolved).transpose()
    }

    async fn probe(&self, forum_ids: &[ForumId], user_id: &UserId) -> Result<Vec<CacheProbe>> {
        if forum_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT f.id AS requested_id, pp.forum_id IS NOT NULL AS cached, {cols}
             FROM unnest($1::text[]) WITH ORDINALITY AS f(id, ord)
             LEFT JOIN parsed_permissions pp ON pp.forum_id = f.id AND pp.user_id = $2
             ORDER BY f.ord",
            cols = columns::qualified("pp"),
        );
        let ids: Vec<String> = forum_ids.iter().map(|id| id.0.clone()).collect();
        let rows = sqlx::query(&sql)
            .bind(ids)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let cached: bool = row.try_get("cached")?;
                let permissions = if cached {
                    Some(columns::read_resolved(row)?)
                } else {
                    None
                };
                Ok(CacheProbe {
                    forum_id: row.try_get("requested_id")?,
                    permissions,
                })
            })
            .collect()
    }

    async fn upsert(&self, row: &ParsedPermission) -> Result<()> {
        let sql = Self::upsert_sql();
        let query = sqlx::query(&sql)
            .bind(row.forum_id.as_str())
            .bind(row.user_id.as_str())
            .bind(row.created_at);
        columns::bind_resolved(query, &row.permissions)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn upsert_many(&self, rows: &[ParsedPermission]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let sql = Self::upsert_sql();
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        for row in rows {
            let query = sqlx::query(&sql)
                .bind(row.forum_id.as_str())
                .bind(row.user_id.as_str())
                .bind(row.created_at);
            columns::bind_resolved(query, &row.permissions)
                .execute(&mut **uow.transaction())
                .await?;
        }
        uow.commit().await
    }

    async fn delete_forums(&self, forum_ids: &[ForumId]) -> Result<u64> {
        if forum_ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = forum_ids.iter().map(|id| id.0.clone()).collect();
        let result = sqlx::query("DELETE FROM parsed_permissions WHERE forum_id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM parsed_permissions WHERE user_id = $1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
