use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};

use super::columns;
use super::store::GroupStore;
use crate::{
    models::{Group, GroupId},
    Result,
};

/// Group repository for database operations
#[derive(Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn select_sql(filter: &str) -> String {
        format!(
            "SELECT id, name, level, default_for, created_at, {}
             FROM groups
             {filter}
             ORDER BY level DESC, id ASC",
            *columns::COLUMNS
        )
    }

    fn row_to_group(row: &PgRow) -> Result<Group> {
        Ok(Group {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            level: row.try_get("level")?,
            default_for: row.try_get("default_for")?,
            permissions: columns::read_set(row)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl GroupStore for GroupRepository {
    async fn get(&self, id: &GroupId) -> Result<Option<Group>> {
        let row = sqlx::query(&Self::select_sql("WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_group).transpose()
    }

    async fn get_many(&self, ids: &[GroupId]) -> Result<Vec<Group>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        let rows = sqlx::query(&Self::select_sql("WHERE id = ANY($1)"))
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_group).collect()
    }

    async fn list(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query(&Self::select_sql(""))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_group).collect()
    }

    async fn save(&self, group: &Group) -> Result<Group> {
        let sql = format!(
            "INSERT INTO groups (id, name, level, default_for, created_at, {cols})
             VALUES ($1, $2, $3, $4, $5, {values})
             ON CONFLICT (id) DO UPDATE
             SET
                name = EXCLUDED.name,
                level = EXCLUDED.level,
                default_for = EXCLUDED.default_for,
                {excluded}
             RETURNING id, name, level, default_for, created_at, {cols}",
            cols = *columns::COLUMNS,
            values = columns::placeholders(6),
            excluded = *columns::EXCLUDED_ASSIGNMENTS,
        );

        let query = sqlx::query(&sql)
            .bind(group.id.as_str())
            .bind(&group.name)
            .bind(group.level)
            .bind(&group.default_for)
            .bind(group.created_at);
        let row = columns::bind_set(query, &group.permissions)
            .fetch_one(&self.pool)
            .await?;

        Self::row_to_group(&row)
    }

    async fn delete(&self, id: &GroupId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
