use async_trait::async_trait;
use sqlx::{postgres::PgRow, types::Json, PgPool, Row};

use super::columns;
use super::store::UserStore;
use crate::{
    models::{GroupId, PermissionSet, ResolvedPermissions, User, UserId},
    Error, Result,
};

/// User repository for database operations
///
/// Only the permission-related columns of `users` are touched here.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &PgRow) -> Result<User> {
        let parsed: Option<Json<ResolvedPermissions>> = row.try_get("parsed_permissions")?;
        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            permissions: columns::read_set(row)?,
            parsed_permissions: parsed.map(|Json(p)| p),
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn get(&self, id: &UserId) -> Result<Option<User>> {
        let sql = format!(
            "SELECT id, name, parsed_permissions, created_at, {}
             FROM users
             WHERE id = $1",
            *columns::COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn create(&self, user: &User) -> Result<User> {
        let sql = format!(
            "INSERT INTO users (id, name, parsed_permissions, created_at, {cols})
             VALUES ($1, $2, $3, $4, {values})
             RETURNING id, name, parsed_permissions, created_at, {cols}",
            cols = *columns::COLUMNS,
            values = columns::placeholders(5),
        );
        let query = sqlx::query(&sql)
            .bind(user.id.as_str())
            .bind(&user.name)
            .bind(user.parsed_permissions.map(Json))
            .bind(user.created_at);
        let row = columns::bind_set(query, &user.permissions)
            .fetch_one(&self.pool)
            .await?;

        Self::row_to_user(&row)
    }

    async fn group_ids(&self, id: &UserId) -> Result<Vec<GroupId>> {
        let ids = sqlx::query_scalar::<_, GroupId>(
            "SELECT group_id FROM user_groups WHERE user_id = $1 ORDER BY group_id",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn add_group(&self, user_id: &UserId, group_id: &GroupId) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO user_groups (user_id, group_id)
             VALUES ($1, $2)
             ON CONFLICT (user_id, group_id) DO NOTHING",
        )
        .bind(user_id.as_str())
        .bind(group_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_group(&self, user_id: &UserId, group_id: &GroupId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_groups WHERE user_id = $1 AND group_id = $2")
            .bind(user_id.as_str())
            .bind(group_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn member_ids(&self, group_id: &GroupId) -> Result<Vec<UserId>> {
        let ids = sqlx::query_scalar::<_, UserId>(
            "SELECT user_id FROM user_groups WHERE group_id = $1 ORDER BY user_id",
        )
        .bind(group_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn set_permissions(&self, user_id: &UserId, permissions: &PermissionSet) -> Result<()> {
        let sql = format!(
            "UPDATE users SET {} WHERE id = $1",
            columns::assignments(2)
        );
        let query = sqlx::query(&sql).bind(user_id.as_str());
        let result = columns::bind_set(query, permissions)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("User", user_id));
        }
        Ok(())
    }

    async fn set_parsed_permissions(
        &self,
        user_id: &UserId,
        permissions: &ResolvedPermissions,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE users SET parsed_permissions = $2 WHERE id = $1")
            .bind(user_id.as_str())
            .bind(Json(permissions))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("User", user_id));
        }
        Ok(())
    }
}
