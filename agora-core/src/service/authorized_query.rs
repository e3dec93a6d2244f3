//! Bulk authorization in SQL
//!
//! Selects the ids of candidate rows an actor may act on by rendering the
//! action's predicate into the select list. Forum-scoped resource types read
//! the actor's `parsed_permissions` row for the governing forum. Each result
//! row reports whether that row existed; the statement is re-issued after
//! materializing the missing forums until every row is answered from the
//! cache.

use sea_query::{
    Alias, Expr, Func, JoinType, Order, PostgresQueryBuilder, Query, SelectStatement, SimpleExpr,
};
use sqlx::{
    postgres::{PgArguments, PgRow},
    query::Query as SqlxQuery,
    PgPool, Postgres, Row,
};

use crate::{
    models::{ForumId, UserId},
    repository::{Predicate, RenderScope, PARSED_ALIAS, RESOURCE_ALIAS},
    service::{authorization::Resource, permission::PermissionService},
    Error, Result,
};

#[derive(Clone, Debug)]
pub struct AuthorizedQuery {
    pool: PgPool,
    permissions: PermissionService,
}

/// One candidate as answered by the select
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuthorizedRow {
    pub id: String,
    pub forum_id: Option<ForumId>,
    /// False when the governing forum has no parsed row for the actor
    pub cached: bool,
    pub allowed: bool,
}

impl AuthorizedRow {
    fn from_row(row: &PgRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            forum_id: row.try_get("forum_id")?,
            cached: row.try_get("cached")?,
            allowed: row.try_get("allowed")?,
        })
    }
}

impl AuthorizedQuery {
    pub fn new(pool: PgPool, permissions: PermissionService) -> Self {
        Self { pool, permissions }
    }

    /// The subset of `candidates` (resource ids) the actor may apply
    /// `action` to, in id order
    pub async fn authorized_ids<R: Resource>(
        &self,
        actor: &UserId,
        action: R::Action,
        candidates: &[String],
    ) -> Result<Vec<String>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let global = self.permissions.user_permissions(actor).await?;
        let scope = RenderScope::new(R::TYPE, actor, &global);
        let (sql, values) = select_statement(&R::action_query(action), candidates, &scope)
            .build(PostgresQueryBuilder);

        let max_passes = self.permissions.config().batch_max_passes.max(1);
        let mut pass = 0;
        loop {
            pass += 1;
            let mut query = sqlx::query(&sql);
            for value in values.0.iter().cloned() {
                query = bind_sea_value(query, value)?;
            }
            let rows = query
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(AuthorizedRow::from_row)
                .collect::<Result<Vec<_>>>()?;

            let missing = uncached_forums(&rows);
            if missing.is_empty() {
                let ids: Vec<String> = rows
                    .into_iter()
                    .filter(|row| row.allowed)
                    .map(|row| row.id)
                    .collect();
                tracing::debug!(
                    actor = %actor,
                    resource = R::TYPE.as_str(),
                    candidates = candidates.len(),
                    allowed = ids.len(),
                    passes = pass,
                    "Bulk authorization"
                );
                return Ok(ids);
            }
            if pass >= max_passes {
                tracing::warn!(
                    actor = %actor,
                    resource = R::TYPE.as_str(),
                    passes = pass,
                    unsettled = missing.len(),
                    "Bulk authorization hit its pass ceiling"
                );
                return Err(Error::Internal(format!(
                    "bulk authorization for {} left {} forums uncached after {pass} passes",
                    R::TYPE,
                    missing.len()
                )));
            }
            self.permissions.cache().get_many(&missing, actor).await?;
        }
    }
}

/// Governing forums of rows answered without a parsed row, deduplicated in
/// first-seen order
pub(crate) fn uncached_forums(rows: &[AuthorizedRow]) -> Vec<ForumId> {
    let mut missing: Vec<ForumId> = Vec::new();
    for row in rows.iter().filter(|row| !row.cached) {
        if let Some(forum_id) = &row.forum_id {
            if !missing.contains(forum_id) {
                missing.push(forum_id.clone());
            }
        }
    }
    missing
}

pub(crate) fn select_statement(
    predicate: &Predicate,
    candidates: &[String],
    scope: &RenderScope<'_>,
) -> SelectStatement {
    let resource = Alias::new(RESOURCE_ALIAS);
    let mut select = Query::select();
    select
        .column((resource.clone(), Alias::new("id")))
        .from_as(Alias::new(scope.resource_type.table()), resource.clone())
        .and_where(Expr::col((resource.clone(), Alias::new("id"))).is_in(candidates.iter().cloned()));

    match scope.resource_type.forum_column() {
        Some(column) => {
            let parsed = Alias::new(PARSED_ALIAS);
            select.join_as(
                JoinType::LeftJoin,
                Alias::new("parsed_permissions"),
                parsed.clone(),
                Expr::col((parsed.clone(), Alias::new("forum_id")))
                    .equals((resource.clone(), Alias::new(column)))
                    .and(Expr::col((parsed.clone(), Alias::new("user_id"))).eq(scope.actor.as_str())),
            );
            // Detached rows (no governing forum) never need a parsed row
            let cached = Expr::col((resource.clone(), Alias::new(column)))
                .is_null()
                .or(Expr::col((parsed, Alias::new("forum_id"))).is_not_null());
            select
                .expr_as(Expr::col((resource.clone(), Alias::new(column))), Alias::new("forum_id"))
                .expr_as(cached, Alias::new("cached"));
        }
        None => {
            select
                .expr_as(Expr::cust("NULL::TEXT"), Alias::new("forum_id"))
                .expr_as(Expr::cust("TRUE"), Alias::new("cached"));
        }
    }

    let allowed: SimpleExpr = Func::coalesce([predicate.to_expr(scope), Expr::cust("FALSE")]).into();
    select
        .expr_as(allowed, Alias::new("allowed"))
        .order_by((resource, Alias::new("id")), Order::Asc);
    select
}

fn bind_sea_value<'q>(
    query: SqlxQuery<'q, Postgres, PgArguments>,
    value: sea_query::Value,
) -> Result<SqlxQuery<'q, Postgres, PgArguments>> {
    match value {
        sea_query::Value::String(Some(s)) => Ok(query.bind(*s)),
        sea_query::Value::Bool(Some(b)) => Ok(query.bind(b)),
        other => Err(Error::Internal(format!(
            "Unsupported query parameter: {other:?}"
        ))),
    }
}
