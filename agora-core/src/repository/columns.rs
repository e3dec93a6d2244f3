//! Permission-key column plumbing shared by the PostgreSQL repositories
//!
//! Every permission key is its own boolean column. Unresolved sets use
//! nullable columns (`NULL` = inherit); parsed rows use `NOT NULL`.

use std::sync::LazyLock;

use sqlx::{
    postgres::{PgArguments, PgRow},
    query::Query,
    Postgres, Row,
};

use crate::{
    models::{PermissionKey, PermissionSet, ResolvedPermissions, TriState},
    Result,
};

/// `category_view, category_create, ...` in canonical order
pub(crate) static COLUMNS: LazyLock<String> = LazyLock::new(|| {
    PermissionKey::ALL
        .iter()
        .map(|key| key.as_str())
        .collect::<Vec<_>>()
        .join(", ")
});

/// `col = EXCLUDED.col, ...` for upserts
pub(crate) static EXCLUDED_ASSIGNMENTS: LazyLock<String> = LazyLock::new(|| {
    PermissionKey::ALL
        .iter()
        .map(|key| format!("{0} = EXCLUDED.{0}", key.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
});

/// Column list qualified with a table alias
pub(crate) fn qualified(alias: &str) -> String {
    PermissionKey::ALL
        .iter()
        .map(|key| format!("{alias}.{}", key.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `$first, $first+1, ...` placeholders, one per key
pub(crate) fn placeholders(first: usize) -> String {
    (first..first + PermissionKey::COUNT)
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `col = $first, col = $first+1, ...` for updates
pub(crate) fn assignments(first: usize) -> String {
    PermissionKey::ALL
        .iter()
        .zip(first..)
        .map(|(key, n)| format!("{} = ${n}", key.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn bind_set<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    set: &PermissionSet,
) -> Query<'q, Postgres, PgArguments> {
    for (_, value) in set.iter() {
        query = query.bind(value.as_bool());
    }
    query
}

pub(crate) fn bind_resolved<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    resolved: &ResolvedPermissions,
) -> Query<'q, Postgres, PgArguments> {
    for (_, value) in resolved.iter() {
        query = query.bind(value);
    }
    query
}

pub(crate) fn read_set(row: &PgRow) -> Result<PermissionSet> {
    let mut set = PermissionSet::inherit_all();
    for key in PermissionKey::ALL {
        let value: Option<bool> = row.try_get(key.as_str())?;
        set.set(*key, TriState::from(value));
    }
    Ok(set)
}

pub(crate) fn read_resolved(row: &PgRow) -> Result<ResolvedPermissions> {
    let mut resolved = ResolvedPermissions::deny_all();
    for key in PermissionKey::ALL {
        let value: bool = row.try_get(key.as_str())?;
        resolved.set(*key, value);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_list_matches_vocabulary() {
        assert!(COLUMNS.starts_with("category_view, category_create"));
        assert_eq!(COLUMNS.split(", ").count(), PermissionKey::COUNT);
    }

    #[test]
    fn test_placeholders_and_assignments_line_up() {
        let p = placeholders(3);
        assert!(p.starts_with("$3, $4"));
        assert!(p.ends_with(&format!("${}", 3 + PermissionKey::COUNT - 1)));

        let a = assignments(2);
        assert!(a.starts_with("category_view = $2, category_create = $3"));
    }

    #[test]
    fn test_qualified_columns() {
        assert!(qualified("pp").starts_with("pp.category_view, pp.category_create"));
    }
}
