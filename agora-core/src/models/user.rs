use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::UserId;
use super::permission::{PermissionSet, ResolvedPermissions};

/// Forum user, as seen by the permission engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,

    /// Per-user global override (highest priority among global sources)
    #[serde(default)]
    pub permissions: PermissionSet,

    /// Resolved global permissions; `None` until first computed
    pub parsed_permissions: Option<ResolvedPermissions>,

    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            permissions: PermissionSet::inherit_all(),
            parsed_permissions: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    #[must_use]
    pub fn with_parsed(mut self, resolved: ResolvedPermissions) -> Self {
        self.parsed_permissions = Some(resolved);
        self
    }
}
