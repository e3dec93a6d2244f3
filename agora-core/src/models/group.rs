use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::GroupId;
use super::permission::PermissionSet;

/// `default_for` tag meaning "every newly registered user"
pub const DEFAULT_FOR_ALL: &str = "*";

/// Permission group
///
/// Groups are ranked by `level`; when a user belongs to several, the higher
/// level wins key by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub level: i32,

    /// Registration channels that auto-assign this group
    #[serde(default)]
    pub default_for: Vec<String>,

    /// Global-scope permissions owned by the group
    #[serde(default)]
    pub permissions: PermissionSet,

    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: impl Into<String>, level: i32) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            level,
            default_for: Vec::new(),
            permissions: PermissionSet::inherit_all(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    #[must_use]
    pub fn default_for(mut self, channel: impl Into<String>) -> Self {
        self.default_for.push(channel.into());
        self
    }

    pub fn is_default_for_all(&self) -> bool {
        self.default_for.iter().any(|tag| tag == DEFAULT_FOR_ALL)
    }

    /// Whether a user registering through `channel` joins this group
    pub fn is_default_for(&self, channel: &str) -> bool {
        self.default_for
            .iter()
            .any(|tag| tag == DEFAULT_FOR_ALL || tag == channel)
    }

    /// Merge priority: higher level first, ties broken by ascending id
    pub fn priority_cmp(&self, other: &Self) -> Ordering {
        other
            .level
            .cmp(&self.level)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Sort groups into merge order (highest priority first)
pub fn sort_by_priority(groups: &mut [Group]) {
    groups.sort_by(Group::priority_cmp);
}
