use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ForumId, UserId};
use super::permission::ResolvedPermissions;

/// Cached forum resolution for one (forum, user) pair
///
/// Purely derived; rows are deleted on invalidation and rebuilt by the next
/// reader, never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPermission {
    pub forum_id: ForumId,
    pub user_id: UserId,
    pub permissions: ResolvedPermissions,
    pub created_at: DateTime<Utc>,
}

impl ParsedPermission {
    pub fn new(forum_id: ForumId, user_id: UserId, permissions: ResolvedPermissions) -> Self {
        Self {
            forum_id,
            user_id,
            permissions,
            created_at: Utc::now(),
        }
    }
}
