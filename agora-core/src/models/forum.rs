use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ForumId, GroupId, UserId};
use super::permission::PermissionSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forum {
    pub id: ForumId,
    pub parent_id: Option<ForumId>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Forum {
    pub fn new(name: impl Into<String>, parent_id: Option<ForumId>) -> Self {
        Self {
            id: ForumId::new(),
            parent_id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Who a forum permission override applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum OverrideSubject {
    Group(GroupId),
    User(UserId),
}

/// Unresolved permission set attached to a (forum, group) or (forum, user) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumPermissionOverride {
    pub forum_id: ForumId,
    pub subject: OverrideSubject,
    pub permissions: PermissionSet,
}

impl ForumPermissionOverride {
    pub fn for_group(forum_id: ForumId, group_id: GroupId, permissions: PermissionSet) -> Self {
        Self {
            forum_id,
            subject: OverrideSubject::Group(group_id),
            permissions,
        }
    }

    pub fn for_user(forum_id: ForumId, user_id: UserId, permissions: PermissionSet) -> Self {
        Self {
            forum_id,
            subject: OverrideSubject::User(user_id),
            permissions,
        }
    }
}

/// A forum and its ancestors, nearest first (`[forum, parent, ..., root]`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncestorChain {
    forums: Vec<Forum>,
}

impl AncestorChain {
    /// Order `forums` into a chain starting at `start` by following parent
    /// links. Unreachable rows are dropped and a cycle ends the chain.
    pub fn from_unordered(start: &ForumId, forums: Vec<Forum>) -> Self {
        let mut by_id: std::collections::HashMap<ForumId, Forum> =
            forums.into_iter().map(|f| (f.id.clone(), f)).collect();

        let mut chain = Vec::with_capacity(by_id.len());
        let mut next = Some(start.clone());
        while let Some(id) = next {
            let Some(forum) = by_id.remove(&id) else {
                break;
            };
            next = forum.parent_id.clone();
            chain.push(forum);
        }
        Self { forums: chain }
    }

    pub fn is_empty(&self) -> bool {
        self.forums.is_empty()
    }

    /// Number of ancestors above the forum (0 for a root forum)
    pub fn depth(&self) -> usize {
        self.forums.len().saturating_sub(1)
    }

    pub fn forum(&self) -> Option<&Forum> {
        self.forums.first()
    }

    pub fn ids(&self) -> Vec<ForumId> {
        self.forums.iter().map(|f| f.id.clone()).collect()
    }

    pub fn contains(&self, id: &ForumId) -> bool {
        self.forums.iter().any(|f| &f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Forum> {
        self.forums.iter()
    }
}
