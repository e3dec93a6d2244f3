//! Governed content resources
//!
//! Only the fields the permission engine consumes are modelled here.

use serde::{Deserialize, Serialize};

use super::id::{CategoryId, ForumId, PostId, ThreadId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    /// Categories attached to a forum take `category_*` from that forum
    pub forum_id: Option<ForumId>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub forum_id: ForumId,
    /// Author
    pub user_id: UserId,
    pub title: String,
    pub closed: bool,
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub thread_id: ThreadId,
    /// Denormalized from the thread
    pub forum_id: ForumId,
    /// Author
    pub user_id: UserId,
}
