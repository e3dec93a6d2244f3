//! Storage seams consumed by the permission engine
//!
//! Each trait has a PostgreSQL implementation in this module tree and an
//! in-memory one in [`super::memory`].

use async_trait::async_trait;

use crate::{
    models::{
        AncestorChain, Forum, ForumId, ForumPermissionOverride, Group, GroupId, OverrideSubject,
        ParsedPermission, PermissionSet, ResolvedPermissions, User, UserId,
    },
    Result,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn get(&self, id: &GroupId) -> Result<Option<Group>>;

    /// Fetch several groups in one round trip; unknown ids are skipped
    async fn get_many(&self, ids: &[GroupId]) -> Result<Vec<Group>>;

    async fn list(&self) -> Result<Vec<Group>>;

    /// Insert or replace
    async fn save(&self, group: &Group) -> Result<Group>;

    async fn delete(&self, id: &GroupId) -> Result<bool>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: &UserId) -> Result<Option<User>>;

    async fn create(&self, user: &User) -> Result<User>;

    async fn group_ids(&self, id: &UserId) -> Result<Vec<GroupId>>;

    /// Returns `false` when the membership already existed
    async fn add_group(&self, user_id: &UserId, group_id: &GroupId) -> Result<bool>;

    async fn remove_group(&self, user_id: &UserId, group_id: &GroupId) -> Result<bool>;

    async fn member_ids(&self, group_id: &GroupId) -> Result<Vec<UserId>>;

    /// Replace the per-user global override
    async fn set_permissions(&self, user_id: &UserId, permissions: &PermissionSet) -> Result<()>;

    /// Persist the resolved global permissions column
    async fn set_parsed_permissions(
        &self,
        user_id: &UserId,
        permissions: &ResolvedPermissions,
    ) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForumStore: Send + Sync {
    async fn get(&self, id: &ForumId) -> Result<Option<Forum>>;

    async fn create(&self, forum: &Forum) -> Result<Forum>;

    /// The forum and every ancestor in one fetch; empty when the forum is unknown
    async fn ancestors(&self, id: &ForumId) -> Result<AncestorChain>;

    /// The forum and every descendant in one fetch
    async fn descendant_ids(&self, id: &ForumId) -> Result<Vec<ForumId>>;

    async fn set_parent(&self, id: &ForumId, parent_id: Option<ForumId>) -> Result<()>;

    /// Overrides on any of `forum_ids` that apply to the user directly or to
    /// one of `group_ids`
    async fn overrides(
        &self,
        forum_ids: &[ForumId],
        user_id: &UserId,
        group_ids: &[GroupId],
    ) -> Result<Vec<ForumPermissionOverride>>;

    /// Insert or replace
    async fn save_override(&self, entry: &ForumPermissionOverride) -> Result<()>;

    async fn delete_override(&self, forum_id: &ForumId, subject: &OverrideSubject) -> Result<bool>;

    /// Forums carrying an override for the group
    async fn forums_with_group_override(&self, group_id: &GroupId) -> Result<Vec<ForumId>>;
}

/// One entry of a batch cache probe
#[derive(Debug, Clone, PartialEq)]
pub struct CacheProbe {
    pub forum_id: ForumId,
    /// `None` when no cache row exists
    pub permissions: Option<ResolvedPermissions>,
}

impl CacheProbe {
    pub fn exists(&self) -> bool {
        self.permissions.is_some()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParsedPermissionStore: Send + Sync {
    async fn get(&self, forum_id: &ForumId, user_id: &UserId) -> Result<Option<ResolvedPermissions>>;

    /// One row per requested forum, flagged by whether a cache row exists
    async fn probe(&self, forum_ids: &[ForumId], user_id: &UserId) -> Result<Vec<CacheProbe>>;

    /// Idempotent insert; a concurrent writer for the same key is not an error
    async fn upsert(&self, row: &ParsedPermission) -> Result<()>;

    /// [`ParsedPermissionStore::upsert`] for many rows in one transaction
    async fn upsert_many(&self, rows: &[ParsedPermission]) -> Result<()>;

    async fn delete_forums(&self, forum_ids: &[ForumId]) -> Result<u64>;

    async fn delete_user(&self, user_id: &UserId) -> Result<u64>;
}
