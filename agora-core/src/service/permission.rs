//! Permission engine facade
//!
//! Resolution, cache-backed reads, authorization and every write path that
//! changes a permission input. Writers invalidate the affected cache scope;
//! readers rebuild it lazily.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::{
    cache::ParsedPermissionCache,
    config::PermissionConfig,
    metrics,
    models::{
        ActionName, Category, ClassAction, Forum, ForumId, ForumPermissionOverride, Group,
        GroupId, OverrideSubject, PermissionKey, PermissionSet, ResolvedPermissions, User, UserId,
    },
    repository::{ForumStore, GroupStore, MemoryStore, ParsedPermissionStore, Predicate, UserStore},
    service::{
        authorization::{allows_class, PermissionScope, Resource},
        forum_resolver::ForumResolver,
        group_aggregator::GroupAggregator,
    },
    Error, Result,
};

/// The storage the engine runs against
#[derive(Clone)]
pub struct Stores {
    pub groups: Arc<dyn GroupStore>,
    pub users: Arc<dyn UserStore>,
    pub forums: Arc<dyn ForumStore>,
    pub parsed: Arc<dyn ParsedPermissionStore>,
}

impl Stores {
    /// Every store backed by the same in-memory instance
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            groups: store.clone(),
            users: store.clone(),
            forums: store.clone(),
            parsed: store,
        }
    }
}

/// A default-for-everyone group at the bottom of the chain and the keys it
/// leaves open; those keys resolve to deny for users without other grants
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FloorEntry {
    pub group_id: GroupId,
    pub group_name: String,
    pub level: i32,
    pub inherited: Vec<PermissionKey>,
}

#[derive(Clone)]
pub struct PermissionService {
    stores: Stores,
    aggregator: GroupAggregator,
    cache: ParsedPermissionCache,
    config: PermissionConfig,
}

impl std::fmt::Debug for PermissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionService")
            .field("config", &self.config)
            .finish()
    }
}

impl PermissionService {
    #[must_use]
    pub fn new(stores: Stores, config: PermissionConfig) -> Self {
        let aggregator = GroupAggregator::new(stores.groups.clone(), stores.users.clone());
        let resolver = ForumResolver::new(stores.forums.clone(), aggregator.clone());
        let cache =
            ParsedPermissionCache::new(stores.parsed.clone(), resolver, config.batch_max_passes);
        Self {
            stores,
            aggregator,
            cache,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PermissionConfig {
        &self.config
    }

    #[must_use]
    pub const fn cache(&self) -> &ParsedPermissionCache {
        &self.cache
    }

    // ---- resolution ----

    /// Recompute and persist the user's global permissions
    pub async fn resolve_user_permissions(&self, user_id: &UserId) -> Result<ResolvedPermissions> {
        self.aggregator.resolve(user_id).await
    }

    /// The persisted global permissions, computed on first use
    pub async fn user_permissions(&self, user_id: &UserId) -> Result<ResolvedPermissions> {
        self.aggregator.current(user_id).await
    }

    /// Cache-backed forum resolution
    pub async fn resolve_forum_permissions(
        &self,
        forum_id: &ForumId,
        user_id: &UserId,
    ) -> Result<ResolvedPermissions> {
        self.cache.get(forum_id, user_id).await
    }

    /// Category permissions: global, with `category_*` from the attached
    /// forum when there is one
    pub async fn resolve_category_permissions(
        &self,
        category: &Category,
        user_id: &UserId,
    ) -> Result<ResolvedPermissions> {
        self.scoped_permissions(category.scope(), user_id).await
    }

    async fn scoped_permissions(
        &self,
        scope: PermissionScope<'_>,
        user_id: &UserId,
    ) -> Result<ResolvedPermissions> {
        match scope {
            PermissionScope::Global | PermissionScope::Category(None) => {
                self.user_permissions(user_id).await
            }
            PermissionScope::Forum(forum_id) => self.resolve_forum_permissions(forum_id, user_id).await,
            PermissionScope::Category(Some(forum_id)) => {
                let global = self.user_permissions(user_id).await?;
                let forum = self.resolve_forum_permissions(forum_id, user_id).await?;
                Ok(with_category_keys(global, &forum))
            }
        }
    }

    // ---- authorization ----

    pub async fn authorize<R: Resource>(
        &self,
        actor: &UserId,
        action: R::Action,
        resource: &R,
    ) -> Result<bool> {
        let permissions = self.scoped_permissions(resource.scope(), actor).await?;
        let allowed = R::allows(action, &resource.context(actor, &permissions));

        metrics::authorization::record(R::TYPE.as_str(), allowed);
        tracing::debug!(
            actor = %actor,
            resource = R::TYPE.as_str(),
            action = action.as_str(),
            allowed,
            "Authorization decision"
        );
        Ok(allowed)
    }

    pub async fn authorize_class(&self, actor: &UserId, action: ClassAction) -> Result<bool> {
        let global = self.user_permissions(actor).await?;
        let allowed = allows_class(action, &global);
        metrics::authorization::record(action.resource_type().as_str(), allowed);
        Ok(allowed)
    }

    /// String-named instance lookup; undeclared names follow
    /// `unknown_action_policy`
    pub async fn authorize_named<R: Resource>(
        &self,
        actor: &UserId,
        name: &str,
        resource: &R,
    ) -> Result<bool> {
        match R::Action::parse(name) {
            Some(action) => self.authorize(actor, action, resource).await,
            None => Ok(self.unknown_action(R::TYPE.as_str(), name)),
        }
    }

    pub async fn authorize_class_named(&self, actor: &UserId, name: &str) -> Result<bool> {
        match ClassAction::parse(name) {
            Some(action) => self.authorize_class(actor, action).await,
            None => Ok(self.unknown_action("class", name)),
        }
    }

    fn unknown_action(&self, resource: &str, name: &str) -> bool {
        let allowed = self.config.unknown_action_policy.allows();
        tracing::warn!(
            resource,
            action = name,
            allowed,
            "Authorization requested for an undeclared action"
        );
        metrics::authorization::record(resource, allowed);
        allowed
    }

    /// Storage predicate equivalent to [`Self::authorize`] for the action
    #[must_use]
    pub fn action_query<R: Resource>(action: R::Action) -> Predicate {
        R::action_query(action)
    }

    /// Instance decision for many resources with one batch cache read
    pub async fn filter_authorized<'r, R: Resource>(
        &self,
        actor: &UserId,
        action: R::Action,
        resources: &'r [R],
    ) -> Result<Vec<&'r R>> {
        let mut forum_ids = Vec::new();
        let mut needs_global = false;
        for resource in resources {
            match resource.scope() {
                PermissionScope::Forum(id) => forum_ids.push(id.clone()),
                PermissionScope::Category(Some(id)) => {
                    forum_ids.push(id.clone());
                    needs_global = true;
                }
                PermissionScope::Global | PermissionScope::Category(None) => needs_global = true,
            }
        }

        let by_forum = self.cache.get_many(&forum_ids, actor).await?;
        let global = if needs_global {
            Some(self.user_permissions(actor).await?)
        } else {
            None
        };

        let mut allowed = Vec::with_capacity(resources.len());
        for resource in resources {
            let permissions = match (resource.scope(), global) {
                (PermissionScope::Forum(id), _) => by_forum.get(id).copied(),
                (PermissionScope::Category(Some(id)), Some(global)) => {
                    by_forum.get(id).map(|forum| with_category_keys(global, forum))
                }
                (_, global) => global,
            };
            let permissions = permissions
                .ok_or_else(|| Error::Internal("Batch read returned an incomplete result".into()))?;
            let decision = R::allows(action, &resource.context(actor, &permissions));
            metrics::authorization::record(R::TYPE.as_str(), decision);
            if decision {
                allowed.push(resource);
            }
        }
        Ok(allowed)
    }

    // ---- invalidation ----

    /// Drop the cache rows of exactly this forum
    pub async fn invalidate_forum(&self, forum_id: &ForumId) -> Result<u64> {
        self.cache.invalidate_forum(forum_id, "forum").await
    }

    /// Drop the cache rows of the forum and every forum below it
    pub async fn invalidate_forum_tree(&self, forum_id: &ForumId) -> Result<u64> {
        let ids = self.stores.forums.descendant_ids(forum_id).await?;
        self.cache.invalidate_forums(&ids, "forum_tree").await
    }

    /// Recompute the user's global permissions and, with
    /// `cascade_global_edits`, drop their forum rows
    pub async fn invalidate_user(&self, user_id: &UserId) -> Result<ResolvedPermissions> {
        let resolved = self.aggregator.resolve(user_id).await?;
        if self.config.cascade_global_edits {
            self.cache.invalidate_user(user_id, "user").await?;
        }
        Ok(resolved)
    }

    // ---- write paths ----

    /// Create a user, join the groups that are default for `channel` and
    /// compute their global permissions
    pub async fn create_user(&self, user: &User, channel: &str) -> Result<User> {
        let mut created = self.stores.users.create(user).await?;

        let mut joined = 0;
        for group in self.stores.groups.list().await? {
            if group.is_default_for(channel) {
                self.stores.users.add_group(&created.id, &group.id).await?;
                joined += 1;
            }
        }

        created.parsed_permissions = Some(self.invalidate_user(&created.id).await?);
        tracing::info!(user_id = %created.id, channel, groups = joined, "User created");
        Ok(created)
    }

    pub async fn add_user_to_group(&self, user_id: &UserId, group_id: &GroupId) -> Result<bool> {
        let added = self.stores.users.add_group(user_id, group_id).await?;
        if added {
            self.invalidate_user(user_id).await?;
            tracing::info!(user_id = %user_id, group_id = %group_id, "User added to group");
        }
        Ok(added)
    }

    pub async fn remove_user_from_group(&self, user_id: &UserId, group_id: &GroupId) -> Result<bool> {
        let removed = self.stores.users.remove_group(user_id, group_id).await?;
        if removed {
            self.invalidate_user(user_id).await?;
            tracing::info!(user_id = %user_id, group_id = %group_id, "User removed from group");
        }
        Ok(removed)
    }

    pub async fn set_user_permissions(
        &self,
        user_id: &UserId,
        permissions: &PermissionSet,
    ) -> Result<ResolvedPermissions> {
        self.stores.users.set_permissions(user_id, permissions).await?;
        self.invalidate_user(user_id).await
    }

    /// Create or edit a group and recompute every member
    pub async fn save_group(&self, group: &Group) -> Result<Group> {
        let saved = self.stores.groups.save(group).await?;
        let members = self.stores.users.member_ids(&saved.id).await?;
        for member in &members {
            self.invalidate_user(member).await?;
        }
        tracing::info!(group_id = %saved.id, members = members.len(), "Group saved");
        Ok(saved)
    }

    /// Delete a group, recompute its former members and invalidate every
    /// forum subtree its overrides touched
    pub async fn delete_group(&self, group_id: &GroupId) -> Result<bool> {
        let members = self.stores.users.member_ids(group_id).await?;
        let forums = self.stores.forums.forums_with_group_override(group_id).await?;

        if !self.stores.groups.delete(group_id).await? {
            return Ok(false);
        }

        for member in &members {
            self.invalidate_user(member).await?;
        }
        let mut affected = HashSet::new();
        for forum_id in &forums {
            affected.extend(self.stores.forums.descendant_ids(forum_id).await?);
        }
        let affected: Vec<ForumId> = affected.into_iter().collect();
        self.cache.invalidate_forums(&affected, "group_deleted").await?;

        tracing::info!(
            group_id = %group_id,
            members = members.len(),
            forums = forums.len(),
            "Group deleted"
        );
        Ok(true)
    }

    pub async fn set_forum_group_permissions(
        &self,
        forum_id: &ForumId,
        group_id: &GroupId,
        permissions: PermissionSet,
    ) -> Result<()> {
        let entry = ForumPermissionOverride::for_group(forum_id.clone(), group_id.clone(), permissions);
        self.stores.forums.save_override(&entry).await?;
        self.invalidate_forum_tree(forum_id).await?;
        Ok(())
    }

    pub async fn set_forum_user_permissions(
        &self,
        forum_id: &ForumId,
        user_id: &UserId,
        permissions: PermissionSet,
    ) -> Result<()> {
        let entry = ForumPermissionOverride::for_user(forum_id.clone(), user_id.clone(), permissions);
        self.stores.forums.save_override(&entry).await?;
        self.invalidate_forum_tree(forum_id).await?;
        Ok(())
    }

    pub async fn clear_forum_group_permissions(
        &self,
        forum_id: &ForumId,
        group_id: &GroupId,
    ) -> Result<bool> {
        self.clear_override(forum_id, &OverrideSubject::Group(group_id.clone()))
            .await
    }

    pub async fn clear_forum_user_permissions(
        &self,
        forum_id: &ForumId,
        user_id: &UserId,
    ) -> Result<bool> {
        self.clear_override(forum_id, &OverrideSubject::User(user_id.clone()))
            .await
    }

    async fn clear_override(&self, forum_id: &ForumId, subject: &OverrideSubject) -> Result<bool> {
        let deleted = self.stores.forums.delete_override(forum_id, subject).await?;
        if deleted {
            self.invalidate_forum_tree(forum_id).await?;
        }
        Ok(deleted)
    }

    pub async fn create_forum(&self, forum: &Forum) -> Result<Forum> {
        let created = self.stores.forums.create(forum).await?;
        tracing::info!(forum_id = %created.id, parent_id = ?created.parent_id, "Forum created");
        Ok(created)
    }

    /// Re-parent a forum. Moving a forum below itself is rejected.
    pub async fn move_forum(&self, forum_id: &ForumId, new_parent: Option<ForumId>) -> Result<()> {
        if self.stores.forums.get(forum_id).await?.is_none() {
            return Err(Error::not_found("Forum", forum_id));
        }
        if let Some(parent) = &new_parent {
            let chain = self.stores.forums.ancestors(parent).await?;
            if chain.is_empty() {
                return Err(Error::not_found("Forum", parent));
            }
            if chain.contains(forum_id) {
                return Err(Error::InvalidInput(format!(
                    "Moving forum {forum_id} under {parent} would create a cycle"
                )));
            }
        }

        self.stores.forums.set_parent(forum_id, new_parent.clone()).await?;
        let deleted = self.invalidate_forum_tree(forum_id).await?;
        tracing::info!(forum_id = %forum_id, parent_id = ?new_parent, deleted, "Forum moved");
        Ok(())
    }

    // ---- audit ----

    /// Lowest-level default-for-everyone groups and the keys they leave open
    pub async fn floor_report(&self) -> Result<Vec<FloorEntry>> {
        let defaults: Vec<Group> = self
            .stores
            .groups
            .list()
            .await?
            .into_iter()
            .filter(Group::is_default_for_all)
            .collect();
        let Some(lowest) = defaults.iter().map(|g| g.level).min() else {
            tracing::warn!("No group is default for every user; all keys fall to deny");
            return Ok(Vec::new());
        };

        let report: Vec<FloorEntry> = defaults
            .into_iter()
            .filter(|g| g.level == lowest)
            .map(|g| FloorEntry {
                inherited: g.permissions.unresolved_keys(),
                group_id: g.id,
                group_name: g.name,
                level: g.level,
            })
            .collect();

        for entry in report.iter().filter(|e| !e.inherited.is_empty()) {
            tracing::warn!(
                group_id = %entry.group_id,
                keys = entry.inherited.len(),
                "Floor group leaves keys unresolved; they resolve to deny"
            );
        }
        Ok(report)
    }
}

/// `global` with every `category_*` key replaced by the forum's value
fn with_category_keys(global: ResolvedPermissions, forum: &ResolvedPermissions) -> ResolvedPermissions {
    let mut merged = global;
    for (key, value) in forum.iter().filter(|(key, _)| key.is_category_key()) {
        merged.set(key, value);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnknownActionPolicy;
    use crate::models::{CategoryId, TriState, DEFAULT_FOR_ALL};
    use crate::test_helpers::{allow, group, memory_service, memory_service_with, permission_set};

    #[test]
    fn test_category_keys_come_from_forum() {
        let global = ResolvedPermissions::deny_all().with(PermissionKey::UserView, true);
        let forum = ResolvedPermissions::allow_all().with(PermissionKey::CategoryDelete, false);
        let merged = with_category_keys(global, &forum);

        assert!(merged.get(PermissionKey::CategoryView));
        assert!(!merged.get(PermissionKey::CategoryDelete));
        assert!(merged.get(PermissionKey::UserView));
        assert!(!merged.get(PermissionKey::ForumView));
    }

    #[tokio::test]
    async fn test_unknown_action_policy() {
        let (store, service) = memory_service();
        let user = service.create_user(&User::new("alice"), "password").await.unwrap();
        let category = Category {
            id: CategoryId::new(),
            forum_id: None,
            name: "c".into(),
        };

        assert!(!service.authorize_named(&user.id, "teleport", &category).await.unwrap());

        let permissive = PermissionService::new(
            Stores::memory(store),
            PermissionConfig {
                unknown_action_policy: UnknownActionPolicy::Allow,
                ..PermissionConfig::default()
            },
        );
        assert!(permissive.authorize_named(&user.id, "teleport", &category).await.unwrap());
        assert!(permissive.authorize_class_named(&user.id, "teleport").await.unwrap());
        // Declared names are still decided normally
        assert!(!permissive.authorize_named(&user.id, "view", &category).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_user_joins_default_groups() {
        let (_, service) = memory_service();
        service
            .save_group(&group("everyone", 0, allow(&[PermissionKey::ForumView])).default_for(DEFAULT_FOR_ALL))
            .await
            .unwrap();
        service
            .save_group(&group("openid", 1, allow(&[PermissionKey::ThreadCreate])).default_for("openid"))
            .await
            .unwrap();

        let local = service.create_user(&User::new("a"), "password").await.unwrap();
        let external = service.create_user(&User::new("b"), "openid").await.unwrap();

        let local = local.parsed_permissions.unwrap();
        assert!(local.get(PermissionKey::ForumView));
        assert!(!local.get(PermissionKey::ThreadCreate));
        assert!(external.parsed_permissions.unwrap().get(PermissionKey::ThreadCreate));
    }

    #[tokio::test]
    async fn test_move_forum_rejects_cycles() {
        let (_, service) = memory_service();
        let root = service.create_forum(&Forum::new("root", None)).await.unwrap();
        let child = service
            .create_forum(&Forum::new("child", Some(root.id.clone())))
            .await
            .unwrap();

        let err = service
            .move_forum(&root.id, Some(child.id.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = service.move_forum(&root.id, Some(root.id.clone())).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        service.move_forum(&child.id, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_cascade_setting_controls_forum_rows() {
        for cascade in [true, false] {
            let (store, service) = memory_service_with(PermissionConfig {
                cascade_global_edits: cascade,
                ..PermissionConfig::default()
            });
            let user = service.create_user(&User::new("u"), "password").await.unwrap();
            let forum = service.create_forum(&Forum::new("f", None)).await.unwrap();
            service.resolve_forum_permissions(&forum.id, &user.id).await.unwrap();
            assert_eq!(store.parsed_len(), 1);

            service
                .set_user_permissions(
                    &user.id,
                    &permission_set(&[(PermissionKey::ForumView, TriState::Allow)]),
                )
                .await
                .unwrap();
            assert_eq!(store.parsed_len(), usize::from(!cascade));
        }
    }

    #[tokio::test]
    async fn test_floor_report_lists_open_keys() {
        let (_, service) = memory_service();
        service
            .save_group(&group("everyone", 0, allow(&[PermissionKey::ForumView])).default_for(DEFAULT_FOR_ALL))
            .await
            .unwrap();
        service
            .save_group(&Group::new("admins", 100).default_for(DEFAULT_FOR_ALL))
            .await
            .unwrap();

        let report = service.floor_report().await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].group_name, "everyone");
        assert_eq!(report[0].inherited.len(), PermissionKey::COUNT - 1);
        assert!(!report[0].inherited.contains(&PermissionKey::ForumView));
    }
}
