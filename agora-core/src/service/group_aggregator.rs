//! Global (forum-independent) permission resolution
//!
//! A user's groups are folded highest priority first, every key the groups
//! leave unresolved is denied, and the user's own override is laid on top.

use std::sync::Arc;
use std::time::Instant;

use crate::{
    metrics,
    models::{sort_by_priority, Group, PermissionSet, ResolvedPermissions, UserId},
    repository::{GroupStore, UserStore},
    Error, Result,
};

/// Resolve global permissions from a user's groups and personal override.
///
/// `groups` may be in any order.
#[must_use]
pub fn aggregate(groups: &[Group], user_override: &PermissionSet) -> ResolvedPermissions {
    let mut ranked: Vec<&Group> = groups.iter().collect();
    ranked.sort_by(|a, b| a.priority_cmp(b));

    let from_groups = PermissionSet::fold(ranked.iter().map(|g| &g.permissions));
    // Floor: whatever the lowest group leaves open is denied
    let floored = from_groups.resolve_or(false);
    floored.overlay(user_override)
}

#[derive(Clone)]
pub struct GroupAggregator {
    groups: Arc<dyn GroupStore>,
    users: Arc<dyn UserStore>,
}

impl std::fmt::Debug for GroupAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupAggregator").finish()
    }
}

impl GroupAggregator {
    pub fn new(groups: Arc<dyn GroupStore>, users: Arc<dyn UserStore>) -> Self {
        Self { groups, users }
    }

    /// The user's groups in merge order
    pub async fn ranked_groups(&self, user_id: &UserId) -> Result<Vec<Group>> {
        let ids = self.users.group_ids(user_id).await?;
        let mut groups = self.groups.get_many(&ids).await?;
        sort_by_priority(&mut groups);
        Ok(groups)
    }

    /// Recompute and persist the user's resolved global permissions
    pub async fn resolve(&self, user_id: &UserId) -> Result<ResolvedPermissions> {
        let started = Instant::now();
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| Error::not_found("User", user_id))?;
        let groups = self.ranked_groups(user_id).await?;

        let resolved = aggregate(&groups, &user.permissions);
        self.users.set_parsed_permissions(user_id, &resolved).await?;

        metrics::resolution::RESOLUTIONS_TOTAL
            .with_label_values(&["user"])
            .inc();
        metrics::resolution::RESOLUTION_DURATION
            .with_label_values(&["user"])
            .observe(started.elapsed().as_secs_f64());
        tracing::debug!(
            user_id = %user_id,
            groups = groups.len(),
            "Resolved global permissions"
        );

        Ok(resolved)
    }

    /// The persisted resolution, computing it first if the user has none yet
    pub async fn current(&self, user_id: &UserId) -> Result<ResolvedPermissions> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| Error::not_found("User", user_id))?;

        match user.parsed_permissions {
            Some(resolved) => Ok(resolved),
            None => self.resolve(user_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GroupId, PermissionKey, TriState, User};
    use crate::repository::store::{MockGroupStore, MockUserStore};

    fn group(id: &str, level: i32, pairs: &[(PermissionKey, TriState)]) -> Group {
        let mut group = Group::new(id, level);
        group.id = GroupId::from(id);
        group.permissions = PermissionSet::from_pairs(pairs.iter().copied());
        group
    }

    #[test]
    fn test_higher_level_wins() {
        let groups = vec![
            group("low", 5, &[(PermissionKey::ThreadCreate, TriState::Deny)]),
            group("high", 10, &[(PermissionKey::ThreadCreate, TriState::Allow)]),
        ];
        let resolved = aggregate(&groups, &PermissionSet::inherit_all());
        assert!(resolved.get(PermissionKey::ThreadCreate));
    }

    #[test]
    fn test_equal_levels_break_ties_by_id() {
        let groups = vec![
            group("bbbb", 7, &[(PermissionKey::PostMove, TriState::Deny)]),
            group("aaaa", 7, &[(PermissionKey::PostMove, TriState::Allow)]),
        ];
        let resolved = aggregate(&groups, &PermissionSet::inherit_all());
        assert!(resolved.get(PermissionKey::PostMove));
    }

    #[test]
    fn test_unresolved_keys_hit_the_floor() {
        let groups = vec![group("only", 1, &[(PermissionKey::ForumView, TriState::Allow)])];
        let resolved = aggregate(&groups, &PermissionSet::inherit_all());

        assert!(resolved.get(PermissionKey::ForumView));
        assert!(!resolved.get(PermissionKey::ForumDelete));
        assert!(!aggregate(&[], &PermissionSet::inherit_all()).get(PermissionKey::ForumView));
    }

    #[test]
    fn test_user_override_beats_groups_and_floor() {
        let groups = vec![group("g", 1, &[(PermissionKey::UserEditBan, TriState::Allow)])];
        let user_override = PermissionSet::inherit_all()
            .with(PermissionKey::UserEditBan, TriState::Deny)
            .with(PermissionKey::GroupCreate, TriState::Allow);
        let resolved = aggregate(&groups, &user_override);

        assert!(!resolved.get(PermissionKey::UserEditBan));
        assert!(resolved.get(PermissionKey::GroupCreate));
    }

    #[tokio::test]
    async fn test_resolve_persists_result() {
        let user = User::new("alice");
        let user_id = user.id.clone();

        let mut users = MockUserStore::new();
        let stored = user.clone();
        users.expect_get().returning(move |_| Ok(Some(stored.clone())));
        users
            .expect_group_ids()
            .returning(|_| Ok(vec![GroupId::from("members")]));
        users
            .expect_set_parsed_permissions()
            .times(1)
            .withf(|_, resolved| resolved.get(PermissionKey::ThreadView))
            .returning(|_, _| Ok(()));

        let mut groups = MockGroupStore::new();
        groups.expect_get_many().returning(|_| {
            Ok(vec![group("members", 1, &[(PermissionKey::ThreadView, TriState::Allow)])])
        });

        let aggregator = GroupAggregator::new(Arc::new(groups), Arc::new(users));
        let resolved = aggregator.resolve(&user_id).await.unwrap();
        assert!(resolved.get(PermissionKey::ThreadView));
        assert!(!resolved.get(PermissionKey::ThreadMerge));
    }

    #[tokio::test]
    async fn test_resolve_unknown_user_is_not_found() {
        let mut users = MockUserStore::new();
        users.expect_get().returning(|_| Ok(None));
        let aggregator = GroupAggregator::new(Arc::new(MockGroupStore::new()), Arc::new(users));

        let err = aggregator.resolve(&UserId::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
