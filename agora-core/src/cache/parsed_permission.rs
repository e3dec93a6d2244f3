//! Materialized forum resolutions keyed by (forum, user)
//!
//! Rows are created lazily by readers and deleted by writers. There is no
//! process-local layer: every read goes to the shared store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{
    metrics,
    models::{ForumId, ParsedPermission, ResolvedPermissions, UserId},
    repository::ParsedPermissionStore,
    service::forum_resolver::ForumResolver,
    Result,
};

#[derive(Clone)]
pub struct ParsedPermissionCache {
    store: Arc<dyn ParsedPermissionStore>,
    resolver: ForumResolver,
    max_passes: u32,
}

impl std::fmt::Debug for ParsedPermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedPermissionCache")
            .field("max_passes", &self.max_passes)
            .finish()
    }
}

impl ParsedPermissionCache {
    pub fn new(store: Arc<dyn ParsedPermissionStore>, resolver: ForumResolver, max_passes: u32) -> Self {
        Self {
            store,
            resolver,
            max_passes: max_passes.max(1),
        }
    }

    /// Cached resolution, resolving and persisting it on a miss
    pub async fn get(&self, forum_id: &ForumId, user_id: &UserId) -> Result<ResolvedPermissions> {
        if let Some(permissions) = self.store.get(forum_id, user_id).await? {
            metrics::cache::PARSED_PERMISSION_HITS
                .with_label_values(&["point"])
                .inc();
            return Ok(permissions);
        }

        metrics::cache::PARSED_PERMISSION_MISSES
            .with_label_values(&["point"])
            .inc();
        let permissions = self.resolver.resolve(forum_id, user_id).await?;
        self.store
            .upsert(&ParsedPermission::new(forum_id.clone(), user_id.clone(), permissions))
            .await?;

        tracing::debug!(forum_id = %forum_id, user_id = %user_id, "Parsed permissions cached");
        Ok(permissions)
    }

    /// Batch read: probe every forum at once, resolve the missing ones in one
    /// transaction, then probe the missing ones again until none remain.
    ///
    /// When the pass ceiling is reached the freshly computed values are
    /// returned without another probe.
    pub async fn get_many(
        &self,
        forum_ids: &[ForumId],
        user_id: &UserId,
    ) -> Result<HashMap<ForumId, ResolvedPermissions>> {
        let mut seen = HashSet::new();
        let mut pending: Vec<ForumId> = forum_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect();
        let mut found = HashMap::with_capacity(pending.len());

        let mut pass = 0;
        while !pending.is_empty() {
            pass += 1;
            let probes = self.store.probe(&pending, user_id).await?;

            let mut missing = Vec::new();
            for probe in probes {
                match probe.permissions {
                    Some(permissions) => {
                        found.insert(probe.forum_id, permissions);
                    }
                    None => missing.push(probe.forum_id),
                }
            }
            metrics::cache::PARSED_PERMISSION_HITS
                .with_label_values(&["batch"])
                .inc_by((pending.len() - missing.len()) as f64);
            if missing.is_empty() {
                break;
            }
            metrics::cache::PARSED_PERMISSION_MISSES
                .with_label_values(&["batch"])
                .inc_by(missing.len() as f64);

            let computed = self.resolver.resolve_many(&missing, user_id).await?;
            let rows: Vec<ParsedPermission> = computed
                .iter()
                .map(|(forum_id, permissions)| {
                    ParsedPermission::new(forum_id.clone(), user_id.clone(), *permissions)
                })
                .collect();
            self.store.upsert_many(&rows).await?;

            if pass >= self.max_passes {
                tracing::warn!(
                    user_id = %user_id,
                    passes = pass,
                    unsettled = missing.len(),
                    "Batch permission read hit its pass ceiling"
                );
                found.extend(computed);
                break;
            }
            pending = missing;
        }

        Ok(found)
    }

    /// Drop every row for exactly these forums
    pub async fn invalidate_forums(&self, forum_ids: &[ForumId], reason: &str) -> Result<u64> {
        let deleted = self.store.delete_forums(forum_ids).await?;
        metrics::cache::INVALIDATED_ROWS
            .with_label_values(&[reason])
            .inc_by(deleted as f64);
        tracing::debug!(forums = forum_ids.len(), deleted, reason, "Invalidated forum permissions");
        Ok(deleted)
    }

    pub async fn invalidate_forum(&self, forum_id: &ForumId, reason: &str) -> Result<u64> {
        self.invalidate_forums(std::slice::from_ref(forum_id), reason)
            .await
    }

    /// Drop every row belonging to the user
    pub async fn invalidate_user(&self, user_id: &UserId, reason: &str) -> Result<u64> {
        let deleted = self.store.delete_user(user_id).await?;
        metrics::cache::INVALIDATED_ROWS
            .with_label_values(&[reason])
            .inc_by(deleted as f64);
        tracing::debug!(user_id = %user_id, deleted, reason, "Invalidated user permissions");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Forum, PermissionKey, User};
    use crate::repository::store::{
        CacheProbe, MockForumStore, MockGroupStore, MockParsedPermissionStore, MockUserStore,
    };
    use crate::models::AncestorChain;
    use crate::service::group_aggregator::GroupAggregator;

    fn resolver_for(user: &User, forum_ids: &[ForumId]) -> ForumResolver {
        let mut users = MockUserStore::new();
        let stored = user
            .clone()
            .with_parsed(ResolvedPermissions::deny_all().with(PermissionKey::ForumView, true));
        users.expect_get().returning(move |_| Ok(Some(stored.clone())));
        users.expect_group_ids().returning(|_| Ok(Vec::new()));

        let mut groups = MockGroupStore::new();
        groups.expect_get_many().returning(|_| Ok(Vec::new()));

        let mut forums = MockForumStore::new();
        let known: Vec<ForumId> = forum_ids.to_vec();
        forums.expect_ancestors().returning(move |id| {
            let mut forum = Forum::new("f", None);
            forum.id = id.clone();
            if known.contains(id) {
                Ok(AncestorChain::from_unordered(id, vec![forum]))
            } else {
                Ok(AncestorChain::default())
            }
        });
        forums.expect_overrides().returning(|_, _, _| Ok(Vec::new()));

        ForumResolver::new(
            Arc::new(forums),
            GroupAggregator::new(Arc::new(groups), Arc::new(users)),
        )
    }

    #[tokio::test]
    async fn test_hit_skips_resolution() {
        let user = User::new("alice");
        let forum = ForumId::new();

        let mut store = MockParsedPermissionStore::new();
        store
            .expect_get()
            .times(1)
            .returning(|_, _| Ok(Some(ResolvedPermissions::allow_all())));
        store.expect_upsert().never();

        // Resolver mocks carry no expectations, so any resolution would panic
        let resolver = ForumResolver::new(
            Arc::new(MockForumStore::new()),
            GroupAggregator::new(Arc::new(MockGroupStore::new()), Arc::new(MockUserStore::new())),
        );
        let cache = ParsedPermissionCache::new(Arc::new(store), resolver, 8);

        let permissions = cache.get(&forum, &user.id).await.unwrap();
        assert_eq!(permissions, ResolvedPermissions::allow_all());
    }

    #[tokio::test]
    async fn test_miss_resolves_and_persists() {
        let user = User::new("alice");
        let forum = ForumId::new();

        let mut store = MockParsedPermissionStore::new();
        store.expect_get().returning(|_, _| Ok(None));
        store
            .expect_upsert()
            .times(1)
            .withf(|row| row.permissions.get(PermissionKey::ForumView))
            .returning(|_| Ok(()));

        let cache = ParsedPermissionCache::new(
            Arc::new(store),
            resolver_for(&user, std::slice::from_ref(&forum)),
            8,
        );
        let permissions = cache.get(&forum, &user.id).await.unwrap();
        assert!(permissions.get(PermissionKey::ForumView));
        assert!(!permissions.get(PermissionKey::ForumDelete));
    }

    #[tokio::test]
    async fn test_batch_reprobes_until_settled() {
        let user = User::new("alice");
        let cached = ForumId::new();
        let missing = ForumId::new();

        let mut store = MockParsedPermissionStore::new();
        let mut seq = mockall::Sequence::new();
        let first = (cached.clone(), missing.clone());
        store
            .expect_probe()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|ids, _| ids.len() == 2)
            .returning(move |_, _| {
                Ok(vec![
                    CacheProbe {
                        forum_id: first.0.clone(),
                        permissions: Some(ResolvedPermissions::allow_all()),
                    },
                    CacheProbe {
                        forum_id: first.1.clone(),
                        permissions: None,
                    },
                ])
            });
        store
            .expect_upsert_many()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|rows| rows.len() == 1)
            .returning(|_| Ok(()));
        let second = missing.clone();
        store
            .expect_probe()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|ids, _| ids.len() == 1)
            .returning(move |_, _| {
                Ok(vec![CacheProbe {
                    forum_id: second.clone(),
                    permissions: Some(ResolvedPermissions::deny_all()),
                }])
            });

        let cache = ParsedPermissionCache::new(
            Arc::new(store),
            resolver_for(&user, &[cached.clone(), missing.clone()]),
            8,
        );
        let found = cache
            .get_many(&[cached.clone(), missing.clone(), cached.clone()], &user.id)
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[&cached], ResolvedPermissions::allow_all());
        assert_eq!(found[&missing], ResolvedPermissions::deny_all());
    }

    #[tokio::test]
    async fn test_batch_stops_at_pass_ceiling() {
        let user = User::new("alice");
        let forum = ForumId::new();

        // A concurrent writer keeps deleting the row
        let mut store = MockParsedPermissionStore::new();
        store.expect_probe().times(2).returning(|ids, _| {
            Ok(ids
                .iter()
                .map(|id| CacheProbe {
                    forum_id: id.clone(),
                    permissions: None,
                })
                .collect())
        });
        store.expect_upsert_many().times(2).returning(|_| Ok(()));

        let cache = ParsedPermissionCache::new(
            Arc::new(store),
            resolver_for(&user, std::slice::from_ref(&forum)),
            2,
        );
        let found = cache.get_many(std::slice::from_ref(&forum), &user.id).await.unwrap();
        assert!(found[&forum].get(PermissionKey::ForumView));
    }

    #[tokio::test]
    async fn test_invalidate_forum_deletes_rows() {
        let forum = ForumId::new();
        let mut store = MockParsedPermissionStore::new();
        let expected = forum.clone();
        store
            .expect_delete_forums()
            .times(1)
            .withf(move |ids| ids.len() == 1 && ids[0] == expected)
            .returning(|_| Ok(3));

        let resolver = ForumResolver::new(
            Arc::new(MockForumStore::new()),
            GroupAggregator::new(Arc::new(MockGroupStore::new()), Arc::new(MockUserStore::new())),
        );
        let cache = ParsedPermissionCache::new(Arc::new(store), resolver, 8);
        assert_eq!(cache.invalidate_forum(&forum, "test").await.unwrap(), 3);
    }
}
