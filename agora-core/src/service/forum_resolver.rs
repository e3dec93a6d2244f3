//! Forum-scoped permission resolution
//!
//! Walks a forum's ancestor chain nearest first. At each level the overrides
//! of the user's groups are folded in group priority order and the user's own
//! override is laid on top of them. A closer level beats any ancestor, and
//! keys still open after the root take the user's resolved global value.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::{
    metrics,
    models::{
        AncestorChain, ForumId, ForumPermissionOverride, Group, GroupId, OverrideSubject,
        PermissionSet, ResolvedPermissions, UserId,
    },
    repository::ForumStore,
    service::group_aggregator::GroupAggregator,
    Error, Result,
};

/// Resolve one forum for one user from pre-fetched inputs.
///
/// `ranked_groups` must already be in merge order; overrides for other
/// subjects or forums outside `chain` are ignored.
#[must_use]
pub fn resolve_chain(
    chain: &AncestorChain,
    overrides: &[ForumPermissionOverride],
    ranked_groups: &[Group],
    user_id: &UserId,
    floor: &ResolvedPermissions,
) -> ResolvedPermissions {
    let mut by_level: HashMap<(&ForumId, &OverrideSubject), &PermissionSet> = HashMap::new();
    for entry in overrides {
        by_level.insert((&entry.forum_id, &entry.subject), &entry.permissions);
    }

    let group_subjects: Vec<OverrideSubject> = ranked_groups
        .iter()
        .map(|g| OverrideSubject::Group(g.id.clone()))
        .collect();
    let user_subject = OverrideSubject::User(user_id.clone());

    let mut acc = PermissionSet::inherit_all();
    for forum in chain.iter() {
        let from_groups = PermissionSet::fold(
            group_subjects
                .iter()
                .filter_map(|subject| by_level.get(&(&forum.id, subject)).copied()),
        );
        let level = match by_level.get(&(&forum.id, &user_subject)) {
            Some(user_set) => user_set.merge(&from_groups),
            None => from_groups,
        };
        acc = acc.merge(&level);
        if acc.is_fully_resolved() {
            break;
        }
    }

    acc.resolve_with(floor)
}

#[derive(Clone)]
pub struct ForumResolver {
    forums: Arc<dyn ForumStore>,
    aggregator: GroupAggregator,
}

impl std::fmt::Debug for ForumResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForumResolver").finish()
    }
}

impl ForumResolver {
    pub fn new(forums: Arc<dyn ForumStore>, aggregator: GroupAggregator) -> Self {
        Self { forums, aggregator }
    }

    /// Resolve a single forum from source data; never consults the cache
    pub async fn resolve(&self, forum_id: &ForumId, user_id: &UserId) -> Result<ResolvedPermissions> {
        let mut resolved = self.resolve_many(std::slice::from_ref(forum_id), user_id).await?;
        resolved
            .pop()
            .map(|(_, permissions)| permissions)
            .ok_or_else(|| Error::not_found("Forum", forum_id))
    }

    /// Resolve several forums for one user, sharing the user's group and
    /// floor lookups. Unknown forums are an error.
    pub async fn resolve_many(
        &self,
        forum_ids: &[ForumId],
        user_id: &UserId,
    ) -> Result<Vec<(ForumId, ResolvedPermissions)>> {
        if forum_ids.is_empty() {
            return Ok(Vec::new());
        }
        let floor = self.aggregator.current(user_id).await?;
        let ranked = self.aggregator.ranked_groups(user_id).await?;
        let group_ids: Vec<GroupId> = ranked.iter().map(|g| g.id.clone()).collect();

        let mut resolved = Vec::with_capacity(forum_ids.len());
        for forum_id in forum_ids {
            let started = Instant::now();
            let chain = self.forums.ancestors(forum_id).await?;
            if chain.is_empty() {
                return Err(Error::not_found("Forum", forum_id));
            }
            let overrides = self
                .forums
                .overrides(&chain.ids(), user_id, &group_ids)
                .await?;

            let permissions = resolve_chain(&chain, &overrides, &ranked, user_id, &floor);

            metrics::resolution::RESOLUTIONS_TOTAL
                .with_label_values(&["forum"])
                .inc();
            metrics::resolution::RESOLUTION_DURATION
                .with_label_values(&["forum"])
                .observe(started.elapsed().as_secs_f64());
            tracing::debug!(
                forum_id = %forum_id,
                user_id = %user_id,
                depth = chain.depth(),
                overrides = overrides.len(),
                "Resolved forum permissions"
            );

            resolved.push((forum_id.clone(), permissions));
        }
        Ok(resolved)
    }
}
