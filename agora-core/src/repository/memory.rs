//! In-memory implementation of every store trait
//!
//! Used for embedding the engine without PostgreSQL and as the test double
//! for whole-engine tests. Deleting a group cascades to memberships and
//! forum overrides the way the foreign keys do.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::store::{CacheProbe, ForumStore, GroupStore, ParsedPermissionStore, UserStore};
use crate::{
    models::{
        sort_by_priority, AncestorChain, Forum, ForumId, ForumPermissionOverride, Group, GroupId,
        OverrideSubject, ParsedPermission, PermissionSet, ResolvedPermissions, User, UserId,
    },
    Error, Result,
};

#[derive(Default)]
struct State {
    groups: HashMap<GroupId, Group>,
    users: HashMap<UserId, User>,
    memberships: HashSet<(UserId, GroupId)>,
    forums: HashMap<ForumId, Forum>,
    overrides: HashMap<(ForumId, OverrideSubject), PermissionSet>,
    parsed: HashMap<(ForumId, UserId), ResolvedPermissions>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    upserts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parsed rows written since creation
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::Relaxed)
    }

    /// Number of parsed rows currently cached
    pub fn parsed_len(&self) -> usize {
        self.state.read().parsed.len()
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn get(&self, id: &GroupId) -> Result<Option<Group>> {
        Ok(self.state.read().groups.get(id).cloned())
    }

    async fn get_many(&self, ids: &[GroupId]) -> Result<Vec<Group>> {
        let state = self.state.read();
        let mut groups: Vec<Group> = ids.iter().filter_map(|id| state.groups.get(id).cloned()).collect();
        sort_by_priority(&mut groups);
        Ok(groups)
    }

    async fn list(&self) -> Result<Vec<Group>> {
        let mut groups: Vec<Group> = self.state.read().groups.values().cloned().collect();
        sort_by_priority(&mut groups);
        Ok(groups)
    }

    async fn save(&self, group: &Group) -> Result<Group> {
        self.state.write().groups.insert(group.id.clone(), group.clone());
        Ok(group.clone())
    }

    async fn delete(&self, id: &GroupId) -> Result<bool> {
        let mut state = self.state.write();
        let existed = state.groups.remove(id).is_some();
        state.memberships.retain(|(_, group_id)| group_id != id);
        state
            .overrides
            .retain(|(_, subject), _| subject != &OverrideSubject::Group(id.clone()));
        Ok(existed)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get(&self, id: &UserId) -> Result<Option<User>> {
        Ok(self.state.read().users.get(id).cloned())
    }

    async fn create(&self, user: &User) -> Result<User> {
        let mut state = self.state.write();
        if state.users.contains_key(&user.id) {
            return Err(Error::AlreadyExists(format!("User {} already exists", user.id)));
        }
        state.users.insert(user.id.clone(), user.clone());
        Ok(user.clone())
    }

    async fn group_ids(&self, id: &UserId) -> Result<Vec<GroupId>> {
        let state = self.state.read();
        let mut ids: Vec<GroupId> = state
            .memberships
            .iter()
            .filter(|(user_id, _)| user_id == id)
            .map(|(_, group_id)| group_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn add_group(&self, user_id: &UserId, group_id: &GroupId) -> Result<bool> {
        let mut state = self.state.write();
        if !state.users.contains_key(user_id) {
            return Err(Error::not_found("User", user_id));
        }
        if !state.groups.contains_key(group_id) {
            return Err(Error::not_found("Group", group_id));
        }
        Ok(state.memberships.insert((user_id.clone(), group_id.clone())))
    }

    async fn remove_group(&self, user_id: &UserId, group_id: &GroupId) -> Result<bool> {
        Ok(self
            .state
            .write()
            .memberships
            .remove(&(user_id.clone(), group_id.clone())))
    }

    async fn member_ids(&self, group_id: &GroupId) -> Result<Vec<UserId>> {
        let state = self.state.read();
        let mut ids: Vec<UserId> = state
            .memberships
            .iter()
            .filter(|(_, g)| g == group_id)
            .map(|(user_id, _)| user_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn set_permissions(&self, user_id: &UserId, permissions: &PermissionSet) -> Result<()> {
        let mut state = self.state.write();
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| Error::not_found("User", user_id))?;
        user.permissions = *permissions;
        Ok(())
    }

    async fn set_parsed_permissions(
        &self,
        user_id: &UserId,
        permissions: &ResolvedPermissions,
    ) -> Result<()> {
        let mut state = self.state.write();
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| Error::not_found("User", user_id))?;
        user.parsed_permissions = Some(*permissions);
        Ok(())
    }
}

#[async_trait]
impl ForumStore for MemoryStore {
    async fn get(&self, id: &ForumId) -> Result<Option<Forum>> {
        Ok(self.state.read().forums.get(id).cloned())
    }

    async fn create(&self, forum: &Forum) -> Result<Forum> {
        let mut state = self.state.write();
        if let Some(parent) = &forum.parent_id {
            if !state.forums.contains_key(parent) {
                return Err(Error::not_found("Forum", parent));
            }
        }
        state.forums.insert(forum.id.clone(), forum.clone());
        Ok(forum.clone())
    }

    async fn ancestors(&self, id: &ForumId) -> Result<AncestorChain> {
        let state = self.state.read();
        let mut forums = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id.clone());
        while let Some(current) = next {
            if !seen.insert(current.clone()) {
                break;
            }
            let Some(forum) = state.forums.get(&current) else {
                break;
            };
            next = forum.parent_id.clone();
            forums.push(forum.clone());
        }
        Ok(AncestorChain::from_unordered(id, forums))
    }

    async fn descendant_ids(&self, id: &ForumId) -> Result<Vec<ForumId>> {
        let state = self.state.read();
        if !state.forums.contains_key(id) {
            return Ok(Vec::new());
        }
        let mut found = vec![id.clone()];
        let mut seen: HashSet<ForumId> = found.iter().cloned().collect();
        let mut cursor = 0;
        while cursor < found.len() {
            let parent = found[cursor].clone();
            cursor += 1;
            for forum in state.forums.values() {
                if forum.parent_id.as_ref() == Some(&parent) && seen.insert(forum.id.clone()) {
                    found.push(forum.id.clone());
                }
            }
        }
        Ok(found)
    }

    async fn set_parent(&self, id: &ForumId, parent_id: Option<ForumId>) -> Result<()> {
        let mut state = self.state.write();
        let forum = state
            .forums
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Forum", id))?;
        forum.parent_id = parent_id;
        Ok(())
    }

    async fn overrides(
        &self,
        forum_ids: &[ForumId],
        user_id: &UserId,
        group_ids: &[GroupId],
    ) -> Result<Vec<ForumPermissionOverride>> {
        let state = self.state.read();
        let mut found = Vec::new();
        for forum_id in forum_ids {
            for group_id in group_ids {
                let subject = OverrideSubject::Group(group_id.clone());
                if let Some(set) = state.overrides.get(&(forum_id.clone(), subject.clone())) {
                    found.push(ForumPermissionOverride {
                        forum_id: forum_id.clone(),
                        subject,
                        permissions: *set,
                    });
                }
            }
            let subject = OverrideSubject::User(user_id.clone());
            if let Some(set) = state.overrides.get(&(forum_id.clone(), subject.clone())) {
                found.push(ForumPermissionOverride {
                    forum_id: forum_id.clone(),
                    subject,
                    permissions: *set,
                });
            }
        }
        Ok(found)
    }

    async fn save_override(&self, entry: &ForumPermissionOverride) -> Result<()> {
        let mut state = self.state.write();
        if !state.forums.contains_key(&entry.forum_id) {
            return Err(Error::not_found("Forum", &entry.forum_id));
        }
        state.overrides.insert(
            (entry.forum_id.clone(), entry.subject.clone()),
            entry.permissions,
        );
        Ok(())
    }

    async fn delete_override(&self, forum_id: &ForumId, subject: &OverrideSubject) -> Result<bool> {
        Ok(self
            .state
            .write()
            .overrides
            .remove(&(forum_id.clone(), subject.clone()))
            .is_some())
    }

    async fn forums_with_group_override(&self, group_id: &GroupId) -> Result<Vec<ForumId>> {
        let subject = OverrideSubject::Group(group_id.clone());
        let state = self.state.read();
        let mut ids: Vec<ForumId> = state
            .overrides
            .keys()
            .filter(|(_, s)| s == &subject)
            .map(|(forum_id, _)| forum_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl ParsedPermissionStore for MemoryStore {
    async fn get(&self, forum_id: &ForumId, user_id: &UserId) -> Result<Option<ResolvedPermissions>> {
        Ok(self
            .state
            .read()
            .parsed
            .get(&(forum_id.clone(), user_id.clone()))
            .copied())
    }

    async fn probe(&self, forum_ids: &[ForumId], user_id: &UserId) -> Result<Vec<CacheProbe>> {
        let state = self.state.read();
        Ok(forum_ids
            .iter()
            .map(|forum_id| CacheProbe {
                forum_id: forum_id.clone(),
                permissions: state.parsed.get(&(forum_id.clone(), user_id.clone())).copied(),
            })
            .collect())
    }

    async fn upsert(&self, row: &ParsedPermission) -> Result<()> {
        self.state
            .write()
            .parsed
            .insert((row.forum_id.clone(), row.user_id.clone()), row.permissions);
        self.upserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn upsert_many(&self, rows: &[ParsedPermission]) -> Result<()> {
        let mut state = self.state.write();
        for row in rows {
            state
                .parsed
                .insert((row.forum_id.clone(), row.user_id.clone()), row.permissions);
        }
        self.upserts.fetch_add(rows.len(), Ordering::Relaxed);
        Ok(())
    }

    async fn delete_forums(&self, forum_ids: &[ForumId]) -> Result<u64> {
        let targets: HashSet<&ForumId> = forum_ids.iter().collect();
        let mut state = self.state.write();
        let before = state.parsed.len();
        state.parsed.retain(|(forum_id, _), _| !targets.contains(forum_id));
        Ok((before - state.parsed.len()) as u64)
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<u64> {
        let mut state = self.state.write();
        let before = state.parsed.len();
        state.parsed.retain(|(_, u), _| u != user_id);
        Ok((before - state.parsed.len()) as u64)
    }
}
