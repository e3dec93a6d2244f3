//! Generated forum worlds shared by the integration suites
//!
//! A [`WorldPlan`] is plain data drawn by proptest. [`build_world`] replays it
//! through a [`PermissionService`], so the same plan works against the
//! in-memory store and PostgreSQL.

#![allow(dead_code)]

use agora_core::{
    models::{
        Category, CategoryId, Forum, Group, PermissionKey, PermissionSet, Post, PostId, Thread,
        ThreadId, TriState, User, DEFAULT_FOR_ALL,
    },
    service::PermissionService,
};
use proptest::{prelude::*, sample::Index};

pub const GROUPS: usize = 4;
pub const USERS: usize = 3;
pub const FORUMS: usize = 6;
pub const CATEGORIES: usize = 4;
pub const THREADS: usize = 8;
pub const POSTS_PER_THREAD: usize = 2;

#[derive(Debug, Clone)]
pub struct ForumPlan {
    /// Ignored for the first forum, which is always a root
    pub parent: Option<Index>,
    /// One slot per group
    pub group_overrides: Vec<Option<PermissionSet>>,
    /// One slot per user
    pub user_overrides: Vec<Option<PermissionSet>>,
}

#[derive(Debug, Clone)]
pub struct ThreadPlan {
    pub forum: Index,
    pub author: Index,
    pub closed: bool,
    pub pinned: bool,
    pub post_authors: Vec<Index>,
}

#[derive(Debug, Clone)]
pub struct WorldPlan {
    /// Level and permissions; the first group is default for everyone
    pub groups: Vec<(i32, PermissionSet)>,
    /// Override plus membership in each non-default group
    pub users: Vec<(PermissionSet, Vec<bool>)>,
    pub forums: Vec<ForumPlan>,
    /// Attached forum, or detached
    pub categories: Vec<Option<Index>>,
    pub threads: Vec<ThreadPlan>,
}

pub struct World {
    pub users: Vec<User>,
    pub forums: Vec<Forum>,
    pub categories: Vec<Category>,
    pub threads: Vec<Thread>,
    pub posts: Vec<Post>,
    pub groups: Vec<Group>,
}

/// Each key is set with probability `density`, then Allow or Deny evenly
pub fn permission_set(density: f64) -> impl Strategy<Value = PermissionSet> {
    prop::collection::vec(
        prop::option::weighted(density, any::<bool>()),
        PermissionKey::COUNT,
    )
    .prop_map(|values| {
        let mut set = PermissionSet::inherit_all();
        for (key, value) in PermissionKey::ALL.iter().zip(values) {
            if let Some(allow) = value {
                set.set(*key, if allow { TriState::Allow } else { TriState::Deny });
            }
        }
        set
    })
}

fn forum_plan() -> impl Strategy<Value = ForumPlan> {
    (
        prop::option::weighted(0.7, any::<Index>()),
        prop::collection::vec(prop::option::weighted(0.4, permission_set(0.3)), GROUPS),
        prop::collection::vec(prop::option::weighted(0.2, permission_set(0.2)), USERS),
    )
        .prop_map(|(parent, group_overrides, user_overrides)| ForumPlan {
            parent,
            group_overrides,
            user_overrides,
        })
}

fn thread_plan() -> impl Strategy<Value = ThreadPlan> {
    (
        any::<Index>(),
        any::<Index>(),
        prop::bool::weighted(0.4),
        prop::bool::weighted(0.4),
        prop::collection::vec(any::<Index>(), POSTS_PER_THREAD),
    )
        .prop_map(|(forum, author, closed, pinned, post_authors)| ThreadPlan {
            forum,
            author,
            closed,
            pinned,
            post_authors,
        })
}

pub fn world_plan() -> impl Strategy<Value = WorldPlan> {
    (
        prop::collection::vec((0..4i32, permission_set(0.6)), GROUPS),
        prop::collection::vec(
            (
                permission_set(0.1),
                prop::collection::vec(prop::bool::weighted(0.5), GROUPS - 1),
            ),
            USERS,
        ),
        prop::collection::vec(forum_plan(), FORUMS),
        prop::collection::vec(prop::option::weighted(0.5, any::<Index>()), CATEGORIES),
        prop::collection::vec(thread_plan(), THREADS),
    )
        .prop_map(|(groups, users, forums, categories, threads)| WorldPlan {
            groups,
            users,
            forums,
            categories,
            threads,
        })
}

/// Replay a plan through the service's write paths
pub async fn build_world(service: &PermissionService, plan: &WorldPlan) -> World {
    let mut groups = Vec::new();
    for (i, (level, permissions)) in plan.groups.iter().enumerate() {
        let group = Group::new(format!("group{i}"), *level).with_permissions(*permissions);
        let group = if i == 0 { group.default_for(DEFAULT_FOR_ALL) } else { group };
        groups.push(service.save_group(&group).await.unwrap());
    }

    let mut users = Vec::new();
    for (i, (permissions, memberships)) in plan.users.iter().enumerate() {
        let user = User::new(format!("user{i}")).with_permissions(*permissions);
        let user = service.create_user(&user, "password").await.unwrap();
        for (group, member) in groups[1..].iter().zip(memberships) {
            if *member {
                service.add_user_to_group(&user.id, &group.id).await.unwrap();
            }
        }
        users.push(user);
    }

    let mut forums: Vec<Forum> = Vec::new();
    for (i, forum_plan) in plan.forums.iter().enumerate() {
        let parent = match &forum_plan.parent {
            Some(index) if !forums.is_empty() => Some(index.get(&forums).id.clone()),
            _ => None,
        };
        let forum = service
            .create_forum(&Forum::new(format!("forum{i}"), parent))
            .await
            .unwrap();
        for (group, permissions) in groups.iter().zip(&forum_plan.group_overrides) {
            if let Some(permissions) = permissions {
                service
                    .set_forum_group_permissions(&forum.id, &group.id, *permissions)
                    .await
                    .unwrap();
            }
        }
        for (user, permissions) in users.iter().zip(&forum_plan.user_overrides) {
            if let Some(permissions) = permissions {
                service
                    .set_forum_user_permissions(&forum.id, &user.id, *permissions)
                    .await
                    .unwrap();
            }
        }
        forums.push(forum);
    }

    let categories = plan
        .categories
        .iter()
        .enumerate()
        .map(|(i, attached)| Category {
            id: CategoryId::new(),
            forum_id: attached.as_ref().map(|index| index.get(&forums).id.clone()),
            name: format!("category{i}"),
        })
        .collect();

    let mut threads = Vec::new();
    let mut posts = Vec::new();
    for (i, thread_plan) in plan.threads.iter().enumerate() {
        let thread = Thread {
            id: ThreadId::new(),
            forum_id: thread_plan.forum.get(&forums).id.clone(),
            user_id: thread_plan.author.get(&users).id.clone(),
            title: format!("thread{i}"),
            closed: thread_plan.closed,
            pinned: thread_plan.pinned,
        };
        for author in &thread_plan.post_authors {
            posts.push(Post {
                id: PostId::new(),
                thread_id: thread.id.clone(),
                forum_id: thread.forum_id.clone(),
                user_id: author.get(&users).id.clone(),
            });
        }
        threads.push(thread);
    }

    World {
        users,
        forums,
        categories,
        threads,
        posts,
        groups,
    }
}
