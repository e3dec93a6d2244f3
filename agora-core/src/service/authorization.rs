//! Action tables for every governed resource type
//!
//! Each resource type answers its instance actions twice: directly, by
//! `match` over a resolved permission set, and as a [`Predicate`] that
//! storage can evaluate for many rows at once. The two forms must agree for
//! every input.

use crate::{
    models::{
        ActionName, Category, CategoryAction, ClassAction, Forum, ForumAction, ForumId, Group,
        GroupAction, PermissionKey as K, Post, PostAction, ResolvedPermissions, ResourceType,
        Thread, ThreadAction, User, UserAction, UserId,
    },
    repository::{Flag, Predicate, PredicateContext},
};

/// Which resolved set governs a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope<'a> {
    /// The actor's global permissions
    Global,
    /// The actor's resolved permissions in this forum
    Forum(&'a ForumId),
    /// Global permissions with `category_*` taken from the forum, if any
    Category(Option<&'a ForumId>),
}

pub trait Resource {
    type Action: ActionName;

    const TYPE: ResourceType;

    fn scope(&self) -> PermissionScope<'_>;

    /// Author or subject compared against the actor for `_own` actions
    fn owner_id(&self) -> Option<&UserId> {
        None
    }

    fn closed(&self) -> bool {
        false
    }

    fn pinned(&self) -> bool {
        false
    }

    /// Instance decision against the governing resolved set
    fn allows(action: Self::Action, ctx: &PredicateContext<'_>) -> bool;

    /// Storage-evaluable form of [`Resource::allows`]
    fn action_query(action: Self::Action) -> Predicate;

    fn context<'p>(&self, actor: &UserId, permissions: &'p ResolvedPermissions) -> PredicateContext<'p> {
        PredicateContext::new(permissions)
            .owned(self.owner_id() == Some(actor))
            .flags(self.closed(), self.pinned())
    }
}

impl Resource for Category {
    type Action = CategoryAction;
    const TYPE: ResourceType = ResourceType::Category;

    fn scope(&self) -> PermissionScope<'_> {
        PermissionScope::Category(self.forum_id.as_ref())
    }

    fn allows(action: CategoryAction, ctx: &PredicateContext<'_>) -> bool {
        let p = ctx.permissions;
        match action {
            CategoryAction::View => p.has(K::CategoryView),
            CategoryAction::Edit => p.has(K::CategoryEdit),
            CategoryAction::Delete => p.has(K::CategoryDelete),
        }
    }

    fn action_query(action: CategoryAction) -> Predicate {
        match action {
            CategoryAction::View => Predicate::perm(K::CategoryView),
            CategoryAction::Edit => Predicate::perm(K::CategoryEdit),
            CategoryAction::Delete => Predicate::perm(K::CategoryDelete),
        }
    }
}

impl Resource for Forum {
    type Action = ForumAction;
    const TYPE: ResourceType = ResourceType::Forum;

    fn scope(&self) -> PermissionScope<'_> {
        PermissionScope::Forum(&self.id)
    }

    fn allows(action: ForumAction, ctx: &PredicateContext<'_>) -> bool {
        let p = ctx.permissions;
        match action {
            ForumAction::View => p.has(K::ForumView),
            ForumAction::Edit => p.has(K::ForumEdit),
            ForumAction::Delete => p.has(K::ForumDelete),
            ForumAction::EditPermissions => p.has(K::ForumEditPermissions),
            ForumAction::CreateSubforum => p.has(K::ForumCreate),
            ForumAction::CreateThread => p.has(K::ThreadCreate),
            ForumAction::CreateCategory => p.has(K::CategoryCreate),
        }
    }

    fn action_query(action: ForumAction) -> Predicate {
        Predicate::perm(match action {
            ForumAction::View => K::ForumView,
            ForumAction::Edit => K::ForumEdit,
            ForumAction::Delete => K::ForumDelete,
            ForumAction::EditPermissions => K::ForumEditPermissions,
            ForumAction::CreateSubforum => K::ForumCreate,
            ForumAction::CreateThread => K::ThreadCreate,
            ForumAction::CreateCategory => K::CategoryCreate,
        })
    }
}

impl Resource for Thread {
    type Action = ThreadAction;
    const TYPE: ResourceType = ResourceType::Thread;

    fn scope(&self) -> PermissionScope<'_> {
        PermissionScope::Forum(&self.forum_id)
    }

    fn owner_id(&self) -> Option<&UserId> {
        Some(&self.user_id)
    }

    fn closed(&self) -> bool {
        self.closed
    }

    fn pinned(&self) -> bool {
        self.pinned
    }

    fn allows(action: ThreadAction, ctx: &PredicateContext<'_>) -> bool {
        let p = ctx.permissions;
        let open_or_allowed = !ctx.closed || p.has(K::ThreadEditClosed);
        match action {
            ThreadAction::View => p.has(K::ThreadView),
            ThreadAction::Edit => {
                let editable = if ctx.is_owner {
                    p.has(K::ThreadEditOwn) || p.has(K::ThreadEditAny)
                } else {
                    p.has(K::ThreadEditAny)
                };
                editable && open_or_allowed && (!ctx.pinned || p.has(K::ThreadEditPinned))
            }
            ThreadAction::Delete => {
                if ctx.is_owner {
                    p.has(K::ThreadDeleteOwn) || p.has(K::ThreadDeleteAny)
                } else {
                    p.has(K::ThreadDeleteAny)
                }
            }
            ThreadAction::Reply => p.has(K::PostCreate) && open_or_allowed,
            ThreadAction::Merge => p.has(K::ThreadMerge),
            ThreadAction::Pin => p.has(K::ThreadEditPinned),
            ThreadAction::Close => p.has(K::ThreadEditClosed),
        }
    }

    fn action_query(action: ThreadAction) -> Predicate {
        match action {
            ThreadAction::View => Predicate::perm(K::ThreadView),
            ThreadAction::Edit => Predicate::All(vec![
                Predicate::own_or_any(K::ThreadEditOwn, K::ThreadEditAny),
                Predicate::unless_flag(Flag::Closed, K::ThreadEditClosed),
                Predicate::unless_flag(Flag::Pinned, K::ThreadEditPinned),
            ]),
            ThreadAction::Delete => Predicate::own_or_any(K::ThreadDeleteOwn, K::ThreadDeleteAny),
            ThreadAction::Reply => Predicate::perm(K::PostCreate)
                .and(Predicate::unless_flag(Flag::Closed, K::ThreadEditClosed)),
            ThreadAction::Merge => Predicate::perm(K::ThreadMerge),
            ThreadAction::Pin => Predicate::perm(K::ThreadEditPinned),
            ThreadAction::Close => Predicate::perm(K::ThreadEditClosed),
        }
    }
}

impl Resource for Post {
    type Action = PostAction;
    const TYPE: ResourceType = ResourceType::Post;

    fn scope(&self) -> PermissionScope<'_> {
        PermissionScope::Forum(&self.forum_id)
    }

    fn owner_id(&self) -> Option<&UserId> {
        Some(&self.user_id)
    }

    fn allows(action: PostAction, ctx: &PredicateContext<'_>) -> bool {
        let p = ctx.permissions;
        match action {
            PostAction::View => p.has(K::PostView),
            PostAction::Edit => {
                p.has(K::PostEditAny) || (ctx.is_owner && p.has(K::PostEditOwn))
            }
            PostAction::Delete => {
                p.has(K::PostDeleteAny) || (ctx.is_owner && p.has(K::PostDeleteOwn))
            }
            PostAction::Move => p.has(K::PostMove),
        }
    }

    fn action_query(action: PostAction) -> Predicate {
        match action {
            PostAction::View => Predicate::perm(K::PostView),
            PostAction::Edit => Predicate::own_or_any(K::PostEditOwn, K::PostEditAny),
            PostAction::Delete => Predicate::own_or_any(K::PostDeleteOwn, K::PostDeleteAny),
            PostAction::Move => Predicate::perm(K::PostMove),
        }
    }
}

impl Resource for Group {
    type Action = GroupAction;
    const TYPE: ResourceType = ResourceType::Group;

    fn scope(&self) -> PermissionScope<'_> {
        PermissionScope::Global
    }

    fn allows(action: GroupAction, ctx: &PredicateContext<'_>) -> bool {
        ctx.permissions.has(group_key(action))
    }

    fn action_query(action: GroupAction) -> Predicate {
        Predicate::perm(group_key(action))
    }
}

const fn group_key(action: GroupAction) -> K {
    match action {
        GroupAction::View => K::GroupView,
        GroupAction::Edit => K::GroupEdit,
        GroupAction::Delete => K::GroupDelete,
        GroupAction::EditPermissions => K::GroupEditPermissions,
        GroupAction::Assign => K::GroupAssign,
    }
}

impl Resource for User {
    type Action = UserAction;
    const TYPE: ResourceType = ResourceType::User;

    fn scope(&self) -> PermissionScope<'_> {
        PermissionScope::Global
    }

    fn owner_id(&self) -> Option<&UserId> {
        Some(&self.id)
    }

    fn allows(action: UserAction, ctx: &PredicateContext<'_>) -> bool {
        let p = ctx.permissions;
        match action {
            UserAction::View => p.has(K::UserView),
            UserAction::Edit => {
                p.has(K::UserEditAny) || (ctx.is_owner && p.has(K::UserEditOwn))
            }
            // Nobody bans themselves
            UserAction::Ban => p.has(K::UserEditBan) && !ctx.is_owner,
            UserAction::EditPermissions => p.has(K::UserEditPermissions),
            UserAction::EditGroups => p.has(K::UserEditGroups),
            UserAction::Delete => p.has(K::UserDelete),
        }
    }

    fn action_query(action: UserAction) -> Predicate {
        match action {
            UserAction::View => Predicate::perm(K::UserView),
            UserAction::Edit => Predicate::own_or_any(K::UserEditOwn, K::UserEditAny),
            UserAction::Ban => Predicate::perm(K::UserEditBan).and(Predicate::IsOwner.not()),
            UserAction::EditPermissions => Predicate::perm(K::UserEditPermissions),
            UserAction::EditGroups => Predicate::perm(K::UserEditGroups),
            UserAction::Delete => Predicate::perm(K::UserDelete),
        }
    }
}

/// Class-level decisions only need the actor's global permissions
#[must_use]
pub fn allows_class(action: ClassAction, global: &ResolvedPermissions) -> bool {
    global.has(match action {
        ClassAction::ListCategories => K::CategoryView,
        ClassAction::CreateCategory => K::CategoryCreate,
        ClassAction::ListForums => K::ForumView,
        ClassAction::CreateForum => K::ForumCreate,
        ClassAction::ListThreads => K::ThreadView,
        ClassAction::ListPosts => K::PostView,
        ClassAction::ListGroups => K::GroupView,
        ClassAction::CreateGroup => K::GroupCreate,
        ClassAction::ListUsers => K::UserView,
        ClassAction::CreateUser => K::UserCreate,
    })
}
