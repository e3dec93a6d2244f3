//! Closed action vocabularies, one enum per governed resource type
//!
//! Instance-level actions are decided against a specific resource's resolved
//! permissions plus ownership; class-level actions only need the actor's
//! global permissions.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Category,
    Forum,
    Thread,
    Post,
    Group,
    User,
}

impl ResourceType {
    pub const ALL: &'static [Self] = &[
        Self::Category,
        Self::Forum,
        Self::Thread,
        Self::Post,
        Self::Group,
        Self::User,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Forum => "forum",
            Self::Thread => "thread",
            Self::Post => "post",
            Self::Group => "group",
            Self::User => "user",
        }
    }

    /// Storage table holding this resource type
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Forum => "forums",
            Self::Thread => "threads",
            Self::Post => "posts",
            Self::Group => "groups",
            Self::User => "users",
        }
    }

    /// Column compared against the actor for `_own` actions
    #[must_use]
    pub const fn owner_column(self) -> Option<&'static str> {
        match self {
            Self::Thread | Self::Post => Some("user_id"),
            Self::User => Some("id"),
            Self::Category | Self::Forum | Self::Group => None,
        }
    }

    /// Column naming the forum whose resolved permissions govern a row
    #[must_use]
    pub const fn forum_column(self) -> Option<&'static str> {
        match self {
            Self::Forum => Some("id"),
            Self::Category | Self::Thread | Self::Post => Some("forum_id"),
            Self::Group | Self::User => None,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common surface of every action enum
pub trait ActionName: Copy + fmt::Debug + Send + Sync + 'static {
    const ALL: &'static [Self];

    fn as_str(self) -> &'static str;

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|action| action.as_str() == name)
    }
}

macro_rules! action_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl ActionName for $name {
            const ALL: &'static [Self] = &[$(Self::$variant,)+];

            fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

action_enum!(CategoryAction {
    View => "view",
    Edit => "edit",
    Delete => "delete",
});

action_enum!(ForumAction {
    View => "view",
    Edit => "edit",
    Delete => "delete",
    EditPermissions => "edit_permissions",
    CreateSubforum => "create_subforum",
    CreateThread => "create_thread",
    CreateCategory => "create_category",
});

action_enum!(ThreadAction {
    View => "view",
    Edit => "edit",
    Delete => "delete",
    Reply => "reply",
    Merge => "merge",
    Pin => "pin",
    Close => "close",
});

action_enum!(PostAction {
    View => "view",
    Edit => "edit",
    Delete => "delete",
    Move => "move",
});

action_enum!(GroupAction {
    View => "view",
    Edit => "edit",
    Delete => "delete",
    EditPermissions => "edit_permissions",
    Assign => "assign",
});

action_enum!(UserAction {
    View => "view",
    Edit => "edit",
    Ban => "ban",
    EditPermissions => "edit_permissions",
    EditGroups => "edit_groups",
    Delete => "delete",
});

action_enum!(
    /// Decisions that do not depend on a specific instance
    ClassAction {
        ListCategories => "list_categories",
        CreateCategory => "create_category",
        ListForums => "list_forums",
        CreateForum => "create_forum",
        ListThreads => "list_threads",
        ListPosts => "list_posts",
        ListGroups => "list_groups",
        CreateGroup => "create_group",
        ListUsers => "list_users",
        CreateUser => "create_user",
    }
);

impl ClassAction {
    #[must_use]
    pub const fn resource_type(self) -> ResourceType {
        match self {
            Self::ListCategories | Self::CreateCategory => ResourceType::Category,
            Self::ListForums | Self::CreateForum => ResourceType::Forum,
            Self::ListThreads => ResourceType::Thread,
            Self::ListPosts => ResourceType::Post,
            Self::ListGroups | Self::CreateGroup => ResourceType::Group,
            Self::ListUsers | Self::CreateUser => ResourceType::User,
        }
    }
}
