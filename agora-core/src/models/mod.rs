pub mod action;
pub mod content;
pub mod forum;
pub mod group;
pub mod id;
pub mod parsed_permission;
pub mod permission;
pub mod user;

pub use action::{
    ActionName, CategoryAction, ClassAction, ForumAction, GroupAction, PostAction, ResourceType,
    ThreadAction, UserAction,
};
pub use content::{Category, Post, Thread};
pub use forum::{AncestorChain, Forum, ForumPermissionOverride, OverrideSubject};
pub use group::{sort_by_priority, Group, DEFAULT_FOR_ALL};
pub use id::{generate_id, CategoryId, ForumId, GroupId, PostId, ThreadId, UserId};
pub use parsed_permission::ParsedPermission;
pub use permission::{PermissionKey, PermissionSet, ResolvedPermissions, TriState};
pub use user::User;
