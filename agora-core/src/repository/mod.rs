pub(crate) mod columns;
pub mod forum;
pub mod group;
pub mod memory;
pub mod parsed_permission;
pub mod predicate;
pub mod store;
pub mod user;

pub use forum::ForumRepository;
pub use group::GroupRepository;
pub use memory::MemoryStore;
pub use parsed_permission::ParsedPermissionRepository;
pub use predicate::{Flag, Predicate, PredicateContext, RenderScope, PARSED_ALIAS, RESOURCE_ALIAS};
pub use store::{CacheProbe, ForumStore, GroupStore, ParsedPermissionStore, UserStore};
pub use user::UserRepository;
