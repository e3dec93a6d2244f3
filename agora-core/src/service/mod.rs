pub mod authorization;
pub mod authorized_query;
pub mod forum_resolver;
pub mod group_aggregator;
pub mod permission;

pub use authorization::{allows_class, PermissionScope, Resource};
pub use authorized_query::AuthorizedQuery;
pub use forum_resolver::{resolve_chain, ForumResolver};
pub use group_aggregator::{aggregate, GroupAggregator};
pub use permission::{FloorEntry, PermissionService, Stores};
