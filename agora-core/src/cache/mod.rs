pub mod parsed_permission;

pub use parsed_permission::ParsedPermissionCache;
