//! Test helpers and fixtures for agora-core unit tests

use std::sync::Arc;

use crate::{
    config::PermissionConfig,
    models::{Group, PermissionKey, PermissionSet, TriState},
    repository::MemoryStore,
    service::{PermissionService, Stores},
};

/// A service over a fresh in-memory store with default configuration
pub fn memory_service() -> (Arc<MemoryStore>, PermissionService) {
    memory_service_with(PermissionConfig::default())
}

pub fn memory_service_with(config: PermissionConfig) -> (Arc<MemoryStore>, PermissionService) {
    let store = Arc::new(MemoryStore::new());
    let service = PermissionService::new(Stores::memory(store.clone()), config);
    (store, service)
}

/// Unresolved set from (key, value) pairs; everything else inherits
pub fn permission_set(pairs: &[(PermissionKey, TriState)]) -> PermissionSet {
    PermissionSet::from_pairs(pairs.iter().copied())
}

pub fn allow(keys: &[PermissionKey]) -> PermissionSet {
    PermissionSet::from_pairs(keys.iter().map(|key| (*key, TriState::Allow)))
}

/// Group fixture
pub fn group(name: &str, level: i32, permissions: PermissionSet) -> Group {
    Group::new(name, level).with_permissions(permissions)
}
