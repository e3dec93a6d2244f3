//! Permission algebra
//!
//! Every stored permission value is a [`TriState`]. Unresolved sets
//! ([`PermissionSet`]) may hold `Inherit` for any key; resolved sets
//! ([`ResolvedPermissions`]) store a plain `bool` per key, so an `Inherit`
//! cannot survive resolution.
//!
//! The key vocabulary is a byte-exact contract: the same strings are used as
//! serialized map keys, request-validation field names and storage column
//! names.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Tri-state permission value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriState {
    Allow,
    Deny,
    /// Defer to the next lower-priority source
    #[default]
    Inherit,
}

impl TriState {
    /// `merge(higher, lower) = higher if higher != Inherit else lower`
    #[must_use]
    pub const fn merge(self, lower: Self) -> Self {
        match self {
            Self::Inherit => lower,
            value => value,
        }
    }

    #[must_use]
    pub const fn is_inherit(self) -> bool {
        matches!(self, Self::Inherit)
    }

    /// The boolean value, or `None` while unresolved
    #[must_use]
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::Allow => Some(true),
            Self::Deny => Some(false),
            Self::Inherit => None,
        }
    }

    #[must_use]
    pub const fn or_floor(self, floor: bool) -> bool {
        match self {
            Self::Allow => true,
            Self::Deny => false,
            Self::Inherit => floor,
        }
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value {
            Self::Allow
        } else {
            Self::Deny
        }
    }
}

impl From<Option<bool>> for TriState {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Self::Inherit, Self::from)
    }
}

impl From<TriState> for Option<bool> {
    fn from(value: TriState) -> Self {
        value.as_bool()
    }
}

impl Serialize for TriState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_bool().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TriState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<bool>::deserialize(deserializer).map(Self::from)
    }
}

macro_rules! permission_keys {
    ($($(#[$meta:meta])* $variant:ident => $name:literal,)+) => {
        /// Closed permission-name vocabulary
        ///
        /// Declaration order is the canonical serialization order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum PermissionKey {
            $($(#[$meta])* $variant,)+
        }

        impl PermissionKey {
            /// Every key, in canonical order
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            pub const COUNT: usize = Self::ALL.len();

            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }

            #[must_use]
            pub fn parse(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

permission_keys! {
    CategoryView => "category_view",
    CategoryCreate => "category_create",
    CategoryEdit => "category_edit",
    CategoryDelete => "category_delete",

    ForumView => "forum_view",
    /// Create a forum (root forums globally, subforums per forum)
    ForumCreate => "forum_create",
    ForumEdit => "forum_edit",
    ForumDelete => "forum_delete",
    ForumEditPermissions => "forum_edit_permissions",

    ThreadView => "thread_view",
    ThreadCreate => "thread_create",
    ThreadEditOwn => "thread_edit_own",
    ThreadEditAny => "thread_edit_any",
    ThreadDeleteOwn => "thread_delete_own",
    ThreadDeleteAny => "thread_delete_any",
    /// Close/reopen threads and act inside closed ones
    ThreadEditClosed => "thread_edit_closed",
    ThreadEditPinned => "thread_edit_pinned",
    ThreadMerge => "thread_merge",

    PostView => "post_view",
    PostCreate => "post_create",
    PostEditOwn => "post_edit_own",
    PostEditAny => "post_edit_any",
    PostDeleteOwn => "post_delete_own",
    PostDeleteAny => "post_delete_any",
    PostMove => "post_move",

    UserView => "user_view",
    UserCreate => "user_create",
    UserEditOwn => "user_edit_own",
    UserEditAny => "user_edit_any",
    UserEditBan => "user_edit_ban",
    UserEditPermissions => "user_edit_permissions",
    UserEditGroups => "user_edit_groups",
    UserDelete => "user_delete",

    GroupView => "group_view",
    GroupCreate => "group_create",
    GroupEdit => "group_edit",
    GroupDelete => "group_delete",
    GroupEditPermissions => "group_edit_permissions",
    GroupAssign => "group_assign",
}

impl PermissionKey {
    const fn index(self) -> usize {
        self as usize
    }

    /// Keys governing category resources; these never come from a forum
    /// unless the category is attached to one
    #[must_use]
    pub const fn is_category_key(self) -> bool {
        matches!(
            self,
            Self::CategoryView | Self::CategoryCreate | Self::CategoryEdit | Self::CategoryDelete
        )
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown permission: {s}"))
    }
}

impl Serialize for PermissionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PermissionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::parse(&name)
            .ok_or_else(|| de::Error::unknown_variant(&name, &["<permission key>"]))
    }
}

/// Unresolved permission set (may contain `Inherit`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionSet {
    values: [TriState; PermissionKey::COUNT],
}

impl PermissionSet {
    /// A set that defers every key
    #[must_use]
    pub const fn inherit_all() -> Self {
        Self {
            values: [TriState::Inherit; PermissionKey::COUNT],
        }
    }

    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (PermissionKey, TriState)>) -> Self {
        let mut set = Self::inherit_all();
        for (key, value) in pairs {
            set.set(key, value);
        }
        set
    }

    #[must_use]
    pub const fn get(&self, key: PermissionKey) -> TriState {
        self.values[key.index()]
    }

    pub fn set(&mut self, key: PermissionKey, value: TriState) {
        self.values[key.index()] = value;
    }

    /// Builder-style [`PermissionSet::set`]
    #[must_use]
    pub fn with(mut self, key: PermissionKey, value: TriState) -> Self {
        self.set(key, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (PermissionKey, TriState)> + '_ {
        PermissionKey::ALL.iter().map(|&key| (key, self.get(key)))
    }

    /// Merge `self` (higher priority) over `lower`, key by key
    #[must_use]
    pub fn merge(&self, lower: &Self) -> Self {
        let mut merged = *self;
        for (slot, below) in merged.values.iter_mut().zip(lower.values.iter()) {
            *slot = slot.merge(*below);
        }
        merged
    }

    /// Left fold of [`PermissionSet::merge`] over sets ordered highest
    /// priority first
    #[must_use]
    pub fn fold<'a>(sets: impl IntoIterator<Item = &'a Self>) -> Self {
        sets.into_iter()
            .fold(Self::inherit_all(), |acc, lower| acc.merge(lower))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_inherit())
    }

    #[must_use]
    pub fn is_fully_resolved(&self) -> bool {
        self.values.iter().all(|v| !v.is_inherit())
    }

    #[must_use]
    pub fn unresolved_keys(&self) -> Vec<PermissionKey> {
        self.iter()
            .filter(|(_, value)| value.is_inherit())
            .map(|(key, _)| key)
            .collect()
    }

    /// Fill every `Inherit` from a resolved floor
    #[must_use]
    pub fn resolve_with(&self, floor: &ResolvedPermissions) -> ResolvedPermissions {
        let mut resolved = *floor;
        for (key, value) in self.iter() {
            resolved.set(key, value.or_floor(floor.get(key)));
        }
        resolved
    }

    /// Fill every `Inherit` with the same constant
    #[must_use]
    pub fn resolve_or(&self, fallback: bool) -> ResolvedPermissions {
        let mut resolved = ResolvedPermissions::deny_all();
        for (key, value) in self.iter() {
            resolved.set(key, value.or_floor(fallback));
        }
        resolved
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::inherit_all()
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(PermissionKey::COUNT))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key.as_str(), &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PermissionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = PermissionSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of permission names to true, false or null")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut set = PermissionSet::inherit_all();
                while let Some((name, value)) = access.next_entry::<String, TriState>()? {
                    let key = PermissionKey::parse(&name)
                        .ok_or_else(|| de::Error::custom(format!("unknown permission `{name}`")))?;
                    set.set(key, value);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(SetVisitor)
    }
}

/// Fully resolved permission set (total over every key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedPermissions {
    values: [bool; PermissionKey::COUNT],
}

impl ResolvedPermissions {
    #[must_use]
    pub const fn deny_all() -> Self {
        Self {
            values: [false; PermissionKey::COUNT],
        }
    }

    #[must_use]
    pub const fn allow_all() -> Self {
        Self {
            values: [true; PermissionKey::COUNT],
        }
    }

    #[must_use]
    pub const fn get(&self, key: PermissionKey) -> bool {
        self.values[key.index()]
    }

    /// Alias for [`ResolvedPermissions::get`]
    #[must_use]
    pub const fn has(&self, key: PermissionKey) -> bool {
        self.get(key)
    }

    pub fn set(&mut self, key: PermissionKey, value: bool) {
        self.values[key.index()] = value;
    }

    #[must_use]
    pub fn with(mut self, key: PermissionKey, value: bool) -> Self {
        self.set(key, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (PermissionKey, bool)> + '_ {
        PermissionKey::ALL.iter().map(|&key| (key, self.get(key)))
    }

    /// Apply the explicit entries of `overrides` on top; its `Inherit`
    /// entries leave the resolved value untouched
    #[must_use]
    pub fn overlay(&self, overrides: &PermissionSet) -> Self {
        overrides.resolve_with(self)
    }

    /// View as an unresolved set with no `Inherit` entries
    #[must_use]
    pub fn to_set(&self) -> PermissionSet {
        PermissionSet::from_pairs(self.iter().map(|(key, value)| (key, TriState::from(value))))
    }

    /// Build from a map that must name every key exactly once
    pub fn try_from_pairs(
        pairs: impl IntoIterator<Item = (PermissionKey, bool)>,
    ) -> Result<Self, String> {
        let mut seen = [false; PermissionKey::COUNT];
        let mut resolved = Self::deny_all();
        for (key, value) in pairs {
            seen[key.index()] = true;
            resolved.set(key, value);
        }
        match PermissionKey::ALL.iter().find(|key| !seen[key.index()]) {
            Some(missing) => Err(format!("missing permission `{missing}`")),
            None => Ok(resolved),
        }
    }
}

impl Serialize for ResolvedPermissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(PermissionKey::COUNT))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key.as_str(), &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResolvedPermissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResolvedVisitor;

        impl<'de> Visitor<'de> for ResolvedVisitor {
            type Value = ResolvedPermissions;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of every permission name to a boolean")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(PermissionKey::COUNT);
                while let Some((name, value)) = access.next_entry::<String, bool>()? {
                    let key = PermissionKey::parse(&name)
                        .ok_or_else(|| de::Error::custom(format!("unknown permission `{name}`")))?;
                    pairs.push((key, value));
                }
                ResolvedPermissions::try_from_pairs(pairs).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_map(ResolvedVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_higher_unless_inherit() {
        assert_eq!(TriState::Allow.merge(TriState::Deny), TriState::Allow);
        assert_eq!(TriState::Deny.merge(TriState::Allow), TriState::Deny);
        assert_eq!(TriState::Inherit.merge(TriState::Deny), TriState::Deny);
        assert_eq!(TriState::Inherit.merge(TriState::Inherit), TriState::Inherit);
    }

    #[test]
    fn test_vocabulary_is_stable() {
        assert_eq!(PermissionKey::COUNT, 39);
        assert_eq!(PermissionKey::ALL[0].as_str(), "category_view");
        assert_eq!(PermissionKey::ThreadDeleteAny.as_str(), "thread_delete_any");
        for key in PermissionKey::ALL {
            assert_eq!(PermissionKey::parse(key.as_str()), Some(*key));
        }
        assert_eq!(PermissionKey::parse("thread_nuke"), None);
    }

    #[test]
    fn test_fold_walks_highest_first() {
        let high = PermissionSet::inherit_all().with(PermissionKey::PostView, TriState::Allow);
        let low = PermissionSet::inherit_all()
            .with(PermissionKey::PostView, TriState::Deny)
            .with(PermissionKey::PostCreate, TriState::Deny);

        let folded = PermissionSet::fold([&high, &low]);
        assert_eq!(folded.get(PermissionKey::PostView), TriState::Allow);
        assert_eq!(folded.get(PermissionKey::PostCreate), TriState::Deny);
        assert_eq!(folded.get(PermissionKey::PostMove), TriState::Inherit);
    }

    #[test]
    fn test_resolve_with_floor() {
        let set = PermissionSet::inherit_all().with(PermissionKey::ForumEdit, TriState::Deny);
        let floor = ResolvedPermissions::allow_all();
        let resolved = set.resolve_with(&floor);
        assert!(!resolved.get(PermissionKey::ForumEdit));
        assert!(resolved.get(PermissionKey::ForumView));
    }

    #[test]
    fn test_overlay_ignores_inherit() {
        let base = ResolvedPermissions::deny_all().with(PermissionKey::UserView, true);
        let overrides = PermissionSet::inherit_all().with(PermissionKey::UserDelete, TriState::Allow);
        let merged = base.overlay(&overrides);
        assert!(merged.get(PermissionKey::UserView));
        assert!(merged.get(PermissionKey::UserDelete));
        assert!(!merged.get(PermissionKey::UserCreate));
    }

    #[test]
    fn test_resolved_round_trip() {
        let resolved = ResolvedPermissions::deny_all()
            .with(PermissionKey::ThreadMerge, true)
            .with(PermissionKey::GroupAssign, true);
        let json = serde_json::to_value(resolved).unwrap();
        assert_eq!(json.as_object().unwrap().len(), PermissionKey::COUNT);
        assert_eq!(json["thread_merge"], serde_json::json!(true));

        let back: ResolvedPermissions = serde_json::from_value(json).unwrap();
        assert_eq!(back, resolved);
    }

    #[test]
    fn test_resolved_rejects_partial_map() {
        let result: Result<ResolvedPermissions, _> =
            serde_json::from_str(r#"{"forum_view": true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_set_deserializes_missing_as_inherit() {
        let set: PermissionSet =
            serde_json::from_str(r#"{"forum_view": true, "forum_edit": null, "forum_delete": false}"#)
                .unwrap();
        assert_eq!(set.get(PermissionKey::ForumView), TriState::Allow);
        assert_eq!(set.get(PermissionKey::ForumEdit), TriState::Inherit);
        assert_eq!(set.get(PermissionKey::ForumDelete), TriState::Deny);
        assert_eq!(set.get(PermissionKey::PostMove), TriState::Inherit);
    }

    #[test]
    fn test_set_rejects_unknown_key() {
        let result: Result<PermissionSet, _> = serde_json::from_str(r#"{"forum_vieww": true}"#);
        assert!(result.is_err());
    }
}
