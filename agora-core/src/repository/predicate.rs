//! Storage-evaluable authorization predicates
//!
//! A [`Predicate`] is the action-query form of an instance decision. The same
//! tree can be evaluated in memory against one resource or rendered with
//! `SeaQuery` into a SQL condition over a resource table joined with its
//! governing `parsed_permissions` row.

use sea_query::{Alias, Expr, Func, SimpleExpr};

use crate::models::{PermissionKey, ResolvedPermissions, ResourceType, UserId};

/// Table alias of the resource being filtered
pub const RESOURCE_ALIAS: &str = "r";
/// Table alias of the joined `parsed_permissions` row
pub const PARSED_ALIAS: &str = "pp";

/// Boolean attributes of a resource row that actions may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Closed,
    Pinned,
}

impl Flag {
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Pinned => "pinned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Const(bool),
    /// The governing resolved set grants the key
    Permission(PermissionKey),
    /// The actor owns the resource
    IsOwner,
    Flag(Flag),
    Not(Box<Predicate>),
    /// Conjunction; empty is `true`
    All(Vec<Predicate>),
    /// Disjunction; empty is `false`
    Any(Vec<Predicate>),
}

/// Everything an in-memory evaluation needs to know about one resource
#[derive(Debug, Clone, Copy)]
pub struct PredicateContext<'a> {
    pub permissions: &'a ResolvedPermissions,
    pub is_owner: bool,
    pub closed: bool,
    pub pinned: bool,
}

impl<'a> PredicateContext<'a> {
    pub const fn new(permissions: &'a ResolvedPermissions) -> Self {
        Self {
            permissions,
            is_owner: false,
            closed: false,
            pinned: false,
        }
    }

    #[must_use]
    pub const fn owned(mut self, is_owner: bool) -> Self {
        self.is_owner = is_owner;
        self
    }

    #[must_use]
    pub const fn flags(mut self, closed: bool, pinned: bool) -> Self {
        self.closed = closed;
        self.pinned = pinned;
        self
    }

    const fn flag(&self, flag: Flag) -> bool {
        match flag {
            Flag::Closed => self.closed,
            Flag::Pinned => self.pinned,
        }
    }
}

impl Predicate {
    #[must_use]
    pub const fn perm(key: PermissionKey) -> Self {
        Self::Permission(key)
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::All(mut parts) => {
                parts.push(other);
                Self::All(parts)
            }
            first => Self::All(vec![first, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Any(mut parts) => {
                parts.push(other);
                Self::Any(parts)
            }
            first => Self::Any(vec![first, other]),
        }
    }

    /// `(owner AND own) OR any`, the shape of every `_own`/`_any` pair
    #[must_use]
    pub fn own_or_any(own: PermissionKey, any: PermissionKey) -> Self {
        Self::IsOwner.and(Self::perm(own)).or(Self::perm(any))
    }

    /// `NOT flag OR key`: the flag only matters when the key is missing
    #[must_use]
    pub fn unless_flag(flag: Flag, key: PermissionKey) -> Self {
        Self::Flag(flag).not().or(Self::perm(key))
    }

    pub fn evaluate(&self, ctx: &PredicateContext<'_>) -> bool {
        match self {
            Self::Const(value) => *value,
            Self::Permission(key) => ctx.permissions.get(*key),
            Self::IsOwner => ctx.is_owner,
            Self::Flag(flag) => ctx.flag(*flag),
            Self::Not(inner) => !inner.evaluate(ctx),
            Self::All(parts) => parts.iter().all(|p| p.evaluate(ctx)),
            Self::Any(parts) => parts.iter().any(|p| p.evaluate(ctx)),
        }
    }

    /// Fold constants away. Evaluation results are unchanged.
    #[must_use]
    pub fn simplify(self) -> Self {
        match self {
            Self::Not(inner) => match inner.simplify() {
                Self::Const(value) => Self::Const(!value),
                Self::Not(double) => *double,
                other => other.not(),
            },
            Self::All(parts) => {
                let mut kept = Vec::with_capacity(parts.len());
                for part in parts.into_iter().map(Self::simplify) {
                    match part {
                        Self::Const(true) => {}
                        Self::Const(false) => return Self::Const(false),
                        other => kept.push(other),
                    }
                }
                match kept.len() {
                    0 => Self::Const(true),
                    1 => kept.remove(0),
                    _ => Self::All(kept),
                }
            }
            Self::Any(parts) => {
                let mut kept = Vec::with_capacity(parts.len());
                for part in parts.into_iter().map(Self::simplify) {
                    match part {
                        Self::Const(false) => {}
                        Self::Const(true) => return Self::Const(true),
                        other => kept.push(other),
                    }
                }
                match kept.len() {
                    0 => Self::Const(false),
                    1 => kept.remove(0),
                    _ => Self::Any(kept),
                }
            }
            leaf => leaf,
        }
    }

    /// Replace every leaf the resource type cannot express in SQL with the
    /// constant it has for this actor
    #[must_use]
    pub fn bind_constants(self, scope: &RenderScope<'_>) -> Self {
        match self {
            Self::Permission(key) if !scope.has_column(key) => {
                Self::Const(scope.global.get(key))
            }
            Self::IsOwner if scope.resource_type.owner_column().is_none() => Self::Const(false),
            Self::Flag(_) if scope.resource_type != ResourceType::Thread => Self::Const(false),
            Self::Not(inner) => inner.bind_constants(scope).not(),
            Self::All(parts) => {
                Self::All(parts.into_iter().map(|p| p.bind_constants(scope)).collect())
            }
            Self::Any(parts) => {
                Self::Any(parts.into_iter().map(|p| p.bind_constants(scope)).collect())
            }
            other => other,
        }
    }

    /// Render as a SQL condition over `RESOURCE_ALIAS` and `PARSED_ALIAS`
    pub fn to_expr(&self, scope: &RenderScope<'_>) -> SimpleExpr {
        self.clone().bind_constants(scope).simplify().render(scope)
    }

    fn render(&self, scope: &RenderScope<'_>) -> SimpleExpr {
        let resource = Alias::new(RESOURCE_ALIAS);
        match self {
            Self::Const(value) => constant(*value),
            Self::Permission(key) => scope.permission_expr(*key),
            Self::IsOwner => match scope.resource_type.owner_column() {
                Some(column) => Expr::col((resource, Alias::new(column))).eq(scope.actor.as_str()),
                None => constant(false),
            },
            Self::Flag(flag) => Expr::col((resource, Alias::new(flag.column()))).eq(true),
            Self::Not(inner) => inner.render(scope).not(),
            Self::All(parts) => parts
                .iter()
                .map(|p| p.render(scope))
                .reduce(SimpleExpr::and)
                .unwrap_or_else(|| constant(true)),
            Self::Any(parts) => parts
                .iter()
                .map(|p| p.render(scope))
                .reduce(SimpleExpr::or)
                .unwrap_or_else(|| constant(false)),
        }
    }
}

fn constant(value: bool) -> SimpleExpr {
    Expr::cust(if value { "TRUE" } else { "FALSE" })
}

/// What a predicate is rendered against
#[derive(Debug, Clone, Copy)]
pub struct RenderScope<'a> {
    pub resource_type: ResourceType,
    pub actor: &'a UserId,
    /// The actor's resolved global permissions
    pub global: &'a ResolvedPermissions,
}

impl<'a> RenderScope<'a> {
    pub const fn new(
        resource_type: ResourceType,
        actor: &'a UserId,
        global: &'a ResolvedPermissions,
    ) -> Self {
        Self {
            resource_type,
            actor,
            global,
        }
    }

    /// Whether the key is read from the joined parsed row for this resource type
    fn has_column(&self, key: PermissionKey) -> bool {
        match self.resource_type {
            ResourceType::Forum | ResourceType::Thread | ResourceType::Post => true,
            ResourceType::Category => key.is_category_key(),
            ResourceType::Group | ResourceType::User => false,
        }
    }

    fn permission_expr(&self, key: PermissionKey) -> SimpleExpr {
        let column = Expr::col((Alias::new(PARSED_ALIAS), Alias::new(key.as_str())));
        match self.resource_type {
            // Detached categories have no parsed row and fall back to the global set
            ResourceType::Category => {
                Expr::expr(Func::coalesce([column.into(), constant(self.global.get(key))]))
                    .eq(true)
            }
            _ => column.eq(true),
        }
    }
}
