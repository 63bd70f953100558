//! The scope grant grammar: actions, resource paths, and filter expressions.
//!
//! A scope is a string-encoded grant of the form
//! `resource-path:action:filter-expression`:
//!
//! - `media/api/files:read:workspace_id=w1` — read files where
//!   `workspace_id == "w1"`
//! - `media/api/files:update` — update any file (no filter expression)
//! - `*/api/*:read:*` — read anything under any `api` service, unrestricted
//!
//! Scopes are data, not code; grant order carries no priority.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ApiConfig;

// ═══════════════════════════════════════════════════════════════════════════════
// Action
// ═══════════════════════════════════════════════════════════════════════════════

/// The fixed action vocabulary of the scope engine.
///
/// `Owner` is the self action: the action implicitly granted to a caller
/// on entities they own. `Wildcard` appears only in grants and matches any
/// requested action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Owner,
    #[serde(rename = "*")]
    Wildcard,
}

impl Action {
    /// Parse an action from its grant form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "read" => Some(Self::Read),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "owner" => Some(Self::Owner),
            "*" => Some(Self::Wildcard),
            _ => None,
        }
    }

    /// Canonical string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Owner => "owner",
            Self::Wildcard => "*",
        }
    }

    /// Check whether a granted action covers a requested action.
    pub fn grants(&self, requested: Action) -> bool {
        *self == Action::Wildcard || *self == requested
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resource Path
// ═══════════════════════════════════════════════════════════════════════════════

/// Canonical slash-joined resource address: `namespace/service/resource`.
///
/// Stable for the lifetime of a router instance; built once from static
/// configuration plus the target entity's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Build a path from its three segments.
    pub fn new(
        namespace: impl AsRef<str>,
        service: impl AsRef<str>,
        resource: impl AsRef<str>,
    ) -> Self {
        let joined = format!(
            "{}/{}/{}",
            namespace.as_ref(),
            service.as_ref(),
            resource.as_ref()
        );
        Self(joined.trim_start_matches('/').to_string())
    }

    /// Build a path from configuration defaults and a resource name.
    pub fn from_config(api: &ApiConfig, resource: impl AsRef<str>) -> Self {
        Self::new(&api.namespace, &api.service, resource)
    }

    /// The trailing resource-name segment.
    pub fn resource(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether a grant's path pattern covers this path.
    ///
    /// Segments match exactly or via an explicit `*` wildcard segment;
    /// segment counts must agree.
    pub fn matched_by(&self, pattern: &str) -> bool {
        let mine: Vec<&str> = self.0.split('/').collect();
        let theirs: Vec<&str> = pattern.trim_start_matches('/').split('/').collect();
        if mine.len() != theirs.len() {
            return false;
        }
        mine.iter()
            .zip(theirs.iter())
            .all(|(seg, pat)| *pat == "*" || seg == pat)
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Filter Expressions
// ═══════════════════════════════════════════════════════════════════════════════

/// A conjunction of field constraints: every entry must hold for an item
/// to satisfy the map.
pub type FilterMap = BTreeMap<String, String>;

/// The filter component of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// No constraint: all rows visible. Only ever produced by an explicit
    /// grant with no filter expression or a `*` expression.
    Unrestricted,
    /// A set of `field=value` constraints, all of which must hold.
    Fields(FilterMap),
}

impl FilterExpr {
    fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || s == "*" {
            return Some(Self::Unrestricted);
        }
        let mut map = FilterMap::new();
        for pair in s.split(',') {
            let (key, value) = pair.split_once('=')?;
            if key.is_empty() {
                return None;
            }
            map.insert(key.to_string(), value.to_string());
        }
        Some(Self::Fields(map))
    }
}

/// Compare a required filter value against a document field.
///
/// Filter values are strings; numbers and booleans compare by their
/// canonical string form.
pub(crate) fn value_matches(required: &str, actual: &serde_json::Value) -> bool {
    match actual {
        serde_json::Value::String(s) => s == required,
        serde_json::Value::Number(n) => n.to_string() == required,
        serde_json::Value::Bool(b) => b.to_string() == required,
        _ => false,
    }
}

/// Check whether a document satisfies every constraint in a filter map.
pub(crate) fn document_satisfies(
    map: &FilterMap,
    document: &serde_json::Map<String, serde_json::Value>,
) -> bool {
    map.iter().all(|(field, required)| {
        document
            .get(field)
            .is_some_and(|actual| value_matches(required, actual))
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scope Grant
// ═══════════════════════════════════════════════════════════════════════════════

/// One parsed scope string: a path pattern, an action, and a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeGrant {
    path: String,
    action: Action,
    filter: FilterExpr,
}

impl ScopeGrant {
    /// Construct a grant directly (primarily for tests and fixtures).
    pub fn new(path: impl Into<String>, action: Action, filter: FilterExpr) -> Self {
        Self {
            path: path.into(),
            action,
            filter,
        }
    }

    /// Parse a grant from its string encoding.
    ///
    /// Returns `None` for malformed scopes; callers skip those rather than
    /// failing the request, so an unparseable grant simply never matches.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, ':');
        let path = parts.next()?.trim();
        let action = Action::parse(parts.next()?.trim())?;
        let filter = FilterExpr::parse(parts.next().unwrap_or("").trim())?;
        if path.is_empty() {
            return None;
        }
        Some(Self {
            path: path.to_string(),
            action,
            filter,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn filter(&self) -> &FilterExpr {
        &self.filter
    }

    /// Check whether this grant addresses the given resource path.
    pub fn covers_path(&self, path: &ResourcePath) -> bool {
        path.matched_by(&self.path)
    }

    /// Check whether this grant covers the given path and action.
    pub fn covers(&self, path: &ResourcePath, action: Action) -> bool {
        self.covers_path(path) && self.action.grants(action)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path() -> ResourcePath {
        ResourcePath::new("media", "api", "files")
    }

    #[test]
    fn test_parse_full_grant() {
        let grant = ScopeGrant::parse("media/api/files:read:workspace_id=w1,region=eu").unwrap();
        assert_eq!(grant.action(), Action::Read);
        assert!(grant.covers_path(&path()));
        match grant.filter() {
            FilterExpr::Fields(map) => {
                assert_eq!(map.get("workspace_id"), Some(&"w1".to_string()));
                assert_eq!(map.get("region"), Some(&"eu".to_string()));
            }
            FilterExpr::Unrestricted => panic!("expected field filter"),
        }
    }

    #[test]
    fn test_parse_without_filter_is_unrestricted() {
        let grant = ScopeGrant::parse("media/api/files:update").unwrap();
        assert_eq!(grant.filter(), &FilterExpr::Unrestricted);

        let starred = ScopeGrant::parse("media/api/files:update:*").unwrap();
        assert_eq!(starred.filter(), &FilterExpr::Unrestricted);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(ScopeGrant::parse("").is_none());
        assert!(ScopeGrant::parse("media/api/files").is_none());
        assert!(ScopeGrant::parse("media/api/files:fly").is_none());
        assert!(ScopeGrant::parse(":read").is_none());
        assert!(ScopeGrant::parse("media/api/files:read:noequals").is_none());
        assert!(ScopeGrant::parse("media/api/files:read:=v").is_none());
    }

    #[test]
    fn test_path_wildcard_segments() {
        let p = path();
        assert!(p.matched_by("media/api/files"));
        assert!(p.matched_by("*/api/files"));
        assert!(p.matched_by("media/*/*"));
        assert!(!p.matched_by("media/api"));
        assert!(!p.matched_by("media/api/files/extra"));
        assert!(!p.matched_by("other/api/files"));
    }

    #[test]
    fn test_path_from_empty_namespace() {
        let api = ApiConfig {
            namespace: String::new(),
            service: "api".to_string(),
            ..ApiConfig::default()
        };
        let p = ResourcePath::from_config(&api, "files");
        assert_eq!(p.as_str(), "api/files");
        assert_eq!(p.resource(), "files");
    }

    #[test]
    fn test_wildcard_action_grants_all() {
        let grant = ScopeGrant::parse("media/api/files:*").unwrap();
        assert!(grant.covers(&path(), Action::Read));
        assert!(grant.covers(&path(), Action::Delete));
    }

    #[test]
    fn test_action_does_not_cross_grant() {
        let grant = ScopeGrant::parse("media/api/files:read").unwrap();
        assert!(grant.covers(&path(), Action::Read));
        assert!(!grant.covers(&path(), Action::Update));
    }

    #[test]
    fn test_value_matches_scalars() {
        assert!(value_matches("w1", &json!("w1")));
        assert!(value_matches("42", &json!(42)));
        assert!(value_matches("true", &json!(true)));
        assert!(!value_matches("w1", &json!(null)));
        assert!(!value_matches("w1", &json!({"nested": "w1"})));
    }

    #[test]
    fn test_document_satisfies() {
        let map = FilterMap::from([
            ("workspace_id".to_string(), "w1".to_string()),
            ("region".to_string(), "eu".to_string()),
        ]);
        let doc = json!({"workspace_id": "w1", "region": "eu", "size": 3});
        let doc = doc.as_object().unwrap();
        assert!(document_satisfies(&map, doc));

        let other = json!({"workspace_id": "w2", "region": "eu"});
        assert!(!document_satisfies(&map, other.as_object().unwrap()));

        let missing = json!({"region": "eu"});
        assert!(!document_satisfies(&map, missing.as_object().unwrap()));
    }
}
