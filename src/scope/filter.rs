//! Scope filter engine: list-level filter computation.
//!
//! Given a caller's granted scopes and a target resource path + action,
//! computes the broadest safe query filter. The result is semantically an
//! OR across alternative filter maps; alternatives are never intersected,
//! because merging would silently narrow access.
//!
//! Computation is a pure function of (scopes, resource path, action,
//! caller id): no hidden state, no I/O.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::grant::{document_satisfies, Action, FilterMap, ResourcePath, ScopeGrant};

// ═══════════════════════════════════════════════════════════════════════════════
// List Filter
// ═══════════════════════════════════════════════════════════════════════════════

/// The broadest safe filter for a list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListFilter {
    /// No rows visible. The safe default when nothing grants access.
    Deny,
    /// Rows matching ANY of the alternative maps are visible. Alternatives
    /// sharing a key with different values stay distinct branches.
    Any(Vec<FilterMap>),
    /// All rows visible. Only produced by an explicitly unrestricted grant.
    Unrestricted,
}

impl ListFilter {
    pub fn is_deny(&self) -> bool {
        matches!(self, Self::Deny)
    }

    /// Construct an OR filter from alternatives, normalizing degenerate
    /// shapes: an empty alternative set is a deny, and an empty map would
    /// mean "no constraint" and is therefore rejected here — unrestricted
    /// access must come from [`ListFilter::Unrestricted`] only.
    pub fn any_of(alternatives: Vec<FilterMap>) -> Self {
        let alternatives: Vec<FilterMap> =
            alternatives.into_iter().filter(|m| !m.is_empty()).collect();
        if alternatives.is_empty() {
            Self::Deny
        } else {
            Self::Any(alternatives)
        }
    }

    /// The alternative branches, if any.
    pub fn alternatives(&self) -> &[FilterMap] {
        match self {
            Self::Any(maps) => maps,
            Self::Deny | Self::Unrestricted => &[],
        }
    }

    /// Evaluate the filter against a document.
    ///
    /// Query-translating collaborators normally compile the filter into
    /// their own predicate language; this direct evaluation backs the
    /// in-memory store and item-level checks.
    pub fn matches_document(&self, document: &serde_json::Map<String, serde_json::Value>) -> bool {
        match self {
            Self::Deny => false,
            Self::Unrestricted => true,
            Self::Any(maps) => maps.iter().any(|m| document_satisfies(m, document)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Self Access
// ═══════════════════════════════════════════════════════════════════════════════

/// Ownership context for self-access during filter computation.
///
/// Present only when the resource type exposes an ownership field and the
/// router enables self-access.
#[derive(Debug, Clone, Copy)]
pub struct SelfAccess<'a> {
    /// The entity attribute holding the owner id.
    pub owner_field: &'a str,
    /// The caller's ownership id.
    pub owner_id: &'a str,
    /// The action implicitly granted on owned entities.
    pub self_action: Action,
}

impl<'a> SelfAccess<'a> {
    fn filter_map(&self) -> FilterMap {
        FilterMap::from([(self.owner_field.to_string(), self.owner_id.to_string())])
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Filter Computation
// ═══════════════════════════════════════════════════════════════════════════════

/// Compute the broadest safe list filter for a caller.
///
/// 1. Grants matching the resource path and action contribute their filter
///    maps; an unrestricted matching grant collapses the whole result to
///    [`ListFilter::Unrestricted`].
/// 2. Grants for the self action contribute the caller-ownership map when
///    self-access applies.
/// 3. Self-access, when enabled, always appends the caller-ownership map.
/// 4. Zero contributed maps yield [`ListFilter::Deny`].
pub fn list_filter(
    scopes: &[ScopeGrant],
    path: &ResourcePath,
    action: Action,
    self_access: Option<SelfAccess<'_>>,
) -> ListFilter {
    let mut maps: Vec<FilterMap> = Vec::new();

    for grant in scopes.iter().filter(|g| g.covers_path(path)) {
        if grant.action().grants(action) {
            match grant.filter() {
                super::grant::FilterExpr::Unrestricted => {
                    debug!(%path, %action, "unrestricted grant matched");
                    return ListFilter::Unrestricted;
                }
                super::grant::FilterExpr::Fields(map) => {
                    if !map.is_empty() && !maps.contains(map) {
                        maps.push(map.clone());
                    }
                }
            }
        } else if let Some(sa) = &self_access {
            // A grant of the self action addresses the caller's own rows.
            if grant.action() == sa.self_action {
                let map = sa.filter_map();
                if !maps.contains(&map) {
                    maps.push(map);
                }
            }
        }
    }

    if let Some(sa) = &self_access {
        let map = sa.filter_map();
        if !maps.contains(&map) {
            maps.push(map);
        }
    }

    if maps.is_empty() {
        debug!(%path, %action, "no grant matched, denying");
        return ListFilter::Deny;
    }

    ListFilter::any_of(maps)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
