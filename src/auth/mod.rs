//! Authenticated principals and the authentication collaborator interface.
//!
//! Authentication itself is external to this core: a host supplies an
//! [`AuthResolver`] that turns an inbound request into a [`User`]. The
//! default [`jwt::JwtResolver`] covers the common bearer-token case.

pub mod jwt;

use async_trait::async_trait;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::scope::ScopeGrant;

pub use jwt::{Claims, JwtResolver};

// ═══════════════════════════════════════════════════════════════════════════════
// User
// ═══════════════════════════════════════════════════════════════════════════════

/// An authenticated principal.
///
/// Constructed once per request by the authentication collaborator and
/// immutable for the request's duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Canonical unique identifier of the principal.
    pub uid: String,
    /// User identifier (may equal `uid`; kept separate because create
    /// paths may stamp it instead of `uid`).
    pub user_id: String,
    /// Tenant isolation boundary; every query is scoped by this.
    pub tenant_id: String,
    /// Optional workspace the principal is acting within.
    pub workspace_id: Option<String>,
    /// Granted scopes, in grant order.
    pub scopes: Vec<ScopeGrant>,
}

impl User {
    /// Create a user with no scopes.
    pub fn new(uid: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        let uid = uid.into();
        Self {
            user_id: uid.clone(),
            uid,
            tenant_id: tenant_id.into(),
            workspace_id: None,
            scopes: Vec::new(),
        }
    }

    /// Set a distinct user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Set the workspace id.
    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// Attach parsed scope grants.
    pub fn with_scopes(mut self, scopes: Vec<ScopeGrant>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Parse and attach scope strings, skipping malformed entries.
    ///
    /// A malformed grant can never match anything, so dropping it (with a
    /// warning) keeps the remaining grants usable.
    pub fn with_scope_strings<S: AsRef<str>>(mut self, scopes: &[S]) -> Self {
        self.scopes = scopes
            .iter()
            .filter_map(|s| {
                let s = s.as_ref();
                let parsed = ScopeGrant::parse(s);
                if parsed.is_none() {
                    warn!(scope = s, "skipping malformed scope grant");
                }
                parsed
            })
            .collect();
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════════════════════════════════════════

/// The authentication collaborator.
///
/// Resolution failures surface as [`crate::CrudError::Unauthenticated`];
/// this core performs no credential storage or refresh of its own.
#[async_trait]
pub trait AuthResolver: Send + Sync {
    /// Resolve the authenticated user from request head parts.
    async fn resolve(&self, parts: &Parts) -> Result<User>;
}
