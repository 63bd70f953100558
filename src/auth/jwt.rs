//! Default JWT-based authentication resolver.
//!
//! Decodes an HS256 bearer token from the `Authorization` header into a
//! [`User`]. Hosts with their own identity provider implement
//! [`AuthResolver`] directly instead.

use async_trait::async_trait;
use axum::http::{header, request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AuthResolver, User};
use crate::config::AuthConfig;
use crate::error::{CrudError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// JWT token claims understood by the default resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (canonical user id)
    pub sub: String,

    /// User id when distinct from the subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Tenant the token was issued for
    pub tenant_id: String,

    /// Workspace the principal is acting within
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,

    /// Granted scope strings
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    /// Project the claims into a request principal.
    pub fn into_user(self) -> User {
        let mut user = User::new(self.sub, self.tenant_id);
        if let Some(user_id) = self.user_id {
            user = user.with_user_id(user_id);
        }
        if let Some(workspace_id) = self.workspace_id {
            user = user.with_workspace(workspace_id);
        }
        user.with_scope_strings(&self.scopes)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════════════════════════════════════════

/// Bearer-token resolver using a shared HMAC secret.
pub struct JwtResolver {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtResolver {
    /// Build a resolver from configuration.
    ///
    /// Fails when no secret is configured; a missing secret must be a
    /// startup error, not a per-request one.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let secret = config
            .jwt_secret
            .as_deref()
            .ok_or_else(|| CrudError::Config("auth.jwt_secret is not set".to_string()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    fn bearer_token<'a>(&self, parts: &'a Parts) -> Option<&'a str> {
        parts
            .headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }
}

#[async_trait]
impl AuthResolver for JwtResolver {
    async fn resolve(&self, parts: &Parts) -> Result<User> {
        let token = self.bearer_token(parts).ok_or_else(|| {
            counter!("crudgate_auth_failures_total", "reason" => "missing").increment(1);
            CrudError::unauthenticated()
        })?;

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(error = %e, "token validation failed");
            counter!("crudgate_auth_failures_total", "reason" => "invalid").increment(1);
            CrudError::unauthenticated()
        })?;

        Ok(data.claims.into_user())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
