#![allow(clippy::result_large_err)]
//! # Crudgate
//!
//! Reusable base layer for multi-tenant CRUD HTTP APIs.
//!
//! ## Architecture
//!
//! - **Scope Filter Engine**: Turns granted scopes into the broadest safe
//!   list filter, with deny as the default when nothing matches
//! - **Authorization Gate**: Item-level allow/deny combining ownership and
//!   scope checks
//! - **CRUD Router Base**: list/get/create/update/delete/mine orchestration
//!   with tenant isolation and configurable deny behavior
//! - **Key-Value Record Store**: Typed records mirrored into Redis hashes
//!   with partial-field access and change notification
//! - **Auth**: Request-principal resolution with a bearer-token JWT
//!   implementation

pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod kv;
pub mod router;
pub mod scope;
pub mod telemetry;

pub use error::{CrudError, ErrorCode, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::auth::{AuthResolver, JwtResolver, User};
    pub use crate::authz::{Document, Gate, OwnerField, Ownership};
    pub use crate::config::{ApiConfig, AuthConfig, CoreConfig, RedisConfig};
    pub use crate::error::{CrudError, ErrorCode, Result};
    pub use crate::kv::{FieldValue, RecordStore, RedisRecord};
    pub use crate::router::{
        CrudRouter, EntityData, EntityStore, InMemoryStore, ListDenyMode, MineResult,
        OwnershipFilter, Page, PageQuery, RouterConfig,
    };
    pub use crate::scope::{
        list_filter, Action, FilterExpr, FilterMap, ListFilter, ResourcePath, ScopeGrant,
        SelfAccess,
    };
}
