//! Scope-based access grants and list-filter computation.
//!
//! This module provides:
//! - **Grammar**: string-encoded scope grants (`path:action:filter`),
//!   resource paths, and filter maps
//! - **Filter engine**: the broadest-safe-filter computation for list
//!   queries (OR-union semantics, deny-by-default)

pub mod filter;
pub mod grant;

pub use filter::{list_filter, ListFilter, SelfAccess};
pub use grant::{Action, FilterExpr, FilterMap, ResourcePath, ScopeGrant};
