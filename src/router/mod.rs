//! CRUD router base and its data-access collaborator interface.
//!
//! This module provides:
//! - **Base router**: list/get/create/update/delete/mine orchestration
//!   with scope filtering and tenant isolation
//! - **Store trait**: the external data-access collaborator contract
//! - **In-memory store**: a direct-evaluation implementation for tests
//!   and lightweight hosts

pub mod base;
pub mod memory;
pub mod store;

pub use base::{CrudRouter, ListDenyMode, MineResult, Page, PageQuery, RouterConfig};
pub use memory::InMemoryStore;
pub use store::{EntityData, EntityStore, OwnershipFilter};
