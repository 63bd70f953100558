//! The data-access collaborator interface.
//!
//! The actual document database lives outside this core; routers only
//! speak this trait. Implementations own persistence concerns entirely,
//! including soft-versus-hard delete policy and any optimistic
//! concurrency for write-after-read races.

use async_trait::async_trait;
use serde::Serialize;

use crate::authz::{Document, OwnerField};
use crate::error::Result;
use crate::scope::ListFilter;

// ═══════════════════════════════════════════════════════════════════════════════
// Entity Data
// ═══════════════════════════════════════════════════════════════════════════════

/// A stored domain entity as the router sees it.
///
/// Entities carry a `uid`, a `tenant_id`, and an ownership field
/// (`user_id` or `owner_id` depending on the router variant).
pub trait EntityData: Serialize + Clone + Send + Sync {
    /// Entity kind name used in resource paths and error details.
    const KIND: &'static str;

    fn uid(&self) -> &str;

    fn tenant_id(&self) -> &str;

    /// Project the entity into a JSON document for filter evaluation.
    fn document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(crate::error::CrudError::Validation(format!(
                "{} does not serialize to a document (got {other})",
                Self::KIND
            ))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ownership Filter
// ═══════════════════════════════════════════════════════════════════════════════

/// Restrict a fetch to entities owned by a specific principal.
///
/// Item fetches in the CRUD paths pass `None` so that tenant-scoped
/// misses surface as not-found before authorization runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipFilter {
    pub field: OwnerField,
    pub owner_id: String,
}

impl OwnershipFilter {
    pub fn new(field: OwnerField, owner_id: impl Into<String>) -> Self {
        Self {
            field,
            owner_id: owner_id.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entity Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-entity-type data access.
///
/// All failures propagate unchanged; this core performs no retries.
#[async_trait]
pub trait EntityStore: Send + Sync {
    type Entity: EntityData;

    /// Fetch one entity by id within a tenant.
    ///
    /// `ownership` of `None` ignores the ownership field at fetch time.
    async fn get_item(
        &self,
        uid: &str,
        tenant_id: &str,
        ownership: Option<&OwnershipFilter>,
    ) -> Result<Option<Self::Entity>>;

    /// List entities within a tenant matching the filter, returning the
    /// page of items and the total match count.
    async fn list_total_combined(
        &self,
        offset: u64,
        limit: u64,
        tenant_id: &str,
        filter: &ListFilter,
    ) -> Result<(Vec<Self::Entity>, u64)>;

    /// Persist a new entity from its document form.
    async fn create_item(&self, data: Document) -> Result<Self::Entity>;

    /// Merge the explicitly-provided fields of `patch` into `entity` and
    /// persist the result.
    async fn update_item(&self, entity: Self::Entity, patch: Document) -> Result<Self::Entity>;

    /// Delete an entity (soft or hard per store policy), returning its
    /// last known state.
    async fn delete_item(&self, entity: Self::Entity) -> Result<Self::Entity>;
}
