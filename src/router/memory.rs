//! In-memory data-access collaborator.
//!
//! Backs router tests and lightweight hosts. Filters are evaluated
//! directly against entity documents; listing order is by `uid` for
//! deterministic pages.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::authz::Document;
use crate::error::{CrudError, Result};
use crate::scope::grant::value_matches;
use crate::scope::ListFilter;

use super::store::{EntityData, EntityStore, OwnershipFilter};

/// Thread-safe in-memory entity store.
#[derive(Debug, Default)]
pub struct InMemoryStore<E> {
    items: DashMap<String, E>,
}

impl<E: EntityData + DeserializeOwned> InMemoryStore<E> {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    /// Seed an entity directly, bypassing the router's create path.
    pub fn insert(&self, entity: E) {
        self.items.insert(entity.uid().to_string(), entity);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn materialize(document: Document) -> Result<E> {
        Ok(serde_json::from_value(Value::Object(document))?)
    }
}

#[async_trait]
impl<E: EntityData + DeserializeOwned> EntityStore for InMemoryStore<E> {
    type Entity = E;

    async fn get_item(
        &self,
        uid: &str,
        tenant_id: &str,
        ownership: Option<&OwnershipFilter>,
    ) -> Result<Option<E>> {
        let Some(entry) = self.items.get(uid) else {
            return Ok(None);
        };
        let entity = entry.value();
        if entity.tenant_id() != tenant_id {
            return Ok(None);
        }
        if let Some(filter) = ownership {
            let document = entity.document()?;
            let owned = document
                .get(filter.field.as_str())
                .is_some_and(|actual| value_matches(&filter.owner_id, actual));
            if !owned {
                return Ok(None);
            }
        }
        Ok(Some(entity.clone()))
    }

    async fn list_total_combined(
        &self,
        offset: u64,
        limit: u64,
        tenant_id: &str,
        filter: &ListFilter,
    ) -> Result<(Vec<E>, u64)> {
        let mut matched: Vec<E> = Vec::new();
        for entry in self.items.iter() {
            let entity = entry.value();
            if entity.tenant_id() != tenant_id {
                continue;
            }
            if filter.matches_document(&entity.document()?) {
                matched.push(entity.clone());
            }
        }
        matched.sort_by(|a, b| a.uid().cmp(b.uid()));

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((items, total))
    }

    async fn create_item(&self, mut data: Document) -> Result<E> {
        if !data.contains_key("uid") {
            data.insert("uid".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        let entity = Self::materialize(data)?;
        let uid = entity.uid().to_string();
        self.items.insert(uid, entity.clone());
        Ok(entity)
    }

    async fn update_item(&self, entity: E, patch: Document) -> Result<E> {
        let mut document = entity.document()?;
        for (field, value) in patch {
            document.insert(field, value);
        }
        let updated = Self::materialize(document)?;
        if updated.uid() != entity.uid() {
            return Err(CrudError::Validation(
                "patch must not change the entity id".to_string(),
            ));
        }
        self.items.insert(updated.uid().to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete_item(&self, entity: E) -> Result<E> {
        self.items.remove(entity.uid());
        Ok(entity)
    }
}
