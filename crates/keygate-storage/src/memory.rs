//! In-memory entity store.
//!
//! Rows are kept as attribute maps in a `DashMap`, so projections and
//! attribute-match queries behave the same way a relational backend would.
//! Used for single-process deployments and throughout the test suites.

use std::marker::PhantomData;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::traits::{Attributes, Entity, EntityStore, project};

/// In-memory entity store for one entity type.
pub struct MemoryEntityStore<E: Entity> {
    rows: DashMap<String, Attributes>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> MemoryEntityStore<E> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            _entity: PhantomData,
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn matching(&self, attribute: &str, value: &Value) -> Vec<Attributes> {
        let mut rows: Vec<Attributes> = self
            .rows
            .iter()
            .filter(|row| row.value().get(attribute) == Some(value))
            .map(|row| row.value().clone())
            .collect();
        // Stable order for callers and tests.
        rows.sort_by(|a, b| row_id(a).cmp(row_id(b)));
        rows
    }
}

impl<E: Entity> Default for MemoryEntityStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn row_id(row: &Attributes) -> &str {
    row.get("id").and_then(Value::as_str).unwrap_or_default()
}

#[async_trait]
impl<E: Entity> EntityStore<E> for MemoryEntityStore<E> {
    async fn find_by_id(&self, id: &str, select: &[String]) -> StorageResult<Option<E>> {
        let Some(row) = self.rows.get(id).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        E::from_attributes(project(row, select)).map(Some)
    }

    async fn find_by_ids(&self, ids: &[String], select: &[String]) -> StorageResult<Vec<E>> {
        ids.iter()
            .filter_map(|id| self.rows.get(id).map(|r| r.value().clone()))
            .map(|row| E::from_attributes(project(row, select)))
            .collect()
    }

    async fn find_one_by(&self, attribute: &str, value: &Value) -> StorageResult<Option<E>> {
        self.matching(attribute, value)
            .into_iter()
            .next()
            .map(E::from_attributes)
            .transpose()
    }

    async fn find_all_by(&self, attribute: &str, value: &Value) -> StorageResult<Vec<E>> {
        self.matching(attribute, value)
            .into_iter()
            .map(E::from_attributes)
            .collect()
    }

    async fn create(&self, entity: &E) -> StorageResult<E> {
        let id = entity.id();
        let attributes = entity.to_attributes()?;

        match self.rows.entry(id.clone()) {
            Entry::Occupied(_) => Err(StorageError::already_exists(E::ENTITY_TYPE, id)),
            Entry::Vacant(slot) => {
                slot.insert(attributes);
                Ok(entity.clone())
            }
        }
    }

    async fn update(&self, entity: &E) -> StorageResult<E> {
        let id = entity.id();
        let attributes = entity.to_attributes()?;

        match self.rows.get_mut(&id) {
            Some(mut row) => {
                *row = attributes;
                Ok(entity.clone())
            }
            None => Err(StorageError::not_found(E::ENTITY_TYPE, id)),
        }
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.rows
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(E::ENTITY_TYPE, id))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
