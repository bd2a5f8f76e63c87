//! Entity and entity store traits.
//!
//! This module defines the contract every durable store backend implements,
//! plus the helpers that map entities to and from their attribute form.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{StorageError, StorageResult};

/// Attribute map of one persisted entity, keyed by attribute name.
pub type Attributes = Map<String, Value>;

/// A persisted entity addressed by a string primary id.
///
/// The serde representation is the entity's persisted attribute set. Derived
/// or virtual fields must be `#[serde(skip)]` so they never reach a store or
/// a cache.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Entity type name. Doubles as the cache namespace (`<type>:<id>`).
    const ENTITY_TYPE: &'static str;

    /// The entity's primary id.
    fn id(&self) -> String;

    /// Converts the entity to its attribute map.
    fn to_attributes(&self) -> StorageResult<Attributes> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(StorageError::invalid_entity(format!(
                "{} serialized to a non-object value: {other}",
                Self::ENTITY_TYPE
            ))),
        }
    }

    /// Builds an entity back from its attribute map.
    fn from_attributes(attributes: Attributes) -> StorageResult<Self> {
        Ok(serde_json::from_value(Value::Object(attributes))?)
    }

    /// Reads a single attribute value, `None` if the attribute is absent.
    fn attribute(&self, name: &str) -> Option<Value> {
        self.to_attributes().ok()?.remove(name)
    }
}

/// Restricts an attribute map to `select` (plus `id`). An empty selection keeps
/// every attribute.
pub fn project(mut attributes: Attributes, select: &[String]) -> Attributes {
    if select.is_empty() {
        return attributes;
    }
    attributes.retain(|key, _| key == "id" || select.iter().any(|s| s == key));
    attributes
}

/// Durable entity storage for a single entity type.
///
/// Implementations must be thread-safe (`Send + Sync`). All reads return
/// `Ok(None)`/empty collections for missing rows; errors are reserved for
/// infrastructure failures and constraint violations.
///
/// # Example
///
/// ```ignore
/// use keygate_storage::{EntityStore, StorageError};
///
/// async fn require_token(store: &dyn EntityStore<Token>, id: &str) -> Result<Token, StorageError> {
///     store
///         .find_by_id(id, &[])
///         .await?
///         .ok_or_else(|| StorageError::not_found("tokens", id))
/// }
/// ```
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Finds an entity by primary id, optionally restricted to an attribute subset.
    async fn find_by_id(&self, id: &str, select: &[String]) -> StorageResult<Option<E>>;

    /// Finds every entity whose id is in `ids`. Order of the result is unspecified.
    async fn find_by_ids(&self, ids: &[String], select: &[String]) -> StorageResult<Vec<E>>;

    /// Finds the first entity whose `attribute` equals `value`.
    async fn find_one_by(&self, attribute: &str, value: &Value) -> StorageResult<Option<E>>;

    /// Finds every entity whose `attribute` equals `value`.
    async fn find_all_by(&self, attribute: &str, value: &Value) -> StorageResult<Vec<E>>;

    /// Persists a new entity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if an entity with the same id exists.
    async fn create(&self, entity: &E) -> StorageResult<E>;

    /// Replaces the persisted state of an existing entity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the entity does not exist.
    async fn update(&self, entity: &E) -> StorageResult<E>;

    /// Deletes an entity by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the entity does not exist.
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Returns the backend name for logging.
    fn backend_name(&self) -> &'static str;
}
