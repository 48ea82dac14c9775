//! crates/tutoring_core/src/client.rs
//!
//! The resource client: the record store plus the backend port, with the
//! write-through rules the UI relies on. Updates and deletes mutate the
//! local cache first so views stay responsive; creates wait for the
//! backend-assigned id before inserting.

use crate::ports::{
    collection_from_value, BackendService, Notification, PortError, COMMAND_RETRIEVE_MULTIPLE,
};
use crate::store::{RawRecord, RecordCache, RecordStore, StoreError, RESOURCE_NAMES};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ResourceClient {
    store: RecordStore,
    backend: Arc<dyn BackendService>,
}

impl ResourceClient {
    pub fn new(backend: Arc<dyn BackendService>) -> Self {
        Self {
            store: RecordStore::new(),
            backend,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn backend(&self) -> &Arc<dyn BackendService> {
        &self.backend
    }

    pub fn cache(&self, resource: &str) -> Result<&RecordCache, StoreError> {
        self.store.by_name(resource)
    }

    /// Creates a record remotely, then inserts the stored copy (with its
    /// assigned id and date) into the local cache.
    pub async fn create_record(
        &self,
        resource: &str,
        record: RawRecord,
    ) -> Result<RawRecord, ClientError> {
        let cache = self.store.by_name(resource)?;
        let created = self.backend.create(resource, record).await?;
        cache.insert(created.clone())?;
        Ok(created)
    }

    /// Writes the record into the local cache, then pushes it to the
    /// backend. A backend failure is surfaced but the local copy stands
    /// until the next refresh.
    pub async fn update_record(
        &self,
        resource: &str,
        record: RawRecord,
    ) -> Result<(), ClientError> {
        let cache = self.store.by_name(resource)?;
        cache.insert(record.clone())?;
        self.backend.update(resource, record).await?;
        Ok(())
    }

    /// Removes the record locally, then deletes it remotely.
    pub async fn delete_record(&self, resource: &str, id: i64) -> Result<(), ClientError> {
        let cache = self.store.by_name(resource)?;
        cache.remove(id)?;
        self.backend.delete(resource, id).await?;
        Ok(())
    }

    /// Replaces every cache from one `retrieveMultiple` round-trip. On
    /// failure all caches are marked failed so stale data is never shown
    /// as current.
    pub async fn refresh_all(&self) -> Result<(), ClientError> {
        let names: Vec<Value> = RESOURCE_NAMES.iter().map(|n| json!(n)).collect();
        let result = self
            .backend
            .command(COMMAND_RETRIEVE_MULTIPLE, vec![Value::Array(names)])
            .await;
        let mut collections = match result {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                let err = PortError::InvalidResponse(format!(
                    "retrieveMultiple returned a non-object value: {other}"
                ));
                for cache in self.store.caches() {
                    cache.set_failed(err.to_string());
                }
                return Err(err.into());
            }
            Err(err) => {
                for cache in self.store.caches() {
                    cache.set_failed(err.to_string());
                }
                return Err(err.into());
            }
        };
        for cache in self.store.caches() {
            match collections.remove(cache.name()) {
                Some(value) => match collection_from_value(value) {
                    Ok(records) => cache.set_loaded(records),
                    Err(err) => cache.set_failed(err.to_string()),
                },
                None => cache.set_failed(format!(
                    "resource missing from retrieveMultiple response: {}",
                    cache.name()
                )),
            }
        }
        Ok(())
    }

    /// Applies a server notification to the local caches. Unknown resources
    /// and unloaded caches are ignored; there is nothing to rebase.
    pub fn apply_notification(&self, notification: Notification) {
        match notification {
            Notification::Create { resource, record }
            | Notification::Update { resource, record } => {
                if let Ok(cache) = self.store.by_name(&resource) {
                    cache.notify_upsert(record);
                }
            }
            Notification::Delete { resource, id } => {
                if let Ok(cache) = self.store.by_name(&resource) {
                    cache.notify_delete(id);
                }
            }
        }
    }
}
