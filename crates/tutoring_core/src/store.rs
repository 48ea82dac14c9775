//! crates/tutoring_core/src/store.rs
//!
//! The local record store: one keyed cache per resource, filled from the
//! backend and mutated by local writes and server notifications. The store
//! is constructed once at startup and passed by reference into the indexer,
//! checker and workflow; there is no global state.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

/// Resource names as they appear on the wire.
pub const TUTORS: &str = "tutors";
pub const LEARNERS: &str = "learners";
pub const REQUESTS: &str = "requests";
pub const BOOKINGS: &str = "bookings";
pub const MATCHINGS: &str = "matchings";
pub const REQUEST_SUBMISSIONS: &str = "requestSubmissions";

/// All resource names, in the order the checker sweeps them.
pub const RESOURCE_NAMES: [&str; 6] = [
    LEARNERS,
    BOOKINGS,
    MATCHINGS,
    REQUESTS,
    TUTORS,
    REQUEST_SUBMISSIONS,
];

/// A record as it crosses the RPC boundary: a JSON object with camelCase
/// keys. Typed views are produced on demand via [`RecordCache::decode`].
pub type RawRecord = serde_json::Map<String, Value>;

/// A loaded record collection, keyed by record id.
pub type RecordMap = BTreeMap<i64, RawRecord>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("resource is not loaded: {0}")]
    NotLoaded(String),

    #[error("record not available: {resource}/#{id}")]
    RecordNotAvailable { resource: String, id: i64 },

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("record has no id field")]
    MissingId,

    #[error("malformed record {resource}/#{id}: {message}")]
    MalformedRecord {
        resource: String,
        id: i64,
        message: String,
    },

    #[error("record could not be serialized: {0}")]
    Encode(String),
}

/// Serializes a typed record into its wire shape.
pub fn to_raw<T: Serialize>(record: &T) -> Result<RawRecord, StoreError> {
    match serde_json::to_value(record).map_err(|e| StoreError::Encode(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Encode(format!(
            "record serialized to a non-object value: {other}"
        ))),
    }
}

/// Extracts the id of a raw record, if it has one.
pub fn record_id(record: &RawRecord) -> Option<i64> {
    record.get("id").and_then(Value::as_i64)
}

/// A change signal with deterministic, synchronous delivery: subscribers
/// run in subscription order on the emitting thread.
#[derive(Default)]
pub struct Signal {
    listeners: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.listeners
            .lock()
            .expect("signal lock poisoned")
            .push(Box::new(listener));
    }

    pub fn emit(&self) {
        for listener in self.listeners.lock().expect("signal lock poisoned").iter() {
            listener();
        }
    }
}

enum CacheState {
    /// Not yet loaded, or the last refresh failed. Carries the message shown
    /// to anyone who tries to read the cache.
    Failed(String),
    Loaded(RecordMap),
}

/// One resource's local record collection.
pub struct RecordCache {
    name: &'static str,
    state: RwLock<CacheState>,
    /// Fires after every visible mutation of the collection.
    pub change: Signal,
}

impl RecordCache {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(CacheState::Failed(
                "resource was not initialized properly".to_string(),
            )),
            change: Signal::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_loaded(&self) -> bool {
        matches!(
            *self.state.read().expect("cache lock poisoned"),
            CacheState::Loaded(_)
        )
    }

    /// Returns a copy of the loaded collection, or the stored failure.
    pub fn snapshot(&self) -> Result<RecordMap, StoreError> {
        match &*self.state.read().expect("cache lock poisoned") {
            CacheState::Failed(message) => Err(StoreError::NotLoaded(format!(
                "{}: {}",
                self.name, message
            ))),
            CacheState::Loaded(records) => Ok(records.clone()),
        }
    }

    pub fn get_record(&self, id: i64) -> Result<RawRecord, StoreError> {
        match &*self.state.read().expect("cache lock poisoned") {
            CacheState::Failed(message) => Err(StoreError::NotLoaded(format!(
                "{}: {}",
                self.name, message
            ))),
            CacheState::Loaded(records) => {
                records
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| StoreError::RecordNotAvailable {
                        resource: self.name.to_string(),
                        id,
                    })
            }
        }
    }

    /// Typed view of one record.
    pub fn decode<T: DeserializeOwned>(&self, id: i64) -> Result<T, StoreError> {
        let record = self.get_record(id)?;
        serde_json::from_value(Value::Object(record)).map_err(|e| StoreError::MalformedRecord {
            resource: self.name.to_string(),
            id,
            message: e.to_string(),
        })
    }

    /// Typed view of the whole collection, in id order.
    pub fn decode_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        self.snapshot()?
            .into_iter()
            .map(|(id, record)| {
                serde_json::from_value(Value::Object(record)).map_err(|e| {
                    StoreError::MalformedRecord {
                        resource: self.name.to_string(),
                        id,
                        message: e.to_string(),
                    }
                })
            })
            .collect()
    }

    pub fn set_loaded(&self, records: RecordMap) {
        *self.state.write().expect("cache lock poisoned") = CacheState::Loaded(records);
        self.change.emit();
    }

    pub fn set_failed(&self, message: impl Into<String>) {
        *self.state.write().expect("cache lock poisoned") = CacheState::Failed(message.into());
        self.change.emit();
    }

    /// Inserts or replaces a record in a loaded cache.
    pub fn insert(&self, record: RawRecord) -> Result<(), StoreError> {
        let id = record_id(&record).ok_or(StoreError::MissingId)?;
        match &mut *self.state.write().expect("cache lock poisoned") {
            CacheState::Failed(message) => {
                return Err(StoreError::NotLoaded(format!("{}: {}", self.name, message)))
            }
            CacheState::Loaded(records) => {
                records.insert(id, record);
            }
        }
        self.change.emit();
        Ok(())
    }

    /// Removes a record from a loaded cache. Removing an absent id is not
    /// an error; the backend delete is what matters.
    pub fn remove(&self, id: i64) -> Result<(), StoreError> {
        match &mut *self.state.write().expect("cache lock poisoned") {
            CacheState::Failed(message) => {
                return Err(StoreError::NotLoaded(format!("{}: {}", self.name, message)))
            }
            CacheState::Loaded(records) => {
                records.remove(&id);
            }
        }
        self.change.emit();
        Ok(())
    }

    /// Applies a server-side mutation. Unlike [`RecordCache::insert`], a
    /// notification against an unloaded cache is silently dropped; the next
    /// full refresh supersedes it.
    pub(crate) fn notify_upsert(&self, record: RawRecord) {
        let Some(id) = record_id(&record) else {
            return;
        };
        let mut changed = false;
        if let CacheState::Loaded(records) = &mut *self.state.write().expect("cache lock poisoned")
        {
            records.insert(id, record);
            changed = true;
        }
        if changed {
            self.change.emit();
        }
    }

    pub(crate) fn notify_delete(&self, id: i64) {
        let mut changed = false;
        if let CacheState::Loaded(records) = &mut *self.state.write().expect("cache lock poisoned")
        {
            records.remove(&id);
            changed = true;
        }
        if changed {
            self.change.emit();
        }
    }
}

/// The six resource caches.
pub struct RecordStore {
    tutors: RecordCache,
    learners: RecordCache,
    requests: RecordCache,
    bookings: RecordCache,
    matchings: RecordCache,
    request_submissions: RecordCache,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            tutors: RecordCache::new(TUTORS),
            learners: RecordCache::new(LEARNERS),
            requests: RecordCache::new(REQUESTS),
            bookings: RecordCache::new(BOOKINGS),
            matchings: RecordCache::new(MATCHINGS),
            request_submissions: RecordCache::new(REQUEST_SUBMISSIONS),
        }
    }

    pub fn tutors(&self) -> &RecordCache {
        &self.tutors
    }

    pub fn learners(&self) -> &RecordCache {
        &self.learners
    }

    pub fn requests(&self) -> &RecordCache {
        &self.requests
    }

    pub fn bookings(&self) -> &RecordCache {
        &self.bookings
    }

    pub fn matchings(&self) -> &RecordCache {
        &self.matchings
    }

    pub fn request_submissions(&self) -> &RecordCache {
        &self.request_submissions
    }

    pub fn by_name(&self, name: &str) -> Result<&RecordCache, StoreError> {
        match name {
            TUTORS => Ok(&self.tutors),
            LEARNERS => Ok(&self.learners),
            REQUESTS => Ok(&self.requests),
            BOOKINGS => Ok(&self.bookings),
            MATCHINGS => Ok(&self.matchings),
            REQUEST_SUBMISSIONS => Ok(&self.request_submissions),
            other => Err(StoreError::UnknownResource(other.to_string())),
        }
    }

    pub fn caches(&self) -> [&RecordCache; 6] {
        [
            &self.learners,
            &self.bookings,
            &self.matchings,
            &self.requests,
            &self.tutors,
            &self.request_submissions,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn unloaded_cache_reports_initialization_failure() {
        let store = RecordStore::new();
        let err = store.tutors().snapshot().unwrap_err();
        assert!(matches!(err, StoreError::NotLoaded(_)));
        assert!(err
            .to_string()
            .contains("resource was not initialized properly"));
    }

    #[test]
    fn insert_and_get_round_trip() {
        let store = RecordStore::new();
        store.tutors().set_loaded(RecordMap::new());
        store
            .tutors()
            .insert(raw(json!({ "id": 7, "date": 1 })))
            .unwrap();
        let record = store.tutors().get_record(7).unwrap();
        assert_eq!(record_id(&record), Some(7));

        let err = store.tutors().get_record(8).unwrap_err();
        assert!(matches!(
            err,
            StoreError::RecordNotAvailable { id: 8, .. }
        ));
    }

    #[test]
    fn notifications_against_unloaded_cache_are_dropped() {
        let store = RecordStore::new();
        store
            .bookings()
            .notify_upsert(raw(json!({ "id": 1, "date": 1 })));
        assert!(!store.bookings().is_loaded());

        store.bookings().set_loaded(RecordMap::new());
        store
            .bookings()
            .notify_upsert(raw(json!({ "id": 1, "date": 1 })));
        assert_eq!(store.bookings().snapshot().unwrap().len(), 1);
        store.bookings().notify_delete(1);
        assert!(store.bookings().snapshot().unwrap().is_empty());
    }

    #[test]
    fn change_signal_fires_on_every_mutation() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let store = RecordStore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        store.requests().change.subscribe(move || {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        store.requests().set_loaded(RecordMap::new());
        store
            .requests()
            .insert(raw(json!({ "id": 1, "date": 1 })))
            .unwrap();
        store.requests().remove(1).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unknown_resource_name_is_an_error() {
        let store = RecordStore::new();
        assert!(matches!(
            store.by_name("nonsense"),
            Err(StoreError::UnknownResource(_))
        ));
    }
}
