//! crates/tutoring_core/src/ports.rs
//!
//! Service contracts (traits) at the boundary of the core. The backend is
//! the remote spreadsheet-backed record service; everything the core knows
//! about it is this trait plus the notification shape it pushes back.

use crate::store::{RawRecord, RecordMap};
use async_trait::async_trait;
use serde_json::Value;

/// Remote commands understood by the backend besides plain resource verbs.
pub const COMMAND_SYNC_DATA_FROM_FORMS: &str = "syncDataFromForms";
pub const COMMAND_RECALCULATE_ATTENDANCE: &str = "recalculateAttendance";
pub const COMMAND_GENERATE_SCHEDULE: &str = "generateSchedule";
pub const COMMAND_RETRIEVE_MULTIPLE: &str = "retrieveMultiple";

/// A generic error type for all backend operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The backend reported a failure in its response envelope.
    #[error("{0}")]
    Backend(String),

    /// The client-side deadline elapsed. The in-flight remote operation is
    /// not aborted; it may still complete on the server.
    #[error("Server is not responding")]
    Timeout,

    /// The reply could not be decoded into the expected envelope or value.
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

pub type PortResult<T> = Result<T, PortError>;

/// The RPC surface of the record backend. Calls are never cancelled once
/// issued and the caller awaits them one at a time.
#[async_trait]
pub trait BackendService: Send + Sync {
    async fn retrieve_all(&self, resource: &str) -> PortResult<RecordMap>;

    /// Creates a record; `id`/`date` of `-1` are assigned by the backend,
    /// and the stored record is returned.
    async fn create(&self, resource: &str, record: RawRecord) -> PortResult<RawRecord>;

    async fn update(&self, resource: &str, record: RawRecord) -> PortResult<()>;

    async fn delete(&self, resource: &str, id: i64) -> PortResult<()>;

    /// Backend-side debug dump of a resource. Part of the wire protocol;
    /// not used by the workflow.
    async fn debug(&self, resource: &str) -> PortResult<Value>;

    async fn command(&self, name: &str, args: Vec<Value>) -> PortResult<Value>;
}

/// A mutation pushed by the server so other clients can rebase their local
/// caches. Delivery is fire-and-forget: no acknowledgement, no conflict
/// resolution, last write wins.
#[derive(Debug, Clone)]
pub enum Notification {
    Create { resource: String, record: RawRecord },
    Update { resource: String, record: RawRecord },
    Delete { resource: String, id: i64 },
}

/// Decodes a record collection from its wire shape (a JSON object keyed by
/// stringified record ids).
pub fn collection_from_value(value: Value) -> PortResult<RecordMap> {
    let object = match value {
        Value::Object(map) => map,
        other => {
            return Err(PortError::InvalidResponse(format!(
                "expected a record collection object, got: {other}"
            )))
        }
    };
    let mut records = RecordMap::new();
    for (key, entry) in object {
        let record = match entry {
            Value::Object(map) => map,
            other => {
                return Err(PortError::InvalidResponse(format!(
                    "record {key} is not an object: {other}"
                )))
            }
        };
        let id = crate::store::record_id(&record)
            .or_else(|| key.parse::<i64>().ok())
            .ok_or_else(|| {
                PortError::InvalidResponse(format!("record {key} has no usable id"))
            })?;
        records.insert(id, record);
    }
    Ok(records)
}
