//! services/coordinator/src/adapters/rpc.rs
//!
//! This module contains the RPC adapter for the record backend. It
//! implements the `BackendService` port from the `core` crate on top of a
//! pluggable [`Transport`] that moves one args array to the server and
//! brings back one JSON envelope string.
//!
//! The wire protocol: the first args element is either a resource name
//! (followed by a verb and its payload) or the literal `"command"`
//! (followed by a command name). Every reply is a JSON string of
//! `{error, val, message}`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use tutoring_core::ports::{collection_from_value, BackendService, PortError, PortResult};
use tutoring_core::store::{RawRecord, RecordMap};

/// One-shot message transport to the record server.
///
/// A transport failure (not an `error: true` envelope) is reported as a
/// `PortError` directly. The production deployment plugs the remote
/// bridge in here; tests and demos use [`crate::adapters::MockTransport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, args: Vec<Value>) -> PortResult<String>;
}

/// The `{error, val, message}` reply envelope.
#[derive(Debug, Deserialize)]
struct ServerResponse {
    error: bool,
    #[serde(default)]
    val: Value,
    #[serde(default)]
    message: Option<String>,
}

/// `BackendService` adapter over a [`Transport`].
pub struct RpcBackend<T: Transport> {
    transport: T,
    timeout: Duration,
}

impl<T: Transport> RpcBackend<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Sends one args array and unwraps the reply envelope.
    ///
    /// Resource verbs run under the deadline; commands do not, because
    /// some of them (schedule generation, attendance recalculation)
    /// legitimately outlast it. An elapsed deadline abandons the reply
    /// but does not cancel the remote operation.
    async fn ask(&self, args: Vec<Value>, with_deadline: bool) -> PortResult<Value> {
        debug!(?args, "backend ask");
        let reply = if with_deadline {
            tokio::time::timeout(self.timeout, self.transport.send(args))
                .await
                .map_err(|_| PortError::Timeout)??
        } else {
            self.transport.send(args).await?
        };
        let response: ServerResponse = serde_json::from_str(&reply)
            .map_err(|e| PortError::InvalidResponse(format!("bad reply envelope: {e}")))?;
        if response.error {
            Err(PortError::Backend(
                response
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Mysterious error".to_string()),
            ))
        } else {
            Ok(response.val)
        }
    }
}

#[async_trait]
impl<T: Transport> BackendService for RpcBackend<T> {
    async fn retrieve_all(&self, resource: &str) -> PortResult<RecordMap> {
        let val = self
            .ask(vec![json!(resource), json!("retrieveAll")], true)
            .await?;
        collection_from_value(val)
    }

    async fn create(&self, resource: &str, record: RawRecord) -> PortResult<RawRecord> {
        let val = self
            .ask(
                vec![json!(resource), json!("create"), Value::Object(record)],
                true,
            )
            .await?;
        match val {
            Value::Object(created) => Ok(created),
            other => Err(PortError::InvalidResponse(format!(
                "create returned a non-record value: {other}"
            ))),
        }
    }

    async fn update(&self, resource: &str, record: RawRecord) -> PortResult<()> {
        self.ask(
            vec![json!(resource), json!("update"), Value::Object(record)],
            true,
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, resource: &str, id: i64) -> PortResult<()> {
        self.ask(vec![json!(resource), json!("delete"), json!(id)], true)
            .await?;
        Ok(())
    }

    async fn debug(&self, resource: &str) -> PortResult<Value> {
        self.ask(vec![json!(resource), json!("debug")], true).await
    }

    async fn command(&self, name: &str, args: Vec<Value>) -> PortResult<Value> {
        let mut wire = vec![json!("command"), json!(name)];
        wire.extend(args);
        self.ask(wire, false).await
    }
}
