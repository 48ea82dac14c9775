//! services/coordinator/src/error.rs
//!
//! Defines the primary error type for the entire coordinator service.

use crate::config::ConfigError;
use tutoring_core::attendance::AttendanceError;
use tutoring_core::client::ClientError;
use tutoring_core::ports::PortError;
use tutoring_core::scheduling::SchedulingError;
use tutoring_core::store::StoreError;
use tutoring_core::workflow::WorkflowError;

/// The primary error type for the `coordinator` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from the core backend port.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the local record store.
    #[error("Record Store Error: {0}")]
    Store(#[from] StoreError),

    /// Represents an error from the resource client's write-through path.
    #[error("Resource Client Error: {0}")]
    Client(#[from] ClientError),

    /// Represents a scheduling workflow transition that was refused.
    #[error("Workflow Error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Represents a scheduling data inconsistency fatal to the indexer.
    #[error("Scheduling Error: {0}")]
    Scheduling(#[from] SchedulingError),

    /// Represents an undecodable attendance blob.
    #[error("Attendance Error: {0}")]
    Attendance(#[from] AttendanceError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
