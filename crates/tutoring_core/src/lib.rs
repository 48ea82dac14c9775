pub mod attendance;
pub mod checker;
pub mod client;
pub mod domain;
pub mod ports;
pub mod scheduling;
pub mod schema;
pub mod store;
pub mod workflow;

pub use client::{ClientError, ResourceClient};
pub use domain::{
    Booking, BookingStatus, Learner, Matching, Request, RequestSubmission, StudentProfile,
    SubmissionStatus, Tutor, NO_LEARNER, UNASSIGNED,
};
pub use ports::{BackendService, Notification, PortError, PortResult};
pub use store::{RawRecord, RecordMap, RecordStore, StoreError};
