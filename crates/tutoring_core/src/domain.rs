//! crates/tutoring_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs mirror the records held by the remote spreadsheet-backed
//! service; on the wire every record is a JSON object with camelCase keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel learner id for "special" requests and matchings that have no
/// associated learner record.
pub const NO_LEARNER: i64 = -1;

/// Sentinel for `id`/`date` fields on a record that has not been created yet.
/// The backend replaces it with a real value during `create`.
pub const UNASSIGNED: i64 = -1;

/// Raw attendance data: epoch-ms date key mapped to a list of
/// `"<mod> <minutes>"` entries. Decoding lives in [`crate::attendance`].
pub type AttendanceData = BTreeMap<String, Vec<String>>;

/// How a student prefers to be contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactPref {
    Email,
    Phone,
    Either,
}

/// Lifecycle of a proposed tutor/mod pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BookingStatus {
    Ignore,
    Unsent,
    WaitingForTutor,
    Selected,
    Rejected,
}

/// Whether a request submission has been converted into a request yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Unchecked,
    Checked,
}

/// Profile fields shared by every student-shaped record (tutors, learners,
/// and raw request submissions). Optional fields arrive as blank strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub first_name: String,
    pub last_name: String,
    pub friendly_name: String,
    pub friendly_full_name: String,
    pub grade: i64,
    pub student_id: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub contact_pref: ContactPref,
    #[serde(default)]
    pub homeroom: String,
    #[serde(default)]
    pub homeroom_teacher: String,
    #[serde(default)]
    pub attendance_annotation: String,
}

/// A tutor and the three overlapping mod-availability signals they declare.
/// `drop_in_mods` and `mods_pref` are supposed to be subsets of `mods`; the
/// data checker reports violations, nothing prevents them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tutor {
    pub id: i64,
    pub date: i64,
    #[serde(flatten)]
    pub profile: StudentProfile,
    pub mods: Vec<u32>,
    pub mods_pref: Vec<u32>,
    pub subject_list: String,
    #[serde(default)]
    pub attendance: AttendanceData,
    pub drop_in_mods: Vec<u32>,
    #[serde(default)]
    pub after_school_availability: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_hours: Option<f64>,
}

/// A learner is profile-only; scheduling state lives on requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Learner {
    pub id: i64,
    pub date: i64,
    #[serde(flatten)]
    pub profile: StudentProfile,
    #[serde(default)]
    pub attendance: AttendanceData,
}

/// A tutoring request being walked through the scheduling steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: i64,
    pub date: i64,
    /// Learner record id, or [`NO_LEARNER`] for a special request.
    pub learner: i64,
    pub mods: Vec<u32>,
    pub subject: String,
    pub is_special: bool,
    #[serde(default)]
    pub annotation: String,
    /// Stored step, 1 through 4. Step 0 is derived, never stored.
    pub step: u8,
    pub chosen_bookings: Vec<i64>,
}

impl Request {
    pub fn is_special(&self) -> bool {
        self.is_special || self.learner == NO_LEARNER
    }
}

/// A provisional tutor/mod proposal for a request. Deleted en masse once
/// the request reaches step 4 and matchings replace it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: i64,
    pub date: i64,
    pub request: i64,
    pub tutor: i64,
    #[serde(
        rename = "mod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub mod_num: Option<u32>,
    pub status: BookingStatus,
}

/// A finalized tutor/learner/mod assignment. Takes precedence over the
/// tutor's drop-in availability at that mod.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matching {
    pub id: i64,
    pub date: i64,
    pub learner: i64,
    pub tutor: i64,
    pub subject: String,
    #[serde(
        rename = "mod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub mod_num: Option<u32>,
    #[serde(default)]
    pub annotation: String,
}

/// Raw intake record awaiting conversion into a request (and possibly a
/// new learner).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSubmission {
    pub id: i64,
    pub date: i64,
    #[serde(flatten)]
    pub profile: StudentProfile,
    pub mods: Vec<u32>,
    pub subject: String,
    #[serde(default)]
    pub is_special: bool,
    #[serde(default)]
    pub annotation: String,
    pub status: SubmissionStatus,
}
