//! crates/tutoring_core/src/schema.rs
//!
//! Declarative field schemas for every resource, consumed by the data
//! checker. A validator never panics, whatever the runtime shape of the
//! value: malformed data is exactly what it exists to report.

use crate::store::{self, RawRecord};
use serde_json::Value;

/// Outcome of validating one field value.
///
/// `RefersTo` means the value is an id into another resource; the checker
/// resolves it against that resource's collection. A resolved reference
/// counts as neither valid nor invalid in the tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldCheck {
    Valid,
    Invalid(String),
    RefersTo(&'static str),
}

/// The declared type of a field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    String { optional: bool },
    Number,
    Boolean,
    Select(&'static [&'static str]),
    NumberArray,
    Json,
    Id { resource: &'static str, optional: bool },
}

impl FieldKind {
    /// Total over arbitrary values. A missing field is validated as
    /// `Value::Null` and fails every kind that cares about its type.
    pub fn validate(&self, value: &Value) -> FieldCheck {
        match self {
            FieldKind::String { optional } => match value {
                Value::String(s) => {
                    if !optional {
                        if s.is_empty() {
                            return FieldCheck::Invalid(
                                "field shouldn't be blank".to_string(),
                            );
                        }
                        if s.trim().is_empty() {
                            return FieldCheck::Invalid(
                                "field shouldn't be blank (there is only whitespace)"
                                    .to_string(),
                            );
                        }
                    }
                    FieldCheck::Valid
                }
                _ => FieldCheck::Invalid(
                    "field should be text/string, but isn't".to_string(),
                ),
            },
            FieldKind::Number => match value {
                Value::Number(_) => FieldCheck::Valid,
                _ => FieldCheck::Invalid("field isn't a number".to_string()),
            },
            FieldKind::Boolean => match value {
                Value::Bool(_) => FieldCheck::Valid,
                _ => FieldCheck::Invalid("not a true/false value".to_string()),
            },
            // Select options are not checked for membership, only for being
            // a non-blank string.
            FieldKind::Select(_) => match value {
                Value::String(s) => {
                    if s.is_empty() {
                        FieldCheck::Invalid("field is blank".to_string())
                    } else if s.trim().is_empty() {
                        FieldCheck::Invalid("field is blank (only whitespace)".to_string())
                    } else {
                        FieldCheck::Valid
                    }
                }
                _ => FieldCheck::Invalid("field isn't text/string".to_string()),
            },
            FieldKind::NumberArray | FieldKind::Json => FieldCheck::Valid,
            FieldKind::Id { resource, optional } => match value {
                Value::Number(n) => {
                    if *optional && n.as_i64() == Some(crate::domain::NO_LEARNER) {
                        FieldCheck::Valid
                    } else {
                        FieldCheck::RefersTo(resource)
                    }
                }
                _ => FieldCheck::Invalid("ID isn't a number".to_string()),
            },
        }
    }
}

pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

pub struct ResourceSchema {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl ResourceSchema {
    fn new(name: &'static str, mut fields: Vec<FieldSpec>) -> Self {
        // Every record carries backend-assigned id and date fields.
        fields.push(field("id", FieldKind::Number));
        fields.push(field("date", FieldKind::Number));
        Self { name, fields }
    }

    /// Looks a field value up for validation; missing fields validate as
    /// null so the validators can report them.
    pub fn field_value<'a>(record: &'a RawRecord, name: &str) -> &'a Value {
        record.get(name).unwrap_or(&Value::Null)
    }
}

const CONTACT_PREF_OPTIONS: &[&str] = &["email", "phone", "either"];
const BOOKING_STATUS_OPTIONS: &[&str] =
    &["ignore", "unsent", "waitingForTutor", "selected", "rejected"];
const SUBMISSION_STATUS_OPTIONS: &[&str] = &["unchecked", "checked"];

fn student_profile_fields() -> Vec<FieldSpec> {
    vec![
        field("firstName", FieldKind::String { optional: false }),
        field("lastName", FieldKind::String { optional: false }),
        field("friendlyName", FieldKind::String { optional: false }),
        field("friendlyFullName", FieldKind::String { optional: false }),
        field("grade", FieldKind::Number),
        field("studentId", FieldKind::Number),
        field("email", FieldKind::String { optional: true }),
        field("phone", FieldKind::String { optional: true }),
        field("contactPref", FieldKind::Select(CONTACT_PREF_OPTIONS)),
        field("homeroom", FieldKind::String { optional: true }),
        field("homeroomTeacher", FieldKind::String { optional: true }),
        field(
            "attendanceAnnotation",
            FieldKind::String { optional: true },
        ),
    ]
}

fn tutors_schema() -> ResourceSchema {
    let mut fields = student_profile_fields();
    fields.extend([
        field("mods", FieldKind::NumberArray),
        field("modsPref", FieldKind::NumberArray),
        field("subjectList", FieldKind::String { optional: false }),
        field("attendance", FieldKind::Json),
        field("dropInMods", FieldKind::NumberArray),
        field(
            "afterSchoolAvailability",
            FieldKind::String { optional: true },
        ),
        field("additionalHours", FieldKind::Number),
    ]);
    ResourceSchema::new(store::TUTORS, fields)
}

fn learners_schema() -> ResourceSchema {
    let mut fields = student_profile_fields();
    fields.push(field("attendance", FieldKind::Json));
    ResourceSchema::new(store::LEARNERS, fields)
}

fn requests_schema() -> ResourceSchema {
    ResourceSchema::new(
        store::REQUESTS,
        vec![
            field(
                "learner",
                FieldKind::Id {
                    resource: store::LEARNERS,
                    optional: true,
                },
            ),
            field("mods", FieldKind::NumberArray),
            field("subject", FieldKind::String { optional: false }),
            field("isSpecial", FieldKind::Boolean),
            field("annotation", FieldKind::String { optional: true }),
            field("step", FieldKind::Number),
            field("chosenBookings", FieldKind::NumberArray),
        ],
    )
}

fn bookings_schema() -> ResourceSchema {
    ResourceSchema::new(
        store::BOOKINGS,
        vec![
            field(
                "request",
                FieldKind::Id {
                    resource: store::REQUESTS,
                    optional: false,
                },
            ),
            field(
                "tutor",
                FieldKind::Id {
                    resource: store::TUTORS,
                    optional: false,
                },
            ),
            field("mod", FieldKind::Number),
            field("status", FieldKind::Select(BOOKING_STATUS_OPTIONS)),
        ],
    )
}

fn matchings_schema() -> ResourceSchema {
    ResourceSchema::new(
        store::MATCHINGS,
        vec![
            field(
                "learner",
                FieldKind::Id {
                    resource: store::LEARNERS,
                    optional: true,
                },
            ),
            field(
                "tutor",
                FieldKind::Id {
                    resource: store::TUTORS,
                    optional: false,
                },
            ),
            field("subject", FieldKind::String { optional: false }),
            field("mod", FieldKind::Number),
            field("annotation", FieldKind::String { optional: true }),
        ],
    )
}

fn request_submissions_schema() -> ResourceSchema {
    let mut fields = student_profile_fields();
    fields.extend([
        field("mods", FieldKind::NumberArray),
        field("subject", FieldKind::String { optional: false }),
        field("isSpecial", FieldKind::Boolean),
        field("annotation", FieldKind::String { optional: true }),
        field("status", FieldKind::Select(SUBMISSION_STATUS_OPTIONS)),
    ]);
    ResourceSchema::new(store::REQUEST_SUBMISSIONS, fields)
}

/// All resource schemas, in sweep order.
pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        learners_schema(),
        bookings_schema(),
        matchings_schema(),
        requests_schema(),
        tutors_schema(),
        request_submissions_schema(),
    ]
}
