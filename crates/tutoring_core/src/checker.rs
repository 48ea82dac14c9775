//! crates/tutoring_core/src/checker.rs
//!
//! The data checker: a read-only sweep over every field of every record of
//! every resource, applying the declared validators and resolving id
//! references, followed by a specialized tutor pass for the mod-subset
//! invariants. It reports problems; it never fixes them.

use crate::schema::{schemas, FieldCheck, ResourceSchema};
use crate::store::{self, RecordMap, RecordStore, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

/// A structured pointer into the data behind one problem. Every field is
/// optional; tags carry whatever subset locates the offending value.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProblemTag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Runtime type of the offending value, JavaScript-typeof style.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ProblemTag {
    fn for_field(resource: &str, id: i64, field: &str, value: &Value) -> Self {
        Self {
            resource: Some(resource.to_string()),
            id: Some(id),
            field: Some(field.to_string()),
            value: Some(display_value(value)),
            kind: Some(runtime_type(value).to_string()),
            ..Self::default()
        }
    }
}

/// One problem found by the checker: human text plus locator tags.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Problem {
    pub text: String,
    pub tags: Vec<ProblemTag>,
}

/// The checker's result. `valid_fields` counts only fields whose type
/// validator returned `Valid`; a resolved id reference increments nothing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    #[serde(rename = "validFieldCount")]
    pub valid_fields: u32,
    pub problems: Vec<Problem>,
}

/// Checks that everything in `a` is contained in `b`. Duplicates and order
/// are irrelevant; the empty list is a subset of anything.
pub fn check_subset<T: Eq + Hash>(a: &[T], b: &[T]) -> bool {
    let b_set: HashSet<&T> = b.iter().collect();
    a.iter().all(|item| b_set.contains(item))
}

/// Stringifies a field value for problem tags the way the UI displays
/// them: arrays join with commas, objects collapse, missing values show
/// as `undefined`.
fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "undefined".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// JavaScript-typeof name for a runtime value, kept for parity with the
/// reports coordinators are used to reading.
fn runtime_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "undefined",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

/// Runs the full check: the generic field sweep, then the specialized
/// tutor/matching pass, results concatenated. Fails only when a resource
/// cache is unavailable; malformed data is report material, never an error.
pub fn run_data_checker(store: &RecordStore) -> Result<CheckReport, StoreError> {
    let mut valid_fields = 0u32;
    let mut problems = Vec::new();

    let schemas = schemas();
    for schema in &schemas {
        let records = store.by_name(schema.name)?.snapshot()?;
        sweep_resource(store, schema, &records, &mut valid_fields, &mut problems)?;
    }

    let special = run_tutor_consistency_check(
        &store.tutors().snapshot()?,
        &store.matchings().snapshot()?,
    );
    Ok(CheckReport {
        valid_fields: valid_fields + special.valid_fields,
        problems: {
            let mut all = problems;
            all.extend(special.problems);
            all
        },
    })
}

fn sweep_resource(
    store: &RecordStore,
    schema: &ResourceSchema,
    records: &RecordMap,
    valid_fields: &mut u32,
    problems: &mut Vec<Problem>,
) -> Result<(), StoreError> {
    for (&id, record) in records {
        for field in &schema.fields {
            let value = ResourceSchema::field_value(record, field.name);
            match field.kind.validate(value) {
                FieldCheck::Valid => *valid_fields += 1,
                FieldCheck::Invalid(text) => problems.push(Problem {
                    text,
                    tags: vec![ProblemTag::for_field(schema.name, id, field.name, value)],
                }),
                FieldCheck::RefersTo(target) => {
                    let target_records = store.by_name(target)?.snapshot()?;
                    let resolved = value
                        .as_i64()
                        .is_some_and(|ref_id| target_records.contains_key(&ref_id));
                    if !resolved {
                        problems.push(Problem {
                            text: "invalid ID".to_string(),
                            tags: vec![
                                ProblemTag::for_field(schema.name, id, field.name, value),
                                ProblemTag {
                                    resource: Some(schema.name.to_string()),
                                    id_resource: Some(target.to_string()),
                                    ..ProblemTag::default()
                                },
                            ],
                        });
                    }
                    // A resolved reference counts as neither valid nor
                    // invalid in the tally.
                }
            }
        }
    }
    Ok(())
}

/// Reads a mod-list field leniently: each element becomes `Some(mod)` if
/// it is an integer and `None` otherwise, so a malformed entry can never
/// satisfy a subset check by accident.
fn mod_list(record: &store::RawRecord, field: &str) -> Vec<Option<i64>> {
    match record.get(field) {
        Some(Value::Array(items)) => items.iter().map(Value::as_i64).collect(),
        _ => Vec::new(),
    }
}

fn subset_violation_tags(
    tutor_id: i64,
    field: &str,
    field_value: &Value,
    mods_value: &Value,
) -> Vec<ProblemTag> {
    vec![
        ProblemTag {
            resource: Some(store::TUTORS.to_string()),
            id: Some(tutor_id),
            field: Some(field.to_string()),
            value: Some(display_value(field_value)),
            kind: Some(runtime_type(field_value).to_string()),
            ..ProblemTag::default()
        },
        ProblemTag {
            resource: Some(store::TUTORS.to_string()),
            id: Some(tutor_id),
            field: Some("mods".to_string()),
            value: Some(display_value(mods_value)),
            kind: Some(runtime_type(mods_value).to_string()),
            ..ProblemTag::default()
        },
    ]
}

/// The specialized pass: for every tutor, `dropInMods` and `modsPref` must
/// be subsets of `mods`, and so must the set of mods the tutor has
/// actually been matched into. Each passing relation counts as one valid
/// field; each failing one is a problem.
fn run_tutor_consistency_check(tutors: &RecordMap, matchings: &RecordMap) -> CheckReport {
    let mut valid_fields = 0u32;
    let mut problems = Vec::new();

    // Matchings grouped by tutor id. A matching whose tutor id dangles is
    // already reported by the generic sweep; it is skipped here.
    let mut by_tutor: BTreeMap<i64, Vec<(i64, &store::RawRecord)>> = BTreeMap::new();
    for (&matching_id, matching) in matchings {
        if let Some(tutor_id) = matching.get("tutor").and_then(Value::as_i64) {
            if tutors.contains_key(&tutor_id) {
                by_tutor
                    .entry(tutor_id)
                    .or_default()
                    .push((matching_id, matching));
            }
        }
    }

    for (&tutor_id, tutor) in tutors {
        let mods = mod_list(tutor, "mods");
        let drop_in_mods = mod_list(tutor, "dropInMods");
        let mods_pref = mod_list(tutor, "modsPref");
        let tutor_matchings = by_tutor.get(&tutor_id).map_or(&[][..], Vec::as_slice);
        let matched_mods: Vec<Option<i64>> = tutor_matchings
            .iter()
            .map(|(_, matching)| matching.get("mod").and_then(Value::as_i64))
            .collect();

        let mods_value = ResourceSchema::field_value(tutor, "mods");

        if check_subset(&drop_in_mods, &mods) {
            valid_fields += 1;
        } else {
            problems.push(Problem {
                text: "tutor's dropInMods are not a subset of tutor's mods".to_string(),
                tags: subset_violation_tags(
                    tutor_id,
                    "dropInMods",
                    ResourceSchema::field_value(tutor, "dropInMods"),
                    mods_value,
                ),
            });
        }

        if check_subset(&mods_pref, &mods) {
            valid_fields += 1;
        } else {
            problems.push(Problem {
                text: "tutor's modsPref are not a subset of tutor's mods".to_string(),
                tags: subset_violation_tags(
                    tutor_id,
                    "modsPref",
                    ResourceSchema::field_value(tutor, "modsPref"),
                    mods_value,
                ),
            });
        }

        if check_subset(&matched_mods, &mods) {
            valid_fields += 1;
        } else {
            let matched_display = matched_mods
                .iter()
                .map(|m| match m {
                    Some(v) => v.to_string(),
                    None => "undefined".to_string(),
                })
                .collect::<Vec<_>>()
                .join(",");
            let mut tags = vec![
                ProblemTag {
                    resource: Some(store::TUTORS.to_string()),
                    id: Some(tutor_id),
                    field: Some("mods".to_string()),
                    value: Some(display_value(mods_value)),
                    kind: Some(runtime_type(mods_value).to_string()),
                    ..ProblemTag::default()
                },
                ProblemTag {
                    text: Some("list of mods tutor has been matched to".to_string()),
                    value: Some(matched_display),
                    kind: Some("object".to_string()),
                    ..ProblemTag::default()
                },
            ];
            // Deep links to every offending matching record.
            tags.extend(tutor_matchings.iter().map(|(matching_id, _)| ProblemTag {
                resource: Some(store::MATCHINGS.to_string()),
                id: Some(*matching_id),
                ..ProblemTag::default()
            }));
            problems.push(Problem {
                text: "tutor has been matched to a mod that isn't one of tutor's mods"
                    .to_string(),
                tags,
            });
        }
    }

    CheckReport {
        valid_fields,
        problems,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RawRecord, RecordMap, RecordStore};
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    fn empty_store() -> RecordStore {
        let store = RecordStore::new();
        for cache in store.caches() {
            cache.set_loaded(RecordMap::new());
        }
        store
    }

    fn tutor_record(id: i64, mods: Value, drop_in: Value, pref: Value) -> RawRecord {
        raw(json!({
            "id": id,
            "date": 1,
            "firstName": "Jordan",
            "lastName": "McCann",
            "friendlyName": "Jordan",
            "friendlyFullName": "Jordan McCann",
            "grade": 10,
            "studentId": 99999,
            "email": "jordan@example.com",
            "phone": "5181234567",
            "contactPref": "phone",
            "homeroom": "H123",
            "homeroomTeacher": "HRTeacher",
            "attendanceAnnotation": "",
            "mods": mods,
            "modsPref": pref,
            "subjectList": "English",
            "attendance": {},
            "dropInMods": drop_in,
            "afterSchoolAvailability": "",
            "additionalHours": 0,
        }))
    }

    #[test]
    fn subset_helper_matches_the_documented_cases() {
        assert!(check_subset(&[3, 5], &[3, 5, 7]));
        assert!(!check_subset(&[3, 9], &[3, 5, 7]));
        assert!(check_subset::<i64>(&[], &[]));
        assert!(check_subset::<i64>(&[], &[1, 2]));
        // duplicates in A don't matter
        assert!(check_subset(&[3, 3, 3], &[3]));
    }

    #[test]
    fn clean_tutor_passes_all_three_relations() {
        let store = empty_store();
        store
            .tutors()
            .insert(tutor_record(1, json!([1, 2, 3]), json!([2]), json!([3])))
            .unwrap();
        let report = run_data_checker(&store).unwrap();
        assert!(report.problems.is_empty(), "{:?}", report.problems);
        // 20 tutor schema fields (profile 12 + 7 declared + id + date, minus
        // nothing invalid) plus the three subset relations.
        assert_eq!(report.valid_fields, 21 + 3);
    }

    #[test]
    fn drop_in_subset_violation_reports_both_lists() {
        let store = empty_store();
        store
            .tutors()
            .insert(tutor_record(1, json!([1, 2]), json!([1, 2, 3]), json!([])))
            .unwrap();
        let report = run_data_checker(&store).unwrap();
        let problem = report
            .problems
            .iter()
            .find(|p| p.text == "tutor's dropInMods are not a subset of tutor's mods")
            .expect("subset problem missing");
        assert_eq!(problem.tags[0].field.as_deref(), Some("dropInMods"));
        assert_eq!(problem.tags[0].value.as_deref(), Some("1,2,3"));
        assert_eq!(problem.tags[1].field.as_deref(), Some("mods"));
        assert_eq!(problem.tags[1].value.as_deref(), Some("1,2"));
    }

    #[test]
    fn dangling_booking_request_is_one_invalid_id_problem() {
        let store = empty_store();
        store
            .tutors()
            .insert(tutor_record(5, json!([3]), json!([]), json!([])))
            .unwrap();
        store
            .bookings()
            .insert(raw(json!({
                "id": 10,
                "date": 1,
                "request": 999,
                "tutor": 5,
                "mod": 3,
                "status": "unsent",
            })))
            .unwrap();
        let report = run_data_checker(&store).unwrap();
        let invalid_ids: Vec<_> = report
            .problems
            .iter()
            .filter(|p| p.text == "invalid ID")
            .collect();
        assert_eq!(invalid_ids.len(), 1);
        let problem = invalid_ids[0];
        assert_eq!(problem.tags[0].resource.as_deref(), Some("bookings"));
        assert_eq!(problem.tags[0].field.as_deref(), Some("request"));
        assert_eq!(problem.tags[1].id_resource.as_deref(), Some("requests"));
    }

    #[test]
    fn resolved_id_reference_does_not_increment_the_tally() {
        let store = empty_store();
        store
            .matchings()
            .insert(raw(json!({
                "id": 30,
                "date": 1,
                "learner": -1,
                "tutor": 1,
                "subject": "Math",
                "mod": 3,
                "annotation": "",
            })))
            .unwrap();
        store
            .tutors()
            .insert(tutor_record(1, json!([3]), json!([]), json!([])))
            .unwrap();
        let with_reference = run_data_checker(&store).unwrap();

        // Same matching, but with the tutor record dropped so the
        // reference dangles instead of resolving.
        let store2 = empty_store();
        store2
            .matchings()
            .insert(raw(json!({
                "id": 30,
                "date": 1,
                "learner": -1,
                "tutor": 1,
                "subject": "Math",
                "mod": 3,
                "annotation": "",
            })))
            .unwrap();
        let without_tutor = run_data_checker(&store2).unwrap();
        // store2 dropped the tutor record entirely: 24 fewer valid fields
        // (21 schema fields + 3 subset relations), one new dangling-id
        // problem, and the reference itself still counts for nothing.
        assert_eq!(
            with_reference.valid_fields - without_tutor.valid_fields,
            24
        );
        assert_eq!(without_tutor.problems.len(), with_reference.problems.len() + 1);
    }

    #[test]
    fn matched_mod_outside_tutor_mods_links_each_offending_matching() {
        let store = empty_store();
        store
            .tutors()
            .insert(tutor_record(1, json!([1, 2]), json!([]), json!([])))
            .unwrap();
        store
            .matchings()
            .insert(raw(json!({
                "id": 40,
                "date": 1,
                "learner": -1,
                "tutor": 1,
                "subject": "Math",
                "mod": 9,
                "annotation": "",
            })))
            .unwrap();
        let report = run_data_checker(&store).unwrap();
        let problem = report
            .problems
            .iter()
            .find(|p| p.text.starts_with("tutor has been matched"))
            .expect("matched-mods problem missing");
        let back_refs: Vec<_> = problem
            .tags
            .iter()
            .filter(|t| t.resource.as_deref() == Some("matchings"))
            .collect();
        assert_eq!(back_refs.len(), 1);
        assert_eq!(back_refs[0].id, Some(40));
    }

    #[test]
    fn malformed_values_are_reported_not_fatal() {
        let store = empty_store();
        // grade is a string, mods is a string, attendance missing entirely
        let mut record = tutor_record(1, json!("never"), json!([]), json!([]));
        record.insert("grade".to_string(), json!("tenth"));
        record.remove("attendance");
        store.tutors().insert(record).unwrap();
        let report = run_data_checker(&store).unwrap();
        let grade_problem = report
            .problems
            .iter()
            .find(|p| p.tags[0].field.as_deref() == Some("grade"))
            .expect("grade problem missing");
        assert_eq!(grade_problem.text, "field isn't a number");
        assert_eq!(grade_problem.tags[0].kind.as_deref(), Some("string"));
        // a non-array mods list is treated as empty by the subset pass, so
        // [] drop-ins still pass
        assert!(report
            .problems
            .iter()
            .all(|p| !p.text.contains("dropInMods")));
    }

    #[test]
    fn checker_is_idempotent_on_an_unmutated_store() {
        let store = empty_store();
        store
            .tutors()
            .insert(tutor_record(1, json!([1, 2]), json!([1, 2, 3]), json!([])))
            .unwrap();
        store
            .bookings()
            .insert(raw(json!({
                "id": 10,
                "date": 1,
                "request": 999,
                "tutor": 1,
                "mod": 3,
                "status": "unsent",
            })))
            .unwrap();
        let first = run_data_checker(&store).unwrap();
        let second = run_data_checker(&store).unwrap();
        assert_eq!(first, second);
    }
}
