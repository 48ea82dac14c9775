//! services/coordinator/src/adapters/mock.rs
//!
//! An in-memory stand-in for the record server, used for demos and tests
//! so nothing links to the real student database. It speaks the same args
//! array and reply envelope as the real server, assigns ids from 1000
//! upward, and pushes create/update/delete notifications into an optional
//! channel the way the real server fans mutations out to other clients.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tutoring_core::domain::UNASSIGNED;
use tutoring_core::ports::{Notification, PortResult, COMMAND_RETRIEVE_MULTIPLE};
use tutoring_core::store::RESOURCE_NAMES;

use crate::adapters::rpc::Transport;

type Collection = Map<String, Value>;

pub struct MockTransport {
    contents: Mutex<BTreeMap<String, Collection>>,
    next_key: AtomicI64,
    notifications: Option<UnboundedSender<Notification>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let contents = RESOURCE_NAMES
            .iter()
            .map(|name| (name.to_string(), Collection::new()))
            .collect();
        Self {
            contents: Mutex::new(contents),
            next_key: AtomicI64::new(1000),
            notifications: None,
        }
    }

    /// Forwards every mutation into `sender` as the real server would to
    /// its other connected clients.
    pub fn with_notifications(mut self, sender: UnboundedSender<Notification>) -> Self {
        self.notifications = Some(sender);
        self
    }

    /// Seeds a handful of records to click around with.
    pub fn with_demo_data(self) -> Self {
        {
            let mut contents = self.contents.lock().expect("mock contents lock poisoned");
            for (resource, records) in demo_records() {
                let collection = contents
                    .get_mut(resource)
                    .expect("demo data targets a known resource");
                for record in records {
                    let id = record["id"].to_string();
                    collection.insert(id, record);
                }
            }
        }
        self
    }

    fn notify(&self, notification: Notification) {
        if let Some(sender) = &self.notifications {
            // A closed channel just means nobody is listening anymore.
            let _ = sender.send(notification);
        }
    }

    fn handle(&self, args: &[Value]) -> Result<Value, String> {
        let head = args
            .first()
            .and_then(Value::as_str)
            .ok_or("args not matched")?;
        if head == "command" {
            return self.handle_command(args);
        }
        let verb = args
            .get(1)
            .and_then(Value::as_str)
            .ok_or("args not matched")?;
        let mut contents = self.contents.lock().expect("mock contents lock poisoned");
        let collection = contents
            .get_mut(head)
            .ok_or_else(|| format!("unknown resource {head}"))?;
        match verb {
            "retrieveAll" => Ok(Value::Object(collection.clone())),
            "create" => {
                let Some(Value::Object(mut record)) = args.get(2).cloned() else {
                    return Err("args not matched".to_string());
                };
                if record.get("date").and_then(Value::as_i64) == Some(UNASSIGNED) {
                    record.insert(
                        "date".to_string(),
                        json!(Utc::now().timestamp_millis()),
                    );
                }
                if record.get("id").and_then(Value::as_i64) == Some(UNASSIGNED) {
                    record.insert(
                        "id".to_string(),
                        json!(self.next_key.fetch_add(1, Ordering::SeqCst)),
                    );
                }
                let id = record["id"].to_string();
                collection.insert(id, Value::Object(record.clone()));
                self.notify(Notification::Create {
                    resource: head.to_string(),
                    record: record.clone(),
                });
                Ok(Value::Object(record))
            }
            "update" => {
                let Some(Value::Object(record)) = args.get(2).cloned() else {
                    return Err("args not matched".to_string());
                };
                let id = record
                    .get("id")
                    .map(Value::to_string)
                    .ok_or("args not matched")?;
                collection.insert(id, Value::Object(record.clone()));
                self.notify(Notification::Update {
                    resource: head.to_string(),
                    record,
                });
                Ok(Value::Null)
            }
            "delete" => {
                let id = args
                    .get(2)
                    .and_then(Value::as_i64)
                    .ok_or("args not matched")?;
                collection.remove(&id.to_string());
                self.notify(Notification::Delete {
                    resource: head.to_string(),
                    id,
                });
                Ok(Value::Null)
            }
            _ => Err("args not matched".to_string()),
        }
    }

    fn handle_command(&self, args: &[Value]) -> Result<Value, String> {
        match args.get(1).and_then(Value::as_str) {
            Some(COMMAND_RETRIEVE_MULTIPLE) => {
                let Some(Value::Array(names)) = args.get(2) else {
                    return Err("args not matched".to_string());
                };
                let contents = self.contents.lock().expect("mock contents lock poisoned");
                let mut result = Map::new();
                for name in names {
                    let name = name.as_str().ok_or("args not matched")?;
                    let collection = contents
                        .get(name)
                        .ok_or_else(|| format!("unknown resource {name}"))?;
                    result.insert(name.to_string(), Value::Object(collection.clone()));
                }
                Ok(Value::Object(result))
            }
            Some(other) => Err(format!(
                "command {other} is not supported on the testing server"
            )),
            None => Err("args not matched".to_string()),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, args: Vec<Value>) -> PortResult<String> {
        // Failures travel inside the envelope, exactly like the real
        // server's replies.
        let envelope = match self.handle(&args) {
            Ok(val) => json!({ "error": false, "val": val, "message": null }),
            Err(message) => json!({ "error": true, "val": null, "message": message }),
        };
        Ok(envelope.to_string())
    }
}

fn demo_records() -> Vec<(&'static str, Vec<Value>)> {
    vec![
        (
            tutoring_core::store::TUTORS,
            vec![json!({
                "id": 1561605140223i64,
                "date": 1561267154650i64,
                "friendlyFullName": "Jordan McCann",
                "friendlyName": "Jordan",
                "firstName": "Jordan",
                "lastName": "McCann",
                "grade": 10,
                "studentId": 99999,
                "email": "foobar@icloud.com",
                "phone": "5181234567",
                "contactPref": "phone",
                "homeroom": "H123",
                "homeroomTeacher": "HRTeacher",
                "attendanceAnnotation": "",
                "mods": [1, 2, 3, 6, 11, 12, 16],
                "modsPref": [3],
                "subjectList": "English",
                "attendance": {},
                "dropInMods": [3],
                "afterSchoolAvailability": "",
                "additionalHours": 0
            })],
        ),
        (
            tutoring_core::store::LEARNERS,
            vec![json!({
                "id": 1567531044346i64,
                "date": 1567531044346i64,
                "friendlyFullName": "Jeffrey Huang",
                "friendlyName": "Jeffrey",
                "firstName": "Jeffrey",
                "lastName": "Huang",
                "grade": 0,
                "studentId": 8355,
                "email": "asdfasdf@gmail.com",
                "phone": "555-555-5555",
                "contactPref": "either",
                "homeroom": "H123",
                "homeroomTeacher": "HRTeacher",
                "attendanceAnnotation": "",
                "attendance": {}
            })],
        ),
        (
            tutoring_core::store::REQUEST_SUBMISSIONS,
            vec![
                json!({
                    "id": 1567530880861i64,
                    "date": 1562007565571i64,
                    "friendlyFullName": "Jeffrey Huang",
                    "friendlyName": "Jeffrey",
                    "firstName": "Jeffrey",
                    "lastName": "Huang",
                    "grade": 0,
                    "studentId": 8355,
                    "email": "asdfasdf@gmail.com",
                    "phone": "555-555-5555",
                    "contactPref": "either",
                    "homeroom": "H123",
                    "homeroomTeacher": "HRTeacher",
                    "attendanceAnnotation": "",
                    "mods": [3],
                    "subject": "English",
                    "isSpecial": false,
                    "annotation": "",
                    "status": "unchecked"
                }),
                json!({
                    "id": 1567530880981i64,
                    "date": 1562100813234i64,
                    "friendlyFullName": "Mary Jane",
                    "friendlyName": "Mary",
                    "firstName": "Mary",
                    "lastName": "Jane",
                    "grade": 0,
                    "studentId": 16234,
                    "email": "mj@example.com",
                    "phone": "555-555-5555",
                    "contactPref": "email",
                    "homeroom": "H123",
                    "homeroomTeacher": "HRTeacher",
                    "attendanceAnnotation": "",
                    "mods": [3],
                    "subject": "Math",
                    "isSpecial": false,
                    "annotation": "",
                    "status": "unchecked"
                }),
                json!({
                    "id": 1567530882754i64,
                    "date": 1562028050971i64,
                    "friendlyFullName": "John Doe",
                    "friendlyName": "John",
                    "firstName": "John",
                    "lastName": "Doe",
                    "grade": 0,
                    "studentId": 12345,
                    "email": "jd@example.com",
                    "phone": "555-555-5555",
                    "contactPref": "either",
                    "homeroom": "H123",
                    "homeroomTeacher": "HRTeacher",
                    "attendanceAnnotation": "",
                    "mods": [3],
                    "subject": "all subjects",
                    "isSpecial": true,
                    "annotation": "meets in B812",
                    "status": "unchecked"
                }),
            ],
        ),
    ]
}
