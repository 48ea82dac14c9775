//! crates/tutoring_core/src/workflow.rs
//!
//! The scheduling workflow: walks a request through
//! booking -> pass -> confirmation -> matched, plus the one-shot
//! conversion of a raw request submission into a learner and a request.
//! Every mutation goes through the resource client so local caches and the
//! backend stay in step; multi-record loops await sequentially.

use crate::client::{ClientError, ResourceClient};
use crate::domain::{
    Booking, Learner, Matching, Request, RequestSubmission, StudentProfile, SubmissionStatus,
    NO_LEARNER, UNASSIGNED,
};
use crate::store::{self, to_raw, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("You haven't marked any bookings as selected.")]
    NoBookingsChosen,

    #[error("request is at step {0}; going back is only possible from steps 2 and 3")]
    CannotGoBack(u8),

    #[error("request submission was already converted")]
    AlreadyConverted,

    #[error("duplicate student id: \"{0}\"")]
    DuplicateStudentId(i64),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The step shown to the coordinator. Step 0 is synthetic: a request still
/// at stored step 1 with no bookings yet.
pub fn derived_ui_step(request: &Request, has_bookings: bool) -> u8 {
    if request.step == 1 && !has_bookings {
        0
    } else {
        request.step
    }
}

pub fn step_name(ui_step: u8) -> &'static str {
    match ui_step {
        0 => "not started",
        1 => "booking",
        2 => "pass",
        3 => "confirmation",
        4 => "matched",
        _ => "???",
    }
}

fn get_request(client: &ResourceClient, request_id: i64) -> Result<Request, WorkflowError> {
    Ok(client.store().requests().decode::<Request>(request_id)?)
}

async fn save_request(client: &ResourceClient, request: &Request) -> Result<(), WorkflowError> {
    client
        .update_record(store::REQUESTS, to_raw(request)?)
        .await?;
    Ok(())
}

/// Moves a request from booking (step 0/1) to pass (step 2), recording
/// which bookings the coordinator chose. Choosing nothing is refused with
/// no state change. The caller owns the yes/no confirmation prompt.
pub async fn advance_to_step2(
    client: &ResourceClient,
    request_id: i64,
    chosen_bookings: &[i64],
) -> Result<(), WorkflowError> {
    if chosen_bookings.is_empty() {
        return Err(WorkflowError::NoBookingsChosen);
    }
    let mut request = get_request(client, request_id)?;
    request.chosen_bookings = chosen_bookings.to_vec();
    request.step = 2;
    save_request(client, &request).await
}

/// Pass (step 2) to confirmation (step 3). Unconditional.
pub async fn advance_to_step3(
    client: &ResourceClient,
    request_id: i64,
) -> Result<(), WorkflowError> {
    let mut request = get_request(client, request_id)?;
    request.step = 3;
    save_request(client, &request).await
}

/// Confirmation (step 3) to matched (step 4): each chosen booking becomes
/// a matching, every booking of the request is deleted, and only then is
/// the step advanced and the chosen list cleared.
///
/// The matching-creation loop stops on the first backend error and does
/// not roll back matchings it already created; the request's step is left
/// untouched so the operation can be retried, and the data checker will
/// flag anything the retry duplicates.
pub async fn advance_to_step4(
    client: &ResourceClient,
    request_id: i64,
) -> Result<(), WorkflowError> {
    let mut request = get_request(client, request_id)?;

    for &booking_id in &request.chosen_bookings {
        let booking = client.store().bookings().decode::<Booking>(booking_id)?;
        let matching = Matching {
            id: UNASSIGNED,
            date: UNASSIGNED,
            learner: request.learner,
            tutor: booking.tutor,
            subject: request.subject.clone(),
            mod_num: booking.mod_num,
            annotation: request.annotation.clone(),
        };
        client
            .create_record(store::MATCHINGS, to_raw(&matching)?)
            .await?;
    }

    // Delete all bookings associated with the request, whatever their
    // status; a matching now supersedes them. Note that a matching takes
    // precedence over the tutor's drop-in availability at that mod even
    // though the tutor's drop-in list still contains it.
    let bookings = client.store().bookings().decode_all::<Booking>()?;
    for booking in bookings.iter().filter(|b| b.request == request.id) {
        client.delete_record(store::BOOKINGS, booking.id).await?;
    }

    request.step = 4;
    request.chosen_bookings.clear();
    save_request(client, &request).await
}

/// Reverts one step, allowed only from pass (2) or confirmation (3).
/// Leaving step 2 also forgets the chosen bookings; the underlying booking
/// records were never touched, so nothing else needs restoring.
pub async fn go_back_a_step(
    client: &ResourceClient,
    request_id: i64,
) -> Result<(), WorkflowError> {
    let mut request = get_request(client, request_id)?;
    match request.step {
        2 => {
            request.chosen_bookings.clear();
            request.step = 1;
        }
        3 => {
            request.step = 2;
        }
        other => return Err(WorkflowError::CannotGoBack(other)),
    }
    save_request(client, &request).await
}

fn learner_from_submission(submission: &RequestSubmission) -> Learner {
    Learner {
        id: UNASSIGNED,
        date: UNASSIGNED,
        profile: StudentProfile {
            attendance_annotation: String::new(),
            ..submission.profile.clone()
        },
        attendance: Default::default(),
    }
}

/// Converts a raw submission into a request, creating or reusing a learner
/// along the way. Returns the new request's id.
///
/// The submission's status is flipped to checked *last*, so a failure in
/// learner or request creation leaves it unchecked and retryable instead
/// of silently dropped.
pub async fn convert_request_submission(
    client: &ResourceClient,
    submission_id: i64,
) -> Result<i64, WorkflowError> {
    let mut submission = client
        .store()
        .request_submissions()
        .decode::<RequestSubmission>(submission_id)?;
    if submission.status == SubmissionStatus::Checked {
        return Err(WorkflowError::AlreadyConverted);
    }

    let learner_id = if submission.is_special {
        NO_LEARNER
    } else {
        // Dig up a learner with a matching student id, which would mean the
        // learner already exists in the database.
        let learners = client.store().learners().decode_all::<Learner>()?;
        let matches: Vec<&Learner> = learners
            .iter()
            .filter(|l| l.profile.student_id == submission.profile.student_id)
            .collect();
        match matches.as_slice() {
            [] => {
                let created = client
                    .create_record(store::LEARNERS, to_raw(&learner_from_submission(&submission))?)
                    .await?;
                store::record_id(&created).ok_or(StoreError::MissingId)?
            }
            [existing] => existing.id,
            // Duplicate student ids are a data-integrity failure the
            // upstream database should have prevented; converting against
            // either candidate would be a guess.
            _ => {
                return Err(WorkflowError::DuplicateStudentId(
                    submission.profile.student_id,
                ))
            }
        }
    };

    let request = Request {
        id: UNASSIGNED,
        date: UNASSIGNED,
        learner: learner_id,
        mods: submission.mods.clone(),
        subject: submission.subject.clone(),
        is_special: submission.is_special,
        annotation: submission.annotation.clone(),
        step: 1,
        chosen_bookings: Vec::new(),
    };
    let created = client
        .create_record(store::REQUESTS, to_raw(&request)?)
        .await?;
    let request_id = store::record_id(&created).ok_or(StoreError::MissingId)?;

    submission.status = SubmissionStatus::Checked;
    client
        .update_record(store::REQUEST_SUBMISSIONS, to_raw(&submission)?)
        .await?;
    Ok(request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BookingStatus, ContactPref};
    use crate::ports::{BackendService, PortError, PortResult};
    use crate::store::{RawRecord, RecordMap};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory backend for workflow tests, with optional failure
    /// injection: `fail_creates_after(n)` makes every create past the
    /// n-th fail.
    #[derive(Default)]
    struct TestBackend {
        contents: Mutex<BTreeMap<String, RecordMap>>,
        next_id: AtomicI64,
        creates_seen: AtomicUsize,
        fail_creates_after: Option<usize>,
    }

    impl TestBackend {
        fn new() -> Self {
            Self {
                next_id: AtomicI64::new(1000),
                ..Self::default()
            }
        }

        fn fail_creates_after(mut self, n: usize) -> Self {
            self.fail_creates_after = Some(n);
            self
        }
    }

    #[async_trait]
    impl BackendService for TestBackend {
        async fn retrieve_all(&self, resource: &str) -> PortResult<RecordMap> {
            Ok(self
                .contents
                .lock()
                .unwrap()
                .get(resource)
                .cloned()
                .unwrap_or_default())
        }

        async fn create(&self, resource: &str, mut record: RawRecord) -> PortResult<RawRecord> {
            let seen = self.creates_seen.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.fail_creates_after {
                if seen >= limit {
                    return Err(PortError::Backend("injected create failure".to_string()));
                }
            }
            if record.get("id").and_then(Value::as_i64) == Some(UNASSIGNED) {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                record.insert("id".to_string(), Value::from(id));
            }
            if record.get("date").and_then(Value::as_i64) == Some(UNASSIGNED) {
                record.insert(
                    "date".to_string(),
                    Value::from(Utc::now().timestamp_millis()),
                );
            }
            let id = crate::store::record_id(&record).expect("test record has an id");
            self.contents
                .lock()
                .unwrap()
                .entry(resource.to_string())
                .or_default()
                .insert(id, record.clone());
            Ok(record)
        }

        async fn update(&self, resource: &str, record: RawRecord) -> PortResult<()> {
            let id = crate::store::record_id(&record).expect("test record has an id");
            self.contents
                .lock()
                .unwrap()
                .entry(resource.to_string())
                .or_default()
                .insert(id, record);
            Ok(())
        }

        async fn delete(&self, resource: &str, id: i64) -> PortResult<()> {
            self.contents
                .lock()
                .unwrap()
                .entry(resource.to_string())
                .or_default()
                .remove(&id);
            Ok(())
        }

        async fn debug(&self, _resource: &str) -> PortResult<Value> {
            Err(PortError::Backend("args not matched".to_string()))
        }

        async fn command(&self, _name: &str, _args: Vec<Value>) -> PortResult<Value> {
            Err(PortError::Backend("not supported".to_string()))
        }
    }

    fn client_with(backend: TestBackend) -> ResourceClient {
        let client = ResourceClient::new(Arc::new(backend));
        for cache in client.store().caches() {
            cache.set_loaded(RecordMap::new());
        }
        client
    }

    fn profile(student_id: i64, name: &str) -> StudentProfile {
        StudentProfile {
            first_name: name.to_string(),
            last_name: "Doe".to_string(),
            friendly_name: name.to_string(),
            friendly_full_name: format!("{name} Doe"),
            grade: 10,
            student_id,
            email: String::new(),
            phone: String::new(),
            contact_pref: ContactPref::Either,
            homeroom: String::new(),
            homeroom_teacher: String::new(),
            attendance_annotation: String::new(),
        }
    }

    fn request(id: i64, step: u8, chosen: Vec<i64>) -> Request {
        Request {
            id,
            date: 1,
            learner: NO_LEARNER,
            mods: vec![3],
            subject: "Math".to_string(),
            is_special: true,
            annotation: String::new(),
            step,
            chosen_bookings: chosen,
        }
    }

    fn booking(id: i64, request: i64, tutor: i64, mod_num: u32) -> Booking {
        Booking {
            id,
            date: 1,
            request,
            tutor,
            mod_num: Some(mod_num),
            status: BookingStatus::Selected,
        }
    }

    fn submission(id: i64, student_id: i64, special: bool) -> RequestSubmission {
        RequestSubmission {
            id,
            date: 1,
            profile: profile(student_id, "Mary"),
            mods: vec![3, 4],
            subject: "English".to_string(),
            is_special: special,
            annotation: String::new(),
            status: SubmissionStatus::Unchecked,
        }
    }

    fn seed<T: serde::Serialize>(client: &ResourceClient, resource: &str, records: &[T]) {
        for record in records {
            client
                .store()
                .by_name(resource)
                .unwrap()
                .insert(to_raw(record).unwrap())
                .unwrap();
        }
    }

    #[test]
    fn ui_step_zero_is_a_bookingless_step_one() {
        let r = request(1, 1, vec![]);
        assert_eq!(derived_ui_step(&r, false), 0);
        assert_eq!(derived_ui_step(&r, true), 1);
        let done = request(1, 4, vec![]);
        assert_eq!(derived_ui_step(&done, false), 4);
        assert_eq!(step_name(0), "not started");
        assert_eq!(step_name(2), "pass");
        assert_eq!(step_name(9), "???");
    }

    #[tokio::test]
    async fn step2_records_chosen_bookings() {
        let client = client_with(TestBackend::new());
        seed(&client, store::REQUESTS, &[request(1, 1, vec![])]);
        seed(
            &client,
            store::BOOKINGS,
            &[booking(10, 1, 5, 3), booking(11, 1, 6, 4)],
        );

        advance_to_step2(&client, 1, &[10, 11]).await.unwrap();
        let updated: Request = client.store().requests().decode(1).unwrap();
        assert_eq!(updated.step, 2);
        assert_eq!(updated.chosen_bookings, vec![10, 11]);
    }

    #[tokio::test]
    async fn step2_with_nothing_chosen_changes_nothing() {
        let client = client_with(TestBackend::new());
        seed(&client, store::REQUESTS, &[request(1, 1, vec![])]);

        let err = advance_to_step2(&client, 1, &[]).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NoBookingsChosen));
        assert_eq!(
            err.to_string(),
            "You haven't marked any bookings as selected."
        );
        let unchanged: Request = client.store().requests().decode(1).unwrap();
        assert_eq!(unchanged.step, 1);
        assert!(unchanged.chosen_bookings.is_empty());
    }

    #[tokio::test]
    async fn step4_replaces_bookings_with_matchings() {
        let client = client_with(TestBackend::new());
        seed(&client, store::REQUESTS, &[request(1, 3, vec![10])]);
        // One chosen booking plus a stray rejected one on the same request:
        // both must be deleted.
        let mut stray = booking(11, 1, 5, 4);
        stray.status = BookingStatus::Rejected;
        seed(&client, store::BOOKINGS, &[booking(10, 1, 5, 3), stray]);

        advance_to_step4(&client, 1).await.unwrap();

        let matchings: Vec<Matching> = client.store().matchings().decode_all().unwrap();
        assert_eq!(matchings.len(), 1);
        assert_eq!(matchings[0].tutor, 5);
        assert_eq!(matchings[0].mod_num, Some(3));
        assert_eq!(matchings[0].learner, NO_LEARNER);
        assert!(client.store().bookings().snapshot().unwrap().is_empty());
        let updated: Request = client.store().requests().decode(1).unwrap();
        assert_eq!(updated.step, 4);
        assert!(updated.chosen_bookings.is_empty());
    }

    #[tokio::test]
    async fn step4_failure_stops_early_without_rollback() {
        // First create succeeds, second fails: the request keeps its step,
        // the first matching survives, bookings stay.
        let client = client_with(TestBackend::new().fail_creates_after(1));
        seed(&client, store::REQUESTS, &[request(1, 3, vec![10, 11])]);
        seed(
            &client,
            store::BOOKINGS,
            &[booking(10, 1, 5, 3), booking(11, 1, 6, 4)],
        );

        let err = advance_to_step4(&client, 1).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Client(_)));
        assert_eq!(client.store().matchings().snapshot().unwrap().len(), 1);
        assert_eq!(client.store().bookings().snapshot().unwrap().len(), 2);
        let unchanged: Request = client.store().requests().decode(1).unwrap();
        assert_eq!(unchanged.step, 3);
        assert_eq!(unchanged.chosen_bookings, vec![10, 11]);
    }

    #[tokio::test]
    async fn going_back_from_step2_forgets_chosen_bookings() {
        let client = client_with(TestBackend::new());
        seed(&client, store::REQUESTS, &[request(1, 2, vec![10])]);

        go_back_a_step(&client, 1).await.unwrap();
        let updated: Request = client.store().requests().decode(1).unwrap();
        assert_eq!(updated.step, 1);
        assert!(updated.chosen_bookings.is_empty());
    }

    #[tokio::test]
    async fn going_back_from_step3_keeps_chosen_bookings() {
        let client = client_with(TestBackend::new());
        seed(&client, store::REQUESTS, &[request(1, 3, vec![10])]);

        go_back_a_step(&client, 1).await.unwrap();
        let updated: Request = client.store().requests().decode(1).unwrap();
        assert_eq!(updated.step, 2);
        assert_eq!(updated.chosen_bookings, vec![10]);
    }

    #[tokio::test]
    async fn going_back_from_other_steps_is_refused() {
        let client = client_with(TestBackend::new());
        seed(&client, store::REQUESTS, &[request(1, 4, vec![])]);
        let err = go_back_a_step(&client, 1).await.unwrap_err();
        assert!(matches!(err, WorkflowError::CannotGoBack(4)));
    }

    #[tokio::test]
    async fn conversion_creates_learner_and_request() {
        let client = client_with(TestBackend::new());
        seed(&client, store::REQUEST_SUBMISSIONS, &[submission(1, 4242, false)]);

        let request_id = convert_request_submission(&client, 1).await.unwrap();

        let learners: Vec<Learner> = client.store().learners().decode_all().unwrap();
        assert_eq!(learners.len(), 1);
        assert_eq!(learners[0].profile.student_id, 4242);
        let created: Request = client.store().requests().decode(request_id).unwrap();
        assert_eq!(created.step, 1);
        assert_eq!(created.learner, learners[0].id);
        assert_eq!(created.mods, vec![3, 4]);
        let converted: RequestSubmission =
            client.store().request_submissions().decode(1).unwrap();
        assert_eq!(converted.status, SubmissionStatus::Checked);
    }

    #[tokio::test]
    async fn conversion_reuses_a_matching_learner() {
        let client = client_with(TestBackend::new());
        let existing = Learner {
            id: 77,
            date: 1,
            profile: profile(4242, "Mary"),
            attendance: Default::default(),
        };
        seed(&client, store::LEARNERS, &[existing]);
        seed(&client, store::REQUEST_SUBMISSIONS, &[submission(1, 4242, false)]);

        let request_id = convert_request_submission(&client, 1).await.unwrap();
        assert_eq!(client.store().learners().snapshot().unwrap().len(), 1);
        let created: Request = client.store().requests().decode(request_id).unwrap();
        assert_eq!(created.learner, 77);
    }

    #[tokio::test]
    async fn conversion_aborts_on_duplicate_student_ids() {
        let client = client_with(TestBackend::new());
        let twin = |id: i64| Learner {
            id,
            date: 1,
            profile: profile(4242, "Mary"),
            attendance: Default::default(),
        };
        seed(&client, store::LEARNERS, &[twin(77), twin(78)]);
        seed(&client, store::REQUEST_SUBMISSIONS, &[submission(1, 4242, false)]);

        let err = convert_request_submission(&client, 1).await.unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateStudentId(4242)));
        // submission stays retryable
        let untouched: RequestSubmission =
            client.store().request_submissions().decode(1).unwrap();
        assert_eq!(untouched.status, SubmissionStatus::Unchecked);
        assert!(client.store().requests().snapshot().unwrap().is_empty());
    }

    #[tokio::test]
    async fn special_submissions_skip_learner_lookup() {
        let client = client_with(TestBackend::new());
        seed(&client, store::REQUEST_SUBMISSIONS, &[submission(1, 4242, true)]);

        let request_id = convert_request_submission(&client, 1).await.unwrap();
        assert!(client.store().learners().snapshot().unwrap().is_empty());
        let created: Request = client.store().requests().decode(request_id).unwrap();
        assert_eq!(created.learner, NO_LEARNER);
        assert!(created.is_special);
    }

    #[tokio::test]
    async fn failed_request_creation_leaves_submission_retryable() {
        // Learner create succeeds, request create fails.
        let client = client_with(TestBackend::new().fail_creates_after(1));
        seed(&client, store::REQUEST_SUBMISSIONS, &[submission(1, 4242, false)]);

        let err = convert_request_submission(&client, 1).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Client(_)));
        let untouched: RequestSubmission =
            client.store().request_submissions().decode(1).unwrap();
        assert_eq!(untouched.status, SubmissionStatus::Unchecked);
    }

    #[tokio::test]
    async fn conversion_refuses_already_checked_submissions() {
        let client = client_with(TestBackend::new());
        let mut s = submission(1, 4242, false);
        s.status = SubmissionStatus::Checked;
        seed(&client, store::REQUEST_SUBMISSIONS, &[s]);
        let err = convert_request_submission(&client, 1).await.unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyConverted));
    }
}
