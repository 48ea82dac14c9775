//! crates/tutoring_core/src/attendance.rs
//!
//! Decoders for the attendance blobs the upstream recalculation writes
//! onto tutors and learners. Each date key maps to entries of the form
//! `"<mod> <minutes>"`; minutes of 1 means excused, 0 or less means
//! absent, anything else is minutes actually present.

use crate::domain::AttendanceData;
use chrono::DateTime;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("attendance entry {0:?} is not of the form \"<mod> <minutes>\"")]
    MalformedEntry(String),

    #[error("attendance date key {0:?} is not an epoch-millisecond number")]
    MalformedDateKey(String),
}

/// One decoded attendance entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    /// Epoch milliseconds of the school day.
    pub date: i64,
    pub mod_num: u32,
    pub minutes: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendanceLevel {
    Present,
    Excused,
    Absent,
}

impl AttendanceEntry {
    pub fn level(&self) -> AttendanceLevel {
        if self.minutes == 1.0 {
            AttendanceLevel::Excused
        } else if self.minutes <= 0.0 {
            AttendanceLevel::Absent
        } else {
            AttendanceLevel::Present
        }
    }
}

/// Per-student totals, shown as e.g. `3P / 1EX / 0A`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub num_present: u32,
    pub num_excused: u32,
    pub num_absent: u32,
    pub total_minutes: f64,
}

impl AttendanceSummary {
    pub fn total_hours(&self) -> f64 {
        self.total_minutes / 60.0
    }
}

fn parse_entry(date: i64, entry: &str) -> Result<AttendanceEntry, AttendanceError> {
    let malformed = || AttendanceError::MalformedEntry(entry.to_string());
    let mut tokens = entry.split(' ');
    let mod_num = tokens
        .next()
        .and_then(|t| t.parse::<u32>().ok())
        .ok_or_else(malformed)?;
    let minutes = tokens
        .next()
        .and_then(|t| t.parse::<f64>().ok())
        .ok_or_else(malformed)?;
    if tokens.next().is_some() {
        return Err(malformed());
    }
    Ok(AttendanceEntry {
        date,
        mod_num,
        minutes,
    })
}

/// Flattens a student's attendance blob into entries sorted by date
/// descending, then mod ascending (the order the attendance views use).
pub fn flatten(attendance: &AttendanceData) -> Result<Vec<AttendanceEntry>, AttendanceError> {
    let mut entries = Vec::new();
    for (date_key, day) in attendance {
        let date = date_key
            .parse::<i64>()
            .map_err(|_| AttendanceError::MalformedDateKey(date_key.clone()))?;
        for entry in day {
            entries.push(parse_entry(date, entry)?);
        }
    }
    entries.sort_by(|a, b| b.date.cmp(&a.date).then(a.mod_num.cmp(&b.mod_num)));
    Ok(entries)
}

/// Tallies a student's attendance. `additional_hours` is a manual credit
/// the upstream sheet stores next to the blob; it is added to the minute
/// total unconverted, matching how the totals have always been computed.
pub fn summarize(
    attendance: &AttendanceData,
    additional_hours: Option<f64>,
) -> Result<AttendanceSummary, AttendanceError> {
    let mut summary = AttendanceSummary {
        total_minutes: additional_hours.unwrap_or(0.0),
        ..AttendanceSummary::default()
    };
    for day in attendance.values() {
        for entry in day {
            let parsed = parse_entry(0, entry)?;
            match parsed.level() {
                AttendanceLevel::Excused => summary.num_excused += 1,
                AttendanceLevel::Absent => summary.num_absent += 1,
                AttendanceLevel::Present => {
                    summary.num_present += 1;
                    summary.total_minutes += parsed.minutes;
                }
            }
        }
    }
    Ok(summary)
}

/// Renders an entry's epoch-ms date as `YYYY-MM-DD` (UTC).
pub fn display_date(epoch_ms: i64) -> String {
    match DateTime::from_timestamp_millis(epoch_ms) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => epoch_ms.to_string(),
    }
}
