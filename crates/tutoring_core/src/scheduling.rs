//! crates/tutoring_core/src/scheduling.rs
//!
//! The mod-availability indexer: reconciles a tutor's declared free mods,
//! drop-in mods and preference mods with actual bookings and matchings
//! into one status per mod slot, plus back-references to the scheduling
//! records occupying each tutor's time.

use crate::domain::{Booking, BookingStatus, Matching, Tutor};
use serde::Serialize;
use std::collections::BTreeMap;

/// Mods are numbered 1..=20: 1-10 are "A day" slots, 11-20 are "B day".
pub const MOD_COUNT: usize = 20;

/// Consistency failures that should have been caught by the data checker
/// before the indexer ever ran. Each one aborts the indexing call.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("mod {0} isn't serializable")]
    ModOutOfRange(u32),

    #[error("tutor #{tutor} has preference mod {mod_num} outside their free mods")]
    PrefOutsideMods { tutor: i64, mod_num: u32 },

    #[error("booking #{booking} refers to unknown tutor #{tutor}")]
    UnknownTutorInBooking { booking: i64, tutor: i64 },

    #[error("matching #{matching} refers to unknown tutor #{tutor}")]
    UnknownTutorInMatching { matching: i64, tutor: i64 },
}

/// The mutually exclusive status of one mod slot for one tutor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ModStatus {
    Unfree,
    Free,
    DropIn,
    Booked,
    Matched,
    FreePref,
    DropInPref,
}

impl ModStatus {
    /// Whether a new drop-in booking could target this slot.
    pub fn is_offerable(self) -> bool {
        matches!(
            self,
            ModStatus::Free | ModStatus::FreePref | ModStatus::DropIn | ModStatus::DropInPref
        )
    }
}

/// A back-reference to the scheduling record occupying a tutor's time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SchedulingRef {
    Booking(i64),
    Matching(i64),
}

/// One tutor's slice of the index: a status for each of the 20 mod slots
/// (index = mod - 1) and the references behind the occupied ones.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorModIndex {
    pub id: i64,
    pub mod_status: [ModStatus; MOD_COUNT],
    pub refs: Vec<SchedulingRef>,
}

fn slot(mod_num: u32) -> Option<usize> {
    if (1..=MOD_COUNT as u32).contains(&mod_num) {
        Some((mod_num - 1) as usize)
    } else {
        None
    }
}

/// Builds the full per-tutor index.
///
/// Overlay order, later writes winning: everything starts `Unfree`; the
/// tutor's `mods` become `Free`; `drop_in_mods` become `DropIn`;
/// `mods_pref` promote `Free` to `FreePref` and `DropIn` to `DropInPref`;
/// live bookings stamp `Booked`; matchings stamp `Matched` last because a
/// matching is final where a booking is provisional. Preference is an
/// overlay on free/drop-in, never a state of its own, so a preference mod
/// in any other slot state means `mods_pref` escaped `mods` and the call
/// fails.
pub fn build_tutor_index(
    tutors: &[Tutor],
    bookings: &[Booking],
    matchings: &[Matching],
) -> Result<BTreeMap<i64, TutorModIndex>, SchedulingError> {
    let mut index = BTreeMap::new();
    for tutor in tutors {
        let mut statuses = [ModStatus::Unfree; MOD_COUNT];
        for &m in &tutor.mods {
            if let Some(i) = slot(m) {
                statuses[i] = ModStatus::Free;
            }
        }
        for &m in &tutor.drop_in_mods {
            if let Some(i) = slot(m) {
                statuses[i] = ModStatus::DropIn;
            }
        }
        for &m in &tutor.mods_pref {
            let i = slot(m).ok_or(SchedulingError::PrefOutsideMods {
                tutor: tutor.id,
                mod_num: m,
            })?;
            statuses[i] = match statuses[i] {
                ModStatus::Free => ModStatus::FreePref,
                ModStatus::DropIn => ModStatus::DropInPref,
                _ => {
                    return Err(SchedulingError::PrefOutsideMods {
                        tutor: tutor.id,
                        mod_num: m,
                    })
                }
            };
        }
        index.insert(
            tutor.id,
            TutorModIndex {
                id: tutor.id,
                mod_status: statuses,
                refs: Vec::new(),
            },
        );
    }

    for booking in bookings {
        if matches!(
            booking.status,
            BookingStatus::Ignore | BookingStatus::Rejected
        ) {
            continue;
        }
        let Some(mod_num) = booking.mod_num else {
            continue;
        };
        let entry =
            index
                .get_mut(&booking.tutor)
                .ok_or(SchedulingError::UnknownTutorInBooking {
                    booking: booking.id,
                    tutor: booking.tutor,
                })?;
        if let Some(i) = slot(mod_num) {
            entry.mod_status[i] = ModStatus::Booked;
            entry.refs.push(SchedulingRef::Booking(booking.id));
        }
    }

    for matching in matchings {
        let Some(mod_num) = matching.mod_num else {
            continue;
        };
        let entry =
            index
                .get_mut(&matching.tutor)
                .ok_or(SchedulingError::UnknownTutorInMatching {
                    matching: matching.id,
                    tutor: matching.tutor,
                })?;
        if let Some(i) = slot(mod_num) {
            entry.mod_status[i] = ModStatus::Matched;
            entry.refs.push(SchedulingRef::Matching(matching.id));
        }
    }

    Ok(index)
}

/// Converts a mod number into its A/B-day display form, e.g. `11` -> `1B`.
/// Users mostly work with the raw 1-20 notation; this is for the few
/// places that show the friendly form.
pub fn display_mod(mod_num: u32) -> Result<String, SchedulingError> {
    match mod_num {
        1..=10 => Ok(format!("{mod_num}A")),
        11..=20 => Ok(format!("{}B", mod_num - 10)),
        other => Err(SchedulingError::ModOutOfRange(other)),
    }
}

/// Renders a mod list with preferred mods starred, e.g. `"3*, 5"`.
pub fn format_mods(mods: &[u32], mods_pref: &[u32]) -> String {
    mods.iter()
        .map(|m| {
            if mods_pref.contains(m) {
                format!("{m}*")
            } else {
                m.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
