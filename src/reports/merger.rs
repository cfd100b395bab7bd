//! Combine a user and a system report into one re-signed report.
//!
//! The combined report has to look like something a device could have
//! produced itself:
//!
//! 1. Its report id is at least every reading id, so it takes the system
//!    report's id.
//! 2. Its sent time is at least every reading's, so it takes the system
//!    report's sent time.
//! 3. Its selector describes its contents (`COMBINED_OUTPUTS`).
//! 4. Its streamer is the virtual `COMBINED_REPORT_STREAMER`, which the
//!    acknowledgement path expands into both real streamers.

use log::{debug, warn};

use super::reading::{Reading, reference_time};
use super::selector::{COMBINED_OUTPUTS, SYSTEM_OUTPUTS, USER_OUTPUTS};
use super::signed_list::{
    COMBINED_REPORT_STREAMER, LIST_OVERHEAD, ListReportHeader, READING_RECORD_LEN,
    SignedListReport, Validity, assemble_record,
};
use crate::adapters::time::{Clock, SystemClock};
use crate::error::MergeError;

/// Merges signed list reports, anchoring merged readings with `clock`.
pub struct ReportMerger<K: Clock = SystemClock> {
    clock: K,
}

impl Default for ReportMerger<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<K: Clock> ReportMerger<K> {
    pub fn new(clock: K) -> Self {
        Self { clock }
    }

    /// Merge `user` and `system` into one combined report.
    ///
    /// Both inputs are left untouched whether or not the merge succeeds.
    pub fn merge(
        &self,
        user: &SignedListReport,
        system: &SignedListReport,
    ) -> Result<SignedListReport, MergeError> {
        check_mergeable(user, system)?;

        let user_header = user.header();
        let system_header = system.header();
        let total_readings = user.readings().len() + system.readings().len();
        let total_length = LIST_OVERHEAD + READING_RECORD_LEN * total_readings;
        if total_length > usize::from(u16::MAX) {
            return Err(MergeError::InvalidArgument(
                "Merged report would exceed the maximum report length",
            ));
        }

        let header = ListReportHeader::new(
            total_length,
            user_header.device_id,
            system_header.report_id,
            system_header.sent_time,
            COMBINED_REPORT_STREAMER,
            COMBINED_OUTPUTS,
        );

        let reference = reference_time(self.clock.now(), system_header.sent_time);
        let (readings, id_range) = interleave(user.readings(), system.readings(), reference)?;

        let raw = assemble_record(&header, &readings, id_range);
        let merged = SignedListReport::from_parts(
            user.device_id(),
            COMBINED_REPORT_STREAMER,
            readings,
            raw,
            system.received_time(),
        )
        .map_err(|_| MergeError::Inconsistent("Merged report has an invalid layout"))?;

        debug!(
            "MERGE: combined reports {} and {} into {} readings, ids {:?}",
            user_header.report_id,
            system_header.report_id,
            total_readings,
            merged.reading_id_range()
        );
        Ok(merged)
    }
}

fn check_mergeable(user: &SignedListReport, system: &SignedListReport) -> Result<(), MergeError> {
    let user_header = user.header();
    let system_header = system.header();

    let reason = if user.validity() != Validity::Valid || system.validity() != Validity::Valid {
        Some("You can only merge reports that have valid signatures")
    } else if user_header.device_id != system_header.device_id {
        Some("Reports did not come from the same device")
    } else if user_header.selector != USER_OUTPUTS {
        Some("User report did not select user readings")
    } else if system_header.selector != SYSTEM_OUTPUTS {
        Some("System report did not select system readings")
    } else if system_header.sent_time < user_header.sent_time {
        Some("System report was sent before user report")
    } else if system_header.report_id < user_header.report_id {
        Some("System report ID was lower than user report")
    } else {
        None
    };

    match reason {
        Some(msg) => {
            warn!("MERGE: refusing to merge: {}", msg);
            Err(MergeError::InvalidArgument(msg))
        }
        None => Ok(()),
    }
}

/// Footer id range of a merged report with no non-zero reading ids.
const EMPTY_FOOTER_RANGE: (u32, u32) = (u32::MAX, 0);

/// Interleave by ascending reading id.  Ties go to the system reading.
fn interleave(
    user: &[Reading],
    system: &[Reading],
    reference: std::time::SystemTime,
) -> Result<(Vec<Reading>, (u32, u32)), MergeError> {
    let total = user.len() + system.len();
    let mut merged = Vec::with_capacity(total);
    let (mut ui, mut si) = (0, 0);
    let mut range: Option<(u32, u32)> = None;

    while merged.len() < total {
        let reading = match (user.get(ui), system.get(si)) {
            (None, None) => {
                return Err(MergeError::Inconsistent(
                    "Both reports have been exhausted, no more readings to pick",
                ));
            }
            (Some(u), Some(s)) if u.id() < s.id() => {
                ui += 1;
                u
            }
            (_, Some(s)) => {
                si += 1;
                s
            }
            (Some(u), None) => {
                ui += 1;
                u
            }
        };

        let id = reading.id();
        if id != 0 {
            range = Some(match range {
                None => (id, id),
                Some((lo, hi)) => (lo.min(id), hi.max(id)),
            });
        }
        merged.push(reading.rebased(reference));
    }

    Ok((merged, range.unwrap_or(EMPTY_FOOTER_RANGE)))
}

// ── Tests ────────────────────────────────────────────────────
