//! Report data model.
//!
//! | Module        | Contents                                        |
//! |---------------|-------------------------------------------------|
//! | `reading`     | `Reading`, value reinterpretation                |
//! | `individual`  | 20-byte realtime `IndividualReport`              |
//! | `signed_list` | `SignedListReport`, header, encoders             |
//! | `selector`    | stream id / selector decoding                    |
//! | `merger`      | user + system → combined report                  |
//! | `reassembler` | out-of-order BLE packet repair                   |

pub mod individual;
pub mod merger;
pub mod reading;
pub mod reassembler;
pub mod selector;
pub mod signed_list;

pub use individual::IndividualReport;
pub use merger::ReportMerger;
pub use reading::{Reading, ValueFormat};
pub use reassembler::{ReportReassembler, Transposition};
pub use selector::StreamSelector;
pub use signed_list::{ListReportHeader, SignatureFlags, SignedListReport, Validity};

/// A decoded report, as produced by the streaming decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Individual(IndividualReport),
    SignedList(SignedListReport),
}

impl Report {
    pub fn device_id(&self) -> u32 {
        match self {
            Self::Individual(r) => r.device_id(),
            Self::SignedList(r) => r.device_id(),
        }
    }

    /// All readings carried by the report.
    pub fn readings(&self) -> &[Reading] {
        match self {
            Self::Individual(r) => core::slice::from_ref(r.reading()),
            Self::SignedList(r) => r.readings(),
        }
    }
}
