//! Realtime single-reading reports.
//!
//! Wire form (20 bytes, little-endian):
//!
//! ```text
//! ┌──────┬──────┬────────┬──────────┬──────────┬───────────┬─────────┐
//! │fmt=0 │ rsvd │ stream │ deviceID │ sent ts  │reading ts │  value  │
//! │ u8   │ u8   │ u16    │ u32      │ u32      │ u32       │  u32    │
//! └──────┴──────┴────────┴──────────┴──────────┴───────────┴─────────┘
//! ```

use super::reading::{Reading, ValueFormat};

/// Format discriminant of an individual report.
pub const FORMAT_INDIVIDUAL: u8 = 0;
/// Fixed wire size of an individual report.
pub const INDIVIDUAL_REPORT_LEN: usize = 20;
/// `pack` format of the wire record.
pub const INDIVIDUAL_REPORT_FORMAT: &str = "BBHLLLL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndividualReport {
    device_id: u32,
    sent_timestamp: u32,
    reading: Reading,
}

impl IndividualReport {
    pub fn new(device_id: u32, sent_timestamp: u32, reading: Reading) -> Self {
        Self {
            device_id,
            sent_timestamp,
            reading,
        }
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Device uptime in seconds when the report was sent.
    pub fn sent_timestamp(&self) -> u32 {
        self.sent_timestamp
    }

    pub fn reading(&self) -> &Reading {
        &self.reading
    }

    /// The reading's value reinterpreted per a cloud-side format code.
    pub fn value_as(&self, format: ValueFormat) -> i64 {
        self.reading.value_as(format)
    }
}

/// Encode an individual report record.
pub fn encode_individual_report(
    device_id: u32,
    stream: u16,
    value: u32,
    sent_timestamp: u32,
    reading_timestamp: u32,
) -> [u8; INDIVIDUAL_REPORT_LEN] {
    let mut out = [0u8; INDIVIDUAL_REPORT_LEN];
    out[0] = FORMAT_INDIVIDUAL;
    out[2..4].copy_from_slice(&stream.to_le_bytes());
    out[4..8].copy_from_slice(&device_id.to_le_bytes());
    out[8..12].copy_from_slice(&sent_timestamp.to_le_bytes());
    out[12..16].copy_from_slice(&reading_timestamp.to_le_bytes());
    out[16..20].copy_from_slice(&value.to_le_bytes());
    out
}
