//! Signed list reports: a header, packed readings and a signed footer.
//!
//! ```text
//! ┌──────────────────────── header (20 B) ─────────────────────────┐
//! │ fmt=1 │ lenLo │ lenHi │ deviceID │ reportID │ sentTime │ flags │
//! │ u8    │ u8    │ u16   │ u32      │ u32      │ u32      │ u8    │
//! │ streamer u8 │ selector u16                                     │
//! ├──────────────────────── readings (16 B each) ──────────────────┤
//! │ stream u16 │ reserved u16 │ id u32 │ timestamp u32 │ value u32 │
//! ├──────────────────────── footer (24 B) ─────────────────────────┤
//! │ lowestID u32 │ highestID u32 │ signature (16 B)                │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::time::SystemTime;

use log::warn;

use super::reading::{Reading, reference_time};
use super::selector::StreamSelector;
use crate::error::ReportError;
use crate::signature::{self, SIGNATURE_LEN};

pub const FORMAT_SIGNED_LIST: u8 = 1;
pub const LIST_HEADER_LEN: usize = 20;
pub const LIST_FOOTER_LEN: usize = 24;
pub const READING_RECORD_LEN: usize = 16;
/// Header plus footer of a report with no readings.
pub const LIST_OVERHEAD: usize = LIST_HEADER_LEN + LIST_FOOTER_LEN;
/// `pack` format of the header.
pub const LIST_HEADER_FORMAT: &str = "BBHLLLBBH";

pub const USER_REPORT_STREAMER: u8 = 0;
pub const SYSTEM_REPORT_STREAMER: u8 = 1;
/// Virtual streamer of a merged report; acknowledging it acknowledges
/// both the user and the system streamer.
pub const COMBINED_REPORT_STREAMER: u8 = 0xFF;

/// Who signed the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SignatureFlags {
    HashOnly = 0,
    SignedUserKey = 1,
    SignedDeviceKey = 2,
}

impl SignatureFlags {
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::HashOnly),
            1 => Some(Self::SignedUserKey),
            2 => Some(Self::SignedDeviceKey),
            _ => None,
        }
    }
}

/// Outcome of checking the embedded signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid,
    /// Signed with a key we cannot check.
    Unknown,
}

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListReportHeader {
    pub format: u8,
    pub length_low: u8,
    pub length_high: u16,
    pub device_id: u32,
    pub report_id: u32,
    pub sent_time: u32,
    pub signature_flags: u8,
    pub streamer: u8,
    pub selector: u16,
}

impl ListReportHeader {
    /// Header for a hash-only report of `total_length` bytes.
    pub fn new(
        total_length: usize,
        device_id: u32,
        report_id: u32,
        sent_time: u32,
        streamer: u8,
        selector: u16,
    ) -> Self {
        Self {
            format: FORMAT_SIGNED_LIST,
            length_low: (total_length & 0xFF) as u8,
            length_high: (total_length >> 8) as u16,
            device_id,
            report_id,
            sent_time,
            signature_flags: SignatureFlags::HashOnly as u8,
            streamer,
            selector,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, ReportError> {
        if data.len() < LIST_HEADER_LEN {
            return Err(ReportError::TooShort(data.len()));
        }

        let u32_at = |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Ok(Self {
            format: data[0],
            length_low: data[1],
            length_high: u16::from_le_bytes([data[2], data[3]]),
            device_id: u32_at(4),
            report_id: u32_at(8),
            sent_time: u32_at(12),
            signature_flags: data[16],
            streamer: data[17],
            selector: u16::from_le_bytes([data[18], data[19]]),
        })
    }

    /// Build from the integers of a `LIST_HEADER_FORMAT` unpack.
    pub fn from_fields(f: &[i64]) -> Option<Self> {
        if f.len() != 9 {
            return None;
        }
        Some(Self {
            format: f[0] as u8,
            length_low: f[1] as u8,
            length_high: f[2] as u16,
            device_id: f[3] as u32,
            report_id: f[4] as u32,
            sent_time: f[5] as u32,
            signature_flags: f[6] as u8,
            streamer: f[7] as u8,
            selector: f[8] as u16,
        })
    }

    pub fn to_bytes(&self) -> [u8; LIST_HEADER_LEN] {
        let mut out = [0u8; LIST_HEADER_LEN];
        out[0] = self.format;
        out[1] = self.length_low;
        out[2..4].copy_from_slice(&self.length_high.to_le_bytes());
        out[4..8].copy_from_slice(&self.device_id.to_le_bytes());
        out[8..12].copy_from_slice(&self.report_id.to_le_bytes());
        out[12..16].copy_from_slice(&self.sent_time.to_le_bytes());
        out[16] = self.signature_flags;
        out[17] = self.streamer;
        out[18..20].copy_from_slice(&self.selector.to_le_bytes());
        out
    }

    pub fn total_length(&self) -> usize {
        usize::from(self.length_low) | (usize::from(self.length_high) << 8)
    }

    pub fn decoded_selector(&self) -> StreamSelector {
        StreamSelector::decode(self.selector)
    }
}

/// A decoded signed list report.  Owns its wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedListReport {
    device_id: u32,
    streamer: u8,
    readings: Vec<Reading>,
    raw: Vec<u8>,
    received_time: SystemTime,
    header: ListReportHeader,
    validity: Validity,
    id_range: (u32, u32),
}

impl SignedListReport {
    /// Decode `raw`, anchoring reading times at `received_time - sent_time`.
    pub fn new(
        device_id: u32,
        streamer: u8,
        raw: Vec<u8>,
        received_time: SystemTime,
    ) -> Result<Self, ReportError> {
        let header = check_layout(&raw)?;
        let reference = reference_time(received_time, header.sent_time);
        let readings = decode_readings(&raw, reference);
        Ok(Self::assemble(
            device_id,
            streamer,
            header,
            readings,
            raw,
            received_time,
        ))
    }

    /// Wrap `raw` with an already decoded reading sequence.
    pub fn from_parts(
        device_id: u32,
        streamer: u8,
        readings: Vec<Reading>,
        raw: Vec<u8>,
        received_time: SystemTime,
    ) -> Result<Self, ReportError> {
        let header = check_layout(&raw)?;
        Ok(Self::assemble(
            device_id,
            streamer,
            header,
            readings,
            raw,
            received_time,
        ))
    }

    fn assemble(
        device_id: u32,
        streamer: u8,
        header: ListReportHeader,
        readings: Vec<Reading>,
        raw: Vec<u8>,
        received_time: SystemTime,
    ) -> Self {
        let validity = match SignatureFlags::from_u8(header.signature_flags) {
            Some(SignatureFlags::HashOnly) => {
                if signature::verify_trailing(&raw) {
                    Validity::Valid
                } else {
                    warn!(
                        "REPORT: signature mismatch on report {} from device {}",
                        header.report_id, device_id
                    );
                    Validity::Invalid
                }
            }
            _ => Validity::Unknown,
        };
        let id_range = id_range(&readings);

        Self {
            device_id,
            streamer,
            readings,
            raw,
            received_time,
            header,
            validity,
            id_range,
        }
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn streamer(&self) -> u8 {
        self.streamer
    }

    /// Readings in wire order.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_raw_bytes(self) -> Vec<u8> {
        self.raw
    }

    /// Wall-clock time the first byte of this report arrived.
    pub fn received_time(&self) -> SystemTime {
        self.received_time
    }

    pub fn header(&self) -> &ListReportHeader {
        &self.header
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    /// `(lowest, highest)` non-zero reading id, or `(0, 0)` if none.
    pub fn reading_id_range(&self) -> (u32, u32) {
        self.id_range
    }

    /// `(lowest, highest)` as recorded in the footer by the device.
    pub fn footer_id_range(&self) -> (u32, u32) {
        let at = self.raw.len() - LIST_FOOTER_LEN;
        let u32_at = |i: usize| {
            u32::from_le_bytes([self.raw[i], self.raw[i + 1], self.raw[i + 2], self.raw[i + 3]])
        };
        (u32_at(at), u32_at(at + 4))
    }

    pub fn signature(&self) -> &[u8] {
        &self.raw[self.raw.len() - SIGNATURE_LEN..]
    }
}

/// Validate the header and overall length of `raw`.
///
/// A body that is not a whole number of reading records is rejected
/// with `Misaligned` rather than truncated to the records that fit, so a
/// report is never decoded from a partial trailing record.
fn check_layout(raw: &[u8]) -> Result<ListReportHeader, ReportError> {
    if raw.len() < LIST_OVERHEAD {
        return Err(ReportError::TooShort(raw.len()));
    }

    let header = ListReportHeader::parse(raw)?;
    if header.format != FORMAT_SIGNED_LIST {
        return Err(ReportError::WrongFormat(header.format));
    }
    if header.total_length() != raw.len() {
        return Err(ReportError::LengthMismatch {
            declared: header.total_length(),
            actual: raw.len(),
        });
    }

    let body = raw.len() - LIST_OVERHEAD;
    if body % READING_RECORD_LEN != 0 {
        return Err(ReportError::Misaligned(body));
    }

    Ok(header)
}

fn decode_readings(raw: &[u8], reference: SystemTime) -> Vec<Reading> {
    raw[LIST_HEADER_LEN..raw.len() - LIST_FOOTER_LEN]
        .chunks_exact(READING_RECORD_LEN)
        .map(|r| {
            let stream = u16::from_le_bytes([r[0], r[1]]);
            let id = u32::from_le_bytes([r[4], r[5], r[6], r[7]]);
            let timestamp = u32::from_le_bytes([r[8], r[9], r[10], r[11]]);
            let value = u32::from_le_bytes([r[12], r[13], r[14], r[15]]);
            Reading::new(stream, value, timestamp, reference, id)
        })
        .collect()
}

/// `(lowest, highest)` over non-zero ids, `(0, 0)` when there are none.
pub fn id_range(readings: &[Reading]) -> (u32, u32) {
    readings
        .iter()
        .map(Reading::id)
        .filter(|&id| id != 0)
        .fold(None, |acc, id| match acc {
            None => Some((id, id)),
            Some((lo, hi)) => Some((lo.min(id), hi.max(id))),
        })
        .unwrap_or((0, 0))
}

/// Serialize one 16-byte reading record.
pub fn reading_record(reading: &Reading) -> [u8; READING_RECORD_LEN] {
    let mut out = [0u8; READING_RECORD_LEN];
    out[0..2].copy_from_slice(&reading.stream().to_le_bytes());
    out[4..8].copy_from_slice(&reading.id().to_le_bytes());
    out[8..12].copy_from_slice(&reading.timestamp().to_le_bytes());
    out[12..16].copy_from_slice(&reading.value().to_le_bytes());
    out
}

/// Write header, readings and footer, then sign everything before the
/// signature field.
pub(crate) fn assemble_record(
    header: &ListReportHeader,
    readings: &[Reading],
    id_range: (u32, u32),
) -> Vec<u8> {
    let total = LIST_OVERHEAD + READING_RECORD_LEN * readings.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&header.to_bytes());
    for reading in readings {
        out.extend_from_slice(&reading_record(reading));
    }
    out.extend_from_slice(&id_range.0.to_le_bytes());
    out.extend_from_slice(&id_range.1.to_le_bytes());

    let sig = signature::calculate(&out);
    out.extend_from_slice(&sig);
    out
}

/// Encode a hash-only signed list report.
pub fn encode_list_report(
    device_id: u32,
    report_id: u32,
    streamer: u8,
    sent_time: u32,
    selector: u16,
    readings: &[Reading],
) -> Vec<u8> {
    let total = LIST_OVERHEAD + READING_RECORD_LEN * readings.len();
    let header = ListReportHeader::new(total, device_id, report_id, sent_time, streamer, selector);
    assemble_record(&header, readings, id_range(readings))
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack;
    use crate::reports::selector::USER_OUTPUTS;
    use std::time::{Duration, UNIX_EPOCH};

    fn sequential(count: u32) -> Vec<Reading> {
        (0..count)
            .map(|i| Reading::new(0x5001, i, i, UNIX_EPOCH, i + 1))
            .collect()
    }

    #[test]
    fn decode_encoded_report() {
        let raw = encode_list_report(1, 11, USER_REPORT_STREAMER, 10, USER_OUTPUTS, &sequential(10));
        assert_eq!(raw.len(), LIST_OVERHEAD + 160);

        let received = UNIX_EPOCH + Duration::from_secs(1_000);
        let report = SignedListReport::new(1, USER_REPORT_STREAMER, raw, received).unwrap();
        assert_eq!(report.validity(), Validity::Valid);
        assert_eq!(report.readings().len(), 10);
        assert_eq!(report.reading_id_range(), (1, 10));
        assert_eq!(report.footer_id_range(), (1, 10));
        assert_eq!(report.header().report_id, 11);
        assert_eq!(report.header().total_length(), LIST_OVERHEAD + 160);

        // reference = 1000 - 10; reading 3 has timestamp 3.
        let r = &report.readings()[3];
        assert_eq!(r.time(), UNIX_EPOCH + Duration::from_secs(993));
    }

    #[test]
    fn corrupt_byte_is_invalid() {
        let mut raw = encode_list_report(1, 2, 0, 5, USER_OUTPUTS, &sequential(3));
        raw[25] ^= 0x40;
        let report = SignedListReport::new(1, 0, raw, UNIX_EPOCH).unwrap();
        assert_eq!(report.validity(), Validity::Invalid);
    }

    #[test]
    fn keyed_signatures_are_unknown() {
        let mut raw = encode_list_report(1, 2, 0, 5, USER_OUTPUTS, &sequential(3));
        raw[16] = SignatureFlags::SignedDeviceKey as u8;
        let report = SignedListReport::new(1, 0, raw, UNIX_EPOCH).unwrap();
        assert_eq!(report.validity(), Validity::Unknown);
    }

    #[test]
    fn header_matches_pack_layout() {
        let header = ListReportHeader::new(300, 7, 8, 9, 1, USER_OUTPUTS);
        let bytes = header.to_bytes();
        let fields = pack::unpack_ints(LIST_HEADER_FORMAT, &bytes).unwrap();
        assert_eq!(ListReportHeader::from_fields(&fields), Some(header));
        assert_eq!(header.total_length(), 300);
    }

    #[test]
    fn layout_errors() {
        assert_eq!(
            SignedListReport::new(1, 0, vec![1; 10], UNIX_EPOCH),
            Err(ReportError::TooShort(10))
        );

        let mut raw = encode_list_report(1, 2, 0, 5, USER_OUTPUTS, &sequential(1));
        raw.push(0);
        assert!(matches!(
            SignedListReport::new(1, 0, raw, UNIX_EPOCH),
            Err(ReportError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn partial_trailing_record_is_rejected() {
        let mut raw = encode_list_report(1, 2, 0, 5, USER_OUTPUTS, &sequential(1));
        let body_end = raw.len() - LIST_FOOTER_LEN;
        raw.splice(body_end..body_end, [0xAA; 4]);
        let header = ListReportHeader::new(raw.len(), 1, 2, 5, 0, USER_OUTPUTS);
        raw[..LIST_HEADER_LEN].copy_from_slice(&header.to_bytes());

        assert_eq!(
            SignedListReport::new(1, 0, raw.clone(), UNIX_EPOCH),
            Err(ReportError::Misaligned(READING_RECORD_LEN + 4))
        );
        assert_eq!(
            SignedListReport::from_parts(1, 0, sequential(1), raw, UNIX_EPOCH),
            Err(ReportError::Misaligned(READING_RECORD_LEN + 4))
        );
    }

    #[test]
    fn zero_ids_excluded_from_range() {
        let readings = vec![
            Reading::new(0x5001, 0, 0, UNIX_EPOCH, 0),
            Reading::new(0x5001, 0, 0, UNIX_EPOCH, 7),
            Reading::new(0x5001, 0, 0, UNIX_EPOCH, 3),
        ];
        assert_eq!(id_range(&readings), (3, 7));
        assert_eq!(id_range(&[]), (0, 0));
    }
}
