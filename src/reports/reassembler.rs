//! Repair signed list reports whose 20-byte notifications arrived out of
//! order.
//!
//! Some BLE stacks hand notifications that arrive close together to the
//! application in the wrong order, which scrambles any report spanning
//! more than one packet.  Readings are 16 bytes but packets are 20, so
//! every packet carries most of one reading plus part of a neighbour.
//! Checking whether the readings that straddle a packet boundary make
//! sense tells us which packet belongs in each slot.  A straddling
//! reading is plausible when:
//!
//! 1. its stream id is admitted by the report's selector,
//! 2. its reserved field is zero,
//! 3. its reading id is greater than the previous one, and
//! 4. its timestamp did not go backwards, unless it is a reboot marker.
//!
//! When several packets pass, the one with the lowest reading id wins.
//!
//! ```text
//!  packet:  │ 0: header │ 1 │ 2 │ 3 │ ... │ n-1 │
//!  reading offset within packet cycles  0 → 4 → 8 → 12 → 0 ...
//! ```

use log::{debug, info};

use super::selector::StreamSelector;
use super::signed_list::ListReportHeader;
use crate::error::ReportError;
use crate::signature::{self, SIGNATURE_LEN};

/// Size of one BLE notification.
pub const CHUNK_LEN: usize = 20;
/// How many packets ahead of the current slot are considered.
const SEARCH_WINDOW: usize = 4;

/// One packet moved from `src` back to `dst` during repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transposition {
    pub src: usize,
    pub dst: usize,
}

/// Fields of the (up to) two readings visible in one packet.  `None` for
/// fields that fall outside the packet.
#[derive(Debug, Clone, Copy)]
struct DecodedChunk {
    streams: [Option<u32>; 2],
    reserved: [Option<u32>; 2],
    ids: [Option<u32>; 2],
    timestamps: [Option<u32>; 2],
    offset: usize,
    index: usize,
}

impl DecodedChunk {
    fn decode(data: &[u8], index: usize, offset: usize) -> Self {
        let u16_at = |i: usize| Some(u32::from(u16::from_le_bytes([data[i], data[i + 1]])));
        let u32_at =
            |i: usize| Some(u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]));

        let mut chunk = Self {
            streams: [None; 2],
            reserved: [None; 2],
            ids: [None; 2],
            timestamps: [None; 2],
            offset,
            index,
        };

        // Lay out where each field of reading 1 (tail of the straddling
        // reading) and reading 2 (head of the next) sits in this packet.
        match offset {
            0 => {
                chunk.streams = [u16_at(0), u16_at(16)];
                chunk.reserved = [u16_at(2), u16_at(18)];
                chunk.ids[0] = u32_at(4);
                chunk.timestamps[0] = u32_at(8);
            }
            4 => {
                chunk.ids = [u32_at(0), u32_at(16)];
                chunk.timestamps[0] = u32_at(4);
                chunk.streams[1] = u16_at(12);
                chunk.reserved[1] = u16_at(14);
            }
            8 => {
                chunk.timestamps = [u32_at(0), u32_at(16)];
                chunk.streams[1] = u16_at(8);
                chunk.reserved[1] = u16_at(10);
                chunk.ids[1] = u32_at(12);
            }
            _ => {
                chunk.streams[1] = u16_at(4);
                chunk.reserved[1] = u16_at(6);
                chunk.ids[1] = u32_at(8);
                chunk.timestamps[1] = u32_at(12);
            }
        }

        chunk
    }

    /// The second slot of the last data packet overlaps the footer.
    fn mask(&mut self) {
        if self.offset == 12 {
            return;
        }
        self.streams[1] = None;
        self.reserved[1] = None;
        self.ids[1] = None;
        self.timestamps[1] = None;
    }

    fn fill(&mut self, last: &Latest) {
        if self.streams[0].is_none() {
            self.streams[0] = last.stream;
        }
        if self.reserved[0].is_none() {
            self.reserved[0] = Some(0);
        }
        if self.timestamps[0].is_none() {
            self.timestamps[0] = last.timestamp;
        }
        if self.ids[0].is_none() {
            self.ids[0] = last.id;
        }
    }

    fn is_plausible(&self, selector: &StreamSelector, last: &Latest) -> bool {
        let selected = self
            .streams
            .iter()
            .flatten()
            .all(|&s| selector.matches(s as u16));
        if !selected {
            return false;
        }

        if self.reserved.iter().flatten().any(|&r| r != 0) {
            return false;
        }

        let id0 = self.ids[0].unwrap_or(0);
        if let Some(id1) = self.ids[1] {
            if id1 <= id0 {
                return false;
            }
        }

        let ts0 = self.timestamps[0].unwrap_or(0);
        if let Some(ts1) = self.timestamps[1] {
            if ts1 < ts0 && self.streams[1] != Some(u32::from(StreamSelector::REBOOT_STREAM)) {
                return false;
            }
        }

        // Only an id that lives in this packet (not one filled in from
        // the previous packet) is compared with the last id.
        if (self.offset == 0 || self.offset == 4) && id0 <= last.id.unwrap_or(0) {
            return false;
        }

        true
    }

    /// First reading id that was actually read from this packet.
    fn own_id(&self) -> Option<u32> {
        if self.offset == 0 || self.offset == 4 {
            self.ids[0]
        } else {
            self.ids[1]
        }
    }

    fn latest(&self) -> Latest {
        Latest {
            stream: self.streams[1].or(self.streams[0]),
            id: self.ids[1].or(self.ids[0]),
            timestamp: self.timestamps[1].or(self.timestamps[0]),
        }
    }
}

/// Most recent reading fields seen while walking the packets.
#[derive(Debug, Clone, Copy, Default)]
struct Latest {
    stream: Option<u32>,
    id: Option<u32>,
    timestamp: Option<u32>,
}

/// Reorders the packets of one raw signed list report in place.
pub struct ReportReassembler {
    report: Vec<u8>,
    selector: StreamSelector,
    original_signature: [u8; SIGNATURE_LEN],
    transpositions: Vec<Transposition>,
}

impl ReportReassembler {
    pub fn new(report: Vec<u8>) -> Result<Self, ReportError> {
        let header = ListReportHeader::parse(&report)?;
        if report.len() < CHUNK_LEN + SIGNATURE_LEN {
            return Err(ReportError::TooShort(report.len()));
        }

        let mut original_signature = [0u8; SIGNATURE_LEN];
        original_signature.copy_from_slice(&report[report.len() - SIGNATURE_LEN..]);

        Ok(Self {
            report,
            selector: header.decoded_selector(),
            original_signature,
            transpositions: Vec::new(),
        })
    }

    /// Whether the current byte order matches the embedded signature.
    pub fn is_valid(&self) -> bool {
        let signed = &self.report[..self.report.len() - SIGNATURE_LEN];
        signature::compare(&self.original_signature, &signature::calculate(signed))
    }

    /// Packet moves made so far, in the order they were applied.
    pub fn transpositions(&self) -> &[Transposition] {
        &self.transpositions
    }

    /// The repaired bytes, or `None` if the signature still does not match.
    pub fn into_fixed_report(self) -> Option<Vec<u8>> {
        if self.is_valid() {
            Some(self.report)
        } else {
            None
        }
    }

    /// Try to put every packet back in its slot.  Returns whether the
    /// signature verifies afterwards.
    pub fn fix_out_of_order_chunks(&mut self) -> bool {
        let total_chunks = self.report.len() / CHUNK_LEN;
        let end = total_chunks.saturating_sub(1);
        let mut slot = 1;
        let mut offset = 0;
        let mut last = Latest::default();

        while slot < end {
            let mut candidates = self.candidates(slot, total_chunks, offset, &last);
            // Stable sort; candidates without an own id keep their order.
            candidates.sort_by_key(DecodedChunk::own_id);

            let Some(best) = candidates.first().copied() else {
                debug!("REPORT: no plausible packet for slot {}", slot);
                return false;
            };

            if best.index != slot {
                self.transpositions.push(Transposition {
                    src: best.index,
                    dst: slot,
                });
                self.bubble_back(best.index, slot);
            }

            last = best.latest();
            offset = (offset + CHUNK_LEN) % 16;
            slot += 1;
        }

        let valid = self.is_valid();
        if valid && !self.transpositions.is_empty() {
            info!(
                "REPORT: repaired {} out-of-order packet(s)",
                self.transpositions.len()
            );
        }
        valid
    }

    fn chunk(&self, index: usize) -> &[u8] {
        &self.report[index * CHUNK_LEN..(index + 1) * CHUNK_LEN]
    }

    fn candidates(
        &self,
        slot: usize,
        total_chunks: usize,
        offset: usize,
        last: &Latest,
    ) -> Vec<DecodedChunk> {
        (slot..total_chunks.min(slot + SEARCH_WINDOW))
            .filter_map(|index| {
                let mut chunk = DecodedChunk::decode(self.chunk(index), index, offset);
                if slot + 2 == total_chunks {
                    chunk.mask();
                }
                chunk.fill(last);
                chunk.is_plausible(&self.selector, last).then_some(chunk)
            })
            .collect()
    }

    /// Move packet `src` to `dst`, shifting the packets in between forward.
    fn bubble_back(&mut self, src: usize, dst: usize) {
        self.report[dst * CHUNK_LEN..(src + 1) * CHUNK_LEN].rotate_right(CHUNK_LEN);
    }
}

// ── Tests ────────────────────────────────────────────────────
