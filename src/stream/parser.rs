//! Incremental report decoder.
//!
//! Turns arbitrarily split streaming notifications into whole reports.
//! Bytes accumulate in a [`RingBuffer`]; after every push the decoder
//! peels off as many complete records as are buffered.
//!
//! ```text
//!  push(chunk) ──▶ RingBuffer ──▶ peek fmt byte
//!                                   │
//!                 0 ────────────────┼──────────────── 1
//!                 │                                   │
//!       pop 20 B "BBHLLLL"                 peek 20 B header "BBHLLLBBH"
//!       IndividualReport                   total > buffered? → progress,
//!                                          wait for more data
//!                                          else pop total → SignedListReport
//! ```
//!
//! Any other format byte breaks the decoder until `reset()`.
//!
//! Progress events are only produced for signed list reports that do not
//! arrive in a single push.  At most one event is pending at a time; poll
//! it with [`ReportDecoder::pop_last_event`].

use std::time::{Duration, SystemTime};

use log::{debug, error};

use crate::adapters::time::{Clock, SystemClock};
use crate::config::StackConfig;
use crate::error::{BufferError, DecodeError};
use crate::events::ReportParserEvent;
use crate::reports::individual::{FORMAT_INDIVIDUAL, INDIVIDUAL_REPORT_FORMAT};
use crate::reports::reading::{Reading, reference_time};
use crate::reports::signed_list::{FORMAT_SIGNED_LIST, LIST_HEADER_FORMAT, ListReportHeader};
use crate::reports::{IndividualReport, Report, SignedListReport};

use super::ring_buffer::RingBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    Idle,
    InProgress,
}

/// Why a single parse attempt stopped.
enum ParseStop {
    /// Not enough bytes yet; try again after the next push.
    NeedMore,
    Malformed(String),
}

impl From<BufferError> for ParseStop {
    fn from(e: BufferError) -> Self {
        match e {
            BufferError::Underflow { .. } => Self::NeedMore,
            other => Self::Malformed(other.to_string()),
        }
    }
}

/// Streaming report decoder.
pub struct ReportDecoder<K: Clock = SystemClock> {
    buffer: RingBuffer,
    broken: bool,
    clock: K,

    state: ReceiveState,
    in_progress_total: usize,
    in_progress_received: usize,
    last_progress_report: usize,
    last_event: Option<ReportParserEvent>,
    reports_received: u32,
    received_time: Option<SystemTime>,
    last_update: Option<SystemTime>,

    progress_interval: u8,
    stall_threshold: Duration,
}

impl ReportDecoder<SystemClock> {
    pub fn new(capacity: usize, auto_expand: bool) -> Self {
        Self::with_clock(capacity, auto_expand, SystemClock)
    }
}

impl<K: Clock> ReportDecoder<K> {
    pub fn with_clock(capacity: usize, auto_expand: bool, clock: K) -> Self {
        let defaults = StackConfig::default();
        Self {
            buffer: RingBuffer::new(capacity, auto_expand),
            broken: false,
            clock,
            state: ReceiveState::Idle,
            in_progress_total: 0,
            in_progress_received: 0,
            last_progress_report: 0,
            last_event: None,
            reports_received: 0,
            received_time: None,
            last_update: None,
            progress_interval: defaults.progress_interval_percent,
            stall_threshold: defaults.stall_threshold(),
        }
    }

    pub fn from_config(config: &StackConfig, clock: K) -> Self {
        let mut decoder = Self::with_clock(
            config.stream_buffer_size,
            config.stream_buffer_autoexpand,
            clock,
        );
        decoder.progress_interval = config.progress_interval_percent.max(1);
        decoder.stall_threshold = config.stall_threshold();
        decoder
    }

    pub fn state(&self) -> ReceiveState {
        self.state
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn in_progress_total(&self) -> usize {
        self.in_progress_total
    }

    pub fn in_progress_received(&self) -> usize {
        self.in_progress_received
    }

    pub fn reports_received(&self) -> u32 {
        self.reports_received
    }

    /// Bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append `chunk` and decode every complete report now buffered.
    pub fn push_data(&mut self, chunk: &[u8]) -> Result<Vec<Report>, DecodeError> {
        if self.broken {
            return Err(DecodeError::Stopped);
        }

        self.buffer.push(chunk).map_err(|e| match e {
            BufferError::InsufficientSpace { requested, free } => {
                DecodeError::InsufficientSpace { requested, free }
            }
            other => DecodeError::UnrecoverableParse(other.to_string()),
        })?;

        self.try_parse_reports()
    }

    fn try_parse_reports(&mut self) -> Result<Vec<Report>, DecodeError> {
        let mut reports = Vec::new();
        loop {
            match self.try_parse_report() {
                Ok(report) => reports.push(report),
                Err(ParseStop::NeedMore) => return Ok(reports),
                Err(ParseStop::Malformed(msg)) => {
                    error!("STREAM: report decoder broken: {}", msg);
                    self.broken = true;
                    return Err(DecodeError::UnrecoverableParse(msg));
                }
            }
        }
    }

    fn try_parse_report(&mut self) -> Result<Report, ParseStop> {
        let format = self.buffer.peek_as("B")?[0];
        match u8::try_from(format) {
            Ok(FORMAT_INDIVIDUAL) => self.parse_individual(),
            Ok(FORMAT_SIGNED_LIST) => self.parse_signed_list(),
            _ => Err(ParseStop::Malformed(format!(
                "Unknown report format received: {format}"
            ))),
        }
    }

    fn parse_individual(&mut self) -> Result<Report, ParseStop> {
        let f = self.buffer.pop_as(INDIVIDUAL_REPORT_FORMAT)?;
        let (stream, device_id, sent, reading_ts, value) =
            (f[2] as u16, f[3] as u32, f[4] as u32, f[5] as u32, f[6] as u32);

        let reference = reference_time(self.clock.now(), sent);
        let reading = Reading::new(stream, value, reading_ts, reference, 0);
        Ok(Report::Individual(IndividualReport::new(
            device_id, sent, reading,
        )))
    }

    fn parse_signed_list(&mut self) -> Result<Report, ParseStop> {
        let fields = self.buffer.peek_as(LIST_HEADER_FORMAT)?;
        let header = ListReportHeader::from_fields(&fields)
            .ok_or_else(|| ParseStop::Malformed("short list report header".into()))?;
        let total = header.total_length();

        if total > self.buffer.len() {
            self.update_status(true, total, self.buffer.len());
        }

        // Stamp the first time any part of this report was seen.
        let received_time = *self.received_time.get_or_insert_with(|| self.clock.now());

        let raw = self.buffer.pop(total)?;
        self.update_status(false, 0, 0);
        self.received_time = None;

        let report = SignedListReport::new(header.device_id, header.streamer, raw, received_time)
            .map_err(|e| ParseStop::Malformed(e.to_string()))?;
        self.reports_received += 1;

        debug!(
            "STREAM: signed report {} from streamer {} ({} readings, {:?})",
            header.report_id,
            header.streamer,
            report.readings().len(),
            report.validity()
        );
        Ok(Report::SignedList(report))
    }

    fn update_status(&mut self, in_progress: bool, total: usize, received: usize) {
        let was_in_progress = self.state == ReceiveState::InProgress;

        if in_progress && !was_in_progress && received < total {
            self.last_event = Some(ReportParserEvent::Started {
                total_size: total,
                report_index: self.reports_received,
            });
        } else if !in_progress && was_in_progress {
            self.last_event = Some(ReportParserEvent::Finished {
                report_index: self.reports_received,
            });
        } else if in_progress && self.in_progress_received != received && self.in_progress_total > 0
        {
            let interval = usize::from(self.progress_interval);
            let last_bucket = self.last_progress_report * 100 / self.in_progress_total / interval;
            let bucket = received * 100 / self.in_progress_total / interval;
            if bucket != last_bucket {
                self.last_event = Some(ReportParserEvent::Progress {
                    percentage: (bucket * interval).min(100) as u8,
                    report_index: self.reports_received,
                });
                self.last_progress_report = received;
            }
        }

        self.last_update = Some(self.clock.now());

        if in_progress {
            self.state = ReceiveState::InProgress;
            self.in_progress_total = total;
            self.in_progress_received = received;
        } else {
            self.state = ReceiveState::Idle;
            self.in_progress_total = 0;
            self.in_progress_received = 0;
            self.last_progress_report = 0;
        }
    }

    /// Take the pending progress event.
    ///
    /// Only the most recent event is kept.  A push that completes one
    /// report and begins the next leaves just the next report's
    /// `Started`; the completed report itself is still returned from
    /// [`push_data`](Self::push_data).
    ///
    /// With nothing pending, a report that has been mid-reception for
    /// longer than the stall threshold yields a synthesized `Stalled`.
    pub fn pop_last_event(&mut self) -> Option<ReportParserEvent> {
        if let Some(event) = self.last_event.take() {
            return Some(event);
        }

        if self.state != ReceiveState::InProgress || self.in_progress_total == 0 {
            return None;
        }

        let since_update = self
            .last_update
            .and_then(|t| self.clock.now().duration_since(t).ok())?;
        if since_update <= self.stall_threshold {
            return None;
        }

        let percentage = (self.in_progress_received * 100 / self.in_progress_total).min(100) as u8;
        Some(ReportParserEvent::Stalled {
            percentage,
            report_index: self.reports_received,
        })
    }

    /// Drop buffered data and progress state; leave the broken state.
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.broken = false;
        self.state = ReceiveState::Idle;
        self.in_progress_total = 0;
        self.in_progress_received = 0;
        self.last_progress_report = 0;
        self.reports_received = 0;
        self.last_event = None;
        self.last_update = None;
        self.received_time = None;
    }

    /// Refuse further data.  A report in flight gets its `Finished` event
    /// so every `Started` is paired.
    pub fn stop(&mut self) {
        self.broken = true;
        if self.state == ReceiveState::InProgress {
            self.update_status(false, 0, 0);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
