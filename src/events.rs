//! Events published by the protocol core.
//!
//! Events are produced by:
//! - the report decoder (progress of long signed list reports)
//! - the streaming interface (decoded reports, repair failures)
//! - the RPC pipeline (fatal errors)
//!
//! and fanned out to higher layers through [`Channel::notify`], which
//! typically forwards them to an [`EventSink`].
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Decoder      │────▶│              │     │              │
//! │ Streaming    │────▶│   notify()   │────▶│  EventSink   │
//! │ RPC pipeline │────▶│              │     │              │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! [`Channel::notify`]: crate::rpc::transport::Channel::notify

use crate::error::{DecodeError, RpcError};
use crate::reports::{IndividualReport, SignedListReport};

/// Progress of a signed list report that spans several pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportParserEvent {
    /// Header seen, body still arriving.
    Started { total_size: usize, report_index: u32 },
    /// Another progress bucket was crossed.
    Progress { percentage: u8, report_index: u32 },
    /// No data arrived for longer than the stall threshold.
    Stalled { percentage: u8, report_index: u32 },
    /// The report is complete (or reception was stopped).
    Finished { report_index: u32 },
}

impl ReportParserEvent {
    pub const fn report_index(&self) -> u32 {
        match *self {
            Self::Started { report_index, .. }
            | Self::Progress { report_index, .. }
            | Self::Stalled { report_index, .. }
            | Self::Finished { report_index } => report_index,
        }
    }

    /// Completion percentage implied by the event.
    pub const fn percentage(&self) -> u8 {
        match *self {
            Self::Started { .. } => 0,
            Self::Progress { percentage, .. } | Self::Stalled { percentage, .. } => percentage,
            Self::Finished { .. } => 100,
        }
    }
}

/// Everything the core tells the layers above it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    // ── RPC ───────────────────────────────────────────────
    /// The RPC pipeline stopped; reopen the session to recover.
    UnrecoverableRpcError(RpcError),

    // ── Streaming ─────────────────────────────────────────
    RawRealtimeReading(IndividualReport),
    RawRobustReport(SignedListReport),
    RobustReportStarted(ReportParserEvent),
    RobustReportStalled(ReportParserEvent),
    RobustReportProgress(ReportParserEvent),
    RobustReportFinished(ReportParserEvent),
    /// A signed report failed its signature and could not be repaired.
    RobustReportInvalid { streamer: u8, raw: Vec<u8> },
    /// The decoder broke; no further reports until the session reopens.
    UnrecoverableStreamingError(DecodeError),
}

impl AdapterEvent {
    /// Wrap a decoder progress event in the matching adapter event.
    pub fn from_progress(event: ReportParserEvent) -> Self {
        match event {
            ReportParserEvent::Started { .. } => Self::RobustReportStarted(event),
            ReportParserEvent::Progress { .. } => Self::RobustReportProgress(event),
            ReportParserEvent::Stalled { .. } => Self::RobustReportStalled(event),
            ReportParserEvent::Finished { .. } => Self::RobustReportFinished(event),
        }
    }
}

/// Consumer of adapter events.
pub trait EventSink {
    fn emit(&mut self, event: &AdapterEvent);
}

/// Sink that records every event, for tests and tooling.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<AdapterEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AdapterEvent) {
        self.events.push(event.clone());
    }
}
