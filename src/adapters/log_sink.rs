//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing every adapter event to the `log`
//! facade, one line per event.  Used by the capture replay tool; a UI
//! or uploader would implement the same trait.

use log::{error, info, warn};

use crate::events::{AdapterEvent, EventSink};
use crate::reports::Validity;

/// Adapter that logs every [`AdapterEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink {
    readings: usize,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Readings seen so far across all reports.
    pub fn readings(&self) -> usize {
        self.readings
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AdapterEvent) {
        match event {
            AdapterEvent::RawRealtimeReading(r) => {
                self.readings += 1;
                let reading = r.reading();
                info!(
                    "REALTIME | device={:#x} | stream={} | value={} | ts={}",
                    r.device_id(),
                    reading.variable(),
                    reading.value(),
                    reading.timestamp(),
                );
            }
            AdapterEvent::RawRobustReport(r) => {
                self.readings += r.readings().len();
                let (lowest, highest) = r.reading_id_range();
                let validity = match r.validity() {
                    Validity::Valid => "valid",
                    Validity::Invalid => "INVALID",
                    Validity::Unknown => "unverified",
                };
                info!(
                    "REPORT | device={:#x} | id={} | streamer={} | readings={} | ids={}..={} | {}",
                    r.device_id(),
                    r.header().report_id,
                    r.streamer(),
                    r.readings().len(),
                    lowest,
                    highest,
                    validity,
                );
            }
            AdapterEvent::RobustReportStarted(e) => {
                info!("PROGRESS | report {} started", e.report_index());
            }
            AdapterEvent::RobustReportProgress(e) => {
                info!("PROGRESS | report {} at {}%", e.report_index(), e.percentage());
            }
            AdapterEvent::RobustReportStalled(e) => {
                warn!("PROGRESS | report {} stalled at {}%", e.report_index(), e.percentage());
            }
            AdapterEvent::RobustReportFinished(e) => {
                info!("PROGRESS | report {} finished", e.report_index());
            }
            AdapterEvent::RobustReportInvalid { streamer, raw } => {
                warn!(
                    "REPORT | streamer {} sent {} bytes with a bad signature",
                    streamer,
                    raw.len()
                );
            }
            AdapterEvent::UnrecoverableStreamingError(e) => {
                error!("STREAM | {}", e);
            }
            AdapterEvent::UnrecoverableRpcError(e) => {
                error!("RPC | {}", e);
            }
        }
    }
}
