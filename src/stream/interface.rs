//! Streaming interface — feeds the report stream into a decoder and
//! publishes what comes out.
//!
//! ```text
//!  Streaming notification
//!        │
//!        ▼
//!  ReportDecoder::push_data ──▶ progress event ──▶ RobustReport{Started,..}
//!        │
//!        ├── Individual ─────────────────────────▶ RawRealtimeReading
//!        ├── SignedList (valid / unknown key) ───▶ RawRobustReport
//!        └── SignedList (bad signature)
//!               ├── packets reordered, fixed ────▶ RawRobustReport
//!               └── not fixable ─────────────────▶ RobustReportInvalid
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{info, warn};

use super::parser::ReportDecoder;
use crate::adapters::time::{Clock, SystemClock};
use crate::config::StackConfig;
use crate::error::DecodeError;
use crate::events::AdapterEvent;
use crate::reports::{Report, ReportReassembler, SignedListReport, Validity};
use crate::rpc::transport::{Channel, Characteristic, Subscription};

struct StreamInner<C: Channel, K: Clock> {
    decoder: RefCell<ReportDecoder<K>>,
    channel: Rc<C>,
    repair_out_of_order: bool,
    subscription: Cell<Option<Subscription>>,
    error_reported: Cell<bool>,
}

/// Owns the report decoder for one device link.
pub struct StreamingInterface<C: Channel, K: Clock = SystemClock> {
    inner: Rc<StreamInner<C, K>>,
}

impl<C: Channel, K: Clock> Clone for StreamingInterface<C, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: Channel + 'static, K: Clock + 'static> StreamingInterface<C, K> {
    pub fn new(channel: Rc<C>, config: &StackConfig, clock: K) -> Self {
        Self {
            inner: Rc::new(StreamInner {
                decoder: RefCell::new(ReportDecoder::from_config(config, clock)),
                channel,
                repair_out_of_order: config.repair_out_of_order,
                subscription: Cell::new(None),
                error_reported: Cell::new(false),
            }),
        }
    }

    /// Reset the decoder and subscribe to the streaming characteristic.
    pub async fn open(&self) -> Result<(), C::Error> {
        self.inner.decoder.borrow_mut().reset();
        self.inner.error_reported.set(false);

        if let Some(stale) = self.inner.subscription.take() {
            self.inner.channel.unsubscribe(stale).await?;
        }

        let weak = Rc::downgrade(&self.inner);
        let sub = self
            .inner
            .channel
            .subscribe(
                Characteristic::Streaming,
                Box::new(move |data| {
                    if let Some(inner) = weak.upgrade() {
                        inner.receive(data);
                    }
                }),
            )
            .await?;
        self.inner.subscription.set(Some(sub));
        Ok(())
    }

    /// Unsubscribe and drop any partially received data.
    pub async fn close(&self) -> Result<(), C::Error> {
        if let Some(sub) = self.inner.subscription.take() {
            self.inner.channel.unsubscribe(sub).await?;
            self.inner.decoder.borrow_mut().reset();
        }
        Ok(())
    }

    /// Stop decoding; a report in flight is reported as finished.
    pub fn stop(&self) {
        self.inner.decoder.borrow_mut().stop();
        self.inner.publish_progress();
    }

    /// Feed one chunk as if it had arrived on the streaming characteristic.
    pub fn receive(&self, data: &[u8]) {
        self.inner.receive(data);
    }

    /// Publish a pending progress event, including a synthesized stall.
    pub fn poll_events(&self) {
        self.inner.publish_progress();
    }

    pub fn is_open(&self) -> bool {
        let sub = self.inner.subscription.get();
        sub.is_some()
    }

    pub fn reports_received(&self) -> u32 {
        self.inner.decoder.borrow().reports_received()
    }
}

impl<C: Channel, K: Clock> StreamInner<C, K> {
    fn receive(&self, data: &[u8]) {
        let result = self.decoder.borrow_mut().push_data(data);
        match result {
            Ok(reports) => {
                self.publish_progress();
                for report in reports {
                    self.route(report);
                }
            }
            // Already reported when the decoder broke.
            Err(DecodeError::Stopped) => {}
            Err(e) => {
                if let DecodeError::InsufficientSpace { .. } = e {
                    // Dropped bytes leave the stream unparseable.
                    self.decoder.borrow_mut().stop();
                }
                if !self.error_reported.replace(true) {
                    self.channel
                        .notify(AdapterEvent::UnrecoverableStreamingError(e));
                }
            }
        }
    }

    fn publish_progress(&self) {
        let event = self.decoder.borrow_mut().pop_last_event();
        if let Some(event) = event {
            self.channel.notify(AdapterEvent::from_progress(event));
        }
    }

    fn route(&self, report: Report) {
        match report {
            Report::Individual(r) => self.channel.notify(AdapterEvent::RawRealtimeReading(r)),
            Report::SignedList(r) => match r.validity() {
                Validity::Valid | Validity::Unknown => {
                    self.channel.notify(AdapterEvent::RawRobustReport(r));
                }
                Validity::Invalid => self.handle_invalid(r),
            },
        }
    }

    fn handle_invalid(&self, report: SignedListReport) {
        if self.repair_out_of_order {
            if let Some(fixed) = repair(&report) {
                self.channel.notify(AdapterEvent::RawRobustReport(fixed));
                return;
            }
        }

        warn!(
            "STREAM: dropping report {} from streamer {} with a bad signature",
            report.header().report_id,
            report.streamer()
        );
        let streamer = report.streamer();
        self.channel.notify(AdapterEvent::RobustReportInvalid {
            streamer,
            raw: report.into_raw_bytes(),
        });
    }
}

fn repair(report: &SignedListReport) -> Option<SignedListReport> {
    let mut fixer = ReportReassembler::new(report.raw_bytes().to_vec()).ok()?;
    if !fixer.fix_out_of_order_chunks() {
        return None;
    }

    let moves = fixer.transpositions().len();
    let raw = fixer.into_fixed_report()?;
    let fixed = SignedListReport::new(
        report.device_id(),
        report.streamer(),
        raw,
        report.received_time(),
    )
    .ok()?;

    info!(
        "STREAM: repaired report {} ({} packet move(s))",
        fixed.header().report_id,
        moves
    );
    (fixed.validity() == Validity::Valid).then_some(fixed)
}

// ── Tests ────────────────────────────────────────────────────
