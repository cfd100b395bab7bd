//! iotile-dump — replay a captured report stream.
//!
//! Feeds the raw bytes of a streaming-characteristic capture through a
//! [`Session`] in fixed-size notifications (20 bytes by default, the BLE
//! notification size) and logs every event the core publishes.
//!
//! ```text
//! iotile-dump <capture.bin> [chunk-size]
//! IOTILE_CONFIG=stack.json RUST_LOG=info iotile-dump capture.bin
//! IOTILE_CONFIG=stack.postcard iotile-dump capture.bin
//! ```
#![deny(unused_must_use)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::env;
use std::fs;

use anyhow::{Context, Result, bail};
use log::{info, warn};

use iotile_ble::adapters::log_sink::LogEventSink;
use iotile_ble::events::{AdapterEvent, EventSink};
use iotile_ble::rpc::{Channel, Characteristic, NotificationHandler, Subscription};
use iotile_ble::{Session, StackConfig};

/// BLE notification payload size.
const DEFAULT_CHUNK: usize = 20;

// ── Replay channel ────────────────────────────────────────────
//
// Stands in for a device link: writes go nowhere, notifications come
// from the capture file, and published events go to the log sink.

#[derive(Default)]
struct ReplayChannel {
    handlers: RefCell<HashMap<Characteristic, (u32, NotificationHandler)>>,
    next_id: RefCell<u32>,
    sink: RefCell<LogEventSink>,
}

impl ReplayChannel {
    fn deliver(&self, characteristic: Characteristic, data: &[u8]) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        match handlers.get_mut(&characteristic) {
            Some((_, handler)) => {
                handler(data);
                true
            }
            None => false,
        }
    }
}

impl Channel for ReplayChannel {
    type Error = &'static str;

    async fn write(&self, characteristic: Characteristic, data: &[u8]) -> Result<(), Self::Error> {
        warn!(
            "REPLAY: dropping {} byte write to {:?}",
            data.len(),
            characteristic
        );
        Ok(())
    }

    async fn subscribe(
        &self,
        characteristic: Characteristic,
        handler: NotificationHandler,
    ) -> Result<Subscription, Self::Error> {
        let mut next = self.next_id.borrow_mut();
        *next += 1;
        self.handlers
            .borrow_mut()
            .insert(characteristic, (*next, handler));
        Ok(Subscription {
            characteristic,
            id: *next,
        })
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), Self::Error> {
        let mut handlers = self.handlers.borrow_mut();
        match handlers.get(&subscription.characteristic) {
            Some((id, _)) if *id == subscription.id => {
                handlers.remove(&subscription.characteristic);
                Ok(())
            }
            _ => Err("unknown subscription"),
        }
    }

    fn notify(&self, event: AdapterEvent) {
        self.sink.borrow_mut().emit(&event);
    }
}

// ── Entry point ───────────────────────────────────────────────

fn load_config() -> Result<StackConfig> {
    match env::var("IOTILE_CONFIG") {
        Ok(path) if path.ends_with(".postcard") => {
            let bytes = fs::read(&path).with_context(|| format!("reading config {path}"))?;
            StackConfig::from_postcard(&bytes).with_context(|| format!("parsing config {path}"))
        }
        Ok(path) => {
            let text =
                fs::read_to_string(&path).with_context(|| format!("reading config {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {path}"))
        }
        Err(_) => Ok(StackConfig::default()),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: iotile-dump <capture.bin> [chunk-size]");
    };
    let chunk = match args.next() {
        Some(n) => n
            .parse::<usize>()
            .with_context(|| format!("invalid chunk size {n:?}"))?,
        None => DEFAULT_CHUNK,
    };
    if chunk == 0 {
        bail!("chunk size must be non-zero");
    }

    let capture = fs::read(&path).with_context(|| format!("reading capture {path}"))?;
    let config = load_config()?;
    let session = Session::new(ReplayChannel::default(), &config)?;

    session
        .open()
        .map_err(anyhow::Error::msg)
        .context("opening replay session")?;

    info!(
        "REPLAY: {} bytes from {} in {}-byte notifications",
        capture.len(),
        path,
        chunk
    );
    for piece in capture.chunks(chunk) {
        if !session.channel().deliver(Characteristic::Streaming, piece) {
            bail!("streaming characteristic is not subscribed");
        }
    }
    session.stop_streaming();

    session
        .close()
        .map_err(anyhow::Error::msg)
        .context("closing replay session")?;

    info!(
        "REPLAY: {} signed report(s), {} reading(s)",
        session.streaming().reports_received(),
        session.channel().sink.borrow().readings()
    );
    Ok(())
}
