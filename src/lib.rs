//! IOTile BLE protocol core.
//!
//! Host-side machinery for talking to IOTile devices over a
//! notification-based link: report stream decoding, single-outstanding
//! RPCs, and merging/re-signing of signed list reports.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                           Session                              │
//! │                                                                │
//! │  Streaming notifications ──▶ StreamingInterface                │
//! │                                ReportDecoder ◀── RingBuffer    │
//! │                                   │                            │
//! │                                   ▼                            │
//! │                        Report::{Individual, SignedList}        │
//! │                                   │                            │
//! │                                   ▼                            │
//! │                         ReportMerger (user + system)           │
//! │                                                                │
//! │  invoke() ──▶ RpcPipeline ──▶ header/payload characteristics   │
//! └────────────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod config;
pub mod error;
pub mod events;
pub mod pack;
pub mod reports;
pub mod rpc;
pub mod session;
pub mod signature;
pub mod stream;

pub use config::StackConfig;
pub use error::{Error, Result};
pub use events::{AdapterEvent, EventSink, ReportParserEvent};
pub use reports::{IndividualReport, Reading, Report, ReportMerger, SignedListReport};
pub use rpc::{Channel, Characteristic, RpcPipeline};
pub use session::Session;
pub use stream::{ReportDecoder, RingBuffer, StreamingInterface};
