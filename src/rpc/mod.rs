//! Transport-agnostic RPC subsystem.
//!
//! Request/response RPCs over a two-phase notification link.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      RPC Stack                             │
//! │                                                            │
//! │  invoke() ──▶ ┌──────────┐  header/payload  ┌───────────┐  │
//! │               │ Pipeline │─────────────────▶│  Channel  │  │
//! │  result  ◀─── │ (queue)  │◀─────────────────│  (trait)  │  │
//! │               └──────────┘  notifications   └───────────┘  │
//! │                    │                                       │
//! │                    └── fatal error ──▶ Channel::notify     │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod header;
pub mod pipeline;
pub mod transport;

pub use pipeline::RpcPipeline;
pub use transport::{Channel, Characteristic, NotificationHandler, Subscription};
