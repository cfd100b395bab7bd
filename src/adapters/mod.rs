//! Adapters — concrete implementations of the core's port traits.
//!
//! | Adapter    | Implements | Connects to                 |
//! |------------|------------|-----------------------------|
//! | `log_sink` | EventSink  | `log` facade                |
//! | `time`     | Clock      | system clock / manual clock |

pub mod log_sink;
pub mod time;
