//! Report streaming: circular buffer, incremental decoder and the
//! interface that binds them to a channel.

pub mod interface;
pub mod parser;
pub mod ring_buffer;

pub use interface::StreamingInterface;
pub use parser::{ReceiveState, ReportDecoder};
pub use ring_buffer::RingBuffer;
