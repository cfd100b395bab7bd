//! Unified error types for the IOTile protocol core.
//!
//! Each subsystem owns a small error enum; every one of them converts into
//! the crate-wide [`Error`] so a session can funnel failures through a
//! single type.  Recoverable conditions (`BufferError::Underflow`,
//! device-reported RPC statuses) are kept distinct from the fatal ones
//! that stop a component until it is reset or reopened.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible public operation funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Struct pack/unpack failed.
    Pack(PackError),
    /// Circular buffer push/peek/pop failed.
    Buffer(BufferError),
    /// Streaming report decoder failed.
    Decode(DecodeError),
    /// A signed list report could not be constructed.
    Report(ReportError),
    /// An RPC failed, either on the device or in the pipeline.
    Rpc(RpcError),
    /// Two reports could not be merged.
    Merge(MergeError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pack(e) => write!(f, "pack: {e}"),
            Self::Buffer(e) => write!(f, "buffer: {e}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Report(e) => write!(f, "report: {e}"),
            Self::Rpc(e) => write!(f, "rpc: {e}"),
            Self::Merge(e) => write!(f, "merge: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Struct codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackError {
    /// The format string contains a character that is not a known code.
    UnknownCode(char),
    /// A repeat count or string width overflows or exceeds what the
    /// input could hold.
    BadCount,
    /// The byte slice is not exactly the size the format implies.
    SizeMismatch { expected: usize, actual: usize },
    /// The number of values does not match the number of fields.
    ValueCount { expected: usize, actual: usize },
    /// A value does not fit in its field.
    OutOfRange { index: usize },
    /// A byte-string value was given for an integer field or vice versa.
    WrongKind { index: usize },
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCode(c) => write!(f, "unknown format code '{c}'"),
            Self::BadCount => write!(f, "format count out of range"),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "expected {expected} bytes, got {actual}")
            }
            Self::ValueCount { expected, actual } => {
                write!(f, "expected {expected} values, got {actual}")
            }
            Self::OutOfRange { index } => write!(f, "value {index} out of range"),
            Self::WrongKind { index } => write!(f, "value {index} has the wrong kind"),
        }
    }
}

impl From<PackError> for Error {
    fn from(e: PackError) -> Self {
        Self::Pack(e)
    }
}

// ---------------------------------------------------------------------------
// Circular buffer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// Fewer bytes are stored than were requested.  Not fatal: supply more
    /// data and retry.
    Underflow { requested: usize, available: usize },
    /// The push does not fit and the buffer may not grow.
    InsufficientSpace { requested: usize, free: usize },
    /// The stored bytes did not unpack with the requested format.
    Pack(PackError),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Underflow {
                requested,
                available,
            } => write!(
                f,
                "buffer underflow: requested {requested} bytes, {available} available"
            ),
            Self::InsufficientSpace { requested, free } => write!(
                f,
                "insufficient space: pushing {requested} bytes, {free} free"
            ),
            Self::Pack(e) => write!(f, "{e}"),
        }
    }
}

impl From<PackError> for BufferError {
    fn from(e: PackError) -> Self {
        Self::Pack(e)
    }
}

impl From<BufferError> for Error {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

// ---------------------------------------------------------------------------
// Report decoder errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The decoder is broken or stopped; call `reset()` first.
    Stopped,
    /// The byte stream is malformed.  The decoder is now broken.
    UnrecoverableParse(String),
    /// The chunk does not fit in the decoder's buffer.
    InsufficientSpace { requested: usize, free: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "report decoder stopped after a previous error"),
            Self::UnrecoverableParse(msg) => write!(f, "unrecoverable parse error: {msg}"),
            Self::InsufficientSpace { requested, free } => write!(
                f,
                "insufficient space: pushing {requested} bytes, {free} free"
            ),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Report construction errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportError {
    /// Fewer bytes than a header plus footer.
    TooShort(usize),
    /// The header's declared length disagrees with the byte count.
    LengthMismatch { declared: usize, actual: usize },
    /// The reading section is not a whole number of 16-byte records.
    Misaligned(usize),
    /// Wrong format discriminant for the record kind.
    WrongFormat(u8),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort(n) => write!(f, "report of {n} bytes is too short"),
            Self::LengthMismatch { declared, actual } => {
                write!(f, "header declares {declared} bytes, got {actual}")
            }
            Self::Misaligned(n) => write!(f, "reading section of {n} bytes is misaligned"),
            Self::WrongFormat(fmt) => write!(f, "unexpected report format {fmt}"),
        }
    }
}

impl From<ReportError> for Error {
    fn from(e: ReportError) -> Self {
        Self::Report(e)
    }
}

// ---------------------------------------------------------------------------
// RPC errors
// ---------------------------------------------------------------------------

/// Why an RPC failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    /// The device executed the RPC and returned a non-success status byte.
    Status(u8),
    /// No response header arrived before the watchdog fired.
    UnexpectedTimeout,
    /// Writing the header or payload to the transport failed.
    WriteFailure,
    /// A response notification was shorter than required.
    IncorrectLength,
    /// A response notification arrived when none was expected.
    ResponseAtInvalidTime,
    /// The pipeline is stopped after a previous fatal error.
    StoppedFromPreviousErrors,
    /// The command payload does not fit in one payload write.
    PayloadTooLarge(usize),
}

impl RpcErrorKind {
    /// Fatal kinds stop the whole pipeline, not just the failing call.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::UnexpectedTimeout
                | Self::WriteFailure
                | Self::IncorrectLength
                | Self::ResponseAtInvalidTime
        )
    }
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "device status 0x{code:02x}"),
            Self::UnexpectedTimeout => write!(f, "unexpected RPC timeout"),
            Self::WriteFailure => write!(f, "error writing RPC"),
            Self::IncorrectLength => write!(f, "incorrect response length"),
            Self::ResponseAtInvalidTime => write!(f, "response received at invalid time"),
            Self::StoppedFromPreviousErrors => write!(f, "stopped from previous errors"),
            Self::PayloadTooLarge(n) => write!(f, "payload of {n} bytes is too large"),
        }
    }
}

/// An RPC failure, tagged with the tile address and RPC id it concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcError {
    pub address: u8,
    pub rpc_id: u16,
    pub kind: RpcErrorKind,
}

impl RpcError {
    pub const fn new(address: u8, rpc_id: u16, kind: RpcErrorKind) -> Self {
        Self {
            address,
            rpc_id,
            kind,
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RPC 0x{:04x} on tile {} failed: {}",
            self.rpc_id, self.address, self.kind
        )
    }
}

impl From<RpcError> for Error {
    fn from(e: RpcError) -> Self {
        Self::Rpc(e)
    }
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeError {
    /// A pre-condition on the input reports does not hold.
    InvalidArgument(&'static str),
    /// Internal bookkeeping went wrong; no report was produced.
    Inconsistent(&'static str),
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Inconsistent(msg) => write!(f, "internal inconsistency: {msg}"),
        }
    }
}

impl From<MergeError> for Error {
    fn from(e: MergeError) -> Self {
        Self::Merge(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
