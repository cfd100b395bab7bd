//! A single timestamped sensor reading.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How the raw 32-bit value of a reading should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// `<L`: unsigned 32-bit (the wire default).
    Unsigned,
    /// `<l`: two's-complement signed 32-bit.
    Signed,
}

impl ValueFormat {
    /// Parse a raw value format code such as `<l`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "<L" | "L" => Some(Self::Unsigned),
            "<l" | "l" => Some(Self::Signed),
            _ => None,
        }
    }
}

/// One reading.  Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    stream: u16,
    value: u32,
    timestamp: u32,
    time: SystemTime,
    id: u32,
}

impl Reading {
    /// Build a reading whose absolute time is `reference + timestamp` seconds.
    ///
    /// `id == 0` means the device assigned no unique id (realtime data).
    pub fn new(stream: u16, value: u32, timestamp: u32, reference: SystemTime, id: u32) -> Self {
        Self {
            stream,
            value,
            timestamp,
            time: reference + Duration::from_secs(u64::from(timestamp)),
            id,
        }
    }

    pub fn stream(&self) -> u16 {
        self.stream
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// Device-relative timestamp in seconds.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Absolute time derived from the reference time of the report.
    pub fn time(&self) -> SystemTime {
        self.time
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Stream id as a 4-digit hex variable name, e.g. `5001`.
    pub fn variable(&self) -> String {
        format!("{:04x}", self.stream)
    }

    pub fn value_as(&self, format: ValueFormat) -> i64 {
        match format {
            ValueFormat::Unsigned => i64::from(self.value),
            ValueFormat::Signed => i64::from(self.value as i32),
        }
    }

    /// Copy of this reading re-anchored to a different reference time.
    pub fn rebased(&self, reference: SystemTime) -> Self {
        Self::new(self.stream, self.value, self.timestamp, reference, self.id)
    }
}

/// `now - sent_secs`, clamped at the Unix epoch.
///
/// A device reports how long it had been running when it sent a record;
/// subtracting that from the receive time anchors device-relative
/// timestamps to wall-clock time.
pub fn reference_time(now: SystemTime, sent_secs: u32) -> SystemTime {
    now.checked_sub(Duration::from_secs(u64::from(sent_secs)))
        .unwrap_or(UNIX_EPOCH)
        .max(UNIX_EPOCH)
}
