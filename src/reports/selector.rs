//! Stream ids and the selectors that filter them.
//!
//! Both share the same 16-bit encoding:
//!
//! ```text
//!  15      14..12     11       10..0
//! ┌──────┬──────────┬────────┬─────────────┐
//! │breaks│   type   │ system │    code     │
//! └──────┴──────────┴────────┴─────────────┘
//! ```

/// Kind of stream encoded in bits 12..14.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Storage,
    Unbuffered,
    Constant,
    Input,
    Count,
    Output,
    Realtime,
    Reserved,
}

impl StreamType {
    const fn from_bits(bits: u16) -> Self {
        match bits & 0b111 {
            0 => Self::Storage,
            1 => Self::Unbuffered,
            2 => Self::Constant,
            3 => Self::Input,
            4 => Self::Count,
            5 => Self::Output,
            6 => Self::Realtime,
            _ => Self::Reserved,
        }
    }
}

/// Which streams a selector admits, from the system and breaks bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOperator {
    UserOnly,
    SystemOnly,
    UserAndBreaks,
    UserAndSystem,
}

/// A decoded 16-bit selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSelector {
    pub stream_type: StreamType,
    pub code: u16,
    pub match_op: MatchOperator,
}

impl StreamSelector {
    /// Code that matches every stream of the selected type.
    pub const WILDCARD: u16 = (1 << 11) - 1;
    /// Global reboot stream, admitted by `UserAndBreaks` selectors.
    pub const REBOOT_STREAM: u16 = 0x5C00;

    pub const fn decode(encoded: u16) -> Self {
        let is_system = encoded & (1 << 11) != 0;
        let include_breaks = encoded & (1 << 15) != 0;
        let match_op = match (is_system, include_breaks) {
            (true, false) => MatchOperator::SystemOnly,
            (false, false) => MatchOperator::UserOnly,
            (true, true) => MatchOperator::UserAndSystem,
            (false, true) => MatchOperator::UserAndBreaks,
        };

        Self {
            stream_type: StreamType::from_bits(encoded >> 12),
            code: encoded & Self::WILDCARD,
            match_op,
        }
    }

    pub const fn is_wildcard(&self) -> bool {
        self.code == Self::WILDCARD
    }

    /// Whether the stream `stream_id` is selected.
    pub fn matches(&self, stream_id: u16) -> bool {
        let stream = Self::decode(stream_id);

        // Stream ids are plain user or system ids, never combined selectors.
        if matches!(
            stream.match_op,
            MatchOperator::UserAndSystem | MatchOperator::UserAndBreaks
        ) {
            return false;
        }

        if !self.is_wildcard() && self.code != stream.code {
            return false;
        }

        if self.stream_type != stream.stream_type {
            return false;
        }

        match (self.match_op, stream.match_op) {
            (MatchOperator::SystemOnly, MatchOperator::UserOnly)
            | (MatchOperator::UserOnly, MatchOperator::SystemOnly) => false,
            (MatchOperator::UserAndBreaks, MatchOperator::SystemOnly) => {
                stream_id == Self::REBOOT_STREAM
            }
            _ => true,
        }
    }
}

/// Selector of a report holding every user output stream.
pub const USER_OUTPUTS: u16 = (5 << 12) | StreamSelector::WILDCARD;
/// Selector of a report holding every system output stream.
pub const SYSTEM_OUTPUTS: u16 = (5 << 12) | StreamSelector::WILDCARD | (1 << 11);
/// Selector of a merged user + system report.
pub const COMBINED_OUTPUTS: u16 = (5 << 12) | StreamSelector::WILDCARD | (1 << 15);
