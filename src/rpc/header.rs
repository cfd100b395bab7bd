//! RPC command and response headers.
//!
//! ```text
//!  command  (host → device, "BBHB"):
//!  ┌────────────┬──────────┬───────────────┬─────────┐
//!  │ payloadLen │ reserved │ rpc id (LE)   │ address │
//!  │ u8         │ u8       │ u16           │ u8      │
//!  └────────────┴──────────┴───────────────┴─────────┘
//!
//!  response (device → host, first 4 bytes used):
//!  ┌──────────────────────────┬──────────┬──────────┬────────────┐
//!  │ status                   │ reserved │ reserved │ payloadLen │
//!  │ b7 has-data b6 app b5..0 │          │          │ u8         │
//!  └──────────────────────────┴──────────┴──────────┴────────────┘
//! ```

use crate::error::RpcErrorKind;

/// Largest payload that fits in one payload characteristic write.
pub const MAX_RPC_PAYLOAD: usize = 20;
pub const COMMAND_HEADER_LEN: usize = 5;
pub const RESPONSE_HEADER_LEN: usize = 4;

const STATUS_CODE_MASK: u8 = 0x3F;
const STATUS_APP_DEFINED: u8 = 1 << 6;
const STATUS_HAS_DATA: u8 = 1 << 7;

/// Encode the command header for a call with `payload_len` payload bytes.
pub fn encode_command(address: u8, rpc_id: u16, payload_len: u8) -> [u8; COMMAND_HEADER_LEN] {
    let id = rpc_id.to_le_bytes();
    [payload_len, 0, id[0], id[1], address]
}

/// Decoded response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: u8,
    pub payload_len: u8,
}

impl ResponseHeader {
    pub fn parse(data: &[u8]) -> Result<Self, RpcErrorKind> {
        if data.len() < RESPONSE_HEADER_LEN {
            return Err(RpcErrorKind::IncorrectLength);
        }
        Ok(Self {
            status: data[0],
            payload_len: data[3],
        })
    }

    pub const fn code(&self) -> u8 {
        self.status & STATUS_CODE_MASK
    }

    pub const fn app_defined(&self) -> bool {
        self.status & STATUS_APP_DEFINED != 0
    }

    pub const fn has_data(&self) -> bool {
        self.status & STATUS_HAS_DATA != 0
    }

    /// The call succeeded on the device.
    pub const fn is_success(&self) -> bool {
        self.app_defined() && self.code() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack;

    #[test]
    fn command_layout_matches_pack_format() {
        let header = encode_command(8, 0x1234, 3);
        assert_eq!(
            pack::unpack_ints("BBHB", &header).unwrap(),
            vec![3, 0, 0x1234, 8]
        );
    }

    #[test]
    fn response_flags() {
        let h = ResponseHeader::parse(&[0xC0, 0, 0, 6]).unwrap();
        assert!(h.is_success());
        assert!(h.has_data());
        assert_eq!(h.payload_len, 6);

        let h = ResponseHeader::parse(&[0x40, 0, 0, 0]).unwrap();
        assert!(h.is_success());
        assert!(!h.has_data());

        // Not app-defined: the device did not run the handler.
        let h = ResponseHeader::parse(&[0x02, 0, 0, 0]).unwrap();
        assert!(!h.is_success());
        assert_eq!(h.code(), 2);

        let h = ResponseHeader::parse(&[0x41, 0, 0, 0]).unwrap();
        assert!(!h.is_success());
    }

    #[test]
    fn short_response_header() {
        assert_eq!(
            ResponseHeader::parse(&[0xC0, 0, 0]),
            Err(RpcErrorKind::IncorrectLength)
        );
    }
}
