//! Little-endian struct packing driven by format strings.
//!
//! Format codes (all little-endian, no padding):
//!
//! | Code | Width | Meaning                 |
//! |------|-------|-------------------------|
//! | `B`  | 1     | unsigned byte           |
//! | `b`  | 1     | signed byte             |
//! | `H`  | 2     | unsigned 16-bit         |
//! | `h`  | 2     | signed 16-bit           |
//! | `L`  | 4     | unsigned 32-bit         |
//! | `l`  | 4     | signed 32-bit           |
//! | `Ns` | N     | fixed N-byte string     |
//!
//! A leading `<` is accepted and ignored.  A decimal count before an
//! integer code repeats it (`4B` == `BBBB`); before `s` it is the string
//! width.

use crate::error::PackError;

/// One unpacked field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Int(i64),
    Bytes(Vec<u8>),
}

impl Field {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bytes(_) => None,
        }
    }
}

impl From<i64> for Field {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Code {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    Str(usize),
}

impl Code {
    const fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 => 4,
            Self::Str(n) => n,
        }
    }

    const fn range(self) -> (i64, i64) {
        match self {
            Self::U8 => (0, u8::MAX as i64),
            Self::I8 => (i8::MIN as i64, i8::MAX as i64),
            Self::U16 => (0, u16::MAX as i64),
            Self::I16 => (i16::MIN as i64, i16::MAX as i64),
            Self::U32 => (0, u32::MAX as i64),
            Self::I32 => (i32::MIN as i64, i32::MAX as i64),
            Self::Str(_) => (0, 0),
        }
    }
}

/// Largest count accepted when no input bounds it.
const MAX_COUNT: usize = 1 << 16;

/// Parse `fmt`, rejecting any count larger than `limit`.
fn parse(fmt: &str, limit: usize) -> Result<Vec<Code>, PackError> {
    let mut codes = Vec::new();
    let mut count: Option<usize> = None;

    for (i, c) in fmt.chars().enumerate() {
        if i == 0 && c == '<' {
            continue;
        }

        if let Some(d) = c.to_digit(10) {
            let next = count
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|n| n.checked_add(d as usize))
                .filter(|&n| n <= limit)
                .ok_or(PackError::BadCount)?;
            count = Some(next);
            continue;
        }

        let code = match c {
            'B' => Code::U8,
            'b' => Code::I8,
            'H' => Code::U16,
            'h' => Code::I16,
            'L' => Code::U32,
            'l' => Code::I32,
            's' => {
                codes.push(Code::Str(count.take().unwrap_or(1)));
                continue;
            }
            other => return Err(PackError::UnknownCode(other)),
        };

        for _ in 0..count.take().unwrap_or(1) {
            codes.push(code);
        }
    }

    Ok(codes)
}

/// Total number of bytes described by `fmt`.
pub fn expected_size(fmt: &str) -> Result<usize, PackError> {
    Ok(parse(fmt, MAX_COUNT)?.iter().map(|c| c.width()).sum())
}

/// Unpack `data` into fields.  `data` must be exactly `expected_size(fmt)`
/// bytes long.
pub fn unpack(fmt: &str, data: &[u8]) -> Result<Vec<Field>, PackError> {
    // No field can repeat more often than there are bytes to fill it.
    let codes = parse(fmt, data.len())?;
    let expected: usize = codes.iter().map(|c| c.width()).sum();
    if data.len() != expected {
        return Err(PackError::SizeMismatch {
            expected,
            actual: data.len(),
        });
    }

    let mut fields = Vec::with_capacity(codes.len());
    let mut offset = 0;
    for code in codes {
        let raw = &data[offset..offset + code.width()];
        let field = match code {
            Code::U8 => Field::Int(raw[0] as i64),
            Code::I8 => Field::Int(raw[0] as i8 as i64),
            Code::U16 => Field::Int(u16::from_le_bytes([raw[0], raw[1]]) as i64),
            Code::I16 => Field::Int(i16::from_le_bytes([raw[0], raw[1]]) as i64),
            Code::U32 => Field::Int(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64),
            Code::I32 => Field::Int(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64),
            Code::Str(_) => Field::Bytes(raw.to_vec()),
        };
        fields.push(field);
        offset += code.width();
    }

    Ok(fields)
}

/// Unpack a format made only of integer codes.
pub fn unpack_ints(fmt: &str, data: &[u8]) -> Result<Vec<i64>, PackError> {
    unpack(fmt, data)?
        .into_iter()
        .enumerate()
        .map(|(index, f)| f.as_int().ok_or(PackError::WrongKind { index }))
        .collect()
}

/// Pack `values` according to `fmt`.  Byte strings shorter than their
/// field are zero padded; longer ones are rejected.
pub fn pack(fmt: &str, values: &[Field]) -> Result<Vec<u8>, PackError> {
    let codes = parse(fmt, MAX_COUNT)?;
    if codes.len() != values.len() {
        return Err(PackError::ValueCount {
            expected: codes.len(),
            actual: values.len(),
        });
    }

    let mut out = Vec::with_capacity(codes.iter().map(|c| c.width()).sum());
    for (index, (code, value)) in codes.iter().zip(values).enumerate() {
        match (code, value) {
            (Code::Str(width), Field::Bytes(bytes)) => {
                if bytes.len() > *width {
                    return Err(PackError::OutOfRange { index });
                }
                out.extend_from_slice(bytes);
                out.resize(out.len() + (width - bytes.len()), 0);
            }
            (Code::Str(_), Field::Int(_)) | (_, Field::Bytes(_)) => {
                return Err(PackError::WrongKind { index });
            }
            (code, Field::Int(v)) => {
                let (lo, hi) = code.range();
                if *v < lo || *v > hi {
                    return Err(PackError::OutOfRange { index });
                }
                let bytes = (*v as u32).to_le_bytes();
                out.extend_from_slice(&bytes[..code.width()]);
            }
        }
    }

    Ok(out)
}

/// Pack a format made only of integer codes.
pub fn pack_ints(fmt: &str, values: &[i64]) -> Result<Vec<u8>, PackError> {
    let fields: Vec<Field> = values.iter().copied().map(Field::Int).collect();
    pack(fmt, &fields)
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(expected_size("BBHLLLL").unwrap(), 20);
        assert_eq!(expected_size("BBHLLLBBH").unwrap(), 20);
        assert_eq!(expected_size("<HHLLL").unwrap(), 16);
        assert_eq!(expected_size("4B").unwrap(), 4);
        assert_eq!(expected_size("B6s").unwrap(), 7);
        assert_eq!(expected_size("").unwrap(), 0);
    }

    #[test]
    fn unknown_code_rejected() {
        assert_eq!(expected_size("BQ"), Err(PackError::UnknownCode('Q')));
    }

    #[test]
    fn little_endian_layout() {
        let bytes = pack_ints("BBHB", &[3, 0, 0x1234, 8]).unwrap();
        assert_eq!(bytes, vec![3, 0, 0x34, 0x12, 8]);

        let vals = unpack_ints("BBHB", &bytes).unwrap();
        assert_eq!(vals, vec![3, 0, 0x1234, 8]);
    }

    #[test]
    fn signed_codes() {
        let bytes = pack_ints("bhl", &[-1, -2, -3]).unwrap();
        assert_eq!(bytes, vec![0xFF, 0xFE, 0xFF, 0xFD, 0xFF, 0xFF, 0xFF]);
        assert_eq!(unpack_ints("bhl", &bytes).unwrap(), vec![-1, -2, -3]);

        // The same bytes read unsigned.
        assert_eq!(unpack_ints("L", &[0xFF; 4]).unwrap(), vec![0xFFFF_FFFF]);
        assert_eq!(unpack_ints("l", &[0xFF; 4]).unwrap(), vec![-1]);
    }

    #[test]
    fn strings_are_padded() {
        let bytes = pack("B4s", &[Field::Int(1), Field::Bytes(b"ab".to_vec())]).unwrap();
        assert_eq!(bytes, vec![1, b'a', b'b', 0, 0]);

        let fields = unpack("B4s", &bytes).unwrap();
        assert_eq!(fields[1], Field::Bytes(vec![b'a', b'b', 0, 0]));
        assert_eq!(unpack_ints("B4s", &bytes), Err(PackError::WrongKind { index: 1 }));
    }

    #[test]
    fn oversized_counts_are_rejected() {
        assert_eq!(
            expected_size("99999999999999999999999B"),
            Err(PackError::BadCount)
        );
        assert_eq!(expected_size("1000000000B"), Err(PackError::BadCount));
        assert_eq!(unpack("5B", &[0; 4]), Err(PackError::BadCount));
        assert_eq!(unpack_ints("4B", &[1, 2, 3, 4]).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn range_and_count_checks() {
        assert_eq!(pack_ints("B", &[256]), Err(PackError::OutOfRange { index: 0 }));
        assert_eq!(pack_ints("H", &[-1]), Err(PackError::OutOfRange { index: 0 }));
        assert_eq!(
            pack_ints("BB", &[1]),
            Err(PackError::ValueCount {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            unpack("L", &[0, 0]),
            Err(PackError::SizeMismatch {
                expected: 4,
                actual: 2
            })
        );
    }
}
