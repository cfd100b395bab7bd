//! Report hash signatures.
//!
//! Hash-only reports carry the first 16 bytes of SHA-256 over every byte
//! that precedes the signature field.

use hmac_sha256::Hash;

/// Width of the signature field at the end of a signed list report.
pub const SIGNATURE_LEN: usize = 16;

/// Compute the 16-byte signature of `data`.
pub fn calculate(data: &[u8]) -> [u8; SIGNATURE_LEN] {
    let digest = Hash::hash(data);
    let mut sig = [0u8; SIGNATURE_LEN];
    sig.copy_from_slice(&digest[..SIGNATURE_LEN]);
    sig
}

/// Compare an embedded signature against a computed one.
///
/// Only the common prefix is compared, so callers may check a truncated
/// signature.  An empty prefix never matches.  The comparison does not
/// short-circuit.
pub fn compare(expected: &[u8], actual: &[u8]) -> bool {
    let len = expected.len().min(actual.len());
    if len == 0 {
        return false;
    }

    let diff = expected[..len]
        .iter()
        .zip(&actual[..len])
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    diff == 0
}

/// Check the trailing signature of a complete record.
pub fn verify_trailing(record: &[u8]) -> bool {
    if record.len() < SIGNATURE_LEN {
        return false;
    }
    let (signed, embedded) = record.split_at(record.len() - SIGNATURE_LEN);
    compare(embedded, &calculate(signed))
}
