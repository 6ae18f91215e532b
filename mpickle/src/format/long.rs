// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Minimal little-endian two's-complement integers, as used by `LONG1`/`LONG4`.
//!
//! Zero encodes to the empty sequence. Every other value uses the fewest bytes whose last byte
//! carries the correct sign bit, so `127` is `7f` but `128` is `80 00`.

use alloc::vec::Vec;
use num_bigint::BigInt;
use num_traits::Zero;

/// Encodes `value`.
#[must_use]
pub fn encode_long(value: &BigInt) -> Vec<u8> {
    if value.is_zero() {
        return Vec::new();
    }
    value.to_signed_bytes_le()
}

/// Decodes `bytes`; the empty sequence is zero.
#[must_use]
pub fn decode_long(bytes: &[u8]) -> BigInt {
    if bytes.is_empty() {
        return BigInt::zero();
    }
    BigInt::from_signed_bytes_le(bytes)
}

/// Appends the minimal encoding of `value` without going through [`BigInt`].
pub fn write_long_i64(out: &mut Vec<u8>, value: i64) {
    if value == 0 {
        return;
    }
    let bytes = value.to_le_bytes();
    let mut len = bytes.len();
    while len > 1 {
        let last = bytes[len - 1];
        let sign = bytes[len - 2] & 0x80;
        let redundant = (last == 0x00 && sign == 0) || (last == 0xff && sign != 0);
        if !redundant {
            break;
        }
        len -= 1;
    }
    out.extend_from_slice(&bytes[..len]);
}

/// Decodes `bytes` if the value fits an `i64`.
#[must_use]
pub fn read_long_i64(bytes: &[u8]) -> Option<i64> {
    if bytes.len() > 8 {
        return None;
    }
    let Some(&last) = bytes.last() else {
        return Some(0);
    };
    let fill = if last & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buf = [fill; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    Some(i64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTORS: &[(i64, &[u8])] = &[
        (0, &[]),
        (1, &[0x01]),
        (-1, &[0xff]),
        (127, &[0x7f]),
        (-127, &[0x81]),
        (128, &[0x80, 0x00]),
        (-128, &[0x80]),
        (255, &[0xff, 0x00]),
        (-255, &[0x01, 0xff]),
        (-256, &[0x00, 0xff]),
        (32767, &[0xff, 0x7f]),
        (-32768, &[0x00, 0x80]),
        (32768, &[0x00, 0x80, 0x00]),
    ];

    #[test]
    fn known_vectors() {
        for &(n, expected) in VECTORS {
            assert_eq!(encode_long(&BigInt::from(n)), expected, "encode {n}");
            let mut out = Vec::new();
            write_long_i64(&mut out, n);
            assert_eq!(out, expected, "write_long_i64 {n}");
            assert_eq!(decode_long(expected), BigInt::from(n), "decode {n}");
            assert_eq!(read_long_i64(expected), Some(n), "read_long_i64 {n}");
        }
    }

    #[test]
    fn extremes_match_bigint_path() {
        for n in [i64::MIN, i64::MAX, i64::MIN + 1, i64::MAX - 1] {
            let mut out = Vec::new();
            write_long_i64(&mut out, n);
            assert_eq!(out, encode_long(&BigInt::from(n)));
            assert_eq!(read_long_i64(&out), Some(n));
        }
    }

    #[test]
    fn wider_than_64_bits() {
        let big = BigInt::from(1_u8) << 100_u32;
        let bytes = encode_long(&big);
        assert_eq!(bytes.len(), 13);
        assert_eq!(decode_long(&bytes), big);
        assert_eq!(read_long_i64(&bytes), None);

        let neg = -(BigInt::from(u64::MAX)) * 3;
        assert_eq!(decode_long(&encode_long(&neg)), neg);
    }
}
