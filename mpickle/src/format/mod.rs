// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire-format constants, framing and the variable-length integer codec.

pub mod frame;
pub mod long;

use crate::error::PickleError;

/// Highest protocol this crate reads and writes.
pub const HIGHEST_PROTOCOL: u8 = 5;

/// Protocol used when none is requested.
pub const DEFAULT_PROTOCOL: u8 = 4;

/// Version of the written format.
pub const FORMAT_VERSION: &str = "4.0";

/// Older format versions this crate can read.
pub const COMPATIBLE_FORMATS: &[&str] = &["1.0", "1.1", "1.2", "1.3", "2.0", "3.0", "4.0", "5.0"];

/// Frames shorter than this are written without a header.
pub const FRAME_SIZE_MIN: usize = 4;

/// A frame is committed once its payload reaches this size.
pub const FRAME_SIZE_TARGET: usize = 64 * 1024;

/// Opcode byte plus the 8-byte little-endian payload length.
pub const FRAME_HEADER_LEN: usize = 9;

/// Validates a caller-requested protocol, defaulting to [`DEFAULT_PROTOCOL`].
pub fn check_protocol(protocol: Option<i32>) -> Result<u8, PickleError> {
    match protocol {
        None => Ok(DEFAULT_PROTOCOL),
        Some(p) => match u8::try_from(p) {
            Ok(p) if p <= HIGHEST_PROTOCOL => Ok(p),
            _ => Err(PickleError::InvalidProtocol { protocol: p }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_range() {
        assert_eq!(check_protocol(None), Ok(DEFAULT_PROTOCOL));
        for p in 0..=5 {
            assert_eq!(check_protocol(Some(p)), Ok(p as u8));
        }
        assert_eq!(
            check_protocol(Some(6)),
            Err(PickleError::InvalidProtocol { protocol: 6 })
        );
        assert_eq!(
            check_protocol(Some(-1)),
            Err(PickleError::InvalidProtocol { protocol: -1 })
        );
    }

    #[test]
    fn format_version_is_in_compatible_list() {
        assert!(COMPATIBLE_FORMATS.contains(&FORMAT_VERSION));
        for v in COMPATIBLE_FORMATS {
            let (major, minor) = v.split_once('.').unwrap();
            assert!(major.parse::<u32>().is_ok());
            assert!(minor.parse::<u32>().is_ok());
        }
    }
}
