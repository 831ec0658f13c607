//! Additive 8-bit checksums used by binary frame protocols

use crate::error::{LinkError, Result};

/// Sum of all bytes, wrapping at 256
pub fn sum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Verify that the last byte of `frame` is the `sum8` of the bytes before it
pub fn verify_sum8(frame: &[u8]) -> Result<()> {
    let Some((&actual, body)) = frame.split_last() else {
        return Err(LinkError::Communication("Empty frame".to_string()));
    };
    let expected = sum8(body);
    if expected != actual {
        return Err(LinkError::Checksum { expected, actual });
    }
    Ok(())
}
