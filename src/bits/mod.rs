//! Conversions between byte buffers, fixed-width unsigned integers and bit strings.
//!
//! A bit string is a `[bool]` slice; every conversion is most-significant-bit first.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitsError {
    #[error("bit string of length {0} is not a multiple of 8")]
    MalformedLength(usize),
    #[error("value {value} does not fit in {width} bits")]
    ValueOutOfRange { value: u64, width: usize },
}

/// Expand every byte into exactly 8 bits, MSB first.
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<bool> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    push_bytes(&mut bits, bytes);
    bits
}

/// Append the bits of `bytes` to an existing bit string.
pub fn push_bytes(bits: &mut Vec<bool>, bytes: &[u8]) {
    for &byte in bytes {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1 == 1);
        }
    }
}

/// Pack a bit string into bytes. Fails unless the length is a multiple of 8.
pub fn bits_to_bytes_strict(bits: &[bool]) -> Result<Vec<u8>, BitsError> {
    if bits.len() % 8 != 0 {
        return Err(BitsError::MalformedLength(bits.len()));
    }
    Ok(pack(bits))
}

/// Pack a bit string into bytes, dropping any trailing incomplete byte.
pub fn bits_to_bytes_lenient(bits: &[bool]) -> Vec<u8> {
    pack(&bits[..bits.len() - bits.len() % 8])
}

fn pack(bits: &[bool]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|octet| octet.iter().fold(0u8, |acc, &b| (acc << 1) | b as u8))
        .collect()
}

/// Encode `value` as a big-endian bit string of exactly `width` bits.
pub fn uint_to_bits(value: u64, width: usize) -> Result<Vec<bool>, BitsError> {
    let mut bits = Vec::with_capacity(width);
    push_uint(&mut bits, value, width)?;
    Ok(bits)
}

/// Append `value` as `width` big-endian bits.
pub fn push_uint(bits: &mut Vec<bool>, value: u64, width: usize) -> Result<(), BitsError> {
    if width > 64 || (width < 64 && value >> width != 0) {
        return Err(BitsError::ValueOutOfRange { value, width });
    }
    for shift in (0..width).rev() {
        bits.push((value >> shift) & 1 == 1);
    }
    Ok(())
}

/// Decode a big-endian bit string (at most 64 bits) into an unsigned integer.
pub fn bits_to_uint(bits: &[bool]) -> Result<u64, BitsError> {
    if bits.len() > 64 {
        return Err(BitsError::ValueOutOfRange {
            value: u64::MAX,
            width: bits.len(),
        });
    }
    Ok(bits.iter().fold(0u64, |acc, &b| (acc << 1) | b as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_bits_msb_first() {
        let bits = bytes_to_bits(&[0b1010_0001]);
        assert_eq!(
            bits,
            vec![true, false, true, false, false, false, false, true]
        );
    }

    #[test]
    fn test_bits_roundtrip() {
        let data: Vec<u8> = (0..=255).collect();
        let bits = bytes_to_bits(&data);
        assert_eq!(bits.len(), data.len() * 8);
        assert_eq!(bits_to_bytes_strict(&bits).unwrap(), data);
    }

    #[test]
    fn test_strict_rejects_partial_byte() {
        let mut bits = bytes_to_bits(&[0xFF, 0x00]);
        bits.push(true);
        assert_eq!(
            bits_to_bytes_strict(&bits),
            Err(BitsError::MalformedLength(17))
        );
    }

    #[test]
    fn test_lenient_truncates_partial_byte() {
        let mut bits = bytes_to_bits(&[0xAB]);
        bits.extend_from_slice(&[true, true, false]);
        assert_eq!(bits_to_bytes_lenient(&bits), vec![0xAB]);
        assert!(bits_to_bytes_lenient(&[true, false]).is_empty());
    }

    #[test]
    fn test_uint_fixed_width() {
        let bits = uint_to_bits(5, 8).unwrap();
        assert_eq!(
            bits,
            vec![false, false, false, false, false, true, false, true]
        );
        assert_eq!(bits_to_uint(&bits).unwrap(), 5);

        let wide = uint_to_bits(640, 16).unwrap();
        assert_eq!(wide.len(), 16);
        assert_eq!(bits_to_uint(&wide).unwrap(), 640);
    }

    #[test]
    fn test_uint_out_of_range() {
        assert_eq!(
            uint_to_bits(256, 8),
            Err(BitsError::ValueOutOfRange { value: 256, width: 8 })
        );
        assert!(uint_to_bits(255, 8).is_ok());
        assert!(uint_to_bits(1 << 32, 32).is_err());
        assert!(uint_to_bits(u64::MAX, 64).is_ok());
    }
}
