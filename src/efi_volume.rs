//! EFI firmware volume leaf format.
//!
//! Only the fixed part of the volume header is interpreted: enough to
//! validate a volume and size it so the BIOS region scanner can step over
//! it. The content beyond the header is carried opaquely.

use crate::firmware::{
    read_u16_le, read_u32_le, read_u64_le, FirmwareImage, ImageKind, ParseError, ParseFlags,
};

/// `_FVH`, little-endian.
pub const VOLUME_SIGNATURE: u32 = 0x4856_465f;

// header layout: 16-byte zero vector, 16-byte filesystem GUID, then the
// fields below
const LENGTH_OFFSET: usize = 0x20;
const SIGNATURE_OFFSET: usize = 0x28;
const HEADER_LENGTH_OFFSET: usize = 0x30;
const CHECKSUM_OFFSET: usize = 0x32;
const HEADER_SIZE: usize = 0x38;

pub fn parse(fw: &[u8], flags: ParseFlags) -> Result<FirmwareImage, ParseError> {
    let signature = read_u32_le(fw, SIGNATURE_OFFSET)?;
    if signature != VOLUME_SIGNATURE {
        return Err(ParseError::Malformed {
            offset: SIGNATURE_OFFSET,
            what: "volume signature",
        });
    }
    let length = read_u64_le(fw, LENGTH_OFFSET)? as usize;
    let header_length = read_u16_le(fw, HEADER_LENGTH_OFFSET)? as usize;
    if header_length < HEADER_SIZE || header_length > length {
        return Err(ParseError::Malformed {
            offset: HEADER_LENGTH_OFFSET,
            what: "volume header length",
        });
    }
    if length > fw.len() {
        return Err(ParseError::Truncated {
            offset: 0,
            needed: length,
        });
    }
    if !flags.contains(ParseFlags::IGNORE_CHECKSUM) && !header_checksum_ok(&fw[..header_length]) {
        return Err(ParseError::Malformed {
            offset: CHECKSUM_OFFSET,
            what: "volume header checksum",
        });
    }
    Ok(FirmwareImage::with_bytes(
        ImageKind::EfiVolume,
        fw[..length].to_vec(),
    ))
}

/// The 16-bit word sum over the header must be zero.
fn header_checksum_ok(header: &[u8]) -> bool {
    let mut sum: u16 = 0;
    for word in header.chunks_exact(2) {
        sum = sum.wrapping_add(u16::from_le_bytes([word[0], word[1]]));
    }
    sum == 0
}

/// A minimal well-formed volume of `total_len` bytes, header checksum fixed
/// up so it validates.
#[cfg(test)]
pub(crate) fn test_volume(total_len: usize) -> Vec<u8> {
    assert!(total_len >= HEADER_SIZE);
    let mut buf = vec![0u8; total_len];
    buf[LENGTH_OFFSET..LENGTH_OFFSET + 8].copy_from_slice(&(total_len as u64).to_le_bytes());
    buf[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 4].copy_from_slice(&VOLUME_SIGNATURE.to_le_bytes());
    buf[HEADER_LENGTH_OFFSET..HEADER_LENGTH_OFFSET + 2]
        .copy_from_slice(&(HEADER_SIZE as u16).to_le_bytes());
    let mut sum: u16 = 0;
    for word in buf[..HEADER_SIZE].chunks_exact(2) {
        sum = sum.wrapping_add(u16::from_le_bytes([word[0], word[1]]));
    }
    buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&(0u16.wrapping_sub(sum)).to_le_bytes());
    buf
}
