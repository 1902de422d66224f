//! BIOS region of an Intel flash descriptor.
//!
//! The region is a sequence of variable-length firmware volumes; the scan
//! walks them in a single pass, stepping by each volume's own reported size,
//! until it hits the FIT table marker or erased flash.

use crate::firmware::{parse_any, read_u32_le, FirmwareImage, ImageKind, ParseError, ParseFlags};

/// `_FIT`, little-endian; marks the end of the volume sequence.
pub const FIT_SIGNATURE: u32 = 0x5449_465f;

/// Erased-flash sentinel.
pub const ERASED_SIGNATURE: u32 = 0xffff_ffff;

/// Fixed reserved header preceding the region's addressable window.
pub const RESERVED_HEADER_SIZE: usize = 0x10_0000;

/// Serialized regions are padded to a 4096-byte boundary.
pub const ALIGNMENT: u8 = 12;

const CHILD_FORMATS: &[ImageKind] = &[ImageKind::EfiVolume];

pub fn parse(fw: &[u8], flags: ParseFlags) -> Result<FirmwareImage, ParseError> {
    let mut image = FirmwareImage::new(ImageKind::BiosRegion);
    image.set_alignment(ALIGNMENT);

    let mut offset = 0;
    if fw.len() > RESERVED_HEADER_SIZE {
        offset += RESERVED_HEADER_SIZE;
    }

    // read each volume in order; a sentinel signature ends the region and
    // any remaining bytes belong to no sub-image
    while offset < fw.len() {
        let signature = read_u32_le(fw, offset)?;
        if signature == FIT_SIGNATURE || signature == ERASED_SIGNATURE {
            break;
        }

        let mut child =
            parse_any(CHILD_FORMATS, &fw[offset..], 0, 0, flags).map_err(|err| {
                ParseError::MalformedChild {
                    offset,
                    length: fw.len() - offset,
                    source: Box::new(err),
                }
            })?;
        child.set_offset(offset);
        let size = child.size();
        image.add_image(child);
        offset += size;
    }

    Ok(image)
}
