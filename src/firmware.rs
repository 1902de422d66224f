//! Generic composite-firmware container model.
//!
//! A firmware image is a tree of kind-tagged, offset-tagged byte regions.
//! Concrete formats implement the parse step; serialization is shared: a
//! container's bytes are the concatenation of its children's bytes in
//! discovery order, zero-padded up to the image's declared alignment.

use core::convert::TryInto;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::util::align_up;

bitflags! {
    /// Behaviour switches for the parse step.
    pub struct ParseFlags: u32 {
        /// Accept images whose structural checksum does not validate.
        const IGNORE_CHECKSUM = 1;
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("truncated input: needed {needed} bytes at offset {offset:#x}")]
    Truncated { offset: usize, needed: usize },
    #[error("malformed {what} at offset {offset:#x}")]
    Malformed { offset: usize, what: &'static str },
    #[error("failed to parse child image at {offset:#x} of {length:#x}")]
    MalformedChild {
        offset: usize,
        length: usize,
        #[source]
        source: Box<ParseError>,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("alignment 2^{0} not representable")]
    AlignmentOverflow(u8),
}

/// The closed set of supported image formats.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ImageKind {
    /// An uninterpreted byte region.
    Raw,
    /// An EFI firmware volume.
    EfiVolume,
    /// The BIOS region of a flash descriptor.
    BiosRegion,
}

impl ImageKind {
    /// Parse `fw` as this format.
    ///
    /// `addr_start`/`addr_end` record the addressable window the bytes were
    /// read from; none of the formats here interpret them.
    pub fn parse(
        self,
        fw: &[u8],
        addr_start: usize,
        addr_end: usize,
        flags: ParseFlags,
    ) -> Result<FirmwareImage, ParseError> {
        let mut image = match self {
            ImageKind::Raw => FirmwareImage::with_bytes(self, fw.to_vec()),
            ImageKind::EfiVolume => crate::efi_volume::parse(fw, flags)?,
            ImageKind::BiosRegion => crate::bios_region::parse(fw, flags)?,
        };
        image.addr_start = addr_start;
        image.addr_end = addr_end;
        Ok(image)
    }
}

/// Try each candidate format in order until one parses.
///
/// The last candidate's failure is surfaced when none succeeds.
pub fn parse_any(
    kinds: &[ImageKind],
    fw: &[u8],
    addr_start: usize,
    addr_end: usize,
    flags: ParseFlags,
) -> Result<FirmwareImage, ParseError> {
    let mut last = ParseError::Malformed {
        offset: 0,
        what: "image (no candidate format)",
    };
    for kind in kinds {
        match kind.parse(fw, addr_start, addr_end, flags) {
            Ok(image) => return Ok(image),
            Err(err) => last = err,
        }
    }
    Err(last)
}

/// One node of a parsed firmware tree.
///
/// Each image exclusively owns its byte buffer and its children; trees are
/// never shared.
#[derive(Clone, Debug)]
pub struct FirmwareImage {
    kind: ImageKind,
    bytes: Vec<u8>,
    offset: usize,
    alignment: u8,
    addr_start: usize,
    addr_end: usize,
    children: Vec<FirmwareImage>,
}

impl FirmwareImage {
    pub fn new(kind: ImageKind) -> Self {
        Self::with_bytes(kind, Vec::new())
    }

    pub fn with_bytes(kind: ImageKind, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            bytes,
            offset: 0,
            alignment: 0,
            addr_start: 0,
            addr_end: 0,
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total serialized size as reported by the format's own header.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Absolute byte position within the parent image.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Power-of-two exponent the serialized length is padded to.
    pub fn alignment(&self) -> u8 {
        self.alignment
    }

    pub fn set_alignment(&mut self, alignment: u8) {
        self.alignment = alignment;
    }

    pub fn addr_start(&self) -> usize {
        self.addr_start
    }

    pub fn addr_end(&self) -> usize {
        self.addr_end
    }

    pub fn children(&self) -> &[FirmwareImage] {
        &self.children
    }

    /// Append a child discovered during parse.
    ///
    /// Child offsets are absolute and non-decreasing in parse order.
    pub fn add_image(&mut self, child: FirmwareImage) {
        debug_assert!(self
            .children
            .last()
            .map_or(true, |last| last.offset <= child.offset));
        self.children.push(child);
    }

    /// Serialize the tree.
    ///
    /// Children are written in discovery order and concatenated with no gaps;
    /// the result is zero-padded to `2^alignment`. A childless image emits
    /// its own bytes.
    pub fn write(&self) -> Result<Vec<u8>, WriteError> {
        let mut buf = Vec::new();
        if self.children.is_empty() {
            buf.extend_from_slice(&self.bytes);
        } else {
            for child in &self.children {
                buf.extend_from_slice(&child.write()?);
            }
        }
        let padded =
            align_up(buf.len(), self.alignment).ok_or(WriteError::AlignmentOverflow(self.alignment))?;
        buf.resize(padded, 0);
        Ok(buf)
    }
}

pub(crate) fn read_u16_le(buf: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = buf
        .get(offset..offset + 2)
        .ok_or(ParseError::Truncated { offset, needed: 2 })?;
    Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
}

pub(crate) fn read_u32_le(buf: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = buf
        .get(offset..offset + 4)
        .ok_or(ParseError::Truncated { offset, needed: 4 })?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

pub(crate) fn read_u64_le(buf: &[u8], offset: usize) -> Result<u64, ParseError> {
    let bytes = buf
        .get(offset..offset + 8)
        .ok_or(ParseError::Truncated { offset, needed: 8 })?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn safe_reads_carry_offset() {
        assert_eq!(read_u32_le(&[0x78, 0x56, 0x34, 0x12], 0).unwrap(), 0x1234_5678);
        match read_u32_le(&[1, 2, 3], 1) {
            Err(ParseError::Truncated { offset: 1, needed: 4 }) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn leaf_write_pads_to_alignment() {
        let mut image = FirmwareImage::with_bytes(ImageKind::Raw, vec![1, 2, 3, 4, 5]);
        image.set_alignment(3);
        assert_eq!(image.write().unwrap(), vec![1, 2, 3, 4, 5, 0, 0, 0]);
    }

    #[test]
    fn container_write_concatenates_children_in_order() {
        let mut container = FirmwareImage::new(ImageKind::Raw);
        container.set_alignment(2);
        let mut first = FirmwareImage::with_bytes(ImageKind::Raw, vec![1, 2]);
        first.set_offset(0);
        let mut second = FirmwareImage::with_bytes(ImageKind::Raw, vec![3, 4, 5]);
        second.set_offset(2);
        container.add_image(first);
        container.add_image(second);
        assert_eq!(container.write().unwrap(), vec![1, 2, 3, 4, 5, 0, 0, 0]);
    }

    #[test]
    fn parse_any_tries_candidates_in_order() {
        let junk = vec![0xa5u8; 64];
        let image = parse_any(
            &[ImageKind::EfiVolume, ImageKind::Raw],
            &junk,
            0,
            0,
            ParseFlags::empty(),
        )
        .unwrap();
        assert_eq!(image.kind(), ImageKind::Raw);
        assert_eq!(image.bytes(), &junk[..]);
    }

    #[test]
    fn parse_any_surfaces_last_failure() {
        let junk = vec![0xa5u8; 64];
        let err = parse_any(&[ImageKind::EfiVolume], &junk, 0, 0, ParseFlags::empty()).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }
}
