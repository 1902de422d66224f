//! Host-side firmware update agent core.
//!
//! Decodes composite firmware containers, verifies their integrity and
//! authenticity, and pushes line-record firmware payloads to devices over a
//! narrow synchronous bus.

pub mod bios_region;
pub mod checksum;
pub mod efi_volume;
pub mod eventlog;
pub mod firmware;
pub mod pki;
pub mod transfer;
pub mod trust_anchors;
pub mod util;

pub use checksum::checksum;
pub use eventlog::{EventKind, EventLog, EventLogItem};
pub use firmware::{parse_any, FirmwareImage, ImageKind, ParseError, ParseFlags, WriteError};
pub use pki::VerifyError;
pub use transfer::{
    Chunk, DeviceStatus, FirmwareBus, RecordType, TransferError, TransferRecord, Updater,
};
pub use trust_anchors::KeyTier;
