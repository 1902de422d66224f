//! Platform measurement-log decoder.
//!
//! The log is a flat sequence of back-to-back records: a fixed 28-byte
//! header (PCR index, event type, 20-byte digest, payload size, all
//! little-endian) followed by the payload. Records measured into PCR 0 are
//! collected; everything else is stepped over to keep the stream
//! synchronized.

use core::convert::TryInto;
use std::fs;
use std::path::Path;

use log::debug;
use nom::bytes::complete::take;
use nom::number::complete::le_u32;
use serde::{Deserialize, Serialize};

use crate::firmware::ParseError;
use crate::util::hex_serialize;

/// Platform-exposed binary log on Linux.
pub const DEFAULT_EVENTLOG_PATH: &str = "/sys/kernel/security/tpm0/binary_bios_measurements";

/// Set to dump retained payloads during decode; never required for
/// correctness.
pub const EVENTLOG_VERBOSE_ENV: &str = "FWHOST_EVENTLOG_VERBOSE";

pub const EVENT_HEADER_SIZE: usize = 28;
const DIGEST_SIZE: usize = 20;

/// TCG event types observed in measurement logs.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum EventKind {
    PrebootCert,
    PostCode,
    NoAction,
    Separator,
    Action,
    EventTag,
    CrtmContents,
    CrtmVersion,
    CpuMicrocode,
    PlatformConfigFlags,
    TableOfDevices,
    CompactHash,
    NonhostCode,
    NonhostConfig,
    NonhostInfo,
    OmitBootDeviceEvents,
    EfiEventBase,
    EfiVariableDriverConfig,
    EfiVariableBoot,
    EfiBootServicesApplication,
    EfiBootServicesDriver,
    EfiRuntimeServicesDriver,
    EfiGptEvent,
    EfiAction,
    EfiPlatformFirmwareBlob,
    EfiHandoffTables,
    EfiHcrtmEvent,
    EfiVariableAuthority,
    Unknown(u32),
}

impl From<u32> for EventKind {
    fn from(event_type: u32) -> Self {
        use EventKind::*;
        match event_type {
            0x0000_0000 => PrebootCert,
            0x0000_0001 => PostCode,
            0x0000_0003 => NoAction,
            0x0000_0004 => Separator,
            0x0000_0005 => Action,
            0x0000_0006 => EventTag,
            0x0000_0007 => CrtmContents,
            0x0000_0008 => CrtmVersion,
            0x0000_0009 => CpuMicrocode,
            0x0000_000a => PlatformConfigFlags,
            0x0000_000b => TableOfDevices,
            0x0000_000c => CompactHash,
            0x0000_000f => NonhostCode,
            0x0000_0010 => NonhostConfig,
            0x0000_0011 => NonhostInfo,
            0x0000_0012 => OmitBootDeviceEvents,
            0x8000_0000 => EfiEventBase,
            0x8000_0001 => EfiVariableDriverConfig,
            0x8000_0002 => EfiVariableBoot,
            0x8000_0003 => EfiBootServicesApplication,
            0x8000_0004 => EfiBootServicesDriver,
            0x8000_0005 => EfiRuntimeServicesDriver,
            0x8000_0006 => EfiGptEvent,
            0x8000_0007 => EfiAction,
            0x8000_0008 => EfiPlatformFirmwareBlob,
            0x8000_0009 => EfiHandoffTables,
            0x8000_0010 => EfiHcrtmEvent,
            0x8000_00e0 => EfiVariableAuthority,
            other => Unknown(other),
        }
    }
}

struct EventHeader {
    pcr_index: u32,
    event_type: u32,
    digest: [u8; DIGEST_SIZE],
    event_data_sz: u32,
}

fn event_header(i: &[u8]) -> nom::IResult<&[u8], EventHeader, ()> {
    let (i, pcr_index) = le_u32(i)?;
    let (i, event_type) = le_u32(i)?;
    let (i, digest) = take(DIGEST_SIZE)(i)?;
    let (i, event_data_sz) = le_u32(i)?;
    Ok((
        i,
        EventHeader {
            pcr_index,
            event_type,
            digest: digest.try_into().unwrap(),
            event_data_sz,
        },
    ))
}

/// One retained PCR 0 record.
#[derive(Clone, Debug, Serialize)]
pub struct EventLogItem {
    pub kind: EventKind,
    /// Lowercase hex of the record's 20-byte digest.
    pub checksum_hex: String,
    #[serde(serialize_with = "hex_serialize")]
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct EventLog {
    items: Vec<EventLogItem>,
}

impl EventLog {
    /// Decode a buffer of back-to-back measurement records.
    ///
    /// Items keep their discovery order; a log with no qualifying record is
    /// valid and yields an empty list.
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        let mut items = Vec::new();
        let mut idx = 0;
        while idx < buf.len() {
            let (_, header) = event_header(&buf[idx..]).map_err(|_| ParseError::Truncated {
                offset: idx,
                needed: EVENT_HEADER_SIZE,
            })?;
            let datasz = header.event_data_sz as usize;
            let data_offset = idx + EVENT_HEADER_SIZE;
            if header.pcr_index == 0 {
                let payload = buf
                    .get(data_offset..data_offset + datasz)
                    .ok_or(ParseError::Truncated {
                        offset: data_offset,
                        needed: datasz,
                    })?
                    .to_vec();
                if std::env::var_os(EVENTLOG_VERBOSE_ENV).is_some() {
                    debug!("event data: {}", hex::encode(&payload));
                }
                items.push(EventLogItem {
                    kind: EventKind::from(header.event_type),
                    checksum_hex: hex::encode(header.digest),
                    payload,
                });
            }
            idx = data_offset + datasz;
        }
        Ok(Self { items })
    }

    /// Read and decode the platform log.
    ///
    /// Zero-length content is a fatal input error, not an empty log.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let buf = fs::read(path)?;
        if buf.is_empty() {
            anyhow::bail!("failed to read measurement data from {}", path.display());
        }
        Ok(Self::parse(&buf)?)
    }

    pub fn items(&self) -> &[EventLogItem] {
        &self.items
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write as _;

    fn record(pcr_index: u32, event_type: u32, digest: [u8; 20], payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(EVENT_HEADER_SIZE + payload.len());
        buf.extend_from_slice(&pcr_index.to_le_bytes());
        buf.extend_from_slice(&event_type.to_le_bytes());
        buf.extend_from_slice(&digest);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn pcr0_record_is_retained() {
        let log = EventLog::parse(&record(0, 0x0000_0003, [0u8; 20], &[])).unwrap();
        assert_eq!(log.items().len(), 1);
        let item = &log.items()[0];
        assert_eq!(item.kind, EventKind::NoAction);
        assert_eq!(item.checksum_hex, "0000000000000000000000000000000000000000");
        assert!(item.payload.is_empty());
    }

    #[test]
    fn other_pcr_records_are_skipped_but_synchronized() {
        let mut buf = record(1, 0x0000_0004, [0xaa; 20], &[1, 2, 3]);
        buf.extend_from_slice(&record(0, 0x8000_0008, [0x5a; 20], &[9, 8]));
        let log = EventLog::parse(&buf).unwrap();
        assert_eq!(log.items().len(), 1);
        let item = &log.items()[0];
        assert_eq!(item.kind, EventKind::EfiPlatformFirmwareBlob);
        assert_eq!(item.checksum_hex, "5a".repeat(20));
        assert_eq!(item.payload, vec![9, 8]);
    }

    #[test]
    fn only_skipped_records_is_a_valid_empty_log() {
        let log = EventLog::parse(&record(1, 0x0000_0004, [0u8; 20], &[])).unwrap();
        assert!(log.items().is_empty());
    }

    #[test]
    fn truncated_header_fails_with_offset() {
        let buf = record(0, 0x0000_0003, [0u8; 20], &[]);
        let err = EventLog::parse(&buf[..10]).unwrap_err();
        assert!(matches!(err, ParseError::Truncated { offset: 0, .. }));
    }

    #[test]
    fn truncated_payload_fails_with_offset() {
        let mut buf = record(0, 0x0000_0003, [0u8; 20], &[1, 2, 3, 4, 5, 6, 7, 8]);
        buf.truncate(EVENT_HEADER_SIZE + 4);
        let err = EventLog::parse(&buf).unwrap_err();
        match err {
            ParseError::Truncated { offset, needed } => {
                assert_eq!(offset, EVENT_HEADER_SIZE);
                assert_eq!(needed, 8);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn from_file_rejects_empty_content() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(EventLog::from_file(file.path()).is_err());
    }

    #[test]
    fn from_file_decodes_content() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&record(0, 0x0000_0001, [0x11; 20], b"POST"))
            .unwrap();
        file.flush().unwrap();
        let log = EventLog::from_file(file.path()).unwrap();
        assert_eq!(log.items().len(), 1);
        assert_eq!(log.items()[0].kind, EventKind::PostCode);
        assert_eq!(log.items()[0].payload, b"POST");
    }
}
