//! Chunked firmware transfer over a narrow synchronous bus.
//!
//! The device is switched into update mode, then fed one wire frame per
//! source record. Every frame is acknowledged by a status read; a non-zero
//! status (or a failed write) retries the same record up to a fixed bound.
//! The bus is request/response only, one outstanding command at a time, so
//! the whole protocol runs on a single thread of control per device.

use std::io;
use std::thread;
use std::time::Duration;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::util::hex_serialize;

/// Bus address the device listens on for update traffic.
pub const DEVICE_ADDR_WRITE: u8 = 0x18;

pub const CMD_WRITE: u8 = 0x32;
pub const CMD_READ_STATUS: u8 = 0x33;
pub const CMD_ENTER_UPDATE: u8 = 0x34;

/// Leading token of every well-formed source record.
pub const START_TOKEN: u8 = b':';

/// Smallest well-formed record: token, count, address, type, checksum.
pub const MIN_RECORD_LEN: usize = 11;

/// Receiver-side buffer limit on slow links.
pub const CHUNK_SIZE: usize = 32;

/// Transmit+verify cycles allowed per record.
pub const MAX_ATTEMPTS: usize = 5;

/// Hardware settle time between bus operations.
const INTER_FRAME_DELAY: Duration = Duration::from_millis(5);

/// Wait after the mode switch, avoids a brown-out while the device
/// restarts.
const DETACH_SETTLE_DELAY: Duration = Duration::from_millis(5);

/// How a write's payload relates to the frame it belongs to.
///
/// Slow links limit the receiver buffer to [`CHUNK_SIZE`] bytes, so an
/// oversized frame goes out as a tagged pair instead of one write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Chunk {
    /// The complete frame in a single write.
    Whole,
    /// A leading chunk, more data follows.
    MoreFollows,
    /// The final chunk of a split frame.
    Final,
}

/// The physical transport the updater drives.
///
/// A single call is expected to return or fail within a bounded
/// millisecond-scale interval; the protocol adds no timeout of its own
/// beyond the retry bound.
pub trait FirmwareBus {
    /// Whether the link runs at its highest negotiated speed.
    fn high_speed(&self) -> bool;

    /// Push `data` to the device.
    fn write(&mut self, chunk: Chunk, data: &[u8]) -> io::Result<()>;

    /// Issue `command` and return the device's one-byte status.
    fn read_status(&mut self, command: u8) -> io::Result<u8>;
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RecordType {
    Data,
    EndOfFile,
    Other(u8),
}

impl RecordType {
    pub fn code(self) -> u8 {
        match self {
            RecordType::Data => 0x00,
            RecordType::EndOfFile => 0x01,
            RecordType::Other(code) => code,
        }
    }
}

impl From<u8> for RecordType {
    fn from(code: u8) -> Self {
        match code {
            0x00 => RecordType::Data,
            0x01 => RecordType::EndOfFile,
            other => RecordType::Other(other),
        }
    }
}

/// One line of a hex-record firmware payload, read-only once parsed.
#[derive(Clone, Debug, Serialize)]
pub struct TransferRecord {
    /// Position within the original image.
    pub sequence_index: usize,
    /// Declared payload length.
    pub byte_count: u8,
    /// Destination address on the device.
    pub load_offset: u16,
    pub record_type: RecordType,
    #[serde(serialize_with = "hex_serialize")]
    pub payload: Vec<u8>,
    /// Trailing checksum byte, forwarded to the device unverified.
    pub checksum: u8,
    /// The raw source line the record came from.
    pub line: String,
    /// One-based source line, for diagnostics.
    pub line_number: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum TransferError {
    #[error("line {line} is incomplete, length {length}")]
    RecordTooShort { line: usize, length: usize },
    #[error("invalid starting token on line {line}")]
    InvalidStartToken { line: usize },
    #[error("line {line} malformed")]
    MalformedRecord { line: usize },
    #[error("failed to enter update mode")]
    Detach(#[source] io::Error),
    #[error("bus failure while writing record {index}")]
    Io {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("record {index} not accepted after {attempts} attempts")]
    RetryExhausted { index: usize, attempts: usize },
}

/// Where the device is in its update state machine.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DeviceStatus {
    Idle,
    Restarting,
    Writing,
    Done,
}

impl TransferRecord {
    /// Parse one source line into a record.
    ///
    /// The line must carry the start token, a full header, `byte_count`
    /// payload byte pairs and the trailing checksum pair.
    pub fn from_line(
        sequence_index: usize,
        line_number: usize,
        line: &str,
    ) -> Result<Self, TransferError> {
        let bytes = line.as_bytes();
        if bytes.len() < MIN_RECORD_LEN {
            return Err(TransferError::RecordTooShort {
                line: line_number,
                length: bytes.len(),
            });
        }
        if bytes[0] != START_TOKEN {
            return Err(TransferError::InvalidStartToken { line: line_number });
        }
        let byte_count = parse_hex_byte(line, 1, line_number)?;
        if MIN_RECORD_LEN + 2 * byte_count as usize > bytes.len() {
            return Err(TransferError::MalformedRecord { line: line_number });
        }
        let load_offset = u16::from(parse_hex_byte(line, 3, line_number)?) << 8
            | u16::from(parse_hex_byte(line, 5, line_number)?);
        let record_type = RecordType::from(parse_hex_byte(line, 7, line_number)?);
        let mut payload = Vec::with_capacity(byte_count as usize);
        for i in 0..byte_count as usize {
            payload.push(parse_hex_byte(line, 9 + 2 * i, line_number)?);
        }
        let checksum = parse_hex_byte(line, 9 + 2 * byte_count as usize, line_number)?;
        Ok(Self {
            sequence_index,
            byte_count,
            load_offset,
            record_type,
            payload,
            checksum,
            line: line.to_string(),
            line_number,
        })
    }

    /// Whether this record terminates the image; its frame is never
    /// status-polled.
    fn is_end_of_file(&self) -> bool {
        self.byte_count == 0 && self.record_type == RecordType::EndOfFile && self.checksum == 0xff
    }
}

fn parse_hex_byte(line: &str, pos: usize, line_number: usize) -> Result<u8, TransferError> {
    line.get(pos..pos + 2)
        .and_then(|pair| u8::from_str_radix(pair, 16).ok())
        .ok_or(TransferError::MalformedRecord { line: line_number })
}

/// Re-validate a record against its source line before transmission.
///
/// Records arrive from an external decoder, so the transmit path does not
/// assume they were built through [`TransferRecord::from_line`].
fn check_record(record: &TransferRecord) -> Result<(), TransferError> {
    let line = record.line.as_bytes();
    if line.len() < MIN_RECORD_LEN {
        return Err(TransferError::RecordTooShort {
            line: record.line_number,
            length: line.len(),
        });
    }
    if line[0] != START_TOKEN {
        return Err(TransferError::InvalidStartToken {
            line: record.line_number,
        });
    }
    if 9 + 2 * record.byte_count as usize > line.len()
        || record.payload.len() != record.byte_count as usize
    {
        return Err(TransferError::MalformedRecord {
            line: record.line_number,
        });
    }
    Ok(())
}

/// `[addr, write-cmd, ':', count, addr-hi, addr-lo, type, payload.., cks]`
fn wire_frame(record: &TransferRecord) -> Vec<u8> {
    let mut frame = Vec::with_capacity(record.payload.len() + 8);
    frame.push(DEVICE_ADDR_WRITE);
    frame.push(CMD_WRITE);
    frame.push(START_TOKEN);
    frame.push(record.byte_count);
    frame.extend_from_slice(&record.load_offset.to_be_bytes());
    frame.push(record.record_type.code());
    frame.extend_from_slice(&record.payload);
    frame.push(record.checksum);
    frame
}

/// Drives one device through `Detach → Transmitting → Verifying → Done`.
pub struct Updater<B> {
    bus: B,
    status: DeviceStatus,
}

impl<B: FirmwareBus> Updater<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            status: DeviceStatus::Idle,
        }
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Switch the device into update mode.
    ///
    /// A failed write here is fatal: the device state after a botched mode
    /// switch is unknown and must not be guessed at.
    pub fn detach(&mut self) -> Result<(), TransferError> {
        self.bus
            .write(Chunk::Whole, &[DEVICE_ADDR_WRITE, CMD_ENTER_UPDATE])
            .map_err(TransferError::Detach)?;
        self.status = DeviceStatus::Restarting;
        thread::sleep(DETACH_SETTLE_DELAY);
        Ok(())
    }

    /// Transmit every record in order, reporting progress after each
    /// verified record as `(records_completed, total_records)`.
    pub fn write_firmware<F>(
        &mut self,
        records: &[TransferRecord],
        mut progress: F,
    ) -> Result<(), TransferError>
    where
        F: FnMut(usize, usize),
    {
        self.status = DeviceStatus::Writing;
        for (index, record) in records.iter().enumerate() {
            check_record(record)?;
            self.push_record(index, record)?;
            progress(index + 1, records.len());
        }
        self.status = DeviceStatus::Done;
        Ok(())
    }

    /// Transmit+verify one record, retrying up to [`MAX_ATTEMPTS`] times.
    ///
    /// A write failure on the final attempt surfaces as [`TransferError::Io`]
    /// (device unreachable); running out of attempts on status rejections is
    /// [`TransferError::RetryExhausted`] (device rejected the record). The
    /// caller must treat either as leaving the device partially written.
    fn push_record(&mut self, index: usize, record: &TransferRecord) -> Result<(), TransferError> {
        let frame = wire_frame(record);
        let mut last_io = None;
        for attempt in 0..MAX_ATTEMPTS {
            thread::sleep(INTER_FRAME_DELAY);
            if let Err(err) = self.transmit(&frame) {
                trace!("record {} attempt {}: write failed: {}", index, attempt, err);
                last_io = Some(err);
                continue;
            }

            if record.is_end_of_file() {
                return Ok(());
            }

            thread::sleep(INTER_FRAME_DELAY);
            match self.bus.read_status(CMD_READ_STATUS) {
                Ok(0) => return Ok(()),
                Ok(status) => {
                    debug!(
                        "record {} attempt {}: device status {:#04x}",
                        index, attempt, status
                    );
                    last_io = None;
                }
                Err(err) => {
                    trace!("record {} attempt {}: status read failed: {}", index, attempt, err);
                    last_io = Some(err);
                }
            }
        }
        match last_io {
            Some(source) => Err(TransferError::Io { index, source }),
            None => Err(TransferError::RetryExhausted {
                index,
                attempts: MAX_ATTEMPTS,
            }),
        }
    }

    fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.bus.high_speed() || frame.len() <= CHUNK_SIZE {
            self.bus.write(Chunk::Whole, frame)
        } else {
            // receiver buffer on slow links holds 32 bytes at most
            self.bus.write(Chunk::MoreFollows, &frame[..CHUNK_SIZE])?;
            self.bus.write(Chunk::Final, &frame[CHUNK_SIZE..])
        }
    }
}
