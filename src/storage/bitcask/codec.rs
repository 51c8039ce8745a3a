use std::io::{self, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crc::{Crc, CRC_32_ISO_HDLC};

/// The checksum used throughout the Bitcask format: CRC32 with the IEEE 802.3
/// polynomial, computed per data entry and once over each hint file body.
pub(super) static CASK_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Size of the fixed data entry header in bytes.
pub(super) const DATA_HEADER_SIZE: usize = 14;

/// Size of the fixed hint record header in bytes.
pub(super) const HINT_RECORD_SIZE: usize = 18;

/// Sentinel position stored in the hint file trailer: the maximum 63-bit value.
pub(super) const HINT_TRAILER_POSITION: u64 = 0x7fff_ffff_ffff_ffff;

/// Values carrying this prefix mark a key as deleted.
pub(super) const TOMBSTONE_PREFIX: &[u8] = b"bitcask_tombstone";

// Top bit of the 8-byte hint position field.
const TOMBSTONE_BIT: u64 = 1 << 63;

// Decoded fixed-width header of a data file entry.
// Fixed-width header            Variable-length body
//+=====+=====+=====+====== - - +============== - - +
//| u32 | u32 | u16 | u32       | [u8] | [u8]       |
//+=====+=====+=====+====== - - +============== - - +
// checksum (4 bytes, over everything after itself)
// timestamp (4 bytes, seconds since the epoch)
// key_size (2 bytes)
// value_size (4 bytes)
// key (key_size bytes)
// value (value_size bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct DataHeader {
    pub crc: u32,
    pub timestamp: u32,
    pub key_size: u16,
    pub value_size: u32,
}

impl DataHeader {
    /// Total on-disk size of the entry this header describes.
    pub fn entry_size(&self) -> u64 {
        DATA_HEADER_SIZE as u64 + self.key_size as u64 + self.value_size as u64
    }
}

// One record of a hint file.
// Fixed-width header            Variable-length body
//+=====+=====+=====+====== - - +======== - - +
//| u32 | u16 | u32 | u64       | [u8]        |
//+=====+=====+=====+====== - - +======== - - +
// timestamp (4 bytes)
// key_size (2 bytes)
// entry_size (4 bytes, full on-disk size of the data entry)
// position (8 bytes, top bit = tombstone flag, low 63 bits = entry offset)
// key (key_size bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct HintRecord {
    pub timestamp: u32,
    pub key_size: u16,
    pub entry_size: u32,
    pub position: u64,
    pub tombstone: bool,
}

/// Encodes a complete data file entry, checksum included.
pub(super) fn encode_data_entry(timestamp: u32, key: &[u8], value: &[u8]) -> io::Result<Vec<u8>> {
    let mut tail = Vec::with_capacity(DATA_HEADER_SIZE - 4 + key.len() + value.len());
    tail.write_u32::<BigEndian>(timestamp)?;
    tail.write_u16::<BigEndian>(key.len() as u16)?;
    tail.write_u32::<BigEndian>(value.len() as u32)?;
    tail.write_all(key)?;
    tail.write_all(value)?;

    let mut entry = Vec::with_capacity(4 + tail.len());
    entry.write_u32::<BigEndian>(CASK_CRC.checksum(&tail))?;
    entry.write_all(&tail)?;
    Ok(entry)
}

/// Decodes the 14-byte header at the front of `buf`.
pub(super) fn decode_data_header(buf: &[u8]) -> io::Result<DataHeader> {
    let mut buf = buf;
    Ok(DataHeader {
        crc: buf.read_u32::<BigEndian>()?,
        timestamp: buf.read_u32::<BigEndian>()?,
        key_size: buf.read_u16::<BigEndian>()?,
        value_size: buf.read_u32::<BigEndian>()?,
    })
}

/// Encodes an 18-byte hint record header, setting the top bit of the position
/// field iff the record marks a tombstone.
pub(super) fn encode_hint_record(record: &HintRecord) -> io::Result<[u8; HINT_RECORD_SIZE]> {
    let mut buf = [0u8; HINT_RECORD_SIZE];
    let mut writer: &mut [u8] = &mut buf;
    writer.write_u32::<BigEndian>(record.timestamp)?;
    writer.write_u16::<BigEndian>(record.key_size)?;
    writer.write_u32::<BigEndian>(record.entry_size)?;
    let mut position = record.position;
    if record.tombstone {
        position |= TOMBSTONE_BIT;
    }
    writer.write_u64::<BigEndian>(position)?;
    Ok(buf)
}

/// Decodes the 18-byte hint record header at the front of `buf`.
pub(super) fn decode_hint_record(buf: &[u8]) -> io::Result<HintRecord> {
    let mut buf = buf;
    let timestamp = buf.read_u32::<BigEndian>()?;
    let key_size = buf.read_u16::<BigEndian>()?;
    let entry_size = buf.read_u32::<BigEndian>()?;
    let position = buf.read_u64::<BigEndian>()?;
    Ok(HintRecord {
        timestamp,
        key_size,
        entry_size,
        position: position & !TOMBSTONE_BIT,
        tombstone: position & TOMBSTONE_BIT != 0,
    })
}

/// Encodes the trailer that seals a hint file: zeroed timestamp and key size,
/// the CRC of every preceding byte, and the sentinel position.
pub(super) fn encode_hint_trailer(body_crc: u32) -> io::Result<[u8; HINT_RECORD_SIZE]> {
    encode_hint_record(&HintRecord {
        timestamp: 0,
        key_size: 0,
        entry_size: body_crc,
        position: HINT_TRAILER_POSITION,
        tombstone: false,
    })
}
