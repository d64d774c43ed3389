//! Low-level field extraction for NEURALCD / NEURALEV records.
//!
//! Everything in here works on byte slices that are already in memory. All
//! integers are little-endian.

use crate::error::{DecodeError, Result};
use crate::types::{DigitalReason, Filter, FilterType, OriginTime, PacketKind};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{ErrorKind, Read};

/// Timestamp value that marks a record as the continuation of the previous one.
pub const CONTINUATION_SENTINEL: u32 = 0x00FF_FFFF;

/// Stimulation electrodes are stored with this offset added to the channel.
pub const STIM_ELECTRODE_OFFSET: u16 = 5120;

/// Largest discriminant that still denotes a spike record.
pub const MAX_SPIKE_ELECTRODE: u16 = 512;

/// Size of the timestamp + discriminant prefix shared by every event record.
pub const PACKET_PREFIX_SIZE: usize = 6;

/// Size of an encoded [`Filter`].
pub const FILTER_SIZE: usize = 10;

/// Size of an encoded [`OriginTime`].
pub const ORIGIN_TIME_SIZE: usize = 16;

/// Reads until `buf` is full or the reader reports end of stream.
///
/// Returns the number of bytes read; anything less than `buf.len()` means the
/// stream is exhausted.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Fills `buf` completely or fails with [`DecodeError::Truncated`].
pub fn read_exact_or_truncated<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<()> {
    let actual = read_full(reader, buf)?;
    if actual < buf.len() {
        return Err(DecodeError::Truncated {
            what,
            expected: buf.len(),
            actual,
        });
    }
    Ok(())
}

/// Decodes a fixed-width, NUL-padded string field.
///
/// The value stops at the first NUL, or spans the whole field if there is none.
pub fn fixed_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Decodes a 16-byte origin timestamp.
pub fn origin_time(bytes: &[u8]) -> OriginTime {
    let mut fields = [0u16; 8];
    LittleEndian::read_u16_into(&bytes[..ORIGIN_TIME_SIZE], &mut fields);
    OriginTime {
        year: fields[0],
        month: fields[1],
        day_of_week: fields[2],
        day: fields[3],
        hour: fields[4],
        minute: fields[5],
        second: fields[6],
        millisecond: fields[7],
    }
}

/// Decodes a 10-byte filter descriptor.
pub fn filter(bytes: &[u8]) -> Filter {
    Filter {
        corner_mhz: LittleEndian::read_u32(&bytes[0..4]),
        order: LittleEndian::read_u32(&bytes[4..8]),
        kind: FilterType::from_u16(LittleEndian::read_u16(&bytes[8..10])),
    }
}

// ============================================================================
// Event record prefix
// Bytes: [0..4] timestamp | [4..6] discriminant (electrode id, 0 = digital)
// ============================================================================

/// Extracts the leading timestamp of an event record.
#[inline]
pub fn packet_timestamp(record: &[u8]) -> u32 {
    LittleEndian::read_u32(&record[0..4])
}

/// Extracts the discriminant that follows the timestamp.
#[inline]
pub fn packet_discriminant(record: &[u8]) -> u16 {
    LittleEndian::read_u16(&record[4..6])
}

/// Returns true if the leading field marks a continuation record.
#[inline]
pub fn is_continuation(timestamp: u32) -> bool {
    timestamp == CONTINUATION_SENTINEL
}

/// Classifies a record by its discriminant.
#[inline]
pub fn classify(discriminant: u16) -> PacketKind {
    match discriminant {
        0 => PacketKind::Digital,
        1..=MAX_SPIKE_ELECTRODE => PacketKind::Spike,
        _ => PacketKind::Stim,
    }
}

/// Removes the stimulation offset from a stored electrode id.
///
/// Ids below the offset are returned unchanged.
#[inline]
pub fn stim_channel(stored_id: u16) -> u16 {
    stored_id.checked_sub(STIM_ELECTRODE_OFFSET).unwrap_or(stored_id)
}

// ============================================================================
// Digital record
// Bytes: [6] reason | [7] reserved | [8..10] parallel | [10..18] SMA 1-4 (i16)
// ============================================================================

/// Minimum record size that holds every digital field.
pub const DIGITAL_RECORD_SIZE: usize = 18;

/// Extracts the reason bitmask of a digital record.
#[inline]
pub fn digital_reason(record: &[u8]) -> DigitalReason {
    DigitalReason(record[6])
}

/// Extracts the parallel port value of a digital record.
#[inline]
pub fn digital_parallel(record: &[u8]) -> u16 {
    LittleEndian::read_u16(&record[8..10])
}

/// Extracts the four SMA input values of a digital record.
#[inline]
pub fn digital_sma(record: &[u8]) -> [i16; 4] {
    let mut sma = [0i16; 4];
    LittleEndian::read_i16_into(&record[10..18], &mut sma);
    sma
}

// ============================================================================
// Spike record
// Bytes: [6] unit | [7] reserved | [8..] waveform
// Stim record
// Bytes: [6..8] reserved | [8..] waveform
// ============================================================================

/// Offset of the waveform payload in spike and stim records.
pub const WAVEFORM_OFFSET: usize = 8;

/// Extracts the sort unit of a spike record.
#[inline]
pub fn spike_unit(record: &[u8]) -> u8 {
    record[6]
}
