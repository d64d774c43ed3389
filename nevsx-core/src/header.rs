//! File-level headers of the two recording formats.
//!
//! Both headers are fixed-layout, little-endian and unpadded. The magic is
//! read and checked on its own before anything else, so a file of the wrong
//! type is rejected having consumed only eight bytes.

use crate::error::{DecodeError, Result};
use crate::parser::{self, read_exact_or_truncated};
use crate::types::OriginTime;
use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use std::fmt;
use std::io::Read;

/// Magic literal of continuous (CD) files.
pub const CD_MAGIC: &[u8; 8] = b"NEURALCD";

/// Magic literal of event (EV) files.
pub const EV_MAGIC: &[u8; 8] = b"NEURALEV";

/// Size of the CD basic header, magic included.
pub const CD_HEADER_SIZE: usize = 314;

/// Size of the EV basic header, magic included.
pub const EV_HEADER_SIZE: usize = 336;

/// Flag bit: every waveform sample in the file is 16 bits wide.
pub const FLAG_ALL_WAVEFORMS_16BIT: u16 = 0x0001;

/// Reads the 8-byte magic and checks it against `expected`.
fn read_magic<R: Read>(reader: &mut R, expected: &'static [u8; 8]) -> Result<()> {
    let mut magic = [0u8; 8];
    read_exact_or_truncated(reader, &mut magic, "file magic")?;
    if &magic != expected {
        return Err(DecodeError::InvalidMagic {
            expected: std::str::from_utf8(expected).unwrap_or("?"),
            found: String::from_utf8_lossy(&magic).into_owned(),
        });
    }
    Ok(())
}

/// Basic header of a continuous-sample (NEURALCD) file.
#[derive(Debug, Clone, PartialEq)]
pub struct CdHeader {
    pub major_version: u8,
    pub minor_version: u8,
    /// Offset of the first sample block, as recorded by the acquisition system.
    pub header_size: u32,
    pub label: String,
    pub comment: String,
    /// Sampling period, in ticks of `time_resolution`.
    pub sampling_period: u32,
    /// Tick rate of the timestamp clock, in Hz.
    pub time_resolution: u32,
    pub origin: OriginTime,
    pub channel_count: u32,
}

impl CdHeader {
    /// Decodes a CD header from the current position of `reader`.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        read_magic(reader, CD_MAGIC)?;

        let mut buf = [0u8; CD_HEADER_SIZE - 8];
        read_exact_or_truncated(reader, &mut buf, "CD header")?;

        let header = Self {
            major_version: buf[0],
            minor_version: buf[1],
            header_size: LittleEndian::read_u32(&buf[2..6]),
            label: parser::fixed_str(&buf[6..22]),
            comment: parser::fixed_str(&buf[22..278]),
            sampling_period: LittleEndian::read_u32(&buf[278..282]),
            time_resolution: LittleEndian::read_u32(&buf[282..286]),
            origin: parser::origin_time(&buf[286..302]),
            channel_count: LittleEndian::read_u32(&buf[302..306]),
        };

        if header.sampling_period == 0 {
            return Err(DecodeError::invalid_format("CD header has a zero sampling period"));
        }

        debug!(
            "CD header v{}.{}: {} channels at {} Hz",
            header.major_version,
            header.minor_version,
            header.channel_count,
            header.sampling_frequency()
        );
        Ok(header)
    }

    /// Samples per second on every channel.
    pub fn sampling_frequency(&self) -> f64 {
        f64::from(self.time_resolution) / f64::from(self.sampling_period)
    }

    /// File format version as `major.minor`.
    pub fn version(&self) -> (u8, u8) {
        (self.major_version, self.minor_version)
    }
}

impl fmt::Display for CdHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "NSx Header (file format {}.{})",
            self.major_version, self.minor_version
        )?;
        writeln!(f, "Data collection began at {}", self.origin)?;
        writeln!(
            f,
            "Contents: {}, beginning at offset {}",
            self.label, self.header_size
        )?;
        writeln!(
            f,
            "{} channels, sampled at {}Hz. Time resolution {} Hz.",
            self.channel_count,
            self.sampling_frequency(),
            self.time_resolution
        )?;
        write!(f, "Comments: {}", self.comment)
    }
}

/// Basic header of an event (NEURALEV) file.
#[derive(Debug, Clone, PartialEq)]
pub struct EvHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub flags: u16,
    /// Size of basic plus extended headers, i.e. offset of the first packet.
    pub header_size: u32,
    /// Size of every physical data record, in bytes.
    pub packet_size: u32,
    /// Tick rate of packet timestamps, in Hz.
    pub timestamp_clock_hz: u32,
    /// Sampling rate of spike and stim waveforms, in Hz.
    pub waveform_clock_hz: u32,
    pub origin: OriginTime,
    pub creator: String,
    pub comment: String,
    pub processor_time: u32,
    pub extended_header_count: u32,
}

impl EvHeader {
    /// Decodes an EV header from the current position of `reader`.
    ///
    /// The extended headers that follow are not consumed; see
    /// [`crate::extheader::ExtendedHeaderRegistry::read`].
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        read_magic(reader, EV_MAGIC)?;

        let mut buf = [0u8; EV_HEADER_SIZE - 8];
        read_exact_or_truncated(reader, &mut buf, "EV header")?;

        // [268..320] is reserved
        let header = Self {
            major_version: buf[0],
            minor_version: buf[1],
            flags: LittleEndian::read_u16(&buf[2..4]),
            header_size: LittleEndian::read_u32(&buf[4..8]),
            packet_size: LittleEndian::read_u32(&buf[8..12]),
            timestamp_clock_hz: LittleEndian::read_u32(&buf[12..16]),
            waveform_clock_hz: LittleEndian::read_u32(&buf[16..20]),
            origin: parser::origin_time(&buf[20..36]),
            creator: parser::fixed_str(&buf[36..68]),
            comment: parser::fixed_str(&buf[68..268]),
            processor_time: LittleEndian::read_u32(&buf[320..324]),
            extended_header_count: LittleEndian::read_u32(&buf[324..328]),
        };

        if (header.packet_size as usize) < parser::WAVEFORM_OFFSET {
            return Err(DecodeError::invalid_format(format!(
                "EV packet size {} is smaller than the {}-byte record prefix",
                header.packet_size,
                parser::WAVEFORM_OFFSET
            )));
        }

        debug!(
            "EV header v{}.{}: {}-byte packets, {} extended headers",
            header.major_version,
            header.minor_version,
            header.packet_size,
            header.extended_header_count
        );
        Ok(header)
    }

    /// True if the file declares every waveform sample to be 16 bits wide.
    #[inline]
    pub fn all_waveforms_16bit(&self) -> bool {
        self.flags & FLAG_ALL_WAVEFORMS_16BIT != 0
    }

    /// File format version as `major.minor`.
    pub fn version(&self) -> (u8, u8) {
        (self.major_version, self.minor_version)
    }

    /// Converts a packet timestamp to seconds since the start of recording.
    pub fn ticks_to_seconds(&self, ticks: u32) -> f64 {
        if self.timestamp_clock_hz == 0 {
            return 0.0;
        }
        f64::from(ticks) / f64::from(self.timestamp_clock_hz)
    }
}

impl fmt::Display for EvHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "NEV File (version {}.{})",
            self.major_version, self.minor_version
        )?;
        writeln!(f, "Created by {}", self.creator)?;
        writeln!(f, "Data collection began at {}", self.origin)?;
        writeln!(f, "Comments: {}", self.comment)?;
        write!(f, "Packet Size: {}", self.packet_size)
    }
}
