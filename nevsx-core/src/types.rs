//! Core value types shared by the NEURALCD and NEURALEV readers.
//!
//! This module defines the decoded packet structures, digital-event reason
//! codes, filter descriptors and the wall-clock origin stored in both file
//! headers.

use std::fmt;

/// Wall-clock time at which acquisition started.
///
/// Stored on disk as eight little-endian `u16` fields, in the order they are
/// declared here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OriginTime {
    pub year: u16,
    pub month: u16,
    pub day_of_week: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub millisecond: u16,
}

impl fmt::Display for OriginTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{} {}:{}:{}.{}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.millisecond
        )
    }
}

/// Analog filter family used by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    None,
    Butterworth,
    Chebyshev,
    /// A type code outside the documented set, kept verbatim.
    Other(u16),
}

impl FilterType {
    /// Maps the on-disk 16-bit type code to a filter type.
    #[inline]
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Butterworth,
            2 => Self::Chebyshev,
            other => Self::Other(other),
        }
    }
}

/// Filter descriptor (10 bytes on disk: corner u32, order u32, type u16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    /// Corner frequency in milli-Hz.
    pub corner_mhz: u32,
    pub order: u32,
    pub kind: FilterType,
}

impl Filter {
    /// Corner frequency in Hz.
    pub fn corner_hz(&self) -> f64 {
        f64::from(self.corner_mhz) / 1000.0
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.kind {
            FilterType::None => return write!(f, "None"),
            FilterType::Butterworth => "Butterworth",
            FilterType::Chebyshev => "Chebyshev",
            FilterType::Other(code) => return write!(f, "Unknown filter type {}", code),
        };
        write!(
            f,
            "{} (Corner Frequency: {}Hz Order: {})",
            name,
            self.corner_hz(),
            self.order
        )
    }
}

/// Capture mode of the digital input front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigitalMode {
    #[default]
    Serial,
    Parallel,
}

impl fmt::Display for DigitalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "Serial"),
            Self::Parallel => write!(f, "Parallel"),
        }
    }
}

/// Bitmask describing why a digital packet was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigitalReason(pub u8);

impl DigitalReason {
    /// Parallel port changed, or the serial port was strobed.
    pub const PARALLEL: u8 = 1 << 0;
    pub const SMA1: u8 = 1 << 1;
    pub const SMA2: u8 = 1 << 2;
    pub const SMA3: u8 = 1 << 3;
    pub const SMA4: u8 = 1 << 4;
    // There is no bit five.
    pub const PERIODIC: u8 = 1 << 6;
    pub const SERIAL: u8 = 1 << 7;

    const NAMES: [(u8, &'static str); 7] = [
        (Self::PARALLEL, "Parallel"),
        (Self::SMA1, "SMA #1"),
        (Self::SMA2, "SMA #2"),
        (Self::SMA3, "SMA #3"),
        (Self::SMA4, "SMA #4"),
        (Self::PERIODIC, "Periodic"),
        (Self::SERIAL, "Serial"),
    ];

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `mask` is set.
    #[inline]
    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    /// Returns true if the SMA input `index` (1-4) changed.
    pub fn sma_changed(self, index: u8) -> bool {
        (1..=4).contains(&index) && self.0 & (1 << index) != 0
    }
}

impl fmt::Display for DigitalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (bit, name) in Self::NAMES {
            if self.0 & bit != 0 {
                if !first {
                    write!(f, " & ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "None")?;
        }
        Ok(())
    }
}

/// Category of a physical event record, decided by its discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Digital,
    Spike,
    Stim,
}

/// A change on the digital inputs (parallel port and SMA connectors).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitalPacket {
    pub timestamp: u32,
    pub reason: DigitalReason,
    pub parallel: u16,
    pub sma: [i16; 4],
}

/// A threshold crossing on a recording electrode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpikePacket {
    pub timestamp: u32,
    pub electrode_id: u16,
    /// Online sort unit (0 = unsorted).
    pub unit: u8,
    /// Raw waveform bytes; see [`crate::waveform`] to unpack samples.
    pub waveform: Vec<u8>,
}

/// A microstimulation pulse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimPacket {
    pub timestamp: u32,
    /// Logical stimulation channel (stored id minus 5120).
    pub electrode_id: u16,
    pub waveform: Vec<u8>,
}

/// A decoded NEURALEV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Digital(DigitalPacket),
    Spike(SpikePacket),
    Stim(StimPacket),
}

impl Packet {
    #[inline]
    pub fn timestamp(&self) -> u32 {
        match self {
            Self::Digital(p) => p.timestamp,
            Self::Spike(p) => p.timestamp,
            Self::Stim(p) => p.timestamp,
        }
    }

    #[inline]
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Digital(_) => PacketKind::Digital,
            Self::Spike(_) => PacketKind::Spike,
            Self::Stim(_) => PacketKind::Stim,
        }
    }

    /// Waveform bytes, for spike and stim packets.
    pub fn waveform(&self) -> Option<&[u8]> {
        match self {
            Self::Digital(_) => None,
            Self::Spike(p) => Some(&p.waveform),
            Self::Stim(p) => Some(&p.waveform),
        }
    }

    pub(crate) fn waveform_mut(&mut self) -> Option<&mut Vec<u8>> {
        match self {
            Self::Digital(_) => None,
            Self::Spike(p) => Some(&mut p.waveform),
            Self::Stim(p) => Some(&mut p.waveform),
        }
    }
}

/// Header of one NEURALCD sample block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleBlockHeader {
    /// Timestamp of the first frame in the block.
    pub timestamp: u32,
    /// Number of multi-channel frames in the block.
    pub frame_count: u32,
}
