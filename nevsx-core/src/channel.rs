//! Per-channel descriptors of continuous (NEURALCD) files.

use crate::error::{DecodeError, Result};
use crate::parser::{self, read_exact_or_truncated, FILTER_SIZE};
use crate::types::Filter;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashSet;
use std::fmt;
use std::io::Read;

/// Marker that opens every channel descriptor.
pub const CHANNEL_MARKER: &[u8; 2] = b"CC";

/// Size of one encoded channel descriptor, marker included.
pub const CHANNEL_DESCRIPTOR_SIZE: usize = 46 + 2 * FILTER_SIZE;

/// Metadata for one channel of a continuous recording.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDescriptor {
    pub electrode_id: u16,
    pub label: String,
    pub front_end_id: u8,
    pub pin: u8,
    pub digital_min: i16,
    pub digital_max: i16,
    pub analog_min: i16,
    pub analog_max: i16,
    /// Physical unit of the analog range (e.g. "uV").
    pub unit_label: String,
    pub highpass: Filter,
    pub lowpass: Filter,
}

fn check_marker(marker: &[u8]) -> Result<()> {
    if marker != CHANNEL_MARKER {
        return Err(DecodeError::BadMarker {
            what: "channel descriptor",
            expected: CHANNEL_MARKER.to_vec(),
            found: marker.to_vec(),
        });
    }
    Ok(())
}

impl ChannelDescriptor {
    /// Decodes one descriptor from the current position of `reader`.
    ///
    /// A wrong marker means the stream is out of step with the file layout,
    /// which cannot be recovered from here.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; CHANNEL_DESCRIPTOR_SIZE];
        read_exact_or_truncated(reader, &mut buf[..2], "channel marker")?;
        check_marker(&buf[..2])?;
        read_exact_or_truncated(reader, &mut buf[2..], "channel descriptor")?;
        Self::from_bytes(&buf)
    }

    /// Decodes a descriptor from an in-memory record.
    pub fn from_bytes(buf: &[u8; CHANNEL_DESCRIPTOR_SIZE]) -> Result<Self> {
        check_marker(&buf[0..2])?;

        Ok(Self {
            electrode_id: LittleEndian::read_u16(&buf[2..4]),
            label: parser::fixed_str(&buf[4..20]),
            front_end_id: buf[20],
            pin: buf[21],
            digital_min: LittleEndian::read_i16(&buf[22..24]),
            digital_max: LittleEndian::read_i16(&buf[24..26]),
            analog_min: LittleEndian::read_i16(&buf[26..28]),
            analog_max: LittleEndian::read_i16(&buf[28..30]),
            unit_label: parser::fixed_str(&buf[30..46]),
            highpass: parser::filter(&buf[46..56]),
            lowpass: parser::filter(&buf[56..66]),
        })
    }

    /// Physical units per digitizer count.
    pub fn volts_per_count(&self) -> f64 {
        let analog = f64::from(self.analog_max) - f64::from(self.analog_min);
        let digital = f64::from(self.digital_max) - f64::from(self.digital_min);
        analog / digital
    }

    /// Connector location, formatted as `<port>-<front end>-<pin>` (e.g. `A-2-7`).
    pub fn connector_id(&self) -> String {
        let port = char::from(b'A' + self.front_end_id / 4);
        let front_end = self.front_end_id % 4 + 1;
        format!("{}-{}-{}", port, front_end, self.pin)
    }
}

impl fmt::Display for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Electrode #{} ({}): {}",
            self.electrode_id,
            self.label,
            self.connector_id()
        )
    }
}

/// Reads `count` consecutive descriptors and checks that electrode ids are unique.
pub fn read_channel_table<R: Read>(reader: &mut R, count: u32) -> Result<Vec<ChannelDescriptor>> {
    let mut channels = Vec::new();
    channels.try_reserve_exact(count as usize)?;
    let mut seen = HashSet::with_capacity(count as usize);

    for _ in 0..count {
        let channel = ChannelDescriptor::read(reader)?;
        if !seen.insert(channel.electrode_id) {
            return Err(DecodeError::invalid_format(format!(
                "electrode {} is described twice",
                channel.electrode_id
            )));
        }
        channels.push(channel);
    }
    Ok(channels)
}
