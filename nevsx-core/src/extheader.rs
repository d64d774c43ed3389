//! Extended headers of event (NEURALEV) files.
//!
//! The basic header is followed by a fixed number of 32-byte records. Each
//! starts with an 8-byte ASCII tag that selects how the remaining 24 bytes are
//! read:
//!
//! | Tag        | Payload                                             |
//! |------------|-----------------------------------------------------|
//! | `NEUEVWAV` | amplifier description (spike or stimulation)        |
//! | `NEUEVFLT` | spike filter settings for one electrode             |
//! | `NEUEVLBL` | electrode label                                     |
//! | `DIGLABEL` | digital input front end, including its capture mode |
//!
//! Unknown tags are logged and skipped.
//!
//! `NEUEVWAV` describes both recording and stimulating amplifiers. Electrode
//! ids at or above 5120 are stimulation channels; everything below is a
//! recording channel. The raw record is converted into the matching typed
//! header and never exposed itself.

use crate::error::Result;
use crate::parser::{self, read_exact_or_truncated, STIM_ELECTRODE_OFFSET};
use crate::types::{DigitalMode, Filter};
use byteorder::{ByteOrder, LittleEndian};
use log::warn;
use std::collections::btree_map::{BTreeMap, Entry};
use std::fmt;
use std::io::Read;

/// Size of one extended header record, tag included.
pub const EXTENDED_HEADER_SIZE: usize = 32;

pub const TAG_WAVEFORM: &[u8; 8] = b"NEUEVWAV";
pub const TAG_FILTER: &[u8; 8] = b"NEUEVFLT";
pub const TAG_LABEL: &[u8; 8] = b"NEUEVLBL";
pub const TAG_DIGITAL: &[u8; 8] = b"DIGLABEL";

/// Offset of the capture-mode byte inside a `DIGLABEL` record.
const DIGITAL_MODE_OFFSET: usize = 24;

/// On-disk `NEUEVWAV` payload.
struct RawAmplifier {
    electrode_id: u16,
    front_end_id: u8,
    pin: u8,
    neural_scale_factor: u16,
    energy_threshold: u16,
    high_threshold: i16,
    low_threshold: i16,
    sorted_units: u8,
    bytes_per_sample: u8,
    stim_scale_factor: f32,
}

impl RawAmplifier {
    fn from_payload(p: &[u8]) -> Self {
        Self {
            electrode_id: LittleEndian::read_u16(&p[0..2]),
            front_end_id: p[2],
            pin: p[3],
            neural_scale_factor: LittleEndian::read_u16(&p[4..6]),
            energy_threshold: LittleEndian::read_u16(&p[6..8]),
            high_threshold: LittleEndian::read_i16(&p[8..10]),
            low_threshold: LittleEndian::read_i16(&p[10..12]),
            sorted_units: p[12],
            bytes_per_sample: p[13],
            stim_scale_factor: LittleEndian::read_f32(&p[14..18]),
        }
    }

    /// Zero and one both mean one byte per sample.
    fn bytes_per_sample(&self) -> u8 {
        self.bytes_per_sample.max(1)
    }
}

/// Recording amplifier settings for one electrode.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeAmplifier {
    pub electrode_id: u16,
    pub front_end_id: u8,
    pub pin: u8,
    pub bytes_per_sample: u8,
    /// Neural scale factor × 1e9.
    pub scale_factor: f64,
    pub energy_threshold: u16,
    pub high_threshold: i16,
    pub low_threshold: i16,
    /// Number of units sorted online on this electrode.
    pub sorted_units: u8,
}

/// Stimulating amplifier settings for one stimulation channel.
#[derive(Debug, Clone, PartialEq)]
pub struct StimAmplifier {
    /// Logical stimulation channel (stored id minus 5120).
    pub electrode_id: u16,
    pub front_end_id: u8,
    pub pin: u8,
    pub bytes_per_sample: u8,
    pub scale_factor: f64,
}

/// Typed form of a `NEUEVWAV` record.
#[derive(Debug, Clone, PartialEq)]
pub enum AmplifierHeader {
    Spike(SpikeAmplifier),
    Stim(StimAmplifier),
}

impl AmplifierHeader {
    fn from_raw(raw: &RawAmplifier) -> Self {
        if raw.electrode_id >= STIM_ELECTRODE_OFFSET {
            let scale_factor = if raw.stim_scale_factor != 0.0 {
                f64::from(raw.stim_scale_factor)
            } else {
                f64::from(raw.neural_scale_factor)
            };
            Self::Stim(StimAmplifier {
                electrode_id: raw.electrode_id - STIM_ELECTRODE_OFFSET,
                front_end_id: raw.front_end_id,
                pin: raw.pin,
                bytes_per_sample: raw.bytes_per_sample(),
                scale_factor,
            })
        } else {
            Self::Spike(SpikeAmplifier {
                electrode_id: raw.electrode_id,
                front_end_id: raw.front_end_id,
                pin: raw.pin,
                bytes_per_sample: raw.bytes_per_sample(),
                scale_factor: f64::from(raw.neural_scale_factor) * 1e9,
                energy_threshold: raw.energy_threshold,
                high_threshold: raw.high_threshold,
                low_threshold: raw.low_threshold,
                sorted_units: raw.sorted_units,
            })
        }
    }

    pub fn electrode_id(&self) -> u16 {
        match self {
            Self::Spike(h) => h.electrode_id,
            Self::Stim(h) => h.electrode_id,
        }
    }

    pub fn bytes_per_sample(&self) -> u8 {
        match self {
            Self::Spike(h) => h.bytes_per_sample,
            Self::Stim(h) => h.bytes_per_sample,
        }
    }

    pub fn scale_factor(&self) -> f64 {
        match self {
            Self::Spike(h) => h.scale_factor,
            Self::Stim(h) => h.scale_factor,
        }
    }
}

impl fmt::Display for SpikeAmplifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Electrode {} recording header:", self.electrode_id)?;
        writeln!(f, "\tLocation: {}.{}", self.front_end_id, self.pin)?;
        writeln!(f, "\tEnergy Threshold: {}", self.energy_threshold)?;
        writeln!(
            f,
            "\tThresholds: {} and/or {} uV",
            self.low_threshold, self.high_threshold
        )?;
        writeln!(f, "\tSorted units: {}", self.sorted_units)?;
        writeln!(f, "\tWaveform bit-depth: {}", self.bytes_per_sample)?;
        write!(f, "\tWaveform V/LSB: {}", self.scale_factor)
    }
}

impl fmt::Display for StimAmplifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Electrode {} stimulation header:", self.electrode_id)?;
        writeln!(f, "\tLocation: {}.{}", self.front_end_id, self.pin)?;
        writeln!(f, "\tWaveform bit-depth: {}", self.bytes_per_sample)?;
        write!(f, "\tWaveform V/LSB: {}", self.scale_factor)
    }
}

/// Spike filter settings for one electrode (`NEUEVFLT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpikeFilter {
    pub electrode_id: u16,
    pub highpass: Filter,
    pub lowpass: Filter,
}

impl SpikeFilter {
    fn from_payload(p: &[u8]) -> Self {
        Self {
            electrode_id: LittleEndian::read_u16(&p[0..2]),
            highpass: parser::filter(&p[2..12]),
            lowpass: parser::filter(&p[12..22]),
        }
    }
}

impl fmt::Display for SpikeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Electrode {} spike filter:", self.electrode_id)?;
        writeln!(f, "\tLowpass Filter: {}", self.lowpass)?;
        write!(f, "\tHighpass Filter: {}", self.highpass)
    }
}

/// Inserts `value` unless `key` is already present; the first record wins.
fn insert_first<V>(map: &mut BTreeMap<u16, V>, key: u16, value: V, what: &str) {
    match map.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
        Entry::Occupied(_) => {
            warn!("Duplicate {} for electrode {}, keeping the first", what, key);
        }
    }
}

/// Per-electrode metadata collected from the extended headers.
#[derive(Debug, Clone, Default)]
pub struct ExtendedHeaderRegistry {
    spike: BTreeMap<u16, SpikeAmplifier>,
    stim: BTreeMap<u16, StimAmplifier>,
    filters: BTreeMap<u16, SpikeFilter>,
    labels: BTreeMap<u16, String>,
    has_digital_events: bool,
    digital_mode: DigitalMode,
    skipped_tags: Vec<String>,
}

impl ExtendedHeaderRegistry {
    /// Reads exactly `count` records from the current position of `reader`.
    ///
    /// Only a short read is fatal; records with unknown tags are skipped.
    pub fn read<R: Read>(reader: &mut R, count: u32) -> Result<Self> {
        let mut registry = Self::default();
        let mut record = [0u8; EXTENDED_HEADER_SIZE];
        for _ in 0..count {
            read_exact_or_truncated(reader, &mut record, "extended header")?;
            registry.add_record(&record);
        }
        Ok(registry)
    }

    /// Files one 32-byte record into the matching table.
    pub fn add_record(&mut self, record: &[u8; EXTENDED_HEADER_SIZE]) {
        let (tag, payload) = record.split_at(8);

        if tag == TAG_WAVEFORM {
            match AmplifierHeader::from_raw(&RawAmplifier::from_payload(payload)) {
                AmplifierHeader::Spike(h) => {
                    insert_first(&mut self.spike, h.electrode_id, h, "spike amplifier")
                }
                AmplifierHeader::Stim(h) => {
                    insert_first(&mut self.stim, h.electrode_id, h, "stim amplifier")
                }
            }
        } else if tag == TAG_FILTER {
            let sf = SpikeFilter::from_payload(payload);
            insert_first(&mut self.filters, sf.electrode_id, sf, "spike filter");
        } else if tag == TAG_LABEL {
            let id = LittleEndian::read_u16(&payload[0..2]);
            let label = parser::fixed_str(&payload[2..18]);
            insert_first(&mut self.labels, id, label, "label");
        } else if tag == TAG_DIGITAL {
            self.has_digital_events = true;
            self.digital_mode = match record[DIGITAL_MODE_OFFSET] {
                0 => DigitalMode::Serial,
                1 => DigitalMode::Parallel,
                other => {
                    warn!("Unknown digital capture mode {}, assuming serial", other);
                    DigitalMode::Serial
                }
            };
        } else {
            let tag = String::from_utf8_lossy(tag).into_owned();
            warn!("Skipping unrecognized extended header {:?}", tag);
            self.skipped_tags.push(tag);
        }
    }

    /// Recording amplifiers, ordered by electrode id.
    pub fn spike_amplifiers(&self) -> impl Iterator<Item = &SpikeAmplifier> {
        self.spike.values()
    }

    /// Stimulating amplifiers, ordered by logical channel.
    pub fn stim_amplifiers(&self) -> impl Iterator<Item = &StimAmplifier> {
        self.stim.values()
    }

    /// Spike filters, ordered by electrode id.
    pub fn spike_filters(&self) -> impl Iterator<Item = &SpikeFilter> {
        self.filters.values()
    }

    /// Electrode labels, ordered by electrode id.
    pub fn labels(&self) -> impl Iterator<Item = (u16, &str)> {
        self.labels.iter().map(|(id, label)| (*id, label.as_str()))
    }

    pub fn spike_amplifier(&self, electrode_id: u16) -> Option<&SpikeAmplifier> {
        self.spike.get(&electrode_id)
    }

    /// Looks up a stimulating amplifier by logical channel.
    pub fn stim_amplifier(&self, channel: u16) -> Option<&StimAmplifier> {
        self.stim.get(&channel)
    }

    pub fn spike_filter(&self, electrode_id: u16) -> Option<&SpikeFilter> {
        self.filters.get(&electrode_id)
    }

    pub fn label(&self, electrode_id: u16) -> Option<&str> {
        self.labels.get(&electrode_id).map(String::as_str)
    }

    pub fn has_digital_events(&self) -> bool {
        self.has_digital_events
    }

    /// Capture mode of the digital front end; meaningful only if
    /// [`has_digital_events`](Self::has_digital_events) is true.
    pub fn digital_mode(&self) -> DigitalMode {
        self.digital_mode
    }

    /// Tags of the records that were skipped, in file order.
    pub fn skipped_tags(&self) -> &[String] {
        &self.skipped_tags
    }
}
