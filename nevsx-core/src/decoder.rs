//! Streaming NEURALEV packet decoder.
//!
//! The decoder reads the file header and extended headers up front, then
//! walks the fixed-size event records through a [`StreamBuffer`]. Each logical
//! packet is one primary record followed by any number of continuation
//! records, whose payloads are appended to the primary record's waveform.

use crate::buffer::StreamBuffer;
use crate::config::{PacketFilter, ReaderOptions};
use crate::error::{DecodeError, Result};
use crate::extheader::{ExtendedHeaderRegistry, EXTENDED_HEADER_SIZE};
use crate::header::{EvHeader, EV_HEADER_SIZE};
use crate::parser;
use crate::types::{DigitalPacket, Packet, PacketKind, SpikePacket, StimPacket};
use crate::waveform::WaveformLayout;
use log::{debug, warn};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Bytes of a continuation record that precede its payload.
const CONTINUATION_PREFIX_SIZE: usize = 4;

/// Pull-based decoder over the event records of a NEURALEV stream.
#[derive(Debug)]
pub struct PacketDecoder<R> {
    header: EvHeader,
    registry: ExtendedHeaderRegistry,
    buffer: StreamBuffer<R>,
    filter: PacketFilter,
    packet_size: usize,
    failed: bool,
}

impl PacketDecoder<File> {
    /// Opens a NEURALEV file with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ReaderOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file, options)
    }
}

impl<R: Read> PacketDecoder<R> {
    /// Reads the EV header and all extended headers from `reader`, leaving it
    /// positioned at the first event record.
    pub fn from_reader(mut reader: R, options: ReaderOptions) -> Result<Self> {
        let header = EvHeader::read(&mut reader)?;
        let registry = ExtendedHeaderRegistry::read(&mut reader, header.extended_header_count)?;

        let consumed = EV_HEADER_SIZE as u64
            + EXTENDED_HEADER_SIZE as u64 * u64::from(header.extended_header_count);
        let declared = u64::from(header.header_size);
        if declared > consumed {
            let gap = declared - consumed;
            warn!(
                "Header declares {} bytes but only {} were parsed; skipping {} bytes",
                declared, consumed, gap
            );
            let skipped = io::copy(&mut (&mut reader).take(gap), &mut io::sink())?;
            if skipped < gap {
                return Err(DecodeError::Truncated {
                    what: "EV header padding",
                    expected: gap as usize,
                    actual: skipped as usize,
                });
            }
        } else if declared < consumed {
            warn!(
                "Header declares {} bytes but {} were parsed; continuing after the parsed headers",
                declared, consumed
            );
        }

        let packet_size = header.packet_size as usize;
        let capacity = options
            .buffer_packets
            .max(1)
            .checked_mul(packet_size)
            .ok_or_else(|| {
                DecodeError::invalid_format(format!(
                    "read-ahead of {} packets of {} bytes overflows",
                    options.buffer_packets, packet_size
                ))
            })?;
        let mut buffer = StreamBuffer::with_capacity(reader, capacity)?;
        // prime the read-ahead so at_end() is accurate before the first read
        buffer.refill()?;

        debug!(
            "Opened EV stream: {} spike, {} stim amplifiers, {}-byte read-ahead",
            registry.spike_amplifiers().count(),
            registry.stim_amplifiers().count(),
            capacity
        );

        Ok(Self {
            header,
            registry,
            buffer,
            filter: options.filter,
            packet_size,
            failed: false,
        })
    }

    pub fn header(&self) -> &EvHeader {
        &self.header
    }

    pub fn registry(&self) -> &ExtendedHeaderRegistry {
        &self.registry
    }

    pub fn filter(&self) -> PacketFilter {
        self.filter
    }

    /// Changes the category selection for records not yet decoded.
    pub fn set_filter(&mut self, filter: PacketFilter) {
        self.filter = filter;
    }

    /// True once every record of the stream has been consumed.
    ///
    /// Already true right after opening a file with no event records.
    pub fn at_end(&self) -> bool {
        self.buffer.at_end()
    }

    /// Returns the next selected packet, or `None` at end of stream.
    ///
    /// Records of unselected categories are skipped silently.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            if !self.has_more()? {
                return Ok(None);
            }
            if let Some(packet) = self.decode_step()? {
                return Ok(Some(packet));
            }
        }
    }

    /// Consumes one logical packet: a primary record and its continuations.
    ///
    /// Returns `None` if the record's category is not selected. Calling this
    /// after [`at_end`](Self::at_end) is a contract violation.
    pub fn decode_step(&mut self) -> Result<Option<Packet>> {
        self.buffer.ensure(self.packet_size)?;
        let record = self.buffer.peek(self.packet_size)?;
        let record_len = record.len();

        let step = if record_len < self.packet_size {
            Err(DecodeError::Truncated {
                what: "event record",
                expected: self.packet_size,
                actual: record_len,
            })
        } else {
            let kind = parser::classify(parser::packet_discriminant(record));
            if self.filter.keeps(kind) {
                decode_record(kind, record).map(Some)
            } else {
                Ok(None)
            }
        };
        self.buffer.advance(record_len);

        // continuations belong to this record even when it failed to decode
        match step {
            Ok(mut packet) => {
                self.absorb_continuations(&mut packet)?;
                Ok(packet)
            }
            Err(e) => {
                self.absorb_continuations(&mut None)?;
                Err(e)
            }
        }
    }

    /// Resolves the sample layout of a waveform packet.
    pub fn waveform_layout(&self, packet: &Packet) -> Option<WaveformLayout> {
        WaveformLayout::for_packet(&self.header, &self.registry, packet)
    }

    /// Unpacks the waveform samples of a spike or stim packet.
    ///
    /// Returns `Ok(None)` for digital packets, and for electrodes that lack an
    /// amplifier header unless the file-wide 16-bit flag fixes the width.
    pub fn waveform_samples(&self, packet: &Packet) -> Result<Option<Vec<i64>>> {
        match (self.waveform_layout(packet), packet.waveform()) {
            (Some(layout), Some(bytes)) => layout.unpack(bytes).map(Some),
            _ => Ok(None),
        }
    }

    fn has_more(&mut self) -> Result<bool> {
        if self.buffer.is_drained() && !self.buffer.is_stream_exhausted() {
            self.buffer.refill()?;
        }
        Ok(!self.buffer.at_end())
    }

    /// Consumes every continuation record that follows the current position.
    ///
    /// Payloads are appended to `packet`'s waveform when there is one;
    /// otherwise the records are only stepped over.
    fn absorb_continuations(&mut self, packet: &mut Option<Packet>) -> Result<()> {
        loop {
            self.buffer.ensure(self.packet_size)?;
            if self.buffer.at_end() {
                return Ok(());
            }
            let record = self.buffer.peek(self.packet_size)?;
            if record.len() < CONTINUATION_PREFIX_SIZE
                || !parser::is_continuation(parser::packet_timestamp(record))
            {
                return Ok(());
            }

            let record_len = record.len();
            if record_len < self.packet_size {
                debug!(
                    "Truncated continuation record: {} of {} bytes",
                    record_len, self.packet_size
                );
            }

            if let Some(p) = packet.as_mut() {
                let timestamp = p.timestamp();
                match p.waveform_mut() {
                    Some(waveform) => {
                        let payload = &record[CONTINUATION_PREFIX_SIZE..];
                        waveform.try_reserve(payload.len())?;
                        waveform.extend_from_slice(payload);
                    }
                    None => warn!(
                        "Discarding continuation record after the digital packet at {}",
                        timestamp
                    ),
                }
            }
            self.buffer.advance(record_len);
        }
    }
}

/// Decodes the fields of a full-length primary record.
fn decode_record(kind: PacketKind, record: &[u8]) -> Result<Packet> {
    let timestamp = parser::packet_timestamp(record);
    let discriminant = parser::packet_discriminant(record);

    match kind {
        PacketKind::Digital => {
            if record.len() < parser::DIGITAL_RECORD_SIZE {
                return Err(DecodeError::Truncated {
                    what: "digital record",
                    expected: parser::DIGITAL_RECORD_SIZE,
                    actual: record.len(),
                });
            }
            Ok(Packet::Digital(DigitalPacket {
                timestamp,
                reason: parser::digital_reason(record),
                parallel: parser::digital_parallel(record),
                sma: parser::digital_sma(record),
            }))
        }
        PacketKind::Spike => Ok(Packet::Spike(SpikePacket {
            timestamp,
            electrode_id: discriminant,
            unit: parser::spike_unit(record),
            waveform: owned_waveform(record)?,
        })),
        PacketKind::Stim => Ok(Packet::Stim(StimPacket {
            timestamp,
            electrode_id: parser::stim_channel(discriminant),
            waveform: owned_waveform(record)?,
        })),
    }
}

fn owned_waveform(record: &[u8]) -> Result<Vec<u8>> {
    let payload = &record[parser::WAVEFORM_OFFSET..];
    let mut waveform = Vec::new();
    waveform.try_reserve_exact(payload.len())?;
    waveform.extend_from_slice(payload);
    Ok(waveform)
}

impl<R: Read> Iterator for PacketDecoder<R> {
    type Item = Result<Packet>;

    /// Yields packets until end of stream. Record-level errors are yielded
    /// and iteration continues past them; an I/O error ends iteration.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_packet() {
            Ok(Some(packet)) => Some(Ok(packet)),
            Ok(None) => None,
            Err(e) => {
                if matches!(e, DecodeError::Io(_) | DecodeError::UseAfterEnd) {
                    self.failed = true;
                }
                Some(Err(e))
            }
        }
    }
}
