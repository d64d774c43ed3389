//! Sample-block reader for continuous (NEURALCD) files.
//!
//! After the header and channel table, a CD file is a sequence of blocks:
//!
//! ```text
//! 0x01 | timestamp: u32 | frame_count: u32 | frame_count x channel_count x i16
//! ```
//!
//! Frames are interleaved: all channels of frame 0, then all channels of
//! frame 1, and so on.

use crate::channel::{read_channel_table, ChannelDescriptor};
use crate::error::{DecodeError, Result};
use crate::header::CdHeader;
use crate::parser::{read_exact_or_truncated, read_full};
use crate::types::SampleBlockHeader;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Marker byte that opens every sample block.
pub const BLOCK_MARKER: u8 = 0x01;

/// Size of a block header, marker included.
pub const BLOCK_HEADER_SIZE: usize = 9;

const SAMPLE_SIZE: usize = 2;

/// A run of frames returned by [`SampleBlockReader::pull`].
#[derive(Debug, Clone, PartialEq)]
pub struct SampleChunk {
    /// Timestamp of the first frame in the chunk.
    pub timestamp: u32,
    /// Number of complete frames delivered.
    pub frames: usize,
    /// `frames * channel_count` interleaved samples.
    pub samples: Vec<i16>,
    /// False once the stream has no further frames.
    pub more_data: bool,
}

/// Position inside the current sample block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPosition {
    pub header: SampleBlockHeader,
    /// Frames of this block not yet delivered.
    pub remaining: u32,
}

/// Pull-based reader over the sample blocks of a NEURALCD stream.
#[derive(Debug)]
pub struct SampleBlockReader<R> {
    reader: BufReader<R>,
    header: CdHeader,
    channels: Vec<ChannelDescriptor>,
    block: Option<BlockPosition>,
    exhausted: bool,
    /// Error hit while rolling to the next block, reported on the next call.
    pending: Option<DecodeError>,
    scratch: Vec<u8>,
}

impl SampleBlockReader<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file)
    }
}

impl<R: Read> SampleBlockReader<R> {
    /// Reads the CD header, the channel table and the first block header.
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let header = CdHeader::read(&mut reader)?;
        let channels = read_channel_table(&mut reader, header.channel_count)?;

        let mut samples = Self {
            reader,
            header,
            channels,
            block: None,
            exhausted: false,
            pending: None,
            scratch: Vec::new(),
        };
        samples.next_block()?;
        Ok(samples)
    }

    pub fn header(&self) -> &CdHeader {
        &self.header
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    /// Looks up a channel descriptor by electrode id.
    pub fn channel(&self, electrode_id: u16) -> Option<&ChannelDescriptor> {
        self.channels.iter().find(|c| c.electrode_id == electrode_id)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sampling_frequency(&self) -> f64 {
        self.header.sampling_frequency()
    }

    /// The block being read and how many of its frames are left.
    pub fn current_block(&self) -> Option<BlockPosition> {
        self.block
    }

    /// True while further frames, or a deferred error, can be pulled.
    pub fn has_more_data(&self) -> bool {
        !self.exhausted || self.pending.is_some()
    }

    /// Copies up to `frames` frames of the current block into `out`.
    ///
    /// `out` is cleared and holds `delivered * channel_count` samples
    /// afterwards. Never crosses a block boundary; once the block is used up
    /// the next block header is read. A short read ends the stream and
    /// returns what was available.
    pub fn read_frames(&mut self, frames: usize, out: &mut Vec<i16>) -> Result<usize> {
        if frames == 0 {
            return Ok(0);
        }
        if let Some(err) = self.pending.take() {
            return Err(err);
        }
        let position = match self.block {
            Some(position) if !self.exhausted => position,
            _ => return Err(DecodeError::UseAfterEnd),
        };

        let fetch = frames.min(position.remaining as usize);
        let frame_bytes = self.channels.len() * SAMPLE_SIZE;
        let wanted = fetch * frame_bytes;

        if self.scratch.len() < wanted {
            self.scratch.try_reserve_exact(wanted - self.scratch.len())?;
            self.scratch.resize(wanted, 0);
        }
        let got = read_full(&mut self.reader, &mut self.scratch[..wanted])?;
        let delivered = if frame_bytes == 0 { fetch } else { got / frame_bytes };
        let sample_count = delivered * self.channels.len();

        out.clear();
        out.try_reserve_exact(sample_count)?;
        out.resize(sample_count, 0);
        LittleEndian::read_i16_into(&self.scratch[..sample_count * SAMPLE_SIZE], out);

        if got < wanted {
            warn!(
                "Sample block at {} ends early: {} of {} frames available",
                position.header.timestamp, delivered, fetch
            );
            self.exhausted = true;
            self.block = None;
            return Ok(delivered);
        }

        let remaining = position.remaining - fetch as u32;
        self.block = Some(BlockPosition {
            remaining,
            ..position
        });
        if remaining == 0 {
            if let Err(err) = self.next_block() {
                self.pending = Some(err);
            }
        }
        Ok(delivered)
    }

    /// Allocating variant of [`read_frames`](Self::read_frames).
    pub fn pull(&mut self, frames: usize) -> Result<SampleChunk> {
        let timestamp = self.next_frame_timestamp();
        let mut samples = Vec::new();
        let delivered = self.read_frames(frames, &mut samples)?;
        Ok(SampleChunk {
            timestamp,
            frames: delivered,
            samples,
            more_data: self.has_more_data(),
        })
    }

    /// Timestamp of the next frame to be delivered.
    fn next_frame_timestamp(&self) -> u32 {
        match self.block {
            Some(p) => {
                let offset = p.header.frame_count - p.remaining;
                p.header
                    .timestamp
                    .wrapping_add(offset.wrapping_mul(self.header.sampling_period))
            }
            None => 0,
        }
    }

    /// Reads block headers until a non-empty block or the end of the stream.
    ///
    /// A stream that ends cleanly before a marker, or inside a block header,
    /// is exhausted rather than broken.
    fn next_block(&mut self) -> Result<()> {
        loop {
            let mut marker = [0u8; 1];
            if read_full(&mut self.reader, &mut marker)? == 0 {
                debug!("No more sample blocks");
                return self.finish();
            }
            if marker[0] != BLOCK_MARKER {
                self.finish()?;
                return Err(DecodeError::BadMarker {
                    what: "sample block",
                    expected: vec![BLOCK_MARKER],
                    found: marker.to_vec(),
                });
            }

            let mut fields = [0u8; BLOCK_HEADER_SIZE - 1];
            match read_exact_or_truncated(&mut self.reader, &mut fields, "sample block header") {
                Ok(()) => {}
                Err(DecodeError::Truncated { actual, .. }) => {
                    warn!("Sample block header cut short after {} bytes", actual + 1);
                    return self.finish();
                }
                Err(e) => return Err(e),
            }

            let header = SampleBlockHeader {
                timestamp: LittleEndian::read_u32(&fields[0..4]),
                frame_count: LittleEndian::read_u32(&fields[4..8]),
            };
            if header.frame_count == 0 {
                debug!("Skipping empty sample block at {}", header.timestamp);
                continue;
            }

            debug!(
                "Sample block at {}: {} frames",
                header.timestamp, header.frame_count
            );
            self.block = Some(BlockPosition {
                header,
                remaining: header.frame_count,
            });
            return Ok(());
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.exhausted = true;
        self.block = None;
        Ok(())
    }
}
