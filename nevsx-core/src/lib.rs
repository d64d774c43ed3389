//! Streaming decoder for NEURALCD continuous and NEURALEV event recordings.
//!
//! This crate reads the two binary formats written by neural recording
//! front ends: continuous multi-channel sample streams (`.nsX`, NEURALCD) and
//! spike / stimulation / digital event streams (`.nev`, NEURALEV).
//!
//! # Example
//!
//! ```no_run
//! use nevsx_core::{Packet, PacketDecoder, SampleBlockReader};
//!
//! let mut events = PacketDecoder::open("recording.nev").unwrap();
//! while let Some(packet) = events.next_packet().unwrap() {
//!     if let Packet::Spike(spike) = packet {
//!         println!("spike on electrode {} at {}", spike.electrode_id, spike.timestamp);
//!     }
//! }
//!
//! let mut samples = SampleBlockReader::open("recording.ns5").unwrap();
//! println!("{} channels at {} Hz", samples.channel_count(), samples.sampling_frequency());
//! while samples.has_more_data() {
//!     let chunk = samples.pull(30_000).unwrap();
//!     println!("{} frames from {}", chunk.frames, chunk.timestamp);
//! }
//! ```
//!
//! # Features
//!
//! - Header, channel table and extended header decoding
//! - Bounded read-ahead with continuation-record reassembly
//! - Category filtering without allocation for skipped records
//! - Waveform unpacking to raw counts or physical units
//! - Channel-range fan-out of sample blocks across worker threads

pub mod buffer;
pub mod channel;
pub mod config;
pub mod decoder;
pub mod error;
pub mod extheader;
pub mod fanout;
pub mod header;
pub mod parser;
pub mod samples;
pub mod session;
pub mod types;
pub mod waveform;

// Re-export commonly used types
pub use channel::ChannelDescriptor;
pub use config::{PacketFilter, ReaderOptions};
pub use decoder::PacketDecoder;
pub use error::{DecodeError, Result};
pub use extheader::{
    AmplifierHeader, ExtendedHeaderRegistry, SpikeAmplifier, SpikeFilter, StimAmplifier,
};
pub use header::{CdHeader, EvHeader};
pub use samples::{SampleBlockReader, SampleChunk};
pub use session::{DigitalColumns, DigitalSession, ParallelTransition};
pub use types::{DigitalPacket, DigitalReason, Packet, PacketKind, SpikePacket, StimPacket};
pub use waveform::WaveformLayout;
