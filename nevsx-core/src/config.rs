//! Reader options.

use crate::types::PacketKind;

/// Selects which event categories are materialized by the packet decoder.
///
/// Records of an unselected category are still consumed (the stream position
/// advances past them and their continuations) but nothing is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketFilter {
    pub digital: bool,
    pub spike: bool,
    pub stim: bool,
}

impl PacketFilter {
    /// Keeps every category.
    pub const ALL: Self = Self {
        digital: true,
        spike: true,
        stim: true,
    };

    /// Keeps nothing; useful only for scanning a file.
    pub const NONE: Self = Self {
        digital: false,
        spike: false,
        stim: false,
    };

    pub fn with_digital(mut self, keep: bool) -> Self {
        self.digital = keep;
        self
    }

    pub fn with_spike(mut self, keep: bool) -> Self {
        self.spike = keep;
        self
    }

    pub fn with_stim(mut self, keep: bool) -> Self {
        self.stim = keep;
        self
    }

    /// Returns true if records of `kind` should be decoded.
    #[inline]
    pub fn keeps(&self, kind: PacketKind) -> bool {
        match kind {
            PacketKind::Digital => self.digital,
            PacketKind::Spike => self.spike,
            PacketKind::Stim => self.stim,
        }
    }
}

impl Default for PacketFilter {
    fn default() -> Self {
        Self::ALL
    }
}

/// Options for opening a NEURALEV file.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Read-ahead window size, in physical packets.
    pub buffer_packets: usize,
    pub filter: PacketFilter,
}

impl ReaderOptions {
    /// Default read-ahead window, in physical packets.
    pub const DEFAULT_BUFFER_PACKETS: usize = 10_000;

    fn new() -> Self {
        Self {
            buffer_packets: Self::DEFAULT_BUFFER_PACKETS,
            filter: PacketFilter::ALL,
        }
    }

    pub fn with_buffer_packets(mut self, packets: usize) -> Self {
        self.buffer_packets = packets;
        self
    }

    pub fn with_filter(mut self, filter: PacketFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self::new()
    }
}
