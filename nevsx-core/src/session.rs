//! State carried across digital packets.

use crate::types::{DigitalPacket, DigitalReason};

/// A change of the parallel port between two digital packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelTransition {
    pub timestamp: u32,
    pub previous: u16,
    pub current: u16,
}

impl ParallelTransition {
    /// Lines that went from low to high.
    #[inline]
    pub fn rising(&self) -> u16 {
        self.current & !self.previous
    }

    /// Lines that went from high to low.
    #[inline]
    pub fn falling(&self) -> u16 {
        self.previous & !self.current
    }

    pub fn is_unchanged(&self) -> bool {
        self.previous == self.current
    }

    /// Indices (0-15) of every line that changed, in ascending order.
    pub fn changed_lines(&self) -> impl Iterator<Item = u8> {
        let changed = self.previous ^ self.current;
        (0..16u8).filter(move |bit| changed & (1 << bit) != 0)
    }
}

/// Tracks the parallel port value across a stream of digital packets.
///
/// The last observed value is explicit session state owned by the caller,
/// so separate streams never share it.
#[derive(Debug, Clone, Default)]
pub struct DigitalSession {
    last_parallel: u16,
    observed: usize,
}

impl DigitalSession {
    pub fn new(initial_parallel: u16) -> Self {
        Self {
            last_parallel: initial_parallel,
            observed: 0,
        }
    }

    pub fn last_parallel(&self) -> u16 {
        self.last_parallel
    }

    /// Number of parallel-port packets seen so far.
    pub fn observed(&self) -> usize {
        self.observed
    }

    /// Feeds one packet; returns the transition if it reports a parallel change.
    pub fn observe(&mut self, packet: &DigitalPacket) -> Option<ParallelTransition> {
        if !packet.reason.contains(DigitalReason::PARALLEL) {
            return None;
        }
        let transition = ParallelTransition {
            timestamp: packet.timestamp,
            previous: self.last_parallel,
            current: packet.parallel,
        };
        self.last_parallel = packet.parallel;
        self.observed += 1;
        Some(transition)
    }
}

/// Column-wise accumulation of digital packets, for tabular writers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DigitalColumns {
    pub timestamps: Vec<u32>,
    pub reasons: Vec<DigitalReason>,
    pub parallel: Vec<u16>,
    pub sma: [Vec<i16>; 4],
}

impl DigitalColumns {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(capacity),
            reasons: Vec::with_capacity(capacity),
            parallel: Vec::with_capacity(capacity),
            sma: std::array::from_fn(|_| Vec::with_capacity(capacity)),
        }
    }

    pub fn push(&mut self, packet: &DigitalPacket) {
        self.timestamps.push(packet.timestamp);
        self.reasons.push(packet.reason);
        self.parallel.push(packet.parallel);
        for (column, value) in self.sma.iter_mut().zip(packet.sma) {
            column.push(value);
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

impl<'a> Extend<&'a DigitalPacket> for DigitalColumns {
    fn extend<I: IntoIterator<Item = &'a DigitalPacket>>(&mut self, iter: I) {
        for packet in iter {
            self.push(packet);
        }
    }
}
