//! Parallel processing of an interleaved sample block by channel range.
//!
//! One thread decodes blocks; for each block, a fixed set of workers each
//! take a disjoint, contiguous range of channels. Workers only read the
//! shared block and every call joins all of them before returning, so the
//! caller may refill the block buffer right afterwards.

use std::ops::Range;
use std::thread;

/// Read-only view of interleaved frames.
#[derive(Debug, Clone, Copy)]
pub struct ChannelView<'a> {
    samples: &'a [i16],
    channel_count: usize,
}

impl<'a> ChannelView<'a> {
    /// Wraps `samples`, which must hold whole frames of `channel_count` samples.
    pub fn new(samples: &'a [i16], channel_count: usize) -> Self {
        Self {
            samples,
            channel_count,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn frame_count(&self) -> usize {
        if self.channel_count == 0 {
            0
        } else {
            self.samples.len() / self.channel_count
        }
    }

    /// Samples of one channel, in frame order.
    pub fn channel(&self, index: usize) -> impl Iterator<Item = i16> + 'a {
        let frames = self.frame_count();
        let samples = self.samples;
        let stride = self.channel_count.max(1);
        let start = if index < self.channel_count { index } else { samples.len() };
        samples
            .iter()
            .skip(start)
            .step_by(stride)
            .take(frames)
            .copied()
    }

    /// De-interleaves one channel into `out`, replacing its contents.
    pub fn copy_channel(&self, index: usize, out: &mut Vec<i16>) {
        out.clear();
        out.extend(self.channel(index));
    }
}

/// Splits `0..channel_count` into at most `workers` contiguous ranges of
/// `ceil(channel_count / workers)` channels; the last range may be shorter.
pub fn channel_ranges(channel_count: usize, workers: usize) -> Vec<Range<usize>> {
    if channel_count == 0 {
        return Vec::new();
    }
    let stride = channel_count.div_ceil(workers.max(1));
    (0..channel_count)
        .step_by(stride)
        .map(|start| start..(start + stride).min(channel_count))
        .collect()
}

/// Runs `f` once per channel range on its own scoped thread.
///
/// Results come back in range order. A panic in any worker is re-raised
/// here after all workers have stopped.
pub fn fan_out<T, F>(samples: &[i16], channel_count: usize, workers: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(Range<usize>, ChannelView<'_>) -> T + Sync,
{
    let view = ChannelView::new(samples, channel_count);
    let ranges = channel_ranges(channel_count, workers);
    let f = &f;

    thread::scope(|scope| {
        let handles: Vec<_> = ranges
            .into_iter()
            .map(|range| scope.spawn(move || f(range, view)))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

/// Runs `f` for every channel, with exclusive access to that channel's state.
///
/// `states` holds one entry per channel. Each worker owns the states of its
/// channel range, so per-channel encoders can be driven without locking.
pub fn fan_out_channels<S, F>(
    samples: &[i16],
    channel_count: usize,
    workers: usize,
    states: &mut [S],
    f: F,
) where
    S: Send,
    F: Fn(usize, &mut S, ChannelView<'_>) + Sync,
{
    let view = ChannelView::new(samples, channel_count);
    let count = channel_count.min(states.len());
    if count == 0 {
        return;
    }
    let stride = count.div_ceil(workers.max(1));
    let f = &f;

    thread::scope(|scope| {
        for (chunk_index, chunk) in states[..count].chunks_mut(stride).enumerate() {
            let first = chunk_index * stride;
            scope.spawn(move || {
                for (offset, state) in chunk.iter_mut().enumerate() {
                    f(first + offset, state, view);
                }
            });
        }
    });
}
