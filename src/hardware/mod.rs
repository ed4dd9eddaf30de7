//! Capability boundaries toward the analog hardware.
//!
//! The conditioning core never talks to peripheral registers; it consumes
//! raw sampled codes from a [`SampleSource`] and hands finished output
//! codes to an [`OutputSink`]. Concrete back ends are selected at
//! initialization and injected into the pipelines. The in-memory mock
//! implementations stand in for the hardware in tests and demos.

use std::sync::atomic::{AtomicI16, AtomicU64, Ordering};

use crate::CHANNEL_COUNT;

/// Source of raw sampled codes, one per channel per trigger. Raw full
/// scale spans the same symmetric voltage range as the output.
pub trait SampleSource: Send + Sync {
    fn read(&self, channel: usize) -> i16;
}

/// Sink accepting one fixed-point output code per channel per sample.
/// Callers guarantee the channel index is in range before writing.
pub trait OutputSink: Send + Sync {
    fn write(&self, channel: usize, code: i16);
}

/// Mock front end holding a settable input level per channel.
#[derive(Debug, Default)]
pub struct MockSampleSource {
    levels: [AtomicI16; CHANNEL_COUNT],
}

impl MockSampleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the raw code the given channel will sample from now on.
    /// Out-of-range channels are ignored.
    pub fn set_level(&self, channel: usize, code: i16) {
        if let Some(cell) = self.levels.get(channel) {
            cell.store(code, Ordering::Relaxed);
        }
    }
}

impl SampleSource for MockSampleSource {
    fn read(&self, channel: usize) -> i16 {
        self.levels
            .get(channel)
            .map(|cell| cell.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Mock output recording the last code and total write count per channel.
#[derive(Debug, Default)]
pub struct MockOutputSink {
    codes: [AtomicI16; CHANNEL_COUNT],
    writes: [AtomicU64; CHANNEL_COUNT],
}

impl MockOutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last code written to a channel, or `None` for an out-of-range index.
    pub fn last_code(&self, channel: usize) -> Option<i16> {
        self.codes
            .get(channel)
            .map(|cell| cell.load(Ordering::Relaxed))
    }

    /// Number of writes a channel has received.
    pub fn write_count(&self, channel: usize) -> u64 {
        self.writes
            .get(channel)
            .map(|cell| cell.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl OutputSink for MockOutputSink {
    fn write(&self, channel: usize, code: i16) {
        if let Some(cell) = self.codes.get(channel) {
            cell.store(code, Ordering::Relaxed);
            self.writes[channel].fetch_add(1, Ordering::Relaxed);
        }
    }
}
