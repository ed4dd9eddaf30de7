//! Periodic per-channel triggers for the conditioning pipelines.
//!
//! Each channel gets its own trigger context, standing in for the hardware
//! sampling interrupt: a thread paced by a target-time accumulator that
//! invokes the channel's pipeline once per sample period, records the
//! execution duration, and periodically reports duration statistics.
//! Channels are not phase-aligned with each other and never share state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flaw::MedianFilter;
use tracing::info;

use crate::diag::DiagSender;
use crate::hardware::{OutputSink, SampleSource};
use crate::pipeline::{ChannelBank, ChannelPipeline};
use crate::store::ParameterStore;

/// Tick rate used if a channel's configured sample rate is degenerate
/// (zero, negative, or non-finite).
const FALLBACK_RATE_HZ: f64 = 10_000.0;

/// Default number of ticks between duration summaries.
const DEFAULT_SUMMARY_EVERY: u64 = 10_000;

/// Owns the pipelines and the hardware handles until the trigger threads
/// are spawned.
pub struct PipelineDriver {
    store: Arc<ParameterStore>,
    source: Arc<dyn SampleSource>,
    bank: ChannelBank,
    diag: DiagSender,
    summary_every: u64,
}

impl PipelineDriver {
    pub fn new(
        store: Arc<ParameterStore>,
        source: Arc<dyn SampleSource>,
        sink: Arc<dyn OutputSink>,
        diag: DiagSender,
    ) -> Self {
        let bank = ChannelBank::new(store.clone(), sink, diag.clone());
        Self {
            store,
            source,
            bank,
            diag,
            summary_every: DEFAULT_SUMMARY_EVERY,
        }
    }

    /// Set the number of ticks between duration summaries.
    pub fn summary_every(mut self, ticks: u64) -> Self {
        self.summary_every = ticks.max(1);
        self
    }

    /// Spawn one trigger thread per channel and return the stop handle.
    pub fn spawn(self) -> Result<DriverHandle, String> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::new();

        for pipeline in self.bank.into_channels() {
            let store = self.store.clone();
            let source = self.source.clone();
            let diag = self.diag.clone();
            let stop = stop.clone();
            let summary_every = self.summary_every;

            let thread = thread::Builder::new()
                .name(format!("sigcond-ch{}", pipeline.index()))
                .spawn(move || run_channel(pipeline, store, source, diag, stop, summary_every))
                .map_err(|e| format!("Failed to spawn channel thread: {e}"))?;
            threads.push(thread);
        }

        info!("Spawned {} channel trigger threads", threads.len());
        Ok(DriverHandle { stop, threads })
    }
}

/// Stop flag and join handles for the running trigger threads.
pub struct DriverHandle {
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl DriverHandle {
    /// Signal every channel thread to stop after its current tick, then
    /// join them.
    pub fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        for thread in self.threads {
            let _ = thread.join();
        }
    }
}

/// One channel's trigger loop: pace to the sample period, read, process,
/// record the execution duration.
fn run_channel(
    mut pipeline: ChannelPipeline,
    store: Arc<ParameterStore>,
    source: Arc<dyn SampleSource>,
    diag: DiagSender,
    stop: Arc<AtomicBool>,
    summary_every: u64,
) {
    #[cfg(feature = "affinity")]
    pin_current_thread(pipeline.index());

    let index = pipeline.index();
    let mut duration_filter = MedianFilter::<i64, 7>::new(0);
    let mut max_ns: i64 = 0;
    let mut ticks: u64 = 0;

    let start = Instant::now();
    let mut target = tick_period(&store, index);

    while !stop.load(Ordering::Relaxed) {
        // Pace to the target time the way the hardware trigger cadence
        // would; a late tick runs immediately rather than being dropped
        if let Some(wait) = target.checked_sub(start.elapsed()) {
            thread::sleep(wait);
        }

        let raw = source.read(index);

        let t0 = Instant::now();
        pipeline.process(raw);
        let elapsed_ns = t0.elapsed().as_nanos() as i64;

        if let Some(shared) = store.channel(index) {
            shared.duration_ns.store(elapsed_ns as u64, Ordering::Relaxed);
        }

        let median_ns = duration_filter.update(elapsed_ns);
        max_ns = max_ns.max(elapsed_ns);
        ticks += 1;
        if ticks % summary_every == 0 {
            diag.duration_summary(index, median_ns, max_ns);
            max_ns = 0;
        }

        // Period is re-derived each tick so sample-rate retunes take
        // effect without a restart
        target += tick_period(&store, index);
    }
}

/// Tick period from the channel's live sample rate.
fn tick_period(store: &ParameterStore, channel: usize) -> Duration {
    let rate = store
        .channel(channel)
        .map(|shared| shared.params.sample_rate_hz.load())
        .unwrap_or(FALLBACK_RATE_HZ);
    let rate = if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        FALLBACK_RATE_HZ
    };
    Duration::from_secs_f64(1.0 / rate)
}

/// Pin the current channel thread to its own core and raise its priority.
/// Skips cores in pairs so hyperthread siblings are not co-scheduled.
#[cfg(feature = "affinity")]
fn pin_current_thread(channel: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    if !core_ids.is_empty() {
        let core = core_ids[(channel * 2) % core_ids.len()];
        core_affinity::set_for_current(core);
    }

    let _ = thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CHANNEL_COUNT;
    use crate::diag::{DiagMsg, diag_channel};
    use crate::hardware::{MockOutputSink, MockSampleSource};
    use crate::stage::volts_to_code;

    #[test]
    fn driver_ticks_every_channel_and_stops_cleanly() {
        let store = Arc::new(ParameterStore::new());
        let source = Arc::new(MockSampleSource::new());
        let sink = Arc::new(MockOutputSink::new());
        let (diag, rx) = diag_channel();

        // Keep the tick rate modest so the test is cheap
        for ch in 0..CHANNEL_COUNT {
            store.set_param(ch, "sample_rate_hz", 1000.0).unwrap();
        }
        source.set_level(0, volts_to_code(1.0));

        let handle = PipelineDriver::new(store.clone(), source, sink.clone(), diag)
            .summary_every(50)
            .spawn()
            .unwrap();

        std::thread::sleep(Duration::from_millis(300));
        handle.stop();

        for ch in 0..CHANNEL_COUNT {
            assert!(sink.write_count(ch) > 0, "channel {ch} never ticked");
        }

        // Channel 0 saw a real input level
        let raw_volts = store.read_monitor(0, "raw_volts").unwrap();
        assert!((raw_volts - 1.0).abs() < 0.01, "raw_volts = {raw_volts}");

        // At least one duration summary should have been emitted
        let got_summary = rx
            .try_iter()
            .any(|msg| matches!(msg, DiagMsg::DurationSummary { .. }));
        assert!(got_summary);
    }

    #[test]
    fn tick_period_falls_back_on_degenerate_rates() {
        let store = ParameterStore::new();

        store.set_param(0, "sample_rate_hz", 0.0).unwrap();
        assert_eq!(
            tick_period(&store, 0),
            Duration::from_secs_f64(1.0 / FALLBACK_RATE_HZ)
        );

        store.set_param(0, "sample_rate_hz", 2000.0).unwrap();
        assert_eq!(tick_period(&store, 0), Duration::from_secs_f64(1.0 / 2000.0));

        // Out-of-range channel also falls back rather than failing
        assert_eq!(
            tick_period(&store, 99),
            Duration::from_secs_f64(1.0 / FALLBACK_RATE_HZ)
        );
    }
}
