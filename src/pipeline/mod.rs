//! Per-channel orchestration of the conditioning stages.
//!
//! One [`ChannelPipeline`] runs a sample through convert → filter → fast
//! stage → (PID | bypass) → invert → clamp → code → sink, publishing each
//! intermediate value to the channel's monitoring slots as soon as it is
//! computed. The [`ChannelBank`] holds the fixed set of pipelines and
//! guards against out-of-range channel indices.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::CHANNEL_COUNT;
use crate::diag::DiagSender;
use crate::hardware::OutputSink;
use crate::stage::{Biquad, Pid, clamp_volts, code_to_volts, fast_stage, volts_to_code};
use crate::store::ParameterStore;

/// The full conditioning cascade for one channel.
///
/// Holds the channel's filter and controller state; everything tunable
/// lives in the shared store and is re-read on every sample.
pub struct ChannelPipeline {
    index: usize,
    store: Arc<ParameterStore>,
    sink: Arc<dyn OutputSink>,

    biquad: Biquad,
    pid: Pid,

    filter_epoch_seen: u32,
    pid_was_enabled: bool,
}

impl ChannelPipeline {
    /// Build the pipeline for one channel, designing the initial filter
    /// from the store's current cutoff and sample rate.
    pub fn new(index: usize, store: Arc<ParameterStore>, sink: Arc<dyn OutputSink>) -> Self {
        let (biquad, filter_epoch_seen) = match store.channel(index) {
            Some(shared) => {
                let p = &shared.params;
                (
                    Biquad::low_pass(p.cutoff_hz.load(), p.sample_rate_hz.load()),
                    p.filter_epoch(),
                )
            }
            None => (Biquad::default(), 0),
        };

        Self {
            index,
            store,
            sink,
            biquad,
            pid: Pid::default(),
            filter_epoch_seen,
            pid_was_enabled: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Run one raw sample through the cascade and write the resulting code
    /// to the output sink. Bounded-time: no allocation, no locking, no I/O
    /// wait anywhere on this path.
    pub fn process(&mut self, raw: i16) {
        let Some(shared) = self.store.channel(self.index) else {
            return;
        };
        let params = &shared.params;
        let monitor = &shared.monitor;

        // Redesign the filter if the cutoff or sample rate changed since
        // the last tick. The delay line resets with the coefficients.
        let epoch = params.filter_epoch();
        if epoch != self.filter_epoch_seen {
            self.biquad
                .set_low_pass(params.cutoff_hz.load(), params.sample_rate_hz.load());
            self.filter_epoch_seen = epoch;
        }

        let raw_volts = code_to_volts(raw);
        monitor.raw_volts.store(raw_volts);

        let filtered = self.biquad.update(raw_volts);
        monitor.filtered.store(filtered);

        let (fast_error, fast_output) =
            fast_stage(filtered, params.setpoint.load(), params.fast_gain.load());
        monitor.fast_error.store(fast_error);
        monitor.fast_output.store(fast_output);

        let enabled = params.pid_enabled.load(Ordering::Relaxed);
        if enabled
            && !self.pid_was_enabled
            && params.reset_pid_on_enable.load(Ordering::Relaxed)
        {
            self.pid.reset();
        }
        self.pid_was_enabled = enabled;

        let invert = params.invert.load(Ordering::Relaxed);
        let control = if enabled {
            let terms = self.pid.update(
                fast_output,
                params.kp.load(),
                params.ki.load(),
                params.kd.load(),
                params.sample_rate_hz.load(),
            );
            monitor.pid_error.store(terms.error);
            monitor.pid_integral.store(terms.integral);
            monitor.pid_derivative.store(terms.derivative);
            monitor.pid_output.store(terms.output);

            if invert { -terms.output } else { terms.output }
        } else {
            // Zeroed as a contract with tuning tools, which read these
            // fields to infer whether the stage is active
            monitor.pid_error.store(0.0);
            monitor.pid_integral.store(0.0);
            monitor.pid_derivative.store(0.0);
            monitor.pid_output.store(0.0);

            if invert { -fast_output } else { fast_output }
        };

        let output_volts = clamp_volts(control);
        monitor.output_volts.store(output_volts);

        self.sink.write(self.index, volts_to_code(output_volts));
    }
}

/// The fixed array of per-channel pipelines.
pub struct ChannelBank {
    channels: Vec<ChannelPipeline>,
    diag: DiagSender,
}

impl ChannelBank {
    pub fn new(
        store: Arc<ParameterStore>,
        sink: Arc<dyn OutputSink>,
        diag: DiagSender,
    ) -> Self {
        let channels = (0..CHANNEL_COUNT)
            .map(|index| ChannelPipeline::new(index, store.clone(), sink.clone()))
            .collect();

        Self { channels, diag }
    }

    /// Run one sample for one channel. An out-of-range index skips the
    /// sample, emits a diagnostic, and leaves every other channel
    /// untouched; no fault is ever raised.
    pub fn process(&mut self, channel: usize, raw: i16) {
        match self.channels.get_mut(channel) {
            Some(pipeline) => pipeline.process(raw),
            None => self.diag.invalid_channel(channel),
        }
    }

    /// Split into the individual pipelines, one per trigger context.
    pub fn into_channels(self) -> Vec<ChannelPipeline> {
        self.channels
    }
}
