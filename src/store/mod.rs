//! Live-tunable parameters and monitoring state shared between the
//! per-channel pipelines and the command interface.
//!
//! Every shared value is an independent atomic cell. The pipelines read
//! tunables and write monitoring values once per sample without locking;
//! the command interface may read or write any single field at any time.
//! Cross-field atomicity is deliberately not provided: the control math
//! tolerates one parameter changing between ticks while another has not.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use once_cell::sync::Lazy;

use crate::CHANNEL_COUNT;

mod config;
pub use config::ChannelConfig;

/// Default low-pass cutoff frequency at startup.
pub const DEFAULT_CUTOFF_HZ: f64 = 100.0;

/// Default per-channel sample rate at startup.
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 10_000.0;

/// An `f64` cell stored and loaded atomically through its bit pattern, so a
/// multi-byte value can never be observed torn between the pipeline context
/// and the command context.
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

/// Runtime-tunable values for one channel. Written by the command interface
/// or initialization; read every sample by the channel's pipeline.
#[derive(Debug)]
pub struct ChannelParams {
    pub cutoff_hz: AtomicF64,
    pub sample_rate_hz: AtomicF64,
    pub setpoint: AtomicF64,
    pub kp: AtomicF64,
    pub ki: AtomicF64,
    pub kd: AtomicF64,
    pub fast_gain: AtomicF64,
    pub pid_enabled: AtomicBool,
    pub invert: AtomicBool,
    pub reset_pid_on_enable: AtomicBool,

    /// Bumped by every cutoff or sample-rate write. The pipeline redesigns
    /// its filter when the epoch it last saw goes stale.
    filter_epoch: AtomicU32,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            cutoff_hz: AtomicF64::new(DEFAULT_CUTOFF_HZ),
            sample_rate_hz: AtomicF64::new(DEFAULT_SAMPLE_RATE_HZ),
            setpoint: AtomicF64::new(0.0),
            kp: AtomicF64::new(0.0),
            ki: AtomicF64::new(0.0),
            kd: AtomicF64::new(0.0),
            fast_gain: AtomicF64::new(1.0),
            pid_enabled: AtomicBool::new(false),
            invert: AtomicBool::new(false),
            reset_pid_on_enable: AtomicBool::new(true),
            filter_epoch: AtomicU32::new(0),
        }
    }
}

impl ChannelParams {
    /// Set the low-pass cutoff and mark the filter design stale.
    pub fn set_cutoff_hz(&self, hz: f64) {
        self.cutoff_hz.store(hz);
        self.bump_filter_epoch();
    }

    /// Set the sample rate and mark the filter design stale.
    pub fn set_sample_rate_hz(&self, hz: f64) {
        self.sample_rate_hz.store(hz);
        self.bump_filter_epoch();
    }

    /// Current filter design epoch. The Acquire pairs with the Release in
    /// `bump_filter_epoch` so an epoch change is never observed before the
    /// cutoff/sample-rate values it covers.
    pub fn filter_epoch(&self) -> u32 {
        self.filter_epoch.load(Ordering::Acquire)
    }

    fn bump_filter_epoch(&self) {
        self.filter_epoch.fetch_add(1, Ordering::Release);
    }
}

/// Latest observed value from each pipeline stage for one channel.
/// Written only by the channel's pipeline, immediately after each stage
/// computes; read-only for everything else.
#[derive(Debug, Default)]
pub struct ChannelMonitor {
    pub raw_volts: AtomicF64,
    pub filtered: AtomicF64,
    pub fast_error: AtomicF64,
    pub fast_output: AtomicF64,
    pub pid_error: AtomicF64,
    pub pid_integral: AtomicF64,
    pub pid_derivative: AtomicF64,
    pub pid_output: AtomicF64,
    pub output_volts: AtomicF64,
}

/// All shared state for one channel.
#[derive(Debug, Default)]
pub struct ChannelShared {
    pub params: ChannelParams,
    pub monitor: ChannelMonitor,

    /// Wall-clock duration of the latest `process` call, overwritten once
    /// per tick by the driver. Eventual visibility only.
    pub duration_ns: AtomicU64,
}

/// Shared state for all channels, plus by-name field access for the
/// command interface.
#[derive(Debug, Default)]
pub struct ParameterStore {
    channels: [ChannelShared; CHANNEL_COUNT],
}

type ParamGet = fn(&ChannelParams) -> f64;
type ParamSet = fn(&ChannelParams, f64);
type MonitorGet = fn(&ChannelMonitor) -> f64;

struct ParamField {
    get: ParamGet,
    set: ParamSet,
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Tunable fields by name. Boolean flags read and write as 0.0/1.0.
static PARAM_FIELDS: Lazy<BTreeMap<&'static str, ParamField>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "cutoff_hz",
            ParamField {
                get: |p| p.cutoff_hz.load(),
                set: |p, v| p.set_cutoff_hz(v),
            },
        ),
        (
            "sample_rate_hz",
            ParamField {
                get: |p| p.sample_rate_hz.load(),
                set: |p, v| p.set_sample_rate_hz(v),
            },
        ),
        (
            "setpoint",
            ParamField {
                get: |p| p.setpoint.load(),
                set: |p, v| p.setpoint.store(v),
            },
        ),
        (
            "kp",
            ParamField {
                get: |p| p.kp.load(),
                set: |p, v| p.kp.store(v),
            },
        ),
        (
            "ki",
            ParamField {
                get: |p| p.ki.load(),
                set: |p, v| p.ki.store(v),
            },
        ),
        (
            "kd",
            ParamField {
                get: |p| p.kd.load(),
                set: |p, v| p.kd.store(v),
            },
        ),
        (
            "fast_gain",
            ParamField {
                get: |p| p.fast_gain.load(),
                set: |p, v| p.fast_gain.store(v),
            },
        ),
        (
            "pid_enabled",
            ParamField {
                get: |p| flag(p.pid_enabled.load(Ordering::Relaxed)),
                set: |p, v| p.pid_enabled.store(v != 0.0, Ordering::Relaxed),
            },
        ),
        (
            "invert",
            ParamField {
                get: |p| flag(p.invert.load(Ordering::Relaxed)),
                set: |p, v| p.invert.store(v != 0.0, Ordering::Relaxed),
            },
        ),
        (
            "reset_pid_on_enable",
            ParamField {
                get: |p| flag(p.reset_pid_on_enable.load(Ordering::Relaxed)),
                set: |p, v| p.reset_pid_on_enable.store(v != 0.0, Ordering::Relaxed),
            },
        ),
    ])
});

/// Monitoring fields by name, read-only.
static MONITOR_FIELDS: Lazy<BTreeMap<&'static str, MonitorGet>> = Lazy::new(|| {
    let fields: [(&'static str, MonitorGet); 9] = [
        ("raw_volts", |m| m.raw_volts.load()),
        ("filtered", |m| m.filtered.load()),
        ("fast_error", |m| m.fast_error.load()),
        ("fast_output", |m| m.fast_output.load()),
        ("pid_error", |m| m.pid_error.load()),
        ("pid_integral", |m| m.pid_integral.load()),
        ("pid_derivative", |m| m.pid_derivative.load()),
        ("pid_output", |m| m.pid_output.load()),
        ("output_volts", |m| m.output_volts.load()),
    ];
    BTreeMap::from(fields)
});

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared state for one channel, or `None` for an out-of-range index.
    pub fn channel(&self, channel: usize) -> Option<&ChannelShared> {
        self.channels.get(channel)
    }

    /// Names of every tunable field, in stable order.
    pub fn param_names() -> Vec<&'static str> {
        PARAM_FIELDS.keys().copied().collect()
    }

    /// Names of every monitoring field, in stable order.
    pub fn monitor_names() -> Vec<&'static str> {
        MONITOR_FIELDS.keys().copied().collect()
    }

    /// Read a tunable field by name.
    pub fn get_param(&self, channel: usize, name: &str) -> Result<f64, String> {
        let shared = self
            .channel(channel)
            .ok_or_else(|| format!("Channel index {channel} out of range"))?;
        let field = PARAM_FIELDS
            .get(name)
            .ok_or_else(|| format!("Unrecognized parameter field {name}"))?;
        Ok((field.get)(&shared.params))
    }

    /// Write a tunable field by name. Safe to call at any time from any
    /// thread; the pipeline observes the new value at its next tick.
    pub fn set_param(&self, channel: usize, name: &str, value: f64) -> Result<(), String> {
        let shared = self
            .channel(channel)
            .ok_or_else(|| format!("Channel index {channel} out of range"))?;
        let field = PARAM_FIELDS
            .get(name)
            .ok_or_else(|| format!("Unrecognized parameter field {name}"))?;
        (field.set)(&shared.params, value);
        Ok(())
    }

    /// Read a monitoring field by name.
    pub fn read_monitor(&self, channel: usize, name: &str) -> Result<f64, String> {
        let shared = self
            .channel(channel)
            .ok_or_else(|| format!("Channel index {channel} out of range"))?;
        let get = MONITOR_FIELDS
            .get(name)
            .ok_or_else(|| format!("Unrecognized monitoring field {name}"))?;
        Ok(get(&shared.monitor))
    }

    /// Latest recorded `process` duration for a channel.
    pub fn duration_ns(&self, channel: usize) -> Option<u64> {
        self.channel(channel)
            .map(|shared| shared.duration_ns.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_param_field_round_trips_by_name() {
        let store = ParameterStore::new();

        for name in ParameterStore::param_names() {
            let is_flag = matches!(name, "pid_enabled" | "invert" | "reset_pid_on_enable");
            let value = if is_flag { 1.0 } else { 12.5 };
            store.set_param(0, name, value).unwrap();
            assert_eq!(store.get_param(0, name).unwrap(), value, "field {name}");
        }
    }

    #[test]
    fn boolean_params_read_back_as_flags() {
        let store = ParameterStore::new();

        store.set_param(1, "pid_enabled", 2.5).unwrap();
        assert_eq!(store.get_param(1, "pid_enabled").unwrap(), 1.0);
        assert!(store.channel(1).unwrap().params.pid_enabled.load(Ordering::Relaxed));

        store.set_param(1, "pid_enabled", 0.0).unwrap();
        assert_eq!(store.get_param(1, "pid_enabled").unwrap(), 0.0);
    }

    #[test]
    fn unknown_field_and_bad_channel_are_rejected() {
        let store = ParameterStore::new();

        assert!(store.set_param(0, "nonsense", 1.0).is_err());
        assert!(store.get_param(0, "nonsense").is_err());
        assert!(store.read_monitor(0, "nonsense").is_err());
        assert!(store.set_param(7, "kp", 1.0).is_err());
        assert!(store.read_monitor(7, "filtered").is_err());
        assert!(store.duration_ns(7).is_none());
    }

    #[test]
    fn cutoff_and_sample_rate_writes_bump_the_filter_epoch() {
        let store = ParameterStore::new();
        let params = &store.channel(0).unwrap().params;

        let before = params.filter_epoch();
        store.set_param(0, "cutoff_hz", 250.0).unwrap();
        store.set_param(0, "sample_rate_hz", 20_000.0).unwrap();
        assert_eq!(params.filter_epoch(), before + 2);

        // A gain write must not force a redesign
        store.set_param(0, "kp", 1.0).unwrap();
        assert_eq!(params.filter_epoch(), before + 2);
    }

    #[test]
    fn channels_are_independent() {
        let store = ParameterStore::new();

        store.set_param(2, "setpoint", 4.0).unwrap();
        assert_eq!(store.get_param(2, "setpoint").unwrap(), 4.0);
        for ch in [0, 1, 3] {
            assert_eq!(store.get_param(ch, "setpoint").unwrap(), 0.0);
        }
    }

    #[test]
    fn monitor_fields_default_to_zero_and_reflect_writes() {
        let store = ParameterStore::new();

        for name in ParameterStore::monitor_names() {
            assert_eq!(store.read_monitor(3, name).unwrap(), 0.0);
        }

        store.channel(3).unwrap().monitor.filtered.store(2.25);
        assert_eq!(store.read_monitor(3, "filtered").unwrap(), 2.25);
    }
}
