//! Serializable per-channel configuration snapshots.
//!
//! Persistence itself is an external collaborator's concern; these types
//! are the surface it reads and writes. Applying a snapshot touches each
//! live field individually, so a pipeline mid-tick sees a partially-applied
//! but never torn configuration.

use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;

use super::{DEFAULT_CUTOFF_HZ, DEFAULT_SAMPLE_RATE_HZ, ParameterStore};

/// Every tunable for one channel.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChannelConfig {
    pub cutoff_hz: f64,
    pub sample_rate_hz: f64,
    pub setpoint: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub fast_gain: f64,
    pub pid_enabled: bool,
    pub invert: bool,
    pub reset_pid_on_enable: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            cutoff_hz: DEFAULT_CUTOFF_HZ,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            setpoint: 0.0,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            fast_gain: 1.0,
            pid_enabled: false,
            invert: false,
            reset_pid_on_enable: true,
        }
    }
}

impl ChannelConfig {
    /// Write every field into the live store. Bumps the channel's filter
    /// epoch so the pipeline redesigns its filter on the next tick.
    pub fn apply(&self, store: &ParameterStore, channel: usize) -> Result<(), String> {
        let shared = store
            .channel(channel)
            .ok_or_else(|| format!("Channel index {channel} out of range"))?;
        let p = &shared.params;

        p.setpoint.store(self.setpoint);
        p.kp.store(self.kp);
        p.ki.store(self.ki);
        p.kd.store(self.kd);
        p.fast_gain.store(self.fast_gain);
        p.pid_enabled.store(self.pid_enabled, Ordering::Relaxed);
        p.invert.store(self.invert, Ordering::Relaxed);
        p.reset_pid_on_enable
            .store(self.reset_pid_on_enable, Ordering::Relaxed);

        // Last so the epoch bump covers the whole snapshot
        p.cutoff_hz.store(self.cutoff_hz);
        p.set_sample_rate_hz(self.sample_rate_hz);

        Ok(())
    }

    /// Read the current tunables for one channel out of the live store.
    pub fn snapshot(store: &ParameterStore, channel: usize) -> Result<Self, String> {
        let shared = store
            .channel(channel)
            .ok_or_else(|| format!("Channel index {channel} out of range"))?;
        let p = &shared.params;

        Ok(Self {
            cutoff_hz: p.cutoff_hz.load(),
            sample_rate_hz: p.sample_rate_hz.load(),
            setpoint: p.setpoint.load(),
            kp: p.kp.load(),
            ki: p.ki.load(),
            kd: p.kd.load(),
            fast_gain: p.fast_gain.load(),
            pid_enabled: p.pid_enabled.load(Ordering::Relaxed),
            invert: p.invert.load(Ordering::Relaxed),
            reset_pid_on_enable: p.reset_pid_on_enable.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ser_roundtrip() {
        let config = ChannelConfig {
            cutoff_hz: 250.0,
            kp: 1.5,
            pid_enabled: true,
            ..Default::default()
        };

        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized = serde_json::from_str::<ChannelConfig>(&serialized).unwrap();
        let reserialized = serde_json::to_string(&deserialized).unwrap();

        assert_eq!(serialized, reserialized);
        assert_eq!(config, deserialized);
    }

    #[test]
    fn apply_then_snapshot_round_trips() {
        let store = ParameterStore::new();
        let config = ChannelConfig {
            cutoff_hz: 42.0,
            sample_rate_hz: 2000.0,
            setpoint: -1.5,
            kp: 0.1,
            ki: 0.2,
            kd: 0.3,
            fast_gain: 7.0,
            pid_enabled: true,
            invert: true,
            reset_pid_on_enable: false,
        };

        config.apply(&store, 2).unwrap();
        assert_eq!(ChannelConfig::snapshot(&store, 2).unwrap(), config);

        // Other channels keep their defaults
        assert_eq!(
            ChannelConfig::snapshot(&store, 0).unwrap(),
            ChannelConfig::default()
        );
    }

    #[test]
    fn apply_bumps_the_filter_epoch() {
        let store = ParameterStore::new();
        let before = store.channel(1).unwrap().params.filter_epoch();

        ChannelConfig::default().apply(&store, 1).unwrap();
        assert!(store.channel(1).unwrap().params.filter_epoch() > before);
    }

    #[test]
    fn apply_to_bad_channel_is_rejected() {
        let store = ParameterStore::new();
        assert!(ChannelConfig::default().apply(&store, 9).is_err());
        assert!(ChannelConfig::snapshot(&store, 9).is_err());
    }
}
