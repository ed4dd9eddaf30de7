//! Diagnostic reporting from the sample contexts.
//!
//! The pipelines and driver run under interrupt-level timing budgets, so
//! they never format or log directly. They push typed messages onto a
//! bounded channel with `try_send` and move on; a worker thread renders the
//! human-readable lines. A full queue drops the message rather than
//! stalling a sample.

use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use crossbeam::channel::{Receiver, Sender, bounded};
use tracing::{info, warn};

/// Depth of the bounded diagnostic queue.
const QUEUE_DEPTH: usize = 64;

/// One diagnostic event from a sample context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiagMsg {
    /// A caller named a channel outside the valid range; the sample was
    /// skipped and no hardware write happened.
    InvalidChannel { requested: usize },

    /// Periodic execution-duration summary for one channel.
    DurationSummary {
        channel: usize,
        median_ns: i64,
        max_ns: i64,
    },
}

impl fmt::Display for DiagMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagMsg::InvalidChannel { requested } => {
                write!(f, "invalid channel index {requested}: sample skipped")
            }
            DiagMsg::DurationSummary {
                channel,
                median_ns,
                max_ns,
            } => write!(
                f,
                "channel {channel} process duration: median {median_ns} ns, max {max_ns} ns"
            ),
        }
    }
}

/// Producer half handed to the pipelines and driver. Sends never block.
#[derive(Clone)]
pub struct DiagSender {
    tx: Sender<DiagMsg>,
}

impl DiagSender {
    pub fn invalid_channel(&self, requested: usize) {
        let _ = self.tx.try_send(DiagMsg::InvalidChannel { requested });
    }

    pub fn duration_summary(&self, channel: usize, median_ns: i64, max_ns: i64) {
        let _ = self.tx.try_send(DiagMsg::DurationSummary {
            channel,
            median_ns,
            max_ns,
        });
    }
}

/// Build the bounded diagnostic channel. The receiver can be consumed
/// directly by an external sink or handed to [`spawn_worker`].
pub fn diag_channel() -> (DiagSender, Receiver<DiagMsg>) {
    let (tx, rx) = bounded(QUEUE_DEPTH);
    (DiagSender { tx }, rx)
}

/// ISO-8601 UTC timestamp for diagnostic lines.
pub fn fmt_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Render incoming diagnostics as timestamped lines until every sender has
/// been dropped.
pub fn spawn_worker(rx: Receiver<DiagMsg>) -> JoinHandle<()> {
    thread::spawn(move || {
        for msg in rx.iter() {
            let line = format!("{} {msg}", fmt_time(SystemTime::now()));
            match msg {
                DiagMsg::InvalidChannel { .. } => warn!("{line}"),
                DiagMsg::DurationSummary { .. } => info!("{line}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_channel_line_names_the_index() {
        let msg = DiagMsg::InvalidChannel { requested: 7 };
        assert_eq!(msg.to_string(), "invalid channel index 7: sample skipped");
    }

    #[test]
    fn duration_line_names_channel_and_stats() {
        let msg = DiagMsg::DurationSummary {
            channel: 2,
            median_ns: 1200,
            max_ns: 4800,
        };
        let line = msg.to_string();
        assert!(line.contains("channel 2"));
        assert!(line.contains("1200"));
        assert!(line.contains("4800"));
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (tx, rx) = diag_channel();

        for i in 0..(QUEUE_DEPTH + 10) {
            tx.invalid_channel(i);
        }

        let received = rx.try_iter().count();
        assert_eq!(received, QUEUE_DEPTH);
    }
}
