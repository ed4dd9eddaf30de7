//! Per-sample processing stages that make up one channel's pipeline.
//!
//! Each stage is O(1), allocation-free, and deterministic so the full
//! cascade stays within an interrupt-level timing budget. The stages hold
//! no channel identity of their own; the pipeline owns one instance of each
//! stateful stage per channel.

mod biquad;
mod fast;
mod output;
mod pid;

pub use biquad::{Biquad, FILTER_Q};
pub use fast::fast_stage;
pub use output::{CODE_FULL_SCALE, VOLT_LIMIT, clamp_volts, code_to_volts, volts_to_code};
pub use pid::{INTEGRAL_LIMIT, Pid, PidTerms};
