//! Signal conditioning and control for a four-channel analog front end.
//!
//! Each channel runs a fixed-rate pipeline: biquad low-pass filter, fast
//! proportional stage, optional PID controller with anti-windup, output
//! clamping, and conversion to a hardware output code. Tunable parameters
//! and per-stage monitoring values are shared with an asynchronous command
//! interface through single-field atomic cells, so the sample path never
//! locks, blocks, or allocates.

pub mod diag;
pub mod driver;
pub mod hardware;
pub mod logging;
pub mod pipeline;
pub mod stage;
pub mod store;

pub use driver::{DriverHandle, PipelineDriver};
pub use hardware::{MockOutputSink, MockSampleSource, OutputSink, SampleSource};
pub use pipeline::{ChannelBank, ChannelPipeline};
pub use store::{ChannelConfig, ParameterStore};

/// Number of independent analog input/output channels.
pub const CHANNEL_COUNT: usize = 4;
