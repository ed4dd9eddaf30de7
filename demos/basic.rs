//! Run the four-channel pipeline against the mock front end: feed a
//! constant level, retune a channel while the loop is live, and read the
//! monitoring values back out.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sigcond::stage::volts_to_code;
use sigcond::{
    CHANNEL_COUNT, ChannelConfig, MockOutputSink, MockSampleSource, ParameterStore,
    PipelineDriver, diag, logging,
};

fn main() -> Result<(), String> {
    logging::init_logging(Path::new("./logs"), "basic")?;

    let store = Arc::new(ParameterStore::new());
    for ch in 0..CHANNEL_COUNT {
        ChannelConfig {
            cutoff_hz: 250.0,
            sample_rate_hz: 2000.0,
            fast_gain: 2.0,
            ..Default::default()
        }
        .apply(&store, ch)?;
    }

    let source = Arc::new(MockSampleSource::new());
    let sink = Arc::new(MockOutputSink::new());
    let (diag_tx, diag_rx) = diag::diag_channel();
    let diag_worker = diag::spawn_worker(diag_rx);

    // 2.5 V into channel 0
    source.set_level(0, volts_to_code(2.5));

    let handle = PipelineDriver::new(store.clone(), source.clone(), sink.clone(), diag_tx)
        .summary_every(500)
        .spawn()?;

    thread::sleep(Duration::from_millis(300));

    // Retune channel 0 while the loop is running
    store.set_param(0, "cutoff_hz", 50.0)?;
    store.set_param(0, "setpoint", 1.0)?;

    thread::sleep(Duration::from_millis(300));

    for name in ["raw_volts", "filtered", "fast_error", "fast_output", "output_volts"] {
        let value = store.read_monitor(0, name)?;
        tracing::info!("channel 0 {name} = {value:.4}");
    }
    tracing::info!(
        "channel 0 last output code: {:?}, process duration: {:?} ns",
        sink.last_code(0),
        store.duration_ns(0)
    );

    handle.stop();
    let _ = diag_worker.join();
    Ok(())
}
