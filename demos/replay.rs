//! Replay example - feed a recorded press through the engine
//!
//! Shows the library without any hardware: a scripted magnet approach,
//! a one-second hold and a release, with actions printed instead of sent.
//! Run with: `cargo run --example replay`

use magnet_controller::{
    Action, ActionSink, DispatchOutcome, EngineConfig, MagnetEngine, ReplaySource, SampleSource,
};
use std::time::Duration;

struct PrintSink;

impl ActionSink for PrintSink {
    fn submit(&mut self, action: Action) -> Option<DispatchOutcome> {
        println!("  -> action: {}", action);
        None
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::with_thresholds(500.0, 300.0, Duration::from_millis(800));
    let mut engine = MagnetEngine::builder(config).sink(Box::new(PrintSink)).build();

    // Short tap, then a long hold on the south pole
    let mut source = ReplaySource::vertical(&[
        (40.0, 0),
        (620.0, 100),
        (610.0, 300),
        (120.0, 400),
        (-650.0, 1000),
        (-640.0, 1500),
        (-630.0, 1900),
        (-90.0, 2200),
    ]);

    while let Some(sample) = source.next_sample()? {
        let report = engine.process(sample);
        println!(
            "t={:>5}ms  |B|={:>6.1}µT  {:?}",
            report.sample.timestamp_ms, report.sample.magnitude, report.status
        );
        if let Some(gesture) = report.gesture {
            println!("  gesture: {}", gesture);
        }
    }

    Ok(())
}
