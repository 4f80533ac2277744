//! Live change-ratio probe for tuning thresholds.
//!
//! This example shows how to:
//! 1. Capture a screen region with `ScreenFrameSource`
//! 2. Compare each new frame against the first one with `DiffEngine`
//! 3. Judge where the strong and weak ratios should sit for a target
//!
//! Run with: cargo run --example probe_demo -- 100,100,320,240
//!
//! Note: Requires Screen Recording permission on macOS.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use click_latency::{
    capture::{screen_available, FrameSource, Region, ScreenFrameSource},
    core::DiffEngine,
    Config,
};

fn main() {
    println!("Click Latency - Change Probe");
    println!("============================");
    println!();

    let region: Region = match std::env::args().nth(1).map(|s| s.parse()) {
        Some(Ok(region)) => region,
        Some(Err(e)) => {
            eprintln!("{e}");
            return;
        }
        None => Region::new(100, 100, 320, 240),
    };

    print!("Checking screen capture... ");
    if screen_available() {
        println!("OK ✓");
    } else {
        println!("FAILED ✗");
        println!("No display could be enumerated on this platform.");
        return;
    }

    let config = Config::load().unwrap_or_default();
    let engine = DiffEngine::new(config.change_threshold);
    let mut source = ScreenFrameSource::new();

    let baseline = match source.capture(&region) {
        Ok(frame) => frame,
        Err(e) => {
            eprintln!("Baseline capture failed: {e}");
            return;
        }
    };

    println!("Region: {region}");
    println!(
        "Thresholds: strong {:.3}, weak {:.3}",
        config.strong_ratio, config.weak_ratio
    );
    println!("Interact with the region; press Ctrl+C to stop.");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let mut peak = 0.0_f64;
    while running.load(Ordering::SeqCst) {
        match source.capture(&region) {
            Ok(frame) => match engine.ratio(&baseline, &frame) {
                Ok(ratio) => {
                    peak = peak.max(ratio);
                    let marker = if ratio >= config.strong_ratio {
                        "strong"
                    } else if ratio >= config.weak_ratio {
                        "weak"
                    } else {
                        ""
                    };
                    println!(
                        "[{}] ratio {ratio:.4} (peak {peak:.4}) {marker}",
                        frame.captured_at().format("%H:%M:%S%.3f")
                    );
                }
                Err(e) => {
                    eprintln!("{e}");
                    break;
                }
            },
            Err(e) => eprintln!("Capture failed: {e}"),
        }
        std::thread::sleep(Duration::from_millis(250));
    }

    println!();
    println!("Peak ratio: {peak:.4}");
}
