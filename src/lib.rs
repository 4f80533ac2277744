//! Click Latency - measure the time from a mouse click to the first
//! visible change in a chosen screen region.
//!
//! A global input hook timestamps each left-button press (`t1`). The
//! region is then sampled at a fixed interval and every frame is compared
//! to a baseline taken at the click. The first frame whose changed-pixel
//! ratio reaches the strong threshold gives `t2`; if none does before the
//! timeout, the largest change above the weak threshold is reported as a
//! fallback.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Click Latency                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Collector  │──▶│   Session   │──▶│  Detector   │       │
//! │  │ (input hook)│   │  (mailbox)  │   │ (per click) │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                           │                 │               │
//! │                           ▼                 ▼               │
//! │                    ┌─────────────┐   ┌─────────────┐       │
//! │                    │   Report    │   │   Capture   │       │
//! │                    │  + Stats    │   │   + Diff    │       │
//! │                    └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use click_latency::{
//!     capture::{Region, ScreenFrameSource},
//!     collector::{CollectorConfig, HookClickSource},
//!     core::{ConsoleSink, DetectorSettings, DiffEngine, Mode, ResponseDetector, Session, SystemClock},
//!     Config,
//! };
//!
//! let config = Config::default();
//! let settings = DetectorSettings::from_config(&config).expect("valid config");
//! let detector = ResponseDetector::new(settings, DiffEngine::new(config.change_threshold));
//!
//! let mut session = Session::new(
//!     Mode::Once,
//!     Region::new(100, 100, 320, 240),
//!     detector,
//!     ScreenFrameSource::new(),
//!     HookClickSource::new(CollectorConfig::default()),
//!     SystemClock,
//! );
//! let mut sink = ConsoleSink::stdout(config.timeout);
//! let summary = session.run(&mut sink).expect("session failed");
//! println!("{} cycle(s)", summary.outcomes.len());
//! ```

pub mod capture;
pub mod collector;
pub mod config;
pub mod core;
pub mod select;
pub mod stats;

// Re-export key types at crate root for convenience
pub use capture::{CaptureError, Frame, FrameSource, Region, ScreenFrameSource};
pub use collector::{ClickSource, Collector, CollectorConfig, CollectorError, HookClickSource};
pub use config::{Config, ConfigError};
pub use core::{
    DetectError, DiffEngine, Mode, Outcome, ResponseDetector, Session, SessionError,
    SessionSummary, StopSignal,
};
pub use select::{DragSelector, SelectionError};
pub use stats::{LatencyStats, LatencySummary};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Permissions notice that can be displayed to users.
pub const PERMISSIONS_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              CLICK LATENCY - PERMISSIONS AND DATA USE            ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This tool needs two operating system permissions:               ║
║                                                                  ║
║  ✓ INPUT MONITORING                                              ║
║    • To timestamp mouse button presses anywhere on screen        ║
║    • To notice the stop key in continuous mode                   ║
║                                                                  ║
║  ✓ SCREEN RECORDING                                              ║
║    • To sample the selected region after each click              ║
║                                                                  ║
║  ✗ WHAT IS NEVER KEPT:                                           ║
║    • Screen images (frames are compared, then discarded)         ║
║    • Typed text (only the stop key is recognised)                ║
║                                                                  ║
║  On macOS grant both in System Settings → Privacy & Security.    ║
║                                                                  ║
║  Check the current state anytime with:                           ║
║    click-latency status                                          ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
