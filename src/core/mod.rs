//! Core measurement logic.
//!
//! This module contains:
//! - Frame differencing
//! - The per-click detection cycle
//! - Session orchestration for once and continuous modes
//! - Report lines for the operator

pub mod clock;
pub mod detector;
pub mod diff;
pub mod report;
pub mod session;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use detector::{
    millis_between, ChangeSample, DetectError, Detection, DetectorSettings, Outcome,
    ResponseDetector,
};
pub use diff::{DiffEngine, DiffError, DEFAULT_CHANGE_THRESHOLD};
pub use report::{format_failure, format_outcome, ConsoleSink, ReportSink, WriterSink};
pub use session::{
    prompt_mode, ClickMailbox, LatchPolicy, Mode, Session, SessionError, SessionInbox,
    SessionSummary, StopSignal,
};
