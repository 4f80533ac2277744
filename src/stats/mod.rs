//! Per-session measurement statistics.
//!
//! Nothing here is persisted; the summary is printed when a session ends
//! and included in `--export` documents.

pub mod latency;

// Re-export commonly used types
pub use latency::{LatencyStats, LatencySummary};
