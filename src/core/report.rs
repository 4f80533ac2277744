//! Operator-facing report lines, one per completed cycle.

use crate::core::detector::{millis_between, DetectError, Outcome};
use crate::core::session::Mode;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::time::Duration;

/// Receives the result of every cycle as it completes.
pub trait ReportSink {
    fn outcome(&mut self, mode: Mode, outcome: &Outcome);

    /// A cycle aborted before it could be classified.
    fn cycle_failed(&mut self, mode: Mode, t1: DateTime<Utc>, error: &DetectError);
}

/// Writes report lines to any writer; stdout for the binary.
pub struct WriterSink<W: Write> {
    writer: W,
    timeout: Duration,
}

/// Report sink printing to standard output.
pub type ConsoleSink = WriterSink<std::io::Stdout>;

impl ConsoleSink {
    pub fn stdout(timeout: Duration) -> Self {
        WriterSink::new(std::io::stdout(), timeout)
    }
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W, timeout: Duration) -> Self {
        Self { writer, timeout }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.writer, "{line}").and_then(|_| self.writer.flush()) {
            tracing::warn!("failed to write report line: {e}");
        }
    }
}

impl<W: Write> ReportSink for WriterSink<W> {
    fn outcome(&mut self, mode: Mode, outcome: &Outcome) {
        let line = format_outcome(mode, outcome, self.timeout);
        self.write_line(&line);
    }

    fn cycle_failed(&mut self, mode: Mode, t1: DateTime<Utc>, error: &DetectError) {
        let line = format_failure(mode, t1, error);
        self.write_line(&line);
    }
}

/// Unix time in seconds with microseconds.
fn epoch(t: DateTime<Utc>) -> String {
    format!("{:.6}", t.timestamp_micros() as f64 / 1_000_000.0)
}

/// Render one outcome as a single report line.
pub fn format_outcome(mode: Mode, outcome: &Outcome, timeout: Duration) -> String {
    match outcome {
        Outcome::Strong { t1, t2, ratio } => format!(
            "[{mode} · response] t1(click)={}, t2(change)={}, Δt = {:.2} ms, ratio={ratio:.3}",
            epoch(*t1),
            epoch(*t2),
            millis_between(*t1, *t2),
        ),
        Outcome::WeakFallback {
            t1,
            t_best,
            best_ratio,
        } => format!(
            "[{mode} · weak fallback] t1(click)={}, t2(max change)={}, Δt ≈ {:.2} ms, max ratio={best_ratio:.3}",
            epoch(*t1),
            epoch(*t_best),
            millis_between(*t1, *t_best),
        ),
        Outcome::NoChange { t1 } => format!(
            "[{mode} · no change] no visible change in the region within {}s after the click at t1={}",
            timeout.as_secs_f64(),
            epoch(*t1),
        ),
    }
}

/// Render an aborted cycle as a single report line.
pub fn format_failure(mode: Mode, t1: DateTime<Utc>, error: &DetectError) -> String {
    format!("[{mode} · capture failed] t1(click)={}: {error}", epoch(t1))
}
