//! Measurement session: mode selection, click latching and the cycle loop.
//!
//! Input events arrive on the collector's thread and are handed over
//! through a [`ClickMailbox`]; detection runs on the session's thread.
//! In `Once` mode the first click is latched and later ones are ignored.
//! In `Continuous` mode a click arriving while a cycle is polling is held
//! and starts the next cycle; if several arrive, the latest one wins.

use crate::capture::{CaptureError, Frame, FrameSource, Region};
use crate::collector::{ClickSource, CollectorError, InputEvent, InputSubscriber, Key};
use crate::core::clock::Clock;
use crate::core::detector::{DetectError, Outcome, ResponseDetector};
use crate::core::diff::DiffError;
use crate::core::report::ReportSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the session blocks on the mailbox before re-checking for stop.
const WAIT_TICK: Duration = Duration::from_millis(50);

/// Measurement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// One click, one cycle
    Once,
    /// Cycles repeat until the stop key is pressed
    Continuous,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Once => write!(f, "once"),
            Mode::Continuous => write!(f, "continuous"),
        }
    }
}

impl FromStr for Mode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "once" => Ok(Mode::Once),
            "2" | "continuous" => Ok(Mode::Continuous),
            other => Err(SessionError::InvalidModeSelection(other.to_string())),
        }
    }
}

/// Ask the operator for a mode on `output` and read one line from `input`.
///
/// Anything other than `1` or `2` is an error; there is no re-prompt. A stop
/// requested while the prompt was waiting wins over whatever was typed.
pub fn prompt_mode<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    stop: &StopSignal,
) -> Result<Mode, SessionError> {
    let io_err = |e: std::io::Error| SessionError::Io(e.to_string());

    writeln!(output, "Select measurement mode:").map_err(io_err)?;
    writeln!(output, "  1) once        measure a single click").map_err(io_err)?;
    writeln!(output, "  2) continuous  measure every click until the stop key").map_err(io_err)?;
    write!(output, "> ").map_err(io_err)?;
    output.flush().map_err(io_err)?;

    let mut line = String::new();
    input.read_line(&mut line).map_err(io_err)?;
    if stop.is_triggered() {
        return Err(SessionError::Cancelled);
    }
    line.trim().parse()
}

/// Shared flag that ends a session at the next check.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a mailbox does with a click when one was already accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchPolicy {
    /// Only the first click ever posted is accepted
    FirstWins,
    /// A newer click replaces one still pending
    LatestWins,
}

#[derive(Debug, Default)]
struct MailboxState {
    pending: Option<DateTime<Utc>>,
    latched: bool,
    superseded: u64,
}

/// Single-slot hand-off of click timestamps between threads.
#[derive(Debug)]
pub struct ClickMailbox {
    policy: LatchPolicy,
    state: Mutex<MailboxState>,
    ready: Condvar,
}

impl ClickMailbox {
    pub fn new(policy: LatchPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(MailboxState::default()),
            ready: Condvar::new(),
        }
    }

    /// Offer a click. Returns `false` if the policy rejected it.
    pub fn post(&self, t1: DateTime<Utc>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match self.policy {
            LatchPolicy::FirstWins => {
                if state.latched {
                    return false;
                }
                state.latched = true;
            }
            LatchPolicy::LatestWins => {
                if state.pending.is_some() {
                    state.superseded += 1;
                }
            }
        }
        state.pending = Some(t1);
        self.ready.notify_all();
        true
    }

    /// Take the pending click without waiting.
    pub fn take(&self) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .take()
    }

    /// Take the pending click, waiting up to `timeout` for one to arrive.
    pub fn wait_take(&self, timeout: Duration) -> Option<DateTime<Utc>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.pending.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        state.pending.take()
    }

    /// Clicks overwritten before a cycle could start on them.
    pub fn superseded(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .superseded
    }
}

/// Routes input events into a session: left-button presses go to the
/// mailbox, the stop key triggers the stop signal.
pub struct SessionInbox {
    mailbox: Arc<ClickMailbox>,
    stop: StopSignal,
    stop_key: Option<Key>,
}

impl SessionInbox {
    pub fn new(mailbox: Arc<ClickMailbox>, stop: StopSignal, stop_key: Option<Key>) -> Self {
        Self {
            mailbox,
            stop,
            stop_key,
        }
    }
}

impl InputSubscriber for SessionInbox {
    fn on_event(&self, event: InputEvent) {
        match event {
            InputEvent::Click(click) if click.is_left_down() => {
                if !self.mailbox.post(click.timestamp) {
                    debug!(t1 = %click.timestamp, "click ignored");
                }
            }
            InputEvent::Key(key) if key.is_key_down && Some(key.key) == self.stop_key => {
                info!(key = %key.key, "stop key pressed");
                self.stop.trigger();
            }
            _ => {}
        }
    }
}

/// What a session did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub mode: Mode,
    pub region: Region,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcomes: Vec<Outcome>,
    /// Cycles abandoned because the screen could not be captured
    pub failed_cycles: u32,
    /// Clicks replaced by a later click before their cycle started
    pub superseded_clicks: u64,
}

/// Drives detection cycles for clicks delivered by a click source.
pub struct Session<F, K, C> {
    mode: Mode,
    region: Region,
    detector: ResponseDetector,
    frames: F,
    clicks: K,
    clock: C,
    stop: StopSignal,
    stop_key: Key,
}

impl<F, K, C> Session<F, K, C>
where
    F: FrameSource,
    K: ClickSource,
    C: Clock,
{
    pub fn new(
        mode: Mode,
        region: Region,
        detector: ResponseDetector,
        frames: F,
        clicks: K,
        clock: C,
    ) -> Self {
        Self {
            mode,
            region,
            detector,
            frames,
            clicks,
            clock,
            stop: StopSignal::new(),
            stop_key: Key::Escape,
        }
    }

    /// Key that ends a continuous session.
    pub fn with_stop_key(mut self, key: Key) -> Self {
        self.stop_key = key;
        self
    }

    /// Share an externally owned stop signal, e.g. one wired to Ctrl+C.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Run the session to completion.
    ///
    /// The click source is subscribed for the duration of the call and is
    /// always unsubscribed before returning.
    pub fn run(&mut self, sink: &mut dyn ReportSink) -> Result<SessionSummary, SessionError> {
        let policy = match self.mode {
            Mode::Once => LatchPolicy::FirstWins,
            Mode::Continuous => LatchPolicy::LatestWins,
        };
        let mailbox = Arc::new(ClickMailbox::new(policy));
        let stop_key = (self.mode == Mode::Continuous).then_some(self.stop_key);
        let inbox = SessionInbox::new(mailbox.clone(), self.stop.clone(), stop_key);

        let mut summary = SessionSummary {
            mode: self.mode,
            region: self.region,
            started_at: self.clock.now(),
            ended_at: self.clock.now(),
            outcomes: Vec::new(),
            failed_cycles: 0,
            superseded_clicks: 0,
        };

        self.clicks.subscribe(Arc::new(inbox))?;
        info!(mode = %self.mode, region = %self.region, "session started");

        let result = match self.mode {
            Mode::Once => self.run_once(&mailbox, sink, &mut summary),
            Mode::Continuous => self.run_continuous(&mailbox, sink, &mut summary),
        };

        self.clicks.unsubscribe();

        summary.ended_at = self.clock.now();
        summary.superseded_clicks = mailbox.superseded();
        info!(
            cycles = summary.outcomes.len(),
            failed = summary.failed_cycles,
            "session ended"
        );
        result.map(|_| summary)
    }

    fn run_once(
        &mut self,
        mailbox: &ClickMailbox,
        sink: &mut dyn ReportSink,
        summary: &mut SessionSummary,
    ) -> Result<(), SessionError> {
        let t1 = loop {
            if self.stop.is_triggered() {
                info!("stopped before a click was received");
                return Ok(());
            }
            if let Some(t1) = mailbox.wait_take(WAIT_TICK) {
                break t1;
            }
        };

        debug!(%t1, "click received");
        let detection = self
            .detector
            .detect(&mut self.frames, &self.clock, &self.region, t1, None)?;
        sink.outcome(Mode::Once, &detection.outcome);
        summary.outcomes.push(detection.outcome);
        Ok(())
    }

    fn run_continuous(
        &mut self,
        mailbox: &ClickMailbox,
        sink: &mut dyn ReportSink,
        summary: &mut SessionSummary,
    ) -> Result<(), SessionError> {
        // Post-response frame of the previous strong cycle, with its end time
        let mut carried: Option<(Frame, DateTime<Utc>)> = None;

        loop {
            if self.stop.is_triggered() {
                info!("stop requested");
                return Ok(());
            }
            let Some(t1) = mailbox.wait_take(WAIT_TICK) else {
                continue;
            };

            // A click made while the previous cycle was still polling is
            // measured against the screen as that cycle left it
            let baseline = match carried.take() {
                Some((frame, ended)) if t1 <= ended => Some(frame),
                _ => None,
            };
            debug!(%t1, carried = baseline.is_some(), "cycle started");

            match self
                .detector
                .detect(&mut self.frames, &self.clock, &self.region, t1, baseline)
            {
                Ok(detection) => {
                    sink.outcome(Mode::Continuous, &detection.outcome);
                    if detection.outcome.is_strong() {
                        if let Some(frame) = detection.final_frame {
                            carried = Some((frame, self.clock.now()));
                        }
                    }
                    summary.outcomes.push(detection.outcome);
                }
                Err(DetectError::Capture(e)) => {
                    warn!(%t1, "cycle abandoned: {e}");
                    sink.cycle_failed(Mode::Continuous, t1, &DetectError::Capture(e));
                    summary.failed_cycles += 1;
                }
                Err(DetectError::Diff(e)) => return Err(SessionError::Diff(e)),
            }
        }
    }
}

/// Session errors.
#[derive(Debug)]
pub enum SessionError {
    /// The mode answer was not `1` or `2`
    InvalidModeSelection(String),
    /// Stop was requested before the session started
    Cancelled,
    Collector(CollectorError),
    Capture(CaptureError),
    Diff(DiffError),
    Io(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::InvalidModeSelection(s) => {
                write!(f, "Invalid mode selection '{s}': expected 1 or 2")
            }
            SessionError::Cancelled => write!(f, "Cancelled before the session started"),
            SessionError::Collector(e) => write!(f, "Input hook error: {e}"),
            SessionError::Capture(e) => write!(f, "{e}"),
            SessionError::Diff(e) => write!(f, "{e}"),
            SessionError::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<CollectorError> for SessionError {
    fn from(e: CollectorError) -> Self {
        SessionError::Collector(e)
    }
}

impl From<DetectError> for SessionError {
    fn from(e: DetectError) -> Self {
        match e {
            DetectError::Capture(e) => SessionError::Capture(e),
            DetectError::Diff(e) => SessionError::Diff(e),
        }
    }
}
