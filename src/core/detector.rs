//! Response detection for a single click.
//!
//! One detection cycle runs the state machine
//!
//! ```text
//! AwaitingBaseline ──▶ Polling ──┬──▶ Strong
//!                      ▲    │    ├──▶ WeakFallback
//!                      └────┘    └──▶ NoChange
//! ```
//!
//! Polling samples the region, compares it with the baseline and exits on
//! the first sample at or above the strong ratio. Otherwise it remembers the
//! largest ratio seen and, once the deadline has passed, falls back to that
//! sample if it reaches the weak ratio. The strong check always runs before
//! the deadline check, so a strong sample taken at or before the deadline
//! wins even when the deadline passes during that same iteration. Frames
//! stamped after the deadline never take part in classification.

use crate::capture::{CaptureError, Frame, FrameSource, Region};
use crate::config::{Config, ConfigError};
use crate::core::clock::Clock;
use crate::core::diff::{DiffEngine, DiffError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Validated detector parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    strong_ratio: f64,
    weak_ratio: f64,
    timeout: Duration,
    deadline_offset: chrono::Duration,
    poll_interval: Duration,
    capture_retries: u32,
    capture_retry_delay: Duration,
}

impl DetectorSettings {
    /// Build settings from a configuration, rejecting unusable values.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let deadline_offset = chrono::Duration::from_std(config.timeout)
            .map_err(|_| ConfigError::Invalid("timeout is too large".into()))?;

        Ok(Self {
            strong_ratio: config.strong_ratio,
            weak_ratio: config.weak_ratio,
            timeout: config.timeout,
            deadline_offset,
            poll_interval: config.poll_interval,
            capture_retries: config.capture_retries,
            capture_retry_delay: config.capture_retry_delay,
        })
    }

    pub fn strong_ratio(&self) -> f64 {
        self.strong_ratio
    }

    pub fn weak_ratio(&self) -> f64 {
        self.weak_ratio
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn capture_retries(&self) -> u32 {
        self.capture_retries
    }
}

/// One comparison against the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChangeSample {
    pub timestamp: DateTime<Utc>,
    pub ratio: f64,
}

/// Classification of one detection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// A sample reached the strong ratio at `t2`
    Strong {
        t1: DateTime<Utc>,
        t2: DateTime<Utc>,
        ratio: f64,
    },
    /// No strong sample before the deadline; the largest weak one is reported
    WeakFallback {
        t1: DateTime<Utc>,
        t_best: DateTime<Utc>,
        best_ratio: f64,
    },
    /// Nothing reached the weak ratio before the deadline
    NoChange { t1: DateTime<Utc> },
}

impl Outcome {
    /// Click time.
    pub fn t1(&self) -> DateTime<Utc> {
        match self {
            Outcome::Strong { t1, .. }
            | Outcome::WeakFallback { t1, .. }
            | Outcome::NoChange { t1 } => *t1,
        }
    }

    /// Time of the reported change, if any.
    pub fn response_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Outcome::Strong { t2, .. } => Some(*t2),
            Outcome::WeakFallback { t_best, .. } => Some(*t_best),
            Outcome::NoChange { .. } => None,
        }
    }

    /// Measured ratio, if any.
    pub fn ratio(&self) -> Option<f64> {
        match self {
            Outcome::Strong { ratio, .. } => Some(*ratio),
            Outcome::WeakFallback { best_ratio, .. } => Some(*best_ratio),
            Outcome::NoChange { .. } => None,
        }
    }

    /// Click-to-change latency in milliseconds.
    pub fn latency_ms(&self) -> Option<f64> {
        self.response_time().map(|t| millis_between(self.t1(), t))
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, Outcome::Strong { .. })
    }
}

/// Signed milliseconds from `start` to `end`, with microsecond precision.
pub fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1000.0,
        None => delta.num_milliseconds() as f64,
    }
}

/// Result of a finished cycle.
#[derive(Debug, Clone)]
pub struct Detection {
    pub outcome: Outcome,
    /// Last frame compared; for a strong outcome this is the post-response frame
    pub final_frame: Option<Frame>,
    /// Number of frames compared against the baseline
    pub samples: u32,
}

/// Errors that abort a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectError {
    Capture(CaptureError),
    Diff(DiffError),
}

impl std::fmt::Display for DetectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectError::Capture(e) => write!(f, "{e}"),
            DetectError::Diff(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DetectError {}

impl From<CaptureError> for DetectError {
    fn from(e: CaptureError) -> Self {
        DetectError::Capture(e)
    }
}

impl From<DiffError> for DetectError {
    fn from(e: DiffError) -> Self {
        DetectError::Diff(e)
    }
}

/// Runs detection cycles. Holds no per-cycle state, so one detector can
/// serve any number of consecutive cycles.
#[derive(Debug, Clone)]
pub struct ResponseDetector {
    settings: DetectorSettings,
    diff: DiffEngine,
}

impl ResponseDetector {
    pub fn new(settings: DetectorSettings, diff: DiffEngine) -> Self {
        Self { settings, diff }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Run one cycle for a click at `t1`.
    ///
    /// When `baseline` is `None` it is captured first; otherwise the given
    /// frame is used as the cycle's baseline.
    pub fn detect<F, C>(
        &self,
        frames: &mut F,
        clock: &C,
        region: &Region,
        t1: DateTime<Utc>,
        baseline: Option<Frame>,
    ) -> Result<Detection, DetectError>
    where
        F: FrameSource + ?Sized,
        C: Clock + ?Sized,
    {
        let mut cycle = Cycle {
            settings: &self.settings,
            diff: &self.diff,
            region,
            t1,
            deadline: t1 + self.settings.deadline_offset,
            samples: 0,
            phase: Phase::AwaitingBaseline { preset: baseline },
        };

        let (outcome, last) = loop {
            match std::mem::replace(&mut cycle.phase, Phase::AwaitingBaseline { preset: None }) {
                Phase::Finished { outcome, last } => break (outcome, last),
                phase => {
                    cycle.phase = phase;
                    cycle.step(frames, clock)?;
                }
            }
        };

        debug!(?outcome, samples = cycle.samples, "detection cycle finished");
        Ok(Detection {
            outcome,
            final_frame: last,
            samples: cycle.samples,
        })
    }
}

enum Phase {
    AwaitingBaseline {
        preset: Option<Frame>,
    },
    Polling {
        baseline: Frame,
        best: Option<ChangeSample>,
        last: Option<Frame>,
    },
    Finished {
        outcome: Outcome,
        last: Option<Frame>,
    },
}

struct Cycle<'a> {
    settings: &'a DetectorSettings,
    diff: &'a DiffEngine,
    region: &'a Region,
    t1: DateTime<Utc>,
    deadline: DateTime<Utc>,
    samples: u32,
    phase: Phase,
}

impl Cycle<'_> {
    fn step<F, C>(&mut self, frames: &mut F, clock: &C) -> Result<(), DetectError>
    where
        F: FrameSource + ?Sized,
        C: Clock + ?Sized,
    {
        let phase = std::mem::replace(&mut self.phase, Phase::AwaitingBaseline { preset: None });

        self.phase = match phase {
            Phase::AwaitingBaseline { preset } => {
                let baseline = match preset {
                    Some(frame) => frame,
                    None => self.capture(frames, clock)?,
                };
                debug!(t1 = %self.t1, deadline = %self.deadline, "baseline ready, polling");
                Phase::Polling {
                    baseline,
                    best: None,
                    last: None,
                }
            }

            Phase::Polling {
                baseline,
                mut best,
                last,
            } => {
                let frame = self.capture(frames, clock)?;
                let sampled_at = frame.captured_at();

                if sampled_at > self.deadline {
                    trace!(%sampled_at, "sample taken after deadline, ignored");
                    Phase::Finished {
                        outcome: self.fallback(best),
                        last,
                    }
                } else {
                    let ratio = self.diff.ratio(&baseline, &frame)?;
                    self.samples += 1;
                    trace!(ratio, %sampled_at, "sample");

                    if ratio >= self.settings.strong_ratio {
                        Phase::Finished {
                            outcome: Outcome::Strong {
                                t1: self.t1,
                                t2: sampled_at,
                                ratio,
                            },
                            last: Some(frame),
                        }
                    } else {
                        if best.map_or(true, |b| ratio > b.ratio) {
                            best = Some(ChangeSample {
                                timestamp: sampled_at,
                                ratio,
                            });
                        }

                        if clock.now() > self.deadline {
                            Phase::Finished {
                                outcome: self.fallback(best),
                                last: Some(frame),
                            }
                        } else {
                            clock.sleep(self.settings.poll_interval);
                            Phase::Polling {
                                baseline,
                                best,
                                last: Some(frame),
                            }
                        }
                    }
                }
            }

            finished @ Phase::Finished { .. } => finished,
        };

        Ok(())
    }

    fn fallback(&self, best: Option<ChangeSample>) -> Outcome {
        match best {
            Some(sample) if sample.ratio >= self.settings.weak_ratio => Outcome::WeakFallback {
                t1: self.t1,
                t_best: sample.timestamp,
                best_ratio: sample.ratio,
            },
            _ => Outcome::NoChange { t1: self.t1 },
        }
    }

    /// Capture with the bounded retry policy for transient backend errors.
    fn capture<F, C>(&self, frames: &mut F, clock: &C) -> Result<Frame, CaptureError>
    where
        F: FrameSource + ?Sized,
        C: Clock + ?Sized,
    {
        let mut attempt = 0;
        loop {
            match frames.capture(self.region) {
                Ok(frame) => return Ok(frame),
                Err(e) if e.is_transient() && attempt < self.settings.capture_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "capture failed, retrying");
                    clock.sleep(self.settings.capture_retry_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
