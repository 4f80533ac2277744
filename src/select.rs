//! Measurement region selection.
//!
//! A region is either given as `left,top,width,height` or picked with a
//! mouse drag: the first left-button press marks one corner and the next
//! release marks the other.
//!
//! The hook only observes input, so the drag also reaches whatever window
//! lies underneath. With an arm key set, clicks are ignored until that key
//! is pressed, which lets the operator move to a harmless spot first.

use crate::capture::Region;
use crate::collector::{InputEvent, Key, Point};
use crate::core::StopSignal;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Granularity of stop and timeout checks while waiting for input.
const SELECT_POLL: Duration = Duration::from_millis(50);

impl Region {
    /// Normalise two opposite corners into a region.
    pub fn from_corners(a: Point, b: Point) -> Result<Region, SelectionError> {
        let (ax, ay) = (a.x.round() as i64, a.y.round() as i64);
        let (bx, by) = (b.x.round() as i64, b.y.round() as i64);

        let left = ax.min(bx);
        let top = ay.min(by);
        let width = (ax - bx).unsigned_abs();
        let height = (ay - by).unsigned_abs();

        if width == 0 || height == 0 {
            return Err(SelectionError::EmptySelection { width, height });
        }

        let convert = |v: i64| {
            i32::try_from(v).map_err(|_| SelectionError::InvalidRegion(format!("{v} out of range")))
        };
        let size = |v: u64| {
            u32::try_from(v).map_err(|_| SelectionError::InvalidRegion(format!("{v} out of range")))
        };

        Ok(Region::new(
            convert(left)?,
            convert(top)?,
            size(width)?,
            size(height)?,
        ))
    }
}

impl FromStr for Region {
    type Err = SelectionError;

    /// Parse `left,top,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(SelectionError::InvalidRegion(format!(
                "expected left,top,width,height, got '{s}'"
            )));
        }

        let coord = |v: &str| {
            v.parse::<i32>()
                .map_err(|e| SelectionError::InvalidRegion(format!("'{v}': {e}")))
        };
        let size = |v: &str| {
            v.parse::<u32>()
                .map_err(|e| SelectionError::InvalidRegion(format!("'{v}': {e}")))
        };

        let region = Region::new(
            coord(parts[0])?,
            coord(parts[1])?,
            size(parts[2])?,
            size(parts[3])?,
        );
        if region.width == 0 || region.height == 0 {
            return Err(SelectionError::EmptySelection {
                width: region.width as u64,
                height: region.height as u64,
            });
        }
        Ok(region)
    }
}

/// Picks a region from a left-button drag seen by the input hook.
pub struct DragSelector<'a> {
    events: &'a Receiver<InputEvent>,
    stop: StopSignal,
    timeout: Duration,
    arm_key: Option<Key>,
}

impl<'a> DragSelector<'a> {
    pub fn new(events: &'a Receiver<InputEvent>, stop: StopSignal, timeout: Duration) -> Self {
        Self {
            events,
            stop,
            timeout,
            arm_key: None,
        }
    }

    /// Ignore clicks until `key` is pressed.
    pub fn with_arm_key(mut self, key: Key) -> Self {
        self.arm_key = Some(key);
        self
    }

    /// Block until a drag completes, the stop signal fires or the wait
    /// times out.
    pub fn select(&self) -> Result<Region, SelectionError> {
        let deadline = Instant::now() + self.timeout;
        let mut start: Option<Point> = None;
        let mut armed = self.arm_key.is_none();

        loop {
            if self.stop.is_triggered() {
                return Err(SelectionError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SelectionError::TimedOut(self.timeout));
            }

            let event = match self.events.recv_timeout(remaining.min(SELECT_POLL)) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(SelectionError::Cancelled),
            };

            let click = match event {
                InputEvent::Click(click) if armed => click,
                InputEvent::Key(key) if !armed && key.is_key_down && Some(key.key) == self.arm_key => {
                    debug!(key = %key.key, "selection armed");
                    armed = true;
                    continue;
                }
                _ => continue,
            };
            let Some(position) = click.position else {
                warn!("click without a position ignored during selection");
                continue;
            };

            match start {
                None if click.is_left_down() => {
                    debug!(x = position.x, y = position.y, "selection started");
                    start = Some(position);
                }
                Some(corner) if click.is_left_up() => {
                    let region = Region::from_corners(corner, position)?;
                    info!(%region, "region selected");
                    return Ok(region);
                }
                _ => {}
            }
        }
    }
}

/// Region selection errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionError {
    /// The dragged rectangle has zero width or height
    EmptySelection { width: u64, height: u64 },
    /// The region text or coordinates could not be used
    InvalidRegion(String),
    /// Selection was aborted before it completed
    Cancelled,
    /// No drag completed within the allowed time
    TimedOut(Duration),
}

impl std::fmt::Display for SelectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionError::EmptySelection { width, height } => write!(
                f,
                "Selected region is empty (width={width}, height={height})"
            ),
            SelectionError::InvalidRegion(e) => write!(f, "Invalid region: {e}"),
            SelectionError::Cancelled => write!(f, "Region selection cancelled"),
            SelectionError::TimedOut(t) => {
                write!(f, "No region selected within {}s", t.as_secs_f64())
            }
        }
    }
}

impl std::error::Error for SelectionError {}
