//! Screen-region capture.
//!
//! `FrameSource` is the seam between the measurement loop and the capture
//! backend. The detector only ever calls `capture`, so tests substitute
//! scripted sources and the binary uses `ScreenFrameSource`.

pub mod frame;
pub mod screen;

pub use frame::{Frame, Region};
pub use screen::{screen_available, ScreenFrameSource};

/// Produces timestamped frames of a region.
pub trait FrameSource {
    /// Capture the region once. The frame's timestamp is the sample time.
    fn capture(&mut self, region: &Region) -> Result<Frame, CaptureError>;
}

impl<F: FrameSource + ?Sized> FrameSource for &mut F {
    fn capture(&mut self, region: &Region) -> Result<Frame, CaptureError> {
        (**self).capture(region)
    }
}

impl<F: FrameSource + ?Sized> FrameSource for Box<F> {
    fn capture(&mut self, region: &Region) -> Result<Frame, CaptureError> {
        (**self).capture(region)
    }
}

/// Errors that can occur while capturing a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// The region is not inside one addressable display
    OutOfBounds(Region),
    /// The capture backend reported a failure
    Backend(String),
    /// No capture backend exists on this platform
    Unavailable,
}

impl CaptureError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::Backend(_))
    }
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::OutOfBounds(region) => {
                write!(f, "Region {region} lies outside the display")
            }
            CaptureError::Backend(e) => write!(f, "Screen capture failed: {e}"),
            CaptureError::Unavailable => {
                write!(f, "Screen capture is not supported on this platform")
            }
        }
    }
}

impl std::error::Error for CaptureError {}
