//! Screen capture backend built on `xcap`.
//!
//! Monitor handles are looked up on every call and released when the call
//! returns, so long continuous sessions never accumulate backend resources.

use super::{CaptureError, Frame, FrameSource, Region};

/// Captures regions of the physical screen.
#[derive(Debug, Default)]
pub struct ScreenFrameSource;

impl ScreenFrameSource {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
mod backend {
    use super::*;
    use chrono::Utc;
    use image::{imageops, DynamicImage};
    use xcap::Monitor;

    pub fn capture(region: &Region) -> Result<Frame, CaptureError> {
        let monitor = Monitor::from_point(region.left, region.top)
            .map_err(|_| CaptureError::OutOfBounds(*region))?;

        let bounds = Region::new(monitor.x(), monitor.y(), monitor.width(), monitor.height());
        if !region.is_within(&bounds) {
            return Err(CaptureError::OutOfBounds(*region));
        }

        // Sample time is taken just before the grab
        let captured_at = Utc::now();
        let image = monitor
            .capture_image()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;

        // On HiDPI displays the image is in physical pixels, the monitor in points
        let scale = image.width() as f64 / bounds.width.max(1) as f64;
        let x = ((region.left - bounds.left) as f64 * scale).round() as u32;
        let y = ((region.top - bounds.top) as f64 * scale).round() as u32;
        let width = ((region.width as f64 * scale).round() as u32).min(image.width() - x);
        let height = ((region.height as f64 * scale).round() as u32).min(image.height() - y);

        let cropped = imageops::crop_imm(&image, x, y, width, height).to_image();
        let rgb = DynamicImage::ImageRgba8(cropped).to_rgb8();

        Ok(Frame::new(rgb, captured_at))
    }

    pub fn available() -> bool {
        Monitor::all().map(|m| !m.is_empty()).unwrap_or(false)
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
mod backend {
    use super::*;

    pub fn capture(_region: &Region) -> Result<Frame, CaptureError> {
        Err(CaptureError::Unavailable)
    }

    pub fn available() -> bool {
        false
    }
}

impl FrameSource for ScreenFrameSource {
    fn capture(&mut self, region: &Region) -> Result<Frame, CaptureError> {
        backend::capture(region)
    }
}

/// Whether at least one display can be captured.
pub fn screen_available() -> bool {
    backend::available()
}

#[cfg(all(test, not(any(target_os = "macos", target_os = "windows"))))]
mod tests {
    use super::*;

    #[test]
    fn test_capture_unavailable() {
        let mut source = ScreenFrameSource::new();
        let err = source.capture(&Region::new(0, 0, 10, 10)).unwrap_err();
        assert_eq!(err, CaptureError::Unavailable);
        assert!(!screen_available());
    }
}
