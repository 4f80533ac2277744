//! Pixel-level change ratio between two frames.
//!
//! A pixel counts as changed when the mean absolute difference of its three
//! channels exceeds the threshold. No spatial filtering is applied; noise is
//! absorbed by the ratio thresholds of the detector instead.

use crate::capture::Frame;

/// Default per-pixel threshold on the 0-255 scale.
pub const DEFAULT_CHANGE_THRESHOLD: u8 = 8;

/// Compares frames of the same region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffEngine {
    threshold: u8,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_THRESHOLD)
    }
}

impl DiffEngine {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Fraction of pixels in `[0, 1]` that changed between `a` and `b`.
    pub fn ratio(&self, a: &Frame, b: &Frame) -> Result<f64, DiffError> {
        if a.width() != b.width() || a.height() != b.height() {
            return Err(DiffError::DimensionMismatch {
                left: (a.width(), a.height()),
                right: (b.width(), b.height()),
            });
        }

        let total = a.width() as usize * a.height() as usize;
        if total == 0 {
            return Ok(0.0);
        }

        // mean > t  <=>  sum > 3t for integer channel sums
        let limit = self.threshold as u16 * 3;
        let changed = a
            .pixels()
            .chunks_exact(3)
            .zip(b.pixels().chunks_exact(3))
            .filter(|(p, q)| {
                let sum: u16 = p
                    .iter()
                    .zip(q.iter())
                    .map(|(&x, &y)| x.abs_diff(y) as u16)
                    .sum();
                sum > limit
            })
            .count();

        Ok(changed as f64 / total as f64)
    }
}

/// Errors from frame comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    /// Frames of different sizes cannot be compared
    DimensionMismatch {
        left: (u32, u32),
        right: (u32, u32),
    },
}

impl std::fmt::Display for DiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffError::DimensionMismatch { left, right } => write!(
                f,
                "Frame size mismatch: {}x{} vs {}x{}",
                left.0, left.1, right.0, right.1
            ),
        }
    }
}

impl std::error::Error for DiffError {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use image::{Rgb, RgbImage};

    fn solid(width: u32, height: u32, color: [u8; 3]) -> Frame {
        Frame::new(RgbImage::from_pixel(width, height, Rgb(color)), Utc::now())
    }

    /// Black frame whose first `changed` pixels (row-major) are set to `color`.
    fn partially_changed(width: u32, height: u32, changed: u32, color: [u8; 3]) -> Frame {
        let image = RgbImage::from_fn(width, height, |x, y| {
            if y * width + x < changed {
                Rgb(color)
            } else {
                Rgb([0, 0, 0])
            }
        });
        Frame::new(image, Utc::now())
    }

    #[test]
    fn test_identical_frames_ratio_zero() {
        let engine = DiffEngine::default();
        let a = solid(16, 9, [120, 40, 200]);
        let b = solid(16, 9, [120, 40, 200]);
        assert_eq!(engine.ratio(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_fully_changed_ratio_one() {
        let engine = DiffEngine::default();
        let a = solid(10, 10, [0, 0, 0]);
        let b = solid(10, 10, [9, 9, 9]);
        assert_eq!(engine.ratio(&a, &b).unwrap(), 1.0);
    }

    #[test]
    fn test_threshold_is_exclusive_on_channel_mean() {
        let engine = DiffEngine::default();
        let base = solid(1, 1, [100, 100, 100]);

        // Mean exactly 8: not changed
        assert_eq!(engine.ratio(&base, &solid(1, 1, [108, 108, 108])).unwrap(), 0.0);
        assert_eq!(engine.ratio(&base, &solid(1, 1, [124, 100, 100])).unwrap(), 0.0);

        // Mean just above 8: changed
        assert_eq!(engine.ratio(&base, &solid(1, 1, [125, 100, 100])).unwrap(), 1.0);
        assert_eq!(engine.ratio(&base, &solid(1, 1, [91, 91, 91])).unwrap(), 1.0);
    }

    #[test]
    fn test_partial_change_ratio() {
        let engine = DiffEngine::default();
        let base = solid(100, 10, [0, 0, 0]);
        let changed = partially_changed(100, 10, 15, [255, 255, 255]);
        let ratio = engine.ratio(&base, &changed).unwrap();
        assert!((ratio - 0.015).abs() < 1e-12);
    }

    #[test]
    fn test_superset_change_is_monotonic() {
        let engine = DiffEngine::default();
        let base = solid(20, 20, [10, 10, 10]);
        let small = partially_changed(20, 20, 30, [60, 60, 60]);
        let large = partially_changed(20, 20, 90, [200, 200, 200]);

        let small_ratio = engine.ratio(&base, &small).unwrap();
        let large_ratio = engine.ratio(&base, &large).unwrap();
        assert!(large_ratio >= small_ratio);
    }

    #[test]
    fn test_dimension_mismatch() {
        let engine = DiffEngine::default();
        let err = engine
            .ratio(&solid(4, 4, [0, 0, 0]), &solid(4, 5, [0, 0, 0]))
            .unwrap_err();
        assert_eq!(
            err,
            DiffError::DimensionMismatch {
                left: (4, 4),
                right: (4, 5)
            }
        );
    }

    #[test]
    fn test_custom_threshold() {
        let strict = DiffEngine::new(0);
        let a = solid(2, 2, [0, 0, 0]);
        let b = solid(2, 2, [0, 0, 1]);
        assert_eq!(strict.ratio(&a, &b).unwrap(), 1.0);
        assert_eq!(DiffEngine::default().ratio(&a, &b).unwrap(), 0.0);
    }
}
