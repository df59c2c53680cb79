//! Fracture detection: keep elongated regions and measure their
//! centreline length.

use crate::contour::{fill, find_external};
use crate::geometry::{contour_area, contour_endpoints, min_area_rect};
use crate::skeleton::skeleton_length;
use crate::types::{BinaryMask, Contour, PixelPoint};

/// Acceptance thresholds for candidate fractures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractureCriteria {
    /// Smallest long-side / short-side ratio of the bounding rectangle.
    pub min_aspect_ratio: f64,
    /// Smallest skeleton length, in pixels.
    pub min_length_pixels: f64,
}

impl FractureCriteria {
    /// Default minimum aspect ratio.
    pub const DEFAULT_MIN_ASPECT_RATIO: f64 = 5.0;
    /// Default minimum length.
    pub const DEFAULT_MIN_LENGTH_PIXELS: f64 = 10.0;
}

impl Default for FractureCriteria {
    fn default() -> Self {
        Self {
            min_aspect_ratio: Self::DEFAULT_MIN_ASPECT_RATIO,
            min_length_pixels: Self::DEFAULT_MIN_LENGTH_PIXELS,
        }
    }
}

/// A measured fracture.
#[derive(Debug, Clone, PartialEq)]
pub struct Fracture {
    /// Outer contour (a convex hull after merging).
    pub contour: Contour,
    /// Contour area in pixels.
    pub area: f64,
    /// Skeleton pixel count.
    pub length: f64,
    /// Long side over short side of the minimum-area rectangle.
    pub aspect_ratio: f64,
    /// Long-side orientation in degrees, `[0, 180)`.
    pub angle: f64,
    /// Long-side midpoints of the rectangle, snapped to the contour.
    pub endpoints: [PixelPoint; 2],
}

impl Fracture {
    /// Measure `contour` without applying any acceptance criteria.
    ///
    /// Returns `None` for contours too short to fit or whose rectangle
    /// has a zero-length side.
    #[must_use]
    pub fn measure(contour: Contour) -> Option<Self> {
        if !contour.is_fittable() {
            return None;
        }
        Self::measure_shape(contour)
    }

    /// Measure a contour of any point count, such as a merged convex
    /// hull. Returns `None` only for a degenerate rectangle.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn measure_shape(contour: Contour) -> Option<Self> {
        let rect = min_area_rect(&contour)?;
        let aspect_ratio = rect.aspect_ratio()?;
        let endpoints = contour_endpoints(&contour)?;
        let length = skeleton_length(&fill(&contour).mask) as f64;
        Some(Self {
            area: contour_area(&contour),
            length,
            aspect_ratio,
            angle: rect.angle(),
            endpoints,
            contour,
        })
    }
}

/// Find fractures in `mask` (fractures at 255).
#[must_use = "returns the detected fractures"]
pub fn detect(mask: &BinaryMask, criteria: &FractureCriteria) -> Vec<Fracture> {
    let contours = find_external(mask);
    let candidates = contours.len();
    let fractures: Vec<Fracture> = contours
        .into_iter()
        .filter_map(|contour| {
            let fracture = Fracture::measure(contour)?;
            if fracture.aspect_ratio < criteria.min_aspect_ratio {
                return None;
            }
            if fracture.length < criteria.min_length_pixels {
                log::debug!("fracture candidate too short: {} px", fracture.length);
                return None;
            }
            Some(fracture)
        })
        .collect();
    log::debug!("fracture detection: {} of {candidates} contours kept", fractures.len());
    fractures
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A horizontal line of `len` pixels starting at `x0`, dilated to
    /// five pixels wide.
    fn thick_line(x0: u32, y: u32, len: u32) -> impl Fn(u32, u32) -> bool {
        move |px, py| (x0 - 2..x0 + len + 2).contains(&px) && (y - 2..=y + 2).contains(&py)
    }

    #[test]
    fn straight_line_length_matches() {
        let mask = BinaryMask::from_fn(80, 30, thick_line(10, 15, 50));
        let found = detect(&mask, &FractureCriteria::default());
        assert_eq!(found.len(), 1);
        let f = &found[0];
        assert!((f.length - 50.0).abs() <= 2.0, "length {}", f.length);
        assert!(f.aspect_ratio >= 5.0);
        assert!(f.angle < 1.0 || f.angle > 179.0, "angle {}", f.angle);
    }

    #[test]
    fn round_blob_is_not_a_fracture() {
        let mask = BinaryMask::from_fn(40, 40, |x, y| {
            (f64::from(x) - 20.0).hypot(f64::from(y) - 20.0) <= 10.0
        });
        assert!(detect(&mask, &FractureCriteria::default()).is_empty());
    }

    #[test]
    fn short_sliver_fails_length() {
        let mask = BinaryMask::from_fn(40, 20, |x, y| (10..22).contains(&x) && (9..11).contains(&y));
        let criteria = FractureCriteria {
            min_length_pixels: 30.0,
            ..FractureCriteria::default()
        };
        assert!(detect(&mask, &criteria).is_empty());
    }

    #[test]
    fn every_detection_meets_aspect_floor() {
        let mask = BinaryMask::from_fn(100, 100, |x, y| {
            let bar = (10..90).contains(&x) && (20..25).contains(&y);
            let stub = (10..30).contains(&x) && (60..70).contains(&y);
            let vertical = (70..74).contains(&x) && (40..95).contains(&y);
            bar || stub || vertical
        });
        let criteria = FractureCriteria::default();
        let found = detect(&mask, &criteria);
        assert_eq!(found.len(), 2);
        for f in &found {
            assert!(f.aspect_ratio >= criteria.min_aspect_ratio);
            assert!(f.length >= criteria.min_length_pixels);
        }
        assert!(found.iter().any(|f| (f.angle - 90.0).abs() < 1.0));
    }

    #[test]
    fn tiny_contours_are_skipped() {
        let dot = BinaryMask::from_fn(10, 10, |x, y| x == 5 && y == 5);
        assert!(detect(&dot, &FractureCriteria::default()).is_empty());
    }
}
