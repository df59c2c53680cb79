//! Pixel ↔ millimetre conversion from image resolution.

use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, Point};

/// Millimetres per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// Image resolution in dots per inch.
///
/// Both axes are positive and finite. Conversions use the horizontal
/// resolution; micrographs are assumed to have square pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64)", into = "(f64, f64)")]
pub struct Dpi {
    x: f64,
    y: f64,
}

impl Dpi {
    /// Validate a resolution pair.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDpi`] if either axis is zero,
    /// negative, or not finite.
    pub fn new(x: f64, y: f64) -> Result<Self, PipelineError> {
        if valid(x) && valid(y) {
            Ok(Self { x, y })
        } else {
            Err(PipelineError::InvalidDpi { x, y })
        }
    }

    /// Same resolution on both axes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDpi`] for a non-positive value.
    pub fn uniform(dpi: f64) -> Result<Self, PipelineError> {
        Self::new(dpi, dpi)
    }

    /// Accept a resolution read from image metadata, or log why it is
    /// unusable and fall back to pixel-only output.
    #[must_use]
    pub fn from_metadata(x: f64, y: f64) -> Option<Self> {
        match Self::new(x, y) {
            Ok(dpi) => Some(dpi),
            Err(e) => {
                log::warn!("{e}; physical units will be omitted");
                None
            }
        }
    }

    /// Horizontal resolution.
    #[must_use]
    pub const fn x(self) -> f64 {
        self.x
    }

    /// Vertical resolution.
    #[must_use]
    pub const fn y(self) -> f64 {
        self.y
    }

    /// Resolution used for conversions.
    #[must_use]
    pub const fn scale(self) -> f64 {
        self.x
    }
}

impl TryFrom<(f64, f64)> for Dpi {
    type Error = PipelineError;

    fn try_from((x, y): (f64, f64)) -> Result<Self, Self::Error> {
        Self::new(x, y)
    }
}

impl From<Dpi> for (f64, f64) {
    fn from(dpi: Dpi) -> Self {
        (dpi.x, dpi.y)
    }
}

fn valid(dpi: f64) -> bool {
    dpi.is_finite() && dpi > 0.0
}

fn check(dpi: f64) -> Result<(), PipelineError> {
    if valid(dpi) {
        Ok(())
    } else {
        Err(PipelineError::InvalidDpi { x: dpi, y: dpi })
    }
}

/// Convert a pixel distance to millimetres.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDpi`] if `dpi` is not positive.
pub fn pixels_to_mm(pixels: f64, dpi: f64) -> Result<f64, PipelineError> {
    check(dpi)?;
    Ok(pixels / dpi * MM_PER_INCH)
}

/// Convert a millimetre distance to pixels.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDpi`] if `dpi` is not positive.
pub fn mm_to_pixels(mm: f64, dpi: f64) -> Result<f64, PipelineError> {
    check(dpi)?;
    Ok(mm * dpi / MM_PER_INCH)
}

/// Convert a pixel distance to millimetres.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDpi`] if `dpi` is not positive.
pub fn convert_distance(pixels: f64, dpi: f64) -> Result<f64, PipelineError> {
    pixels_to_mm(pixels, dpi)
}

/// Convert a pixel area to square millimetres.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDpi`] if `dpi` is not positive.
pub fn convert_area(pixels: f64, dpi: f64) -> Result<f64, PipelineError> {
    check(dpi)?;
    let mm_per_pixel = MM_PER_INCH / dpi;
    Ok(pixels * mm_per_pixel * mm_per_pixel)
}

/// Convert a pixel position to millimetres from the image origin.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDpi`] if `dpi` is not positive.
pub fn convert_point(point: Point, dpi: f64) -> Result<Point, PipelineError> {
    Ok(Point::new(pixels_to_mm(point.x, dpi)?, pixels_to_mm(point.y, dpi)?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn one_inch_is_25_4_mm() {
        assert!((pixels_to_mm(300.0, 300.0).unwrap() - 25.4).abs() < 1e-12);
        assert!((mm_to_pixels(25.4, 300.0).unwrap() - 300.0).abs() < 1e-12);
    }

    #[test]
    fn round_trip() {
        for dpi in [72.0, 96.0, 300.0, 1200.0, 4800.0] {
            for px in [0.0, 1.0, 17.5, 1000.0] {
                let back = mm_to_pixels(pixels_to_mm(px, dpi).unwrap(), dpi).unwrap();
                assert!((back - px).abs() < 1e-9, "{px} px at {dpi} dpi came back as {back}");
            }
        }
    }

    #[test]
    fn area_scales_quadratically() {
        let mm2 = convert_area(300.0 * 300.0, 300.0).unwrap();
        assert!((mm2 - 25.4 * 25.4).abs() < 1e-9);
        assert!((convert_distance(150.0, 300.0).unwrap() - 12.7).abs() < 1e-12);
    }

    #[test]
    fn point_conversion() {
        let p = convert_point(Point::new(600.0, 300.0), 300.0).unwrap();
        assert!((p.x - 50.8).abs() < 1e-12);
        assert!((p.y - 25.4).abs() < 1e-12);
    }

    #[test]
    fn non_positive_dpi_is_an_error() {
        for dpi in [0.0, -72.0, f64::NAN, f64::INFINITY] {
            assert!(pixels_to_mm(10.0, dpi).is_err());
            assert!(mm_to_pixels(10.0, dpi).is_err());
            assert!(convert_distance(10.0, dpi).is_err());
            assert!(convert_area(10.0, dpi).is_err());
            assert!(convert_point(Point::new(1.0, 1.0), dpi).is_err());
        }
    }

    #[test]
    fn dpi_validation() {
        assert!(Dpi::new(300.0, 300.0).is_ok());
        assert!(Dpi::new(300.0, 0.0).is_err());
        assert!(Dpi::uniform(-1.0).is_err());
        assert!(Dpi::from_metadata(0.0, 0.0).is_none());
        assert!(Dpi::from_metadata(96.0, 96.0).is_some());
        let dpi = Dpi::new(300.0, 200.0).unwrap();
        assert!((dpi.scale() - 300.0).abs() < f64::EPSILON);
        assert!((dpi.y() - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dpi_deserialization_validates() {
        let ok: Dpi = serde_json::from_str("[300.0, 300.0]").unwrap();
        assert!((ok.x() - 300.0).abs() < f64::EPSILON);
        assert!(serde_json::from_str::<Dpi>("[0.0, 300.0]").is_err());
    }
}
