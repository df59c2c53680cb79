//! The measurement table: one record per accepted feature plus totals.
//!
//! Pixel-unit fields are always present. [`Measurements::with_physical_units`]
//! adds a millimetre counterpart next to each of them and never touches
//! the pixel values.

use serde::{Deserialize, Serialize};

use crate::fracture::Fracture;
use crate::pore::PoreRegion;
use crate::types::{Contour, Dimensions, PipelineError, PixelPoint, Point};
use crate::units::{Dpi, convert_area, convert_distance, convert_point};

/// One measured fracture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractureRecord {
    /// Outer contour in image pixels.
    pub contour: Contour,
    /// Contour area.
    pub area_pixels: f64,
    /// Skeleton pixel count.
    pub length_pixels: f64,
    /// Long side over short side of the minimum-area rectangle.
    pub aspect_ratio: f64,
    /// Long-side orientation in degrees, `[0, 180)`.
    pub angle: f64,
    /// Ends of the long axis, on the contour.
    pub endpoints: [PixelPoint; 2],
    /// `area_pixels` in square millimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_mm2: Option<f64>,
    /// `length_pixels` in millimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_mm: Option<f64>,
}

impl From<&Fracture> for FractureRecord {
    fn from(f: &Fracture) -> Self {
        Self {
            contour: f.contour.clone(),
            area_pixels: f.area,
            length_pixels: f.length,
            aspect_ratio: f.aspect_ratio,
            angle: f.angle,
            endpoints: f.endpoints,
            area_mm2: None,
            length_mm: None,
        }
    }
}

/// One measured pore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoreRecord {
    /// Outer contour in image pixels.
    pub contour: Contour,
    /// Contour area.
    pub area_pixels: f64,
    /// Area over convex hull area.
    pub solidity: f64,
    /// Area centroid in pixels.
    pub centroid: Point,
    /// Diameter of the circle of equal area.
    pub equivalent_diameter_pixels: f64,
    /// `area_pixels` in square millimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_mm2: Option<f64>,
    /// `equivalent_diameter_pixels` in millimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equivalent_diameter_mm: Option<f64>,
    /// `centroid` in millimetres from the image origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid_mm: Option<Point>,
}

impl From<&PoreRegion> for PoreRecord {
    fn from(p: &PoreRegion) -> Self {
        Self {
            contour: p.contour.clone(),
            area_pixels: p.area,
            solidity: p.solidity,
            centroid: p.centroid,
            equivalent_diameter_pixels: p.equivalent_diameter(),
            area_mm2: None,
            equivalent_diameter_mm: None,
            centroid_mm: None,
        }
    }
}

/// A row of the measurement table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureRecord {
    /// A fracture.
    Fracture(FractureRecord),
    /// A pore.
    Pore(PoreRecord),
}

impl FeatureRecord {
    /// Contour area in pixels.
    #[must_use]
    pub const fn area_pixels(&self) -> f64 {
        match self {
            Self::Fracture(f) => f.area_pixels,
            Self::Pore(p) => p.area_pixels,
        }
    }

    /// Outer contour in image pixels.
    #[must_use]
    pub const fn contour(&self) -> &Contour {
        match self {
            Self::Fracture(f) => &f.contour,
            Self::Pore(p) => &p.contour,
        }
    }

    /// The fracture record, if this is one.
    #[must_use]
    pub const fn as_fracture(&self) -> Option<&FractureRecord> {
        match self {
            Self::Fracture(f) => Some(f),
            Self::Pore(_) => None,
        }
    }

    /// The pore record, if this is one.
    #[must_use]
    pub const fn as_pore(&self) -> Option<&PoreRecord> {
        match self {
            Self::Pore(p) => Some(p),
            Self::Fracture(_) => None,
        }
    }

    fn add_physical_units(&mut self, dpi: f64) -> Result<(), PipelineError> {
        match self {
            Self::Fracture(f) => {
                f.area_mm2 = Some(convert_area(f.area_pixels, dpi)?);
                f.length_mm = Some(convert_distance(f.length_pixels, dpi)?);
            }
            Self::Pore(p) => {
                p.area_mm2 = Some(convert_area(p.area_pixels, dpi)?);
                p.equivalent_diameter_mm = Some(convert_distance(p.equivalent_diameter_pixels, dpi)?);
                p.centroid_mm = Some(convert_point(p.centroid, dpi)?);
            }
        }
        Ok(())
    }
}

/// Totals and per-feature records for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    /// Number of accepted features.
    pub count: usize,
    /// Sum of feature areas.
    pub total_area_pixels: f64,
    /// `total_area_pixels` in square millimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_area_mm2: Option<f64>,
    /// Sum of fracture lengths (fracture mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_length_pixels: Option<f64>,
    /// `total_length_pixels` in millimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_length_mm: Option<f64>,
    /// Mean fracture length (fracture mode, at least one fracture).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_length_pixels: Option<f64>,
    /// `avg_length_pixels` in millimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_length_mm: Option<f64>,
    /// Pore area over image area (pore mode only), in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub porosity: Option<f64>,
    /// One record per feature, in detection order.
    pub details: Vec<FeatureRecord>,
}

impl Measurements {
    /// Table for detected fractures.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_fractures(fractures: &[Fracture]) -> Self {
        let total_length: f64 = fractures.iter().map(|f| f.length).sum();
        let count = fractures.len();
        Self {
            count,
            total_area_pixels: fractures.iter().map(|f| f.area).sum(),
            total_length_pixels: Some(total_length),
            avg_length_pixels: (count > 0).then(|| total_length / count as f64),
            details: fractures
                .iter()
                .map(|f| FeatureRecord::Fracture(f.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Table for segmented pores in an image of size `image`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_pores(pores: &[PoreRegion], image: Dimensions) -> Self {
        let total_area: f64 = pores.iter().map(|p| p.area).sum();
        let image_area = image.area() as f64;
        Self {
            count: pores.len(),
            total_area_pixels: total_area,
            porosity: (image_area > 0.0).then(|| (total_area / image_area).clamp(0.0, 1.0)),
            details: pores.iter().map(|p| FeatureRecord::Pore(p.into())).collect(),
            ..Self::default()
        }
    }

    /// Whether no feature was accepted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Add millimetre fields alongside every pixel field.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDpi`] if `dpi` fails conversion
    /// (a validated [`Dpi`] never does).
    pub fn with_physical_units(mut self, dpi: Dpi) -> Result<Self, PipelineError> {
        let scale = dpi.scale();
        self.total_area_mm2 = Some(convert_area(self.total_area_pixels, scale)?);
        self.total_length_mm = self
            .total_length_pixels
            .map(|px| convert_distance(px, scale))
            .transpose()?;
        self.avg_length_mm = self
            .avg_length_pixels
            .map(|px| convert_distance(px, scale))
            .transpose()?;
        for record in &mut self.details {
            record.add_physical_units(scale)?;
        }
        Ok(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fracture(area: f64, length: f64) -> Fracture {
        Fracture {
            contour: Contour::new(vec![
                PixelPoint::new(0, 0),
                PixelPoint::new(10, 0),
                PixelPoint::new(10, 2),
                PixelPoint::new(0, 2),
            ]),
            area,
            length,
            aspect_ratio: 5.0,
            angle: 0.0,
            endpoints: [PixelPoint::new(0, 1), PixelPoint::new(10, 1)],
        }
    }

    fn pore(area: f64) -> PoreRegion {
        PoreRegion {
            label: 2,
            contour: Contour::new(vec![
                PixelPoint::new(0, 0),
                PixelPoint::new(4, 0),
                PixelPoint::new(4, 4),
                PixelPoint::new(0, 4),
            ]),
            area,
            solidity: 1.0,
            centroid: Point::new(2.0, 2.0),
        }
    }

    #[test]
    fn fracture_totals() {
        let m = Measurements::from_fractures(&[fracture(20.0, 10.0), fracture(30.0, 14.0)]);
        assert_eq!(m.count, 2);
        assert!((m.total_area_pixels - 50.0).abs() < f64::EPSILON);
        assert_eq!(m.total_length_pixels, Some(24.0));
        assert_eq!(m.avg_length_pixels, Some(12.0));
        assert!(m.porosity.is_none());
    }

    #[test]
    fn pore_totals_and_porosity() {
        let dims = Dimensions {
            width: 10,
            height: 10,
        };
        let m = Measurements::from_pores(&[pore(16.0), pore(9.0)], dims);
        assert_eq!(m.count, 2);
        assert_eq!(m.porosity, Some(0.25));
        assert!(m.total_length_pixels.is_none());
        let first = m.details[0].as_pore().unwrap();
        assert!((first.equivalent_diameter_pixels - (64.0 / std::f64::consts::PI).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn physical_units_are_added_beside_pixels() {
        let dpi = Dpi::uniform(25.4).unwrap();
        let m = Measurements::from_fractures(&[fracture(20.0, 10.0)])
            .with_physical_units(dpi)
            .unwrap();
        assert_eq!(m.total_area_mm2, Some(20.0));
        assert_eq!(m.total_length_mm, Some(10.0));
        let f = m.details[0].as_fracture().unwrap();
        assert!(m.details[0].as_pore().is_none());
        assert_eq!(f.area_mm2, Some(20.0));
        assert_eq!(f.length_mm, Some(10.0));
        assert!((f.length_pixels - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pore_millimetres_include_centroid() {
        let dpi = Dpi::uniform(254.0).unwrap();
        let dims = Dimensions {
            width: 100,
            height: 100,
        };
        let m = Measurements::from_pores(&[pore(100.0)], dims)
            .with_physical_units(dpi)
            .unwrap();
        let p = m.details[0].as_pore().unwrap();
        assert!((p.area_mm2.unwrap() - 1.0).abs() < 1e-12);
        assert!((p.centroid_mm.unwrap().x - 0.2).abs() < 1e-12);
        assert!(m.total_length_mm.is_none());
    }

    #[test]
    fn serialized_shape() {
        let m = Measurements::from_fractures(&[fracture(20.0, 10.0)]);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["details"][0]["kind"], "fracture");
        assert!(json.get("total_area_mm2").is_none());
        assert!(json["details"][0].get("length_mm").is_none());
        assert!(json.get("porosity").is_none());
    }

    #[test]
    fn empty_table() {
        let m = Measurements::from_fractures(&[]);
        assert!(m.is_empty());
        assert!(m.avg_length_pixels.is_none());
        assert_eq!(m.total_length_pixels, Some(0.0));
    }
}
