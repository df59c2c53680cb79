//! Shared types for the petroscan analysis pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` for the rendered visualization.
pub use image::RgbImage;

/// Re-export `DynamicImage`, the input type of every analysis entry point.
pub use image::DynamicImage;

/// Pixel value marking a foreground feature in a [`BinaryMask`].
pub const FOREGROUND: u8 = 255;

/// Pixel value marking background in a [`BinaryMask`].
pub const BACKGROUND: u8 = 0;

/// A sub-pixel position in image coordinates (x right, y down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// An integer pixel position on a contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl PixelPoint {
    /// Create a new pixel position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The same position as a floating-point [`Point`].
    #[must_use]
    pub fn to_point(self) -> Point {
        Point::new(f64::from(self.x), f64::from(self.y))
    }
}

/// An ordered, implicitly closed ring of boundary pixels.
///
/// The last point connects back to the first; the ring is never stored
/// with a repeated closing point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour(Vec<PixelPoint>);

impl Contour {
    /// Fewest points a contour needs before shape fitting is attempted.
    pub const MIN_FIT_POINTS: usize = 5;

    /// Create a contour, dropping a trailing point equal to the first.
    #[must_use]
    pub fn new(mut points: Vec<PixelPoint>) -> Self {
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        Self(points)
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of points on the ring.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// All points in ring order.
    #[must_use]
    pub fn points(&self) -> &[PixelPoint] {
        &self.0
    }

    /// Consumes the contour and returns its points.
    #[must_use]
    pub fn into_points(self) -> Vec<PixelPoint> {
        self.0
    }

    /// Whether the contour has enough points for rectangle fitting.
    #[must_use]
    pub const fn is_fittable(&self) -> bool {
        self.0.len() >= Self::MIN_FIT_POINTS
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of a grayscale buffer.
    #[must_use]
    pub fn of(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Which side of an intensity threshold holds the features of interest.
///
/// Threshold primitives take a `Foreground` and always return masks with
/// features at [`FOREGROUND`], so nothing downstream ever inverts a mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Foreground {
    /// Features are darker than the surrounding matrix (pores, open
    /// fractures under reflected light).
    #[default]
    Dark,
    /// Features are brighter than the surrounding matrix (epoxy-filled
    /// pores under fluorescence).
    Bright,
}

/// A single-channel mask whose pixels are exactly [`FOREGROUND`] or
/// [`BACKGROUND`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    /// All-background mask of the given size.
    #[must_use]
    pub fn empty(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// Build a mask from a predicate; `true` marks foreground.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        Self(GrayImage::from_fn(width, height, |x, y| {
            image::Luma([if f(x, y) { FOREGROUND } else { BACKGROUND }])
        }))
    }

    /// Wrap an existing buffer after checking every pixel is 0 or 255.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParameter`] if any pixel holds
    /// another value.
    pub fn from_gray(image: GrayImage) -> Result<Self, PipelineError> {
        if let Some(bad) = image
            .pixels()
            .find(|p| p.0[0] != FOREGROUND && p.0[0] != BACKGROUND)
        {
            return Err(PipelineError::InvalidParameter(format!(
                "binary mask pixel has value {}",
                bad.0[0]
            )));
        }
        Ok(Self(image))
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Mask dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.0)
    }

    /// Whether `(x, y)` is foreground. Out-of-range positions are background.
    #[must_use]
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        x < self.0.width() && y < self.0.height() && self.0.get_pixel(x, y).0[0] == FOREGROUND
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn foreground_count(&self) -> usize {
        self.0.pixels().filter(|p| p.0[0] == FOREGROUND).count()
    }

    /// Borrow the underlying buffer.
    #[must_use]
    pub const fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Consume the mask and return the underlying buffer.
    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.0
    }
}

/// Errors that can occur during analysis.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// The input image has zero width or height.
    #[error("input image is empty")]
    EmptyImage,

    /// Analysis configuration is invalid.
    #[error("invalid analysis configuration: {0}")]
    InvalidConfig(String),

    /// A key path passed to the parameter setter does not exist.
    #[error("unknown parameter path: {0}")]
    UnknownParameterPath(String),

    /// The active threshold method needs a value that neither its
    /// method-prefixed key nor the shared key provides.
    #[error("threshold method {method} requires parameter {key}")]
    MissingParameter {
        /// Threshold method name.
        method: &'static str,
        /// Unprefixed parameter name.
        key: &'static str,
    },

    /// A primitive was called with a value outside its domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Image resolution is missing, non-finite, or not positive.
    #[error("invalid DPI ({x}, {y}): both axes must be positive")]
    InvalidDpi {
        /// Horizontal resolution.
        x: f64,
        /// Vertical resolution.
        y: f64,
    },

    /// A parameter file could not be parsed.
    #[error("invalid parameter file: {0}")]
    ParameterFile(String),
}
