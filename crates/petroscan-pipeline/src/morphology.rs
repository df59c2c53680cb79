//! Binary morphology and the two-stage mask clean-up.
//!
//! The primitives ([`erode`], [`dilate`], [`open`], [`close`]) take a
//! [`BinaryMask`] with features at 255 and a [`StructuringElement`].
//! Kernel taps that fall outside the image are ignored, so erosion never
//! eats in from the border and dilation never grows in from it.
//!
//! [`clean`] runs an opening stage (kernel- or area-based) followed by a
//! closing stage, skipping any stage that is disabled or degenerate.

use serde::{Deserialize, Serialize};

use crate::components::remove_small_components;
use crate::kernel::{KernelShape, StructuringElement};
use crate::params::UiHints;
use crate::pore::WatershedParams;
use crate::types::BinaryMask;

/// How the opening stage removes noise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningStrategy {
    /// Kernel erosion followed by dilation.
    #[default]
    Standard,
    /// Drop connected components below `min_area`; shapes are untouched.
    AreaBased,
}

/// Opening stage parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpeningParams {
    /// Whether the stage runs.
    pub enabled: bool,
    /// Kernel or area-based noise removal.
    pub strategy: OpeningStrategy,
    /// Kernel shape for the standard strategy.
    pub kernel_shape: KernelShape,
    /// Kernel `(width, height)` for the standard strategy.
    pub kernel_size: (u32, u32),
    /// Erode/dilate repetitions for the standard strategy.
    pub iterations: u32,
    /// Component area floor in pixels. Required by the area-based
    /// strategy; applied after the kernel opening when non-zero.
    pub min_area: usize,
    /// UI metadata; never read by the pipeline.
    pub ui_hints: UiHints,
}

impl Default for OpeningParams {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: OpeningStrategy::Standard,
            kernel_shape: KernelShape::Rect,
            kernel_size: (3, 3),
            iterations: 2,
            min_area: 10,
            ui_hints: UiHints::realtime(),
        }
    }
}

/// Closing stage parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosingParams {
    /// Whether the stage runs.
    pub enabled: bool,
    /// Kernel shape.
    pub kernel_shape: KernelShape,
    /// Kernel `(width, height)`.
    pub kernel_size: (u32, u32),
    /// Dilate/erode repetitions.
    pub iterations: u32,
    /// UI metadata; never read by the pipeline.
    pub ui_hints: UiHints,
}

impl Default for ClosingParams {
    fn default() -> Self {
        Self {
            enabled: true,
            kernel_shape: KernelShape::Rect,
            kernel_size: (3, 3),
            iterations: 1,
            ui_hints: UiHints::realtime(),
        }
    }
}

/// Morphology section of the analysis parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphologyParams {
    /// Noise removal.
    pub opening: OpeningParams,
    /// Gap filling.
    pub closing: ClosingParams,
    /// Seed preparation for pore segmentation.
    pub watershed: WatershedParams,
}

/// Cleaned mask plus the stage parameters that actually ran.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphologyOutput {
    /// The cleaned mask.
    pub mask: BinaryMask,
    /// Opening parameters, or `None` if the stage was skipped.
    pub opening: Option<OpeningParams>,
    /// Closing parameters, or `None` if the stage was skipped.
    pub closing: Option<ClosingParams>,
}

/// Erode once: a pixel survives if every in-bounds tap is foreground.
#[must_use = "returns the eroded mask"]
pub fn erode(mask: &BinaryMask, kernel: &StructuringElement) -> BinaryMask {
    if kernel.is_empty() {
        return mask.clone();
    }
    let offsets = kernel.offsets();
    BinaryMask::from_fn(mask.width(), mask.height(), |x, y| {
        mask.is_foreground(x, y)
            && offsets
                .iter()
                .filter_map(|&(dx, dy)| shifted(mask, x, y, dx, dy))
                .all(|(sx, sy)| mask.is_foreground(sx, sy))
    })
}

/// Dilate once: a pixel is set if any in-bounds tap is foreground.
#[must_use = "returns the dilated mask"]
pub fn dilate(mask: &BinaryMask, kernel: &StructuringElement) -> BinaryMask {
    if kernel.is_empty() {
        return mask.clone();
    }
    let offsets = kernel.offsets();
    BinaryMask::from_fn(mask.width(), mask.height(), |x, y| {
        offsets
            .iter()
            .filter_map(|&(dx, dy)| shifted(mask, x, y, dx, dy))
            .any(|(sx, sy)| mask.is_foreground(sx, sy))
    })
}

/// `iterations` erosions followed by as many dilations.
#[must_use = "returns the opened mask"]
pub fn open(mask: &BinaryMask, kernel: &StructuringElement, iterations: u32) -> BinaryMask {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = erode(&out, kernel);
    }
    for _ in 0..iterations {
        out = dilate(&out, kernel);
    }
    out
}

/// `iterations` dilations followed by as many erosions.
#[must_use = "returns the closed mask"]
pub fn close(mask: &BinaryMask, kernel: &StructuringElement, iterations: u32) -> BinaryMask {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = dilate(&out, kernel);
    }
    for _ in 0..iterations {
        out = erode(&out, kernel);
    }
    out
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn shifted(mask: &BinaryMask, x: u32, y: u32, dx: i32, dy: i32) -> Option<(u32, u32)> {
    let sx = i64::from(x) + i64::from(dx);
    let sy = i64::from(y) + i64::from(dy);
    (sx >= 0 && sy >= 0 && sx < i64::from(mask.width()) && sy < i64::from(mask.height()))
        .then(|| (sx as u32, sy as u32))
}

/// Run the opening stage then the closing stage.
#[must_use = "returns the cleaned mask"]
pub fn clean(mask: &BinaryMask, params: &MorphologyParams) -> MorphologyOutput {
    let (opened, opening) = opening_stage(mask, &params.opening);
    let (closed, closing) = closing_stage(opened, &params.closing);
    log::debug!(
        "morphology: {} -> {} foreground pixels (opening {}, closing {})",
        mask.foreground_count(),
        closed.foreground_count(),
        if opening.is_some() { "on" } else { "off" },
        if closing.is_some() { "on" } else { "off" },
    );
    MorphologyOutput {
        mask: closed,
        opening,
        closing,
    }
}

fn opening_stage(mask: &BinaryMask, p: &OpeningParams) -> (BinaryMask, Option<OpeningParams>) {
    if !p.enabled {
        return (mask.clone(), None);
    }
    match p.strategy {
        OpeningStrategy::AreaBased => {
            if p.min_area == 0 {
                return (mask.clone(), None);
            }
            (remove_small_components(mask, p.min_area), Some(p.clone()))
        }
        OpeningStrategy::Standard => {
            let kernel = StructuringElement::new(p.kernel_shape, p.kernel_size.0, p.kernel_size.1);
            let kernel_runs = !kernel.is_empty() && p.iterations > 0;
            if !kernel_runs && p.min_area == 0 {
                return (mask.clone(), None);
            }
            let opened = if kernel_runs {
                open(mask, &kernel, p.iterations)
            } else {
                mask.clone()
            };
            (remove_small_components(&opened, p.min_area), Some(p.clone()))
        }
    }
}

fn closing_stage(mask: BinaryMask, p: &ClosingParams) -> (BinaryMask, Option<ClosingParams>) {
    let kernel = StructuringElement::new(p.kernel_shape, p.kernel_size.0, p.kernel_size.1);
    if !p.enabled || kernel.is_empty() || p.iterations == 0 {
        return (mask, None);
    }
    (close(&mask, &kernel, p.iterations), Some(p.clone()))
}
