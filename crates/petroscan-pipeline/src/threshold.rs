//! Binarization: five threshold primitives and the dispatcher that picks
//! one from [`ThresholdParams`].
//!
//! Every primitive takes a [`Foreground`] and returns a [`BinaryMask`]
//! with the features of interest at 255. For [`Foreground::Dark`] the
//! comparison is "at or below the threshold" for the global and adaptive
//! methods and "strictly below" for Niblack and Sauvola.
//!
//! [`apply`] is the only entry point used by the pipeline. It resolves
//! each method's parameters, preferring the method-prefixed key
//! (`sauvola_k`) over the shared one (`k`), and coerces window sizes to
//! odd values of at least 3 before calling the primitive.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::local_stats::LocalStats;
use crate::params::UiHints;
use crate::types::{BinaryMask, Foreground, PipelineError};

/// Default Sauvola dynamic range for 8-bit images.
pub const DEFAULT_SAUVOLA_R: f64 = 128.0;

/// Default window for the Sauvola method when none is configured.
pub const DEFAULT_SAUVOLA_WINDOW: u32 = 25;

/// Which binarization method [`apply`] uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMethod {
    /// Single fixed cut-off for the whole image.
    Global,
    /// Cut-off chosen by Otsu's between-class variance criterion.
    Otsu,
    /// Gaussian-weighted local mean minus a constant.
    AdaptiveGaussian,
    /// Local mean plus `k` local standard deviations.
    Niblack,
    /// Local mean scaled by the normalised local standard deviation.
    #[default]
    Sauvola,
}

impl ThresholdMethod {
    /// All methods, in display order.
    pub const ALL: [Self; 5] = [
        Self::Global,
        Self::Otsu,
        Self::AdaptiveGaussian,
        Self::Niblack,
        Self::Sauvola,
    ];

    /// Serialized name of the method.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Otsu => "otsu",
            Self::AdaptiveGaussian => "adaptive_gaussian",
            Self::Niblack => "niblack",
            Self::Sauvola => "sauvola",
        }
    }
}

impl std::fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ThresholdMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| PipelineError::InvalidConfig(format!("unknown threshold method: {s}")))
    }
}

/// Threshold section of the analysis parameters.
///
/// The unprefixed fields (`value`, `block_size`, ...) are shared between
/// methods. Each method also accepts its own prefixed key, which wins
/// when both are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdParams {
    /// Binarization method.
    pub method: ThresholdMethod,
    /// Which intensity side holds the features.
    pub foreground: Foreground,
    /// Gaussian kernel size applied to the grayscale image before
    /// thresholding. 0 or 1 disables the blur.
    pub blur_kernel_size: u32,

    /// Global cut-off.
    pub value: Option<f64>,
    /// Adaptive block size.
    pub block_size: Option<u32>,
    /// Adaptive offset subtracted from the local mean.
    pub c: Option<f64>,
    /// Niblack/Sauvola window size.
    pub window_size: Option<u32>,
    /// Niblack/Sauvola weight on the local standard deviation.
    pub k: Option<f64>,
    /// Sauvola dynamic range of the standard deviation.
    pub r: Option<f64>,

    /// Overrides `value` for the global method.
    pub global_value: Option<f64>,
    /// Overrides `block_size` for the adaptive method.
    pub adaptive_block_size: Option<u32>,
    /// Overrides `c` for the adaptive method.
    pub adaptive_c_value: Option<f64>,
    /// Overrides `window_size` for Niblack.
    pub niblack_window_size: Option<u32>,
    /// Overrides `k` for Niblack.
    pub niblack_k: Option<f64>,
    /// Overrides `window_size` for Sauvola.
    pub sauvola_window_size: Option<u32>,
    /// Overrides `k` for Sauvola.
    pub sauvola_k: Option<f64>,
    /// Overrides `r` for Sauvola.
    pub sauvola_r: Option<f64>,

    /// UI metadata; never read by the pipeline.
    pub ui_hints: UiHints,
}

impl ThresholdParams {
    /// Default global cut-off.
    pub const DEFAULT_VALUE: f64 = 128.0;
    /// Default adaptive block size.
    pub const DEFAULT_BLOCK_SIZE: u32 = 51;
    /// Default adaptive offset.
    pub const DEFAULT_C: f64 = 2.0;
    /// Default Niblack/Sauvola window.
    pub const DEFAULT_WINDOW_SIZE: u32 = 51;
    /// Default Niblack/Sauvola `k`.
    pub const DEFAULT_K: f64 = 0.2;
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            method: ThresholdMethod::Sauvola,
            foreground: Foreground::Dark,
            blur_kernel_size: crate::blur::DEFAULT_KERNEL_SIZE,
            value: Some(Self::DEFAULT_VALUE),
            block_size: Some(Self::DEFAULT_BLOCK_SIZE),
            c: Some(Self::DEFAULT_C),
            window_size: Some(Self::DEFAULT_WINDOW_SIZE),
            k: Some(Self::DEFAULT_K),
            r: Some(DEFAULT_SAUVOLA_R),
            global_value: None,
            adaptive_block_size: None,
            adaptive_c_value: None,
            niblack_window_size: None,
            niblack_k: None,
            sauvola_window_size: None,
            sauvola_k: None,
            sauvola_r: None,
            ui_hints: UiHints::realtime(),
        }
    }
}

/// Output of [`apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholded {
    /// Features at 255.
    pub mask: BinaryMask,
    /// The global cut-off actually used, for methods that have one.
    pub level: Option<f64>,
}

/// Binarize `gray` with the method and parameters in `params`.
///
/// # Errors
///
/// Returns [`PipelineError::MissingParameter`] when the active method
/// needs a value that neither key provides, and
/// [`PipelineError::InvalidParameter`] for values outside a primitive's
/// domain (for example a non-positive Sauvola `r`).
pub fn apply(gray: &GrayImage, params: &ThresholdParams) -> Result<Thresholded, PipelineError> {
    let method = params.method;
    let fg = params.foreground;
    let name = method.name();

    let thresholded = match method {
        ThresholdMethod::Global => {
            let value = pick(name, "value", params.global_value, params.value)?;
            Thresholded {
                mask: global(gray, value, fg),
                level: Some(value),
            }
        }
        ThresholdMethod::Otsu => {
            let (mask, level) = otsu(gray, fg);
            Thresholded {
                mask,
                level: Some(f64::from(level)),
            }
        }
        ThresholdMethod::AdaptiveGaussian => {
            let block = pick(name, "block_size", params.adaptive_block_size, params.block_size)?;
            let c = pick(name, "c", params.adaptive_c_value, params.c)?;
            Thresholded {
                mask: adaptive_gaussian(gray, coerce_odd_window(block), c, fg)?,
                level: None,
            }
        }
        ThresholdMethod::Niblack => {
            let window = pick(name, "window_size", params.niblack_window_size, params.window_size)?;
            let k = pick(name, "k", params.niblack_k, params.k)?;
            Thresholded {
                mask: niblack(gray, coerce_odd_window(window), k, fg)?,
                level: None,
            }
        }
        ThresholdMethod::Sauvola => {
            let window = pick(name, "window_size", params.sauvola_window_size, params.window_size)?;
            let k = pick(name, "k", params.sauvola_k, params.k)?;
            let r = pick(name, "r", params.sauvola_r, params.r)?;
            Thresholded {
                mask: sauvola(gray, coerce_odd_window(window), k, r, fg)?,
                level: None,
            }
        }
    };

    log::debug!(
        "threshold {name}: {} foreground pixels",
        thresholded.mask.foreground_count()
    );
    Ok(thresholded)
}

fn pick<T>(
    method: &'static str,
    key: &'static str,
    specific: Option<T>,
    shared: Option<T>,
) -> Result<T, PipelineError> {
    specific
        .or(shared)
        .ok_or(PipelineError::MissingParameter { method, key })
}

/// Round a window size up to the nearest odd integer of at least 3.
#[must_use]
pub const fn coerce_odd_window(size: u32) -> u32 {
    if size < 3 {
        3
    } else if size % 2 == 0 {
        size + 1
    } else {
        size
    }
}

fn check_window(size: u32, what: &str) -> Result<(), PipelineError> {
    if size < 3 || size % 2 == 0 {
        return Err(PipelineError::InvalidParameter(format!(
            "{what} must be odd and at least 3, got {size}"
        )));
    }
    Ok(())
}

const fn is_feature(below: bool, fg: Foreground) -> bool {
    match fg {
        Foreground::Dark => below,
        Foreground::Bright => !below,
    }
}

/// Fixed cut-off. For [`Foreground::Dark`] a pixel is a feature when its
/// intensity is at or below `value`.
#[must_use = "returns the binary mask"]
pub fn global(gray: &GrayImage, value: f64, fg: Foreground) -> BinaryMask {
    BinaryMask::from_fn(gray.width(), gray.height(), |x, y| {
        is_feature(f64::from(gray.get_pixel(x, y).0[0]) <= value, fg)
    })
}

/// Otsu's automatic cut-off. Returns the mask and the chosen level.
#[must_use = "returns the binary mask and level"]
pub fn otsu(gray: &GrayImage, fg: Foreground) -> (BinaryMask, u8) {
    let level = imageproc::contrast::otsu_level(gray);
    (global(gray, f64::from(level), fg), level)
}

/// Local threshold at the Gaussian-weighted mean of a `block_size` square
/// neighbourhood, minus `c`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] if `block_size` is even
/// or below 3.
pub fn adaptive_gaussian(
    gray: &GrayImage,
    block_size: u32,
    c: f64,
    fg: Foreground,
) -> Result<BinaryMask, PipelineError> {
    check_window(block_size, "adaptive block size")?;
    let local_mean = crate::blur::gaussian_blur(gray, block_size);
    Ok(BinaryMask::from_fn(gray.width(), gray.height(), |x, y| {
        let v = f64::from(gray.get_pixel(x, y).0[0]);
        let t = f64::from(local_mean.get_pixel(x, y).0[0]) - c;
        is_feature(v <= t, fg)
    }))
}

/// Niblack: threshold at `mean + k * stddev` of the local window.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] if `window_size` is even
/// or below 3.
pub fn niblack(
    gray: &GrayImage,
    window_size: u32,
    k: f64,
    fg: Foreground,
) -> Result<BinaryMask, PipelineError> {
    check_window(window_size, "Niblack window size")?;
    let stats = LocalStats::new(gray);
    Ok(BinaryMask::from_fn(gray.width(), gray.height(), |x, y| {
        let (mean, std) = stats.mean_std(x, y, window_size);
        let t = k.mul_add(std, mean);
        local_feature(f64::from(gray.get_pixel(x, y).0[0]), t, fg)
    }))
}

/// Sauvola: threshold at `mean * (1 + k * (stddev / r - 1))`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidParameter`] if `window_size` is even
/// or below 3, or if `r` is not positive.
pub fn sauvola(
    gray: &GrayImage,
    window_size: u32,
    k: f64,
    r: f64,
    fg: Foreground,
) -> Result<BinaryMask, PipelineError> {
    check_window(window_size, "Sauvola window size")?;
    if r.is_nan() || r <= 0.0 {
        return Err(PipelineError::InvalidParameter(format!(
            "Sauvola r must be positive, got {r}"
        )));
    }
    let stats = LocalStats::new(gray);
    Ok(BinaryMask::from_fn(gray.width(), gray.height(), |x, y| {
        let (mean, std) = stats.mean_std(x, y, window_size);
        let t = mean * k.mul_add(std / r - 1.0, 1.0);
        local_feature(f64::from(gray.get_pixel(x, y).0[0]), t, fg)
    }))
}

// Local methods use a strict comparison on both sides.
fn local_feature(v: f64, t: f64, fg: Foreground) -> bool {
    match fg {
        Foreground::Dark => v < t,
        Foreground::Bright => v > t,
    }
}
