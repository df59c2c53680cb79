//! Orchestration: the two analysis modes, the staged pipeline that both
//! run through, and the result envelope.
//!
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use petroscan_pipeline::{AnalysisMode, AnalysisParameters, DynamicImage, Pipeline, PipelineError};
//! # fn run(image: &DynamicImage) -> Result<(), PipelineError> {
//! let params = AnalysisParameters::for_mode(AnalysisMode::Fracture);
//! let result = Pipeline::new(image, AnalysisMode::Fracture, params)
//!     .preprocess()?
//!     .threshold()?
//!     .clean()
//!     .extract(None)?
//!     .into_result()?;
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state, so
//! stages cannot be skipped or reordered. [`run_staged`] stops early for
//! interactive previews and never extracts features.

use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::fracture::{self, Fracture};
use crate::measure::Measurements;
use crate::merge::merge_fractures;
use crate::morphology::{self, MorphologyOutput};
use crate::params::AnalysisParameters;
use crate::pore::{self, PoreSegmentation};
use crate::types::{BinaryMask, PipelineError};
use crate::units::Dpi;
use crate::{blur, grayscale, render, threshold};

/// Which features an analysis looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Elongated cracks, measured by skeleton length.
    Fracture,
    /// Rounded voids, split with a watershed.
    Pore,
}

impl AnalysisMode {
    /// Every mode.
    pub const ALL: [Self; 2] = [Self::Fracture, Self::Pore];

    /// Stable identifier used in parameter files and on the command line.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Fracture => "fracture",
            Self::Pore => "pore",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fracture => "Fracture analysis",
            Self::Pore => "Pore analysis (watershed)",
        }
    }

    /// The built-in parameter template.
    #[must_use]
    pub fn default_parameters(self) -> AnalysisParameters {
        AnalysisParameters::for_mode(self)
    }

    /// Message shown when a run finds nothing.
    #[must_use]
    pub const fn empty_message(self) -> &'static str {
        match self {
            Self::Fracture => "no fractures matched the filtering criteria",
            Self::Pore => "no pores matched the filtering criteria",
        }
    }

    /// Run every stage.
    ///
    /// # Errors
    ///
    /// See [`run_fracture_analysis`].
    pub fn run_full(
        self,
        image: &DynamicImage,
        params: &AnalysisParameters,
        dpi: Option<Dpi>,
    ) -> Result<AnalysisResult, PipelineError> {
        Pipeline::new(image, self, params.clone())
            .preprocess()?
            .threshold()?
            .clean()
            .extract(dpi)?
            .into_result()
    }

    /// Run up to and including `stage`, returning the intermediates.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyImage`] for a zero-sized image and
    /// any threshold configuration error.
    pub fn run_staged(
        self,
        image: &DynamicImage,
        params: &AnalysisParameters,
        stage: PreviewStage,
    ) -> Result<Previews, PipelineError> {
        let preprocessed = Pipeline::new(image, self, params.clone()).preprocess()?;
        if stage == PreviewStage::Gray {
            return Ok(Previews {
                gray: Some(preprocessed.gray),
                ..Previews::default()
            });
        }

        let thresholded = preprocessed.threshold()?;
        if stage == PreviewStage::Binary {
            return Ok(Previews {
                gray: Some(thresholded.gray),
                binary: Some(thresholded.binary.mask),
                morph: None,
            });
        }

        let cleaned = thresholded.clean();
        Ok(Previews {
            gray: Some(cleaned.gray),
            binary: Some(cleaned.binary),
            morph: Some(cleaned.preview),
        })
    }

    /// Whether `measurements` hold no features.
    #[must_use]
    pub const fn is_empty(self, measurements: &Measurements) -> bool {
        measurements.is_empty()
    }

    /// Add millimetre fields when `dpi` is known.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDpi`] if conversion fails.
    pub fn post_process(
        self,
        measurements: Measurements,
        dpi: Option<Dpi>,
    ) -> Result<Measurements, PipelineError> {
        match dpi {
            Some(dpi) => measurements.with_physical_units(dpi),
            None => {
                log::debug!("{}: no DPI, reporting pixels only", self.id());
                Ok(measurements)
            }
        }
    }
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for AnalysisMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.id() == s)
            .ok_or_else(|| PipelineError::InvalidConfig(format!("unknown analysis mode {s:?}")))
    }
}

/// Run a fracture analysis.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyImage`] for a zero-sized image,
/// [`PipelineError::MissingParameter`] or
/// [`PipelineError::InvalidParameter`] for an unusable threshold or
/// segmentation configuration, and [`PipelineError::InvalidConfig`] for
/// a bad millimetre threshold.
pub fn run_fracture_analysis(
    image: &DynamicImage,
    params: &AnalysisParameters,
    dpi: Option<Dpi>,
) -> Result<AnalysisResult, PipelineError> {
    AnalysisMode::Fracture.run_full(image, params, dpi)
}

/// Run a pore analysis.
///
/// # Errors
///
/// Same as [`run_fracture_analysis`].
pub fn run_pore_analysis(
    image: &DynamicImage,
    params: &AnalysisParameters,
    dpi: Option<Dpi>,
) -> Result<AnalysisResult, PipelineError> {
    AnalysisMode::Pore.run_full(image, params, dpi)
}

/// Run up to `stage` in `mode`.
///
/// # Errors
///
/// Same as [`AnalysisMode::run_staged`].
pub fn run_staged(
    mode: AnalysisMode,
    image: &DynamicImage,
    params: &AnalysisParameters,
    stage: PreviewStage,
) -> Result<Previews, PipelineError> {
    mode.run_staged(image, params, stage)
}

/// A mode bound to its parameter set.
///
/// Holds no state between runs; every call starts from the image.
#[derive(Debug, Clone, PartialEq)]
pub struct Analyzer {
    mode: AnalysisMode,
    params: AnalysisParameters,
}

impl Analyzer {
    /// Bind `mode` to `params`.
    #[must_use]
    pub const fn new(mode: AnalysisMode, params: AnalysisParameters) -> Self {
        Self { mode, params }
    }

    /// Bind `mode` to its built-in template.
    #[must_use]
    pub fn with_defaults(mode: AnalysisMode) -> Self {
        Self::new(mode, mode.default_parameters())
    }

    /// The analysis mode.
    #[must_use]
    pub const fn mode(&self) -> AnalysisMode {
        self.mode
    }

    /// The parameter set every run reads.
    #[must_use]
    pub const fn params(&self) -> &AnalysisParameters {
        &self.params
    }

    /// Change one parameter by key path.
    ///
    /// # Errors
    ///
    /// See [`AnalysisParameters::set`].
    pub fn set_parameter(&mut self, path: &str, value: serde_json::Value) -> Result<(), PipelineError> {
        self.params.set(path, value)
    }

    /// Run every stage.
    ///
    /// # Errors
    ///
    /// See [`run_fracture_analysis`].
    pub fn run(&self, image: &DynamicImage, dpi: Option<Dpi>) -> Result<AnalysisResult, PipelineError> {
        self.mode.run_full(image, &self.params, dpi)
    }

    /// Run up to `stage`.
    ///
    /// # Errors
    ///
    /// See [`AnalysisMode::run_staged`].
    pub fn preview(&self, image: &DynamicImage, stage: PreviewStage) -> Result<Previews, PipelineError> {
        self.mode.run_staged(image, &self.params, stage)
    }
}

/// How far a preview run goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStage {
    /// Grayscale conversion.
    Gray,
    /// Thresholding.
    Binary,
    /// Morphological clean-up.
    Morph,
}

impl PreviewStage {
    /// Every stage, in pipeline order.
    pub const ALL: [Self; 3] = [Self::Gray, Self::Binary, Self::Morph];

    /// Stable identifier.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Gray => "gray",
            Self::Binary => "binary",
            Self::Morph => "morph",
        }
    }
}

impl std::str::FromStr for PreviewStage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.id() == s)
            .ok_or_else(|| PipelineError::InvalidConfig(format!("unknown preview stage {s:?}")))
    }
}

/// Intermediate images. A staged run leaves the stages it did not reach
/// as `None`; a full run fills all three.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Previews {
    /// Grayscale input, before blurring.
    pub gray: Option<GrayImage>,
    /// Threshold output.
    pub binary: Option<BinaryMask>,
    /// Clean-up output. In pore mode, the segmenter's opened mask.
    pub morph: Option<BinaryMask>,
}

impl Previews {
    /// The image for `stage`, if it was computed.
    #[must_use]
    pub fn get(&self, stage: PreviewStage) -> Option<&GrayImage> {
        match stage {
            PreviewStage::Gray => self.gray.as_ref(),
            PreviewStage::Binary => self.binary.as_ref().map(BinaryMask::as_gray),
            PreviewStage::Morph => self.morph.as_ref().map(BinaryMask::as_gray),
        }
    }
}

/// Whether a completed run found anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// At least one feature.
    Ready,
    /// Valid run, no features.
    Empty,
}

/// Everything one run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// Mode that produced the result.
    pub mode: AnalysisMode,
    /// Source image with the features drawn on it.
    pub visualization: RgbImage,
    /// Measurement table.
    pub measurements: Measurements,
    /// Intermediate images.
    pub previews: Previews,
    /// Whether anything was found.
    pub status: AnalysisStatus,
    /// Resolution used for millimetre fields, if any.
    pub dpi: Option<Dpi>,
}

impl AnalysisResult {
    /// The mode's empty message when nothing was found.
    #[must_use]
    pub const fn message(&self) -> Option<&'static str> {
        match self.status {
            AnalysisStatus::Ready => None,
            AnalysisStatus::Empty => Some(self.mode.empty_message()),
        }
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Nothing computed yet. Call [`preprocess`](Self::preprocess) to
/// continue.
#[must_use = "pipeline stages are consumed by advancing; call .preprocess() to continue"]
pub struct Pending<'a> {
    image: &'a DynamicImage,
    mode: AnalysisMode,
    params: AnalysisParameters,
}

impl Pending<'_> {
    /// The source image.
    #[must_use]
    pub const fn image(&self) -> &DynamicImage {
        self.image
    }

    /// Convert to grayscale and blur.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyImage`] if the image has zero width
    /// or height.
    pub fn preprocess(self) -> Result<Preprocessed, PipelineError> {
        if self.image.width() == 0 || self.image.height() == 0 {
            return Err(PipelineError::EmptyImage);
        }
        let gray = grayscale::to_gray(self.image);
        let blurred = blur::gaussian_blur(&gray, self.params.threshold.blur_kernel_size);
        Ok(Preprocessed {
            mode: self.mode,
            color: grayscale::to_rgb(self.image),
            gray,
            blurred,
            params: self.params,
        })
    }
}

// ───────────────────────── Stage 1: Preprocessed ─────────────────────

/// Grayscale and blurred copies exist. Call
/// [`threshold`](Self::threshold) to continue.
#[must_use = "pipeline stages are consumed by advancing; call .threshold() to continue"]
pub struct Preprocessed {
    mode: AnalysisMode,
    params: AnalysisParameters,
    color: RgbImage,
    gray: GrayImage,
    blurred: GrayImage,
}

impl Preprocessed {
    /// Grayscale input.
    #[must_use]
    pub const fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Blurred grayscale, the threshold input.
    #[must_use]
    pub const fn blurred(&self) -> &GrayImage {
        &self.blurred
    }

    /// Binarize the blurred image.
    ///
    /// # Errors
    ///
    /// Returns the threshold engine's configuration errors.
    pub fn threshold(self) -> Result<Thresholded, PipelineError> {
        let binary = threshold::apply(&self.blurred, &self.params.threshold)?;
        Ok(Thresholded {
            mode: self.mode,
            params: self.params,
            color: self.color,
            gray: self.gray,
            binary,
        })
    }
}

// ───────────────────────── Stage 2: Thresholded ──────────────────────

/// Binary mask exists. Call [`clean`](Self::clean) to continue.
#[must_use = "pipeline stages are consumed by advancing; call .clean() to continue"]
pub struct Thresholded {
    mode: AnalysisMode,
    params: AnalysisParameters,
    color: RgbImage,
    gray: GrayImage,
    binary: threshold::Thresholded,
}

impl Thresholded {
    /// Features at 255.
    #[must_use]
    pub const fn binary(&self) -> &BinaryMask {
        &self.binary.mask
    }

    /// Global cut-off, for methods that have one.
    #[must_use]
    pub const fn level(&self) -> Option<f64> {
        self.binary.level
    }

    /// Run the opening and closing stages.
    pub fn clean(self) -> Cleaned {
        let morph = morphology::clean(&self.binary.mask, &self.params.morphology);
        let preview = match self.mode {
            AnalysisMode::Fracture => morph.mask.clone(),
            AnalysisMode::Pore => pore::open_speckle(&morph.mask, &self.params.morphology.watershed),
        };
        Cleaned {
            mode: self.mode,
            params: self.params,
            color: self.color,
            gray: self.gray,
            binary: self.binary.mask,
            morph,
            preview,
        }
    }
}

// ───────────────────────── Stage 3: Cleaned ──────────────────────────

/// Cleaned mask exists. Call [`extract`](Self::extract) to continue.
#[must_use = "pipeline stages are consumed by advancing; call .extract() to continue"]
pub struct Cleaned {
    mode: AnalysisMode,
    params: AnalysisParameters,
    color: RgbImage,
    gray: GrayImage,
    binary: BinaryMask,
    morph: MorphologyOutput,
    preview: BinaryMask,
}

impl Cleaned {
    /// Clean-up output with the stage parameters that ran.
    #[must_use]
    pub const fn morphology(&self) -> &MorphologyOutput {
        &self.morph
    }

    /// The mask shown as the morphology preview.
    #[must_use]
    pub const fn preview(&self) -> &BinaryMask {
        &self.preview
    }

    /// Detect and measure features. `dpi` resolves millimetre
    /// thresholds; without it the pixel fallbacks apply.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a bad millimetre
    /// threshold and [`PipelineError::InvalidParameter`] for a bad
    /// watershed configuration.
    pub fn extract(self, dpi: Option<Dpi>) -> Result<Extracted, PipelineError> {
        let features = match self.mode {
            AnalysisMode::Fracture => {
                let detected =
                    fracture::detect(&self.morph.mask, &self.params.fracture_criteria(dpi)?);
                let fractures = if self.params.merging.enabled {
                    merge_fractures(detected, &self.params.merge_tolerance(dpi)?)
                } else {
                    detected
                };
                Features::Fractures(fractures)
            }
            AnalysisMode::Pore => Features::Pores(pore::segment(
                &self.morph.mask,
                &self.color,
                &self.params.morphology.watershed,
                &self.params.pore_criteria(),
            )?),
        };
        Ok(Extracted {
            mode: self.mode,
            color: self.color,
            gray: self.gray,
            binary: self.binary,
            preview: self.preview,
            features,
            dpi,
        })
    }
}

// ───────────────────────── Stage 4: Extracted ────────────────────────

/// Features found by one mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Features {
    /// Detected (and possibly merged) fractures.
    Fractures(Vec<Fracture>),
    /// Pore segmentation with its accepted regions.
    Pores(PoreSegmentation),
}

impl Features {
    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Fractures(f) => f.len(),
            Self::Pores(p) => p.regions.len(),
        }
    }

    /// Whether nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Features exist. Call [`into_result`](Self::into_result) to render and
/// measure.
#[must_use = "call .into_result() to extract the AnalysisResult"]
pub struct Extracted {
    mode: AnalysisMode,
    color: RgbImage,
    gray: GrayImage,
    binary: BinaryMask,
    preview: BinaryMask,
    features: Features,
    dpi: Option<Dpi>,
}

impl Extracted {
    /// The features found.
    #[must_use]
    pub const fn features(&self) -> &Features {
        &self.features
    }

    /// Draw the overlay and build the measurement table.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDpi`] if unit conversion fails.
    pub fn into_result(self) -> Result<AnalysisResult, PipelineError> {
        let (visualization, measurements) = match &self.features {
            Features::Fractures(fractures) => (
                render::draw_fractures(&self.color, fractures),
                Measurements::from_fractures(fractures),
            ),
            Features::Pores(seg) => (
                render::draw_pores(&self.color, &seg.regions),
                Measurements::from_pores(&seg.regions, self.binary.dimensions()),
            ),
        };
        let measurements = self.mode.post_process(measurements, self.dpi)?;
        let status = if self.mode.is_empty(&measurements) {
            AnalysisStatus::Empty
        } else {
            AnalysisStatus::Ready
        };
        log::info!(
            "{}: {} features, total area {:.1} px{}",
            self.mode.name(),
            measurements.count,
            measurements.total_area_pixels,
            self.dpi
                .map(|d| format!(" at {} dpi", d.scale()))
                .unwrap_or_default(),
        );

        Ok(AnalysisResult {
            mode: self.mode,
            visualization,
            measurements,
            previews: Previews {
                gray: Some(self.gray),
                binary: Some(self.binary),
                morph: Some(self.preview),
            },
            status,
            dpi: self.dpi,
        })
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental analysis pipeline. See the [module docs](self).
pub struct Pipeline;

impl Pipeline {
    /// Store the image, mode and parameters without processing anything.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(
        image: &DynamicImage,
        mode: AnalysisMode,
        params: AnalysisParameters,
    ) -> Pending<'_> {
        Pending {
            image,
            mode,
            params,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Luma;

    /// Light background with a dark horizontal band, 5 px tall.
    fn cracked(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
            let in_band = (10..width - 10).contains(&x) && (height / 2 - 2..=height / 2 + 2).contains(&y);
            Luma([if in_band { 30 } else { 200 }])
        }))
    }

    fn blank(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([200])))
    }

    #[test]
    fn mode_ids_round_trip() {
        for mode in AnalysisMode::ALL {
            assert_eq!(mode.id().parse::<AnalysisMode>().unwrap(), mode);
            assert_eq!(mode.to_string(), mode.id());
        }
        assert!("grain".parse::<AnalysisMode>().is_err());
    }

    #[test]
    fn empty_image_is_rejected() {
        let image = DynamicImage::new_luma8(0, 0);
        for mode in AnalysisMode::ALL {
            assert!(matches!(
                mode.run_full(&image, &mode.default_parameters(), None),
                Err(PipelineError::EmptyImage)
            ));
            assert!(matches!(
                mode.run_staged(&image, &mode.default_parameters(), PreviewStage::Gray),
                Err(PipelineError::EmptyImage)
            ));
        }
    }

    #[test]
    fn stages_expose_intermediates() {
        let image = cracked(100, 40);
        let params = AnalysisParameters::fracture();
        let pre = Pipeline::new(&image, AnalysisMode::Fracture, params)
            .preprocess()
            .unwrap();
        assert_eq!(pre.gray().dimensions(), (100, 40));
        assert_ne!(pre.blurred(), pre.gray());

        let thr = pre.threshold().unwrap();
        assert!(thr.binary().is_foreground(50, 20));
        assert!(!thr.binary().is_foreground(50, 2));
        assert!(thr.level().is_none());

        let cleaned = thr.clean();
        assert!(cleaned.morphology().opening.is_some());
        let extracted = cleaned.extract(None).unwrap();
        assert_eq!(extracted.features().len(), 1);
    }

    #[test]
    fn fracture_run_produces_a_record() {
        let result = run_fracture_analysis(&cracked(100, 40), &AnalysisParameters::fracture(), None)
            .unwrap();
        assert_eq!(result.status, AnalysisStatus::Ready);
        assert_eq!(result.measurements.count, 1);
        assert!(result.dpi.is_none());
        assert!(result.measurements.total_area_mm2.is_none());
        let f = result.measurements.details[0].as_fracture().unwrap();
        assert!(f.length_pixels > 60.0, "length {}", f.length_pixels);
        assert!(f.angle < 5.0 || f.angle > 175.0);
        assert_eq!(result.visualization.dimensions(), (100, 40));
        assert!(result.previews.morph.is_some());
    }

    #[test]
    fn millimetres_follow_dpi() {
        let dpi = Dpi::uniform(254.0).unwrap();
        let result = run_fracture_analysis(
            &cracked(100, 40),
            &AnalysisParameters::fracture(),
            Some(dpi),
        )
        .unwrap();
        let m = &result.measurements;
        let mm = m.total_length_mm.unwrap();
        assert!((mm - m.total_length_pixels.unwrap() * 0.1).abs() < 1e-9);
        assert_eq!(result.dpi, Some(dpi));
    }

    #[test]
    fn blank_image_is_an_empty_outcome() {
        for mode in AnalysisMode::ALL {
            let result = mode
                .run_full(&blank(60, 60), &mode.default_parameters(), None)
                .unwrap();
            assert_eq!(result.status, AnalysisStatus::Empty);
            assert_eq!(result.message(), Some(mode.empty_message()));
            assert!(result.measurements.details.is_empty());
        }
    }

    #[test]
    fn staged_run_stops_where_asked() {
        let image = cracked(80, 30);
        let analyzer = Analyzer::with_defaults(AnalysisMode::Fracture);
        let gray = analyzer.preview(&image, PreviewStage::Gray).unwrap();
        assert!(gray.gray.is_some() && gray.binary.is_none() && gray.morph.is_none());
        let binary = analyzer.preview(&image, PreviewStage::Binary).unwrap();
        assert!(binary.binary.is_some() && binary.morph.is_none());
        let morph = analyzer.preview(&image, PreviewStage::Morph).unwrap();
        for stage in PreviewStage::ALL {
            assert!(morph.get(stage).is_some());
        }
    }

    #[test]
    fn pore_morph_preview_is_the_opened_mask() {
        // The single dark pixels pass Otsu but not the opening.
        let image = DynamicImage::ImageLuma8(GrayImage::from_fn(60, 60, |x, y| {
            let disk = (f64::from(x) - 30.0).hypot(f64::from(y) - 30.0) <= 12.0;
            let speck = (x, y) == (5, 5) || (x, y) == (50, 8);
            Luma([if disk || speck { 30 } else { 210 }])
        }));
        let mut params = AnalysisParameters::pore();
        params.threshold.blur_kernel_size = 0;
        let previews = run_staged(AnalysisMode::Pore, &image, &params, PreviewStage::Morph).unwrap();
        let expected = pore::open_speckle(
            previews.binary.as_ref().unwrap(),
            &params.morphology.watershed,
        );
        let binary = previews.binary.as_ref().unwrap();
        assert!(binary.is_foreground(5, 5));
        let morph = previews.morph.unwrap();
        assert!(!morph.is_foreground(5, 5));
        assert!(morph.is_foreground(30, 30));
        assert_eq!(morph, expected);
    }

    #[test]
    fn unknown_threshold_method_fails_loudly() {
        let mut analyzer = Analyzer::with_defaults(AnalysisMode::Fracture);
        assert!(
            analyzer
                .set_parameter("threshold.method", serde_json::json!("magic"))
                .is_err()
        );
        assert_eq!(analyzer.params(), &AnalysisParameters::fracture());
    }

    #[test]
    fn missing_parameter_is_reported() {
        let mut params = AnalysisParameters::fracture();
        params.threshold.window_size = None;
        let err = run_fracture_analysis(&cracked(60, 30), &params, None).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingParameter {
                method: "sauvola",
                key: "window_size"
            }
        ));
    }
}
