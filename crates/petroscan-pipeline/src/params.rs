//! Analysis parameters: the typed tree every run reads, the per-mode
//! templates, a validated key-path setter, and the JSON parameter file.
//!
//! The tree has four sections (`threshold`, `morphology`, `filtering`,
//! `merging`). Each section carries [`UiHints`], which the pipeline never
//! reads.
//!
//! Key paths are dot-separated (`"threshold.method"`,
//! `"morphology.opening.kernel_size.0"`). A path must name a field that
//! already exists; the setter never creates new keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::analysis::AnalysisMode;
use crate::fracture::FractureCriteria;
use crate::merge::{MergeTolerance, MergingParams};
use crate::morphology::MorphologyParams;
use crate::pore::PoreCriteria;
use crate::threshold::{ThresholdMethod, ThresholdParams};
use crate::types::PipelineError;
use crate::units::{Dpi, mm_to_pixels};

/// Metadata for an interactive front-end: whether editing a section
/// should refresh the preview immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiHints {
    /// Re-preview on every change.
    pub realtime: bool,
}

impl UiHints {
    /// Hints for a section that previews on every change.
    #[must_use]
    pub const fn realtime() -> Self {
        Self { realtime: true }
    }

    /// Hints for a section that only applies on an explicit run.
    #[must_use]
    pub const fn deferred() -> Self {
        Self { realtime: false }
    }
}

impl Default for UiHints {
    fn default() -> Self {
        Self::realtime()
    }
}

/// Feature acceptance thresholds.
///
/// Fracture mode reads the aspect ratio and length fields; pore mode
/// reads the area and solidity fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilteringParams {
    /// Smallest fracture aspect ratio.
    pub min_aspect_ratio: f64,
    /// Smallest fracture length in millimetres. Only used when the image
    /// has a DPI.
    pub min_length_mm: Option<f64>,
    /// Smallest fracture length in pixels, used when `min_length_mm` is
    /// unset or the image has no DPI.
    pub min_length_pixels: f64,
    /// Smallest pore area in pixels.
    pub min_area_pixels: f64,
    /// Smallest pore solidity.
    pub min_solidity: f64,
    /// UI metadata; never read by the pipeline.
    pub ui_hints: UiHints,
}

impl FilteringParams {
    /// Default minimum fracture length in millimetres.
    pub const DEFAULT_MIN_LENGTH_MM: f64 = 5.0;
}

impl Default for FilteringParams {
    fn default() -> Self {
        Self {
            min_aspect_ratio: FractureCriteria::DEFAULT_MIN_ASPECT_RATIO,
            min_length_mm: Some(Self::DEFAULT_MIN_LENGTH_MM),
            min_length_pixels: FractureCriteria::DEFAULT_MIN_LENGTH_PIXELS,
            min_area_pixels: PoreCriteria::DEFAULT_MIN_AREA_PIXELS,
            min_solidity: PoreCriteria::DEFAULT_MIN_SOLIDITY,
            ui_hints: UiHints::deferred(),
        }
    }
}

/// The full parameter tree read by one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParameters {
    /// Binarization.
    pub threshold: ThresholdParams,
    /// Mask clean-up and pore seed preparation.
    pub morphology: MorphologyParams,
    /// Feature acceptance.
    pub filtering: FilteringParams,
    /// Fracture fragment merging.
    pub merging: MergingParams,
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        Self::fracture()
    }
}

impl AnalysisParameters {
    /// Pore-mode blur kernel; larger than the fracture default to
    /// smooth grain texture before Otsu.
    pub const PORE_BLUR_KERNEL_SIZE: u32 = 7;

    /// The built-in template for `mode`.
    #[must_use]
    pub fn for_mode(mode: AnalysisMode) -> Self {
        match mode {
            AnalysisMode::Fracture => Self::fracture(),
            AnalysisMode::Pore => Self::pore(),
        }
    }

    /// The template for `mode` with a partial parameter tree laid over
    /// it. Sections and fields `overrides` leaves out keep the template's
    /// values; unknown keys are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `overrides` is not an
    /// object or a value fails validation.
    pub fn for_mode_with(mode: AnalysisMode, overrides: Value) -> Result<Self, PipelineError> {
        if !overrides.is_object() {
            return Err(PipelineError::InvalidConfig(
                "parameter overrides must be a JSON object".to_owned(),
            ));
        }
        let mut tree = serde_json::to_value(Self::for_mode(mode))
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        merge_into(&mut tree, overrides, "");
        serde_json::from_value(tree).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }

    /// Fracture template: Sauvola, kernel opening and closing, merging
    /// off.
    #[must_use]
    pub fn fracture() -> Self {
        Self {
            threshold: ThresholdParams::default(),
            morphology: MorphologyParams::default(),
            filtering: FilteringParams::default(),
            merging: MergingParams::default(),
        }
    }

    /// Pore template: Otsu on a stronger blur. The generic opening and
    /// closing stages are off because the segmenter does its own opening.
    #[must_use]
    pub fn pore() -> Self {
        let mut params = Self::fracture();
        params.threshold.method = ThresholdMethod::Otsu;
        params.threshold.blur_kernel_size = Self::PORE_BLUR_KERNEL_SIZE;
        params.morphology.opening.enabled = false;
        params.morphology.closing.enabled = false;
        params.merging.enabled = false;
        params
    }

    /// Read the value at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownParameterPath`] if `path` names no
    /// field.
    pub fn get(&self, path: &str) -> Result<Value, PipelineError> {
        let tree = self.to_tree()?;
        tree.pointer(&pointer(path)?)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownParameterPath(path.to_owned()))
    }

    /// Replace the value at `path`.
    ///
    /// The whole tree is re-validated after the change; on any error
    /// `self` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownParameterPath`] if `path` names no
    /// existing field, and [`PipelineError::InvalidConfig`] if the new
    /// value has the wrong type or is not an accepted name (for example
    /// an unknown threshold method).
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), PipelineError> {
        let mut tree = self.to_tree()?;
        let slot = tree
            .pointer_mut(&pointer(path)?)
            .ok_or_else(|| PipelineError::UnknownParameterPath(path.to_owned()))?;
        if slot.is_object() {
            return Err(PipelineError::UnknownParameterPath(format!(
                "{path} is a section, not a field"
            )));
        }
        *slot = value;

        let updated: Self = serde_json::from_value(tree)
            .map_err(|e| PipelineError::InvalidConfig(format!("{path}: {e}")))?;
        log::debug!("parameter {path} updated");
        *self = updated;
        Ok(())
    }

    /// Like [`set`](Self::set), parsing `raw` as JSON first. Text that is
    /// not valid JSON is taken as a bare string, so `otsu` and `"otsu"`
    /// are equivalent.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn set_str(&mut self, path: &str, raw: &str) -> Result<(), PipelineError> {
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.trim().to_owned()));
        self.set(path, value)
    }

    /// Fracture acceptance thresholds in pixels.
    ///
    /// `filtering.min_length_mm` wins when both it and `dpi` are set;
    /// otherwise `filtering.min_length_pixels` applies.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a negative or
    /// non-finite millimetre length.
    pub fn fracture_criteria(&self, dpi: Option<Dpi>) -> Result<FractureCriteria, PipelineError> {
        let f = &self.filtering;
        let min_length_pixels = match (f.min_length_mm, dpi) {
            (Some(mm), Some(dpi)) => {
                check_length("filtering.min_length_mm", mm)?;
                mm_to_pixels(mm, dpi.scale())?
            }
            (Some(mm), None) => {
                log::debug!(
                    "no DPI: ignoring min_length_mm = {mm}, using {} px",
                    f.min_length_pixels
                );
                f.min_length_pixels
            }
            (None, _) => f.min_length_pixels,
        };
        Ok(FractureCriteria {
            min_aspect_ratio: f.min_aspect_ratio,
            min_length_pixels,
        })
    }

    /// Pore acceptance thresholds.
    #[must_use]
    pub const fn pore_criteria(&self) -> PoreCriteria {
        PoreCriteria {
            min_area_pixels: self.filtering.min_area_pixels,
            min_solidity: self.filtering.min_solidity,
        }
    }

    /// Merge tolerances in pixels: `merging.max_distance_mm` through
    /// `dpi` when there is one, `merging.max_distance_pixels` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a negative or
    /// non-finite millimetre distance.
    pub fn merge_tolerance(&self, dpi: Option<Dpi>) -> Result<MergeTolerance, PipelineError> {
        let m = &self.merging;
        let max_distance_pixels = if let Some(dpi) = dpi {
            check_length("merging.max_distance_mm", m.max_distance_mm)?;
            mm_to_pixels(m.max_distance_mm, dpi.scale())?
        } else {
            log::warn!(
                "no DPI: merge distance falls back to {} px",
                m.max_distance_pixels
            );
            m.max_distance_pixels
        };
        Ok(MergeTolerance {
            max_distance_pixels,
            max_angle_diff: m.max_angle_diff,
        })
    }

    fn to_tree(&self) -> Result<Value, PipelineError> {
        serde_json::to_value(self).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }
}

// `"a.b.0"` as the JSON pointer `"/a/b/0"`.
fn pointer(path: &str) -> Result<String, PipelineError> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(PipelineError::UnknownParameterPath(path.to_owned()));
    }
    Ok(path.split('.').fold(String::new(), |mut acc, segment| {
        acc.push('/');
        acc.push_str(segment);
        acc
    }))
}

fn check_length(path: &str, mm: f64) -> Result<(), PipelineError> {
    if mm.is_finite() && mm >= 0.0 {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "{path} must be a non-negative length, got {mm}"
        )))
    }
}

// ───────────────────────── Parameter file ──────────────────────────

/// On-disk parameter file.
///
/// Parameters live either under `analysis_parameters` or under a key
/// named after the mode (`"fracture"`, `"pore"`). Any section or field
/// the file leaves out comes from the mode's template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterFile {
    /// Format version, `"<major>.<minor>"`.
    pub version: String,
    /// Parameters shared by every mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_parameters: Option<Value>,
    /// Per-mode parameter objects.
    #[serde(flatten)]
    pub per_mode: Map<String, Value>,
}

impl ParameterFile {
    /// Version written by [`from_parameters`](Self::from_parameters).
    pub const CURRENT_VERSION: &str = "1.0";

    /// Wrap a parameter tree for saving.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ParameterFile`] if serialisation fails.
    pub fn from_parameters(params: &AnalysisParameters) -> Result<Self, PipelineError> {
        let tree =
            serde_json::to_value(params).map_err(|e| PipelineError::ParameterFile(e.to_string()))?;
        Ok(Self {
            version: Self::CURRENT_VERSION.to_owned(),
            analysis_parameters: Some(tree),
            per_mode: Map::new(),
        })
    }

    /// Parse a parameter file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ParameterFile`] for malformed JSON, a
    /// missing `version`, or an unsupported major version.
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        let file: Self =
            serde_json::from_str(json).map_err(|e| PipelineError::ParameterFile(e.to_string()))?;
        file.check_version()?;
        Ok(file)
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ParameterFile`] if serialisation fails.
    pub fn to_json_string(&self) -> Result<String, PipelineError> {
        serde_json::to_string_pretty(self).map_err(|e| PipelineError::ParameterFile(e.to_string()))
    }

    /// Resolve the parameters for `mode`, filling gaps from the mode's
    /// template.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ParameterFile`] for an unsupported
    /// version or a section that is not an object, and
    /// [`PipelineError::InvalidConfig`] when a value fails validation
    /// (such as an unknown threshold method).
    pub fn into_parameters(self, mode: AnalysisMode) -> Result<AnalysisParameters, PipelineError> {
        self.check_version()?;
        let Self {
            analysis_parameters,
            mut per_mode,
            ..
        } = self;
        let overrides = analysis_parameters
            .or_else(|| per_mode.remove(mode.id()))
            .unwrap_or_else(|| Value::Object(Map::new()));
        if !overrides.is_object() {
            return Err(PipelineError::ParameterFile(
                "analysis parameters must be a JSON object".to_owned(),
            ));
        }

        AnalysisParameters::for_mode_with(mode, overrides)
    }

    fn check_version(&self) -> Result<(), PipelineError> {
        let major = self.version.split('.').next().unwrap_or_default();
        if major == "1" {
            Ok(())
        } else {
            Err(PipelineError::ParameterFile(format!(
                "unsupported parameter file version {:?}",
                self.version
            )))
        }
    }
}

// Older names still accepted in parameter files, keyed by full path.
const KEY_ALIASES: &[(&str, &str)] = &[("merging.merge_distance_mm", "max_distance_mm")];

// Overlay `overrides` onto `base`, recursing into objects. Keys `base`
// does not have are dropped with a warning.
fn merge_into(base: &mut Value, overrides: Value, prefix: &str) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                let key = KEY_ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == path)
                    .map_or(key.as_str(), |&(_, canonical)| canonical);
                match base.get_mut(key) {
                    Some(slot) => merge_into(slot, value, &path),
                    None => log::warn!("parameter file: ignoring unknown key {path}"),
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
