//! petroscan-pipeline: Rock-core micrograph analysis (sans-IO).
//!
//! Extracts fractures and pores from in-memory images through:
//! grayscale -> blur -> threshold -> morphology -> feature extraction
//! (skeleton-measured fractures, or watershed-split pores) -> measurement.
//!
//! This crate has **no I/O dependencies**: it takes a decoded
//! [`DynamicImage`] and an injected [`AnalysisParameters`] tree and
//! returns an [`AnalysisResult`]. Image loading, DPI discovery and
//! parameter file storage live in `petroscan-cli`.

pub mod analysis;
pub mod blur;
pub mod components;
pub mod contour;
pub mod fracture;
pub mod geometry;
pub mod grayscale;
pub mod kernel;
pub mod local_stats;
pub mod measure;
pub mod merge;
pub mod morphology;
pub mod params;
pub mod pore;
pub mod render;
pub mod skeleton;
pub mod threshold;
pub mod types;
pub mod units;
pub mod watershed;

pub use analysis::{
    AnalysisMode, AnalysisResult, AnalysisStatus, Analyzer, Pipeline, PreviewStage, Previews,
    run_fracture_analysis, run_pore_analysis, run_staged,
};
pub use measure::{FeatureRecord, FractureRecord, Measurements, PoreRecord};
pub use params::{AnalysisParameters, FilteringParams, ParameterFile, UiHints};
pub use threshold::{ThresholdMethod, ThresholdParams};
pub use types::{
    BinaryMask, Contour, Dimensions, DynamicImage, Foreground, GrayImage, PipelineError, PixelPoint,
    Point, RgbImage,
};
pub use units::Dpi;
