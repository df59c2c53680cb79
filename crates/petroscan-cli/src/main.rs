//! petroscan: run one fracture or pore analysis on a micrograph.
//!
//! Loads the image, resolves parameters (mode template, optional
//! parameter file, `--set` overrides), runs the pipeline and prints the
//! measurement table as JSON on stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! petroscan [OPTIONS] <IMAGE_PATH>
//! petroscan --mode pore --dpi 2400 --set threshold.method=sauvola core.png
//! petroscan --mode fracture --stage binary --preview-dir out/ core.png
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use petroscan_pipeline::{
    AnalysisMode, AnalysisParameters, AnalysisResult, Analyzer, Dpi, DynamicImage, ParameterFile,
    PreviewStage, Previews,
};

/// Largest accepted image, in pixels, unless `--max-pixels` says otherwise.
const DEFAULT_MAX_PIXELS: u64 = 40_000_000;

/// Pore and fracture measurement for rock-core micrographs.
#[derive(Parser)]
#[command(name = "petroscan", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, TIFF, WebP).
    image_path: PathBuf,

    /// Which features to measure.
    #[arg(long, value_enum, default_value_t = Mode::Fracture)]
    mode: Mode,

    /// Image resolution in dots per inch. Without it only pixel units are
    /// reported.
    #[arg(long)]
    dpi: Option<f64>,

    /// Vertical resolution, when it differs from `--dpi`.
    #[arg(long, requires = "dpi")]
    dpi_y: Option<f64>,

    /// Parameter file (JSON with `version` and `analysis_parameters`).
    #[arg(long)]
    params: Option<PathBuf>,

    /// Parameter tree as a JSON string, laid over the mode template.
    /// Sections it leaves out keep the template's values.
    #[arg(long, conflicts_with = "params")]
    config_json: Option<String>,

    /// Override one parameter, e.g. `threshold.method=otsu`. Repeatable.
    #[arg(long = "set", value_name = "PATH=VALUE")]
    overrides: Vec<String>,

    /// Stop after this stage and only write previews.
    #[arg(long, value_enum)]
    stage: Option<Stage>,

    /// Write the annotated image here.
    #[arg(long)]
    visualization: Option<PathBuf>,

    /// Write `gray.png`, `binary.png` and `morph.png` into this directory.
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// Save the resolved parameters as a parameter file.
    #[arg(long)]
    save_params: Option<PathBuf>,

    /// Refuse images with more pixels than this.
    #[arg(long, default_value_t = DEFAULT_MAX_PIXELS)]
    max_pixels: u64,

    /// Log per-stage details.
    #[arg(short, long)]
    verbose: bool,
}

/// Analysis mode selection.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Elongated cracks.
    Fracture,
    /// Watershed-separated pores.
    Pore,
}

impl From<Mode> for AnalysisMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Fracture => Self::Fracture,
            Mode::Pore => Self::Pore,
        }
    }
}

/// Preview stage selection.
#[derive(Clone, Copy, ValueEnum)]
enum Stage {
    /// Grayscale conversion.
    Gray,
    /// Thresholding.
    Binary,
    /// Morphological clean-up.
    Morph,
}

impl From<Stage> for PreviewStage {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Gray => Self::Gray,
            Stage::Binary => Self::Binary,
            Stage::Morph => Self::Morph,
        }
    }
}

/// Resolve the parameter tree: the mode template with `--config-json` or
/// the parameter file laid over it, then each `--set` in order.
fn params_from_cli(cli: &Cli, mode: AnalysisMode) -> Result<AnalysisParameters, String> {
    let mut params = if let Some(ref json) = cli.config_json {
        let overrides: serde_json::Value =
            serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?;
        AnalysisParameters::for_mode_with(mode, overrides)
            .map_err(|e| format!("--config-json: {e}"))?
    } else if let Some(ref path) = cli.params {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        ParameterFile::from_json_str(&text)
            .and_then(|file| file.into_parameters(mode))
            .map_err(|e| format!("{}: {e}", path.display()))?
    } else {
        mode.default_parameters()
    };

    for raw in &cli.overrides {
        let (path, value) = raw
            .split_once('=')
            .ok_or_else(|| format!("--set expects PATH=VALUE, got {raw:?}"))?;
        params
            .set_str(path.trim(), value)
            .map_err(|e| format!("--set {raw}: {e}"))?;
    }
    Ok(params)
}

fn dpi_from_cli(cli: &Cli) -> Option<Dpi> {
    let x = cli.dpi?;
    Dpi::from_metadata(x, cli.dpi_y.unwrap_or(x))
}

/// Decode the image after checking its size against `max_pixels`.
fn load_image(path: &Path, max_pixels: u64) -> Result<DynamicImage, String> {
    let (w, h) = image::image_dimensions(path)
        .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    let pixels = u64::from(w) * u64::from(h);
    if pixels > max_pixels {
        return Err(format!(
            "{} is {w}x{h} ({pixels} pixels), above the {max_pixels} pixel limit",
            path.display()
        ));
    }
    image::open(path).map_err(|e| format!("Error decoding {}: {e}", path.display()))
}

fn write_previews(dir: &Path, previews: &Previews) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
    for stage in PreviewStage::ALL {
        if let Some(image) = previews.get(stage) {
            let path = dir.join(format!("{}.png", stage.id()));
            image
                .save(&path)
                .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
            log::info!("preview written to {}", path.display());
        }
    }
    Ok(())
}

fn report(result: &AnalysisResult) -> serde_json::Value {
    serde_json::json!({
        "mode": result.mode,
        "status": result.status,
        "message": result.message(),
        "dpi": result.dpi,
        "measurements": result.measurements,
    })
}

fn run(cli: &Cli) -> Result<(), String> {
    let mode = AnalysisMode::from(cli.mode);
    let params = params_from_cli(cli, mode)?;

    if let Some(ref path) = cli.save_params {
        let json = ParameterFile::from_parameters(&params)
            .and_then(|file| file.to_json_string())
            .map_err(|e| e.to_string())?;
        std::fs::write(path, json).map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        log::info!("parameters saved to {}", path.display());
    }

    let image = load_image(&cli.image_path, cli.max_pixels)?;
    log::info!(
        "{}: {}x{} ({})",
        cli.image_path.display(),
        image.width(),
        image.height(),
        mode.name()
    );
    let analyzer = Analyzer::new(mode, params);

    if let Some(stage) = cli.stage {
        let previews = analyzer
            .preview(&image, stage.into())
            .map_err(|e| format!("Pipeline error: {e}"))?;
        match cli.preview_dir {
            Some(ref dir) => write_previews(dir, &previews)?,
            None => log::warn!("--stage without --preview-dir writes nothing"),
        }
        return Ok(());
    }

    let result = analyzer
        .run(&image, dpi_from_cli(cli))
        .map_err(|e| format!("Pipeline error: {e}"))?;

    if let Some(ref path) = cli.visualization {
        result
            .visualization
            .save(path)
            .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        log::info!("visualization written to {}", path.display());
    }
    if let Some(ref dir) = cli.preview_dir {
        write_previews(dir, &result.previews)?;
    }
    if let Some(message) = result.message() {
        eprintln!("{message}");
    }

    let json = serde_json::to_string_pretty(&report(&result))
        .map_err(|e| format!("Error serializing measurements: {e}"))?;
    println!("{json}");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
