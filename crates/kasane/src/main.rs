//! kasane: command-line front end for the operation engine.
//!
//! Loads an image, applies one catalog operation through a real session
//! (background worker, streamed progress), and saves the result:
//!
//! ```text
//! kasane photo.png --op sobel --threshold 0.2 --sigma 1.0 -o edges.png
//! ```
//!
//! `--describe` prints the operation catalog from the declarative
//! parameter descriptors; `--config-json` accepts a full serialized
//! operation selection and overrides the individual parameter flags.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use kasane_ops::chan_vese::ChanVeseParams;
use kasane_ops::conversion::{
    AdaptiveThresholdParams, BinaryThresholdParams, GrayscaleParams, HsvParams,
};
use kasane_ops::edge::{EdgeDetectParams, EdgeFilterKind};
use kasane_ops::morph_snakes::MorphSnakesParams;
use kasane_ops::segmentation::MultiOtsuParams;
use kasane_ops::{Operation, OperationError, OperationKind, ParamKind, catalog};
use kasane_session::{Coordinator, SessionError, SessionEvent};

/// Apply one image operation with live progress, then save the result.
#[derive(Parser)]
#[command(name = "kasane", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, TIFF).
    #[arg(required_unless_present = "describe")]
    image_path: Option<PathBuf>,

    /// Operation to apply.
    #[arg(long, value_enum)]
    op: Option<OpChoice>,

    /// Write the output image here (default: `<input stem>_out.png`).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the operation catalog and exit.
    #[arg(long)]
    describe: bool,

    /// Full operation selection as a serialized `OperationKind` JSON
    /// document. When provided, `--op` and all parameter flags are
    /// ignored.
    #[arg(long)]
    config_json: Option<String>,

    /// Brightness adjustment for grayscale (-1 to 1).
    #[arg(long, default_value_t = 0.0)]
    brightness: f32,

    /// Contrast adjustment for grayscale (0 to 3).
    #[arg(long, default_value_t = 1.0)]
    contrast: f32,

    /// Circular hue shift for HSV (-0.5 to 0.5).
    #[arg(long, default_value_t = 0.0)]
    hue_shift: f32,

    /// Saturation multiplier for HSV (0 to 2).
    #[arg(long, default_value_t = 1.0)]
    saturation_scale: f32,

    /// Value multiplier for HSV (0 to 2).
    #[arg(long, default_value_t = 1.0)]
    value_scale: f32,

    /// Threshold level: binary threshold level, or edge-detection
    /// gradient threshold (omit for the raw magnitude).
    #[arg(long)]
    threshold: Option<f32>,

    /// Invert the binary threshold output.
    #[arg(long)]
    invert: bool,

    /// Adaptive threshold neighborhood size (odd, at least 3).
    #[arg(long, default_value_t = 35)]
    block_size: u32,

    /// Adaptive threshold offset subtracted from the local mean.
    #[arg(long, default_value_t = 0.0)]
    constant: f32,

    /// Gaussian blur sigma before edge detection (0 = no blur).
    #[arg(long, default_value_t = 0.0)]
    sigma: f32,

    /// Number of Multi-Otsu classes (2 to 5).
    #[arg(long, default_value_t = 3)]
    classes: u8,

    /// Chan-Vese iteration cap.
    #[arg(long, default_value_t = 200)]
    max_iter: u32,

    /// Chan-Vese convergence tolerance.
    #[arg(long, default_value_t = 1e-3)]
    tol: f64,

    /// Chan-Vese contour length penalty.
    #[arg(long, default_value_t = 0.25)]
    mu: f64,

    /// Inside-region energy weight (Chan-Vese and morphological snakes).
    #[arg(long, default_value_t = 1.0)]
    lambda1: f64,

    /// Outside-region energy weight (Chan-Vese and morphological snakes).
    #[arg(long, default_value_t = 1.0)]
    lambda2: f64,

    /// Chan-Vese time step.
    #[arg(long, default_value_t = 0.5)]
    dt: f64,

    /// Morphological snakes iteration count.
    #[arg(long, default_value_t = 35)]
    iterations: u32,

    /// Morphological snakes smoothing passes per iteration.
    #[arg(long, default_value_t = 1)]
    smoothing: u32,
}

/// Operation selection.
#[derive(Clone, Copy, ValueEnum)]
enum OpChoice {
    /// Grayscale conversion with brightness/contrast.
    Grayscale,
    /// HSV adjustment.
    Hsv,
    /// Fixed binary threshold.
    BinaryThreshold,
    /// Local-mean adaptive threshold.
    AdaptiveThreshold,
    /// Roberts edge detection.
    Roberts,
    /// Sobel edge detection.
    Sobel,
    /// Scharr edge detection.
    Scharr,
    /// Prewitt edge detection.
    Prewitt,
    /// Multi-Otsu segmentation.
    MultiOtsu,
    /// Chan-Vese segmentation.
    ChanVese,
    /// Morphological snakes (ACWE) segmentation.
    MorphSnakes,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Io(#[from] kasane_io::IoError),

    #[error("invalid --config-json: {0}")]
    ConfigJson(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),

    #[error("operation '{operation}' failed: {source}")]
    RunFailed {
        operation: &'static str,
        #[source]
        source: OperationError,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.describe {
        print_catalog();
        return Ok(());
    }

    let image_path = cli
        .image_path
        .clone()
        .ok_or_else(|| CliError::Usage("an input image is required".to_string()))?;
    let kind = match &cli.config_json {
        Some(json) => serde_json::from_str::<OperationKind>(json)?.validated()?,
        None => build_kind(cli)?,
    };
    let output_path = cli.output.clone().unwrap_or_else(|| {
        let stem = image_path
            .file_stem()
            .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().to_string());
        image_path.with_file_name(format!("{stem}_out.png"))
    });

    let source = kasane_io::load(&image_path)?;
    let mut coordinator = Coordinator::new();
    coordinator.load_source(source, Some(image_path))?;
    coordinator.run(Operation::new(kind))?;

    let mut failure = None;
    while let Some(event) = coordinator.wait_event() {
        match event {
            SessionEvent::Progress { percent, message } => {
                eprintln!("[{percent:>3}%] {message}");
            }
            SessionEvent::Completed { label } => {
                eprintln!("{label}");
            }
            SessionEvent::Failed { operation, error } => {
                failure = Some(CliError::RunFailed {
                    operation,
                    source: error,
                });
            }
            SessionEvent::Cancelled { operation } => {
                failure = Some(CliError::Usage(format!("operation '{operation}' cancelled")));
            }
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }

    let output = coordinator
        .state()
        .output()
        .cloned()
        .ok_or_else(|| CliError::Usage("operation produced no output".to_string()))?;
    kasane_io::save(&output, &output_path)?;
    coordinator.mark_output_saved(output_path.clone());
    println!("{}", output_path.display());
    Ok(())
}

/// Construct the operation selection from `--op` and the parameter flags.
fn build_kind(cli: &Cli) -> Result<OperationKind, CliError> {
    let op = cli
        .op
        .ok_or_else(|| CliError::Usage("--op is required (or use --config-json)".to_string()))?;
    let edge = |filter: EdgeFilterKind| -> Result<OperationKind, OperationError> {
        Ok(OperationKind::EdgeDetect(EdgeDetectParams::new(
            filter,
            cli.threshold,
            cli.sigma,
        )?))
    };
    let kind = match op {
        OpChoice::Grayscale => {
            OperationKind::Grayscale(GrayscaleParams::new(cli.brightness, cli.contrast)?)
        }
        OpChoice::Hsv => OperationKind::Hsv(HsvParams::new(
            cli.hue_shift,
            cli.saturation_scale,
            cli.value_scale,
        )?),
        OpChoice::BinaryThreshold => OperationKind::BinaryThreshold(BinaryThresholdParams::new(
            cli.threshold.unwrap_or(0.5),
            cli.invert,
        )?),
        OpChoice::AdaptiveThreshold => OperationKind::AdaptiveThreshold(
            AdaptiveThresholdParams::new(cli.block_size, cli.constant)?,
        ),
        OpChoice::Roberts => edge(EdgeFilterKind::Roberts)?,
        OpChoice::Sobel => edge(EdgeFilterKind::Sobel)?,
        OpChoice::Scharr => edge(EdgeFilterKind::Scharr)?,
        OpChoice::Prewitt => edge(EdgeFilterKind::Prewitt)?,
        OpChoice::MultiOtsu => OperationKind::MultiOtsu(MultiOtsuParams::new(cli.classes)),
        OpChoice::ChanVese => OperationKind::ChanVese(ChanVeseParams::new(
            cli.max_iter,
            cli.tol,
            cli.mu,
            cli.lambda1,
            cli.lambda2,
            cli.dt,
        )?),
        OpChoice::MorphSnakes => OperationKind::MorphSnakes(MorphSnakesParams::new(
            cli.iterations,
            cli.smoothing,
            cli.lambda1,
            cli.lambda2,
        )?),
    };
    Ok(kind)
}

/// Print the operation catalog from the declarative descriptors.
fn print_catalog() {
    let mut current_family = None;
    for descriptor in catalog() {
        if current_family != Some(descriptor.family) {
            current_family = Some(descriptor.family);
            println!("{}", descriptor.family.label());
        }
        println!("  {}", descriptor.name);
        for param in descriptor.params {
            let bounds = match param.kind {
                ParamKind::Float { min, max, default } => {
                    format!("float [{min}, {max}] (default {default})")
                }
                ParamKind::Int { min, max, default } => {
                    format!("int [{min}, {max}] (default {default})")
                }
                ParamKind::Bool { default } => format!("flag (default {default})"),
                ParamKind::OptionalFloat { min, max } => {
                    format!("float [{min}, {max}] or unset")
                }
            };
            println!("    {:<18} {bounds}  {}", param.name, param.help);
        }
    }
}
