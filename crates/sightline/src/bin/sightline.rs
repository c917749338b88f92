//! sightline CLI: run camera pipelines over image files and calibrate cameras.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use sightline::calib::{BoardSpec, CalibrationParams, CalibrationSession};
use sightline::core::{LensKind, Resolution};
use sightline::pipeline::{
    CameraConfig, FieldValue, FrameSource, FrameSourceError, ImageFileSource, PipelineResult,
    PipelineType, VisionContext,
};
use sightline::report::FrameReport;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "sightline")]
#[command(about = "Run vision pipelines over camera frames and calibrate cameras")]
#[command(version)]
struct Cli {
    /// Log level when built without the `tracing` feature.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a camera config with one stock pipeline.
    Init {
        #[arg(long)]
        name: String,
        /// Diagonal field of view in degrees.
        #[arg(long, default_value_t = 70.0)]
        fov: f64,
        #[arg(long)]
        out: PathBuf,
    },

    /// List the pipelines of a camera config.
    List {
        #[arg(long)]
        config: PathBuf,
    },

    /// Add a pipeline to a camera config.
    Add {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, value_enum, default_value_t = KindArg::Reflective)]
        kind: KindArg,
        #[arg(long)]
        name: String,
    },

    /// Change one settings field of a pipeline.
    Set(SetArgs),

    /// Run the selected pipeline over a folder of images.
    Run(RunArgs),

    /// Calibrate a camera from photos of a board.
    Calibrate(CalibrateArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Reflective,
    ColoredShape,
}

impl From<KindArg> for PipelineType {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Reflective => PipelineType::Reflective,
            KindArg::ColoredShape => PipelineType::ColoredShape,
        }
    }
}

#[derive(Debug, Args)]
struct SetArgs {
    #[arg(long)]
    config: PathBuf,
    /// Pipeline index; -1 is driver mode, -2 calibration.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pipeline: i32,
    #[arg(long)]
    field: String,
    /// JSON value, e.g. `true`, `12`, `0.5` or `[50, 70]`.
    #[arg(long)]
    value: String,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    config: PathBuf,
    /// Folder of PNG or JPEG frames, replayed in file-name order.
    #[arg(long)]
    images: PathBuf,
    /// Pipeline to run instead of the config's current one.
    #[arg(long, allow_negative_numbers = true)]
    pipeline: Option<i32>,
    /// Write JSON lines here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Folder for annotated frames.
    #[arg(long)]
    annotated: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CalibrateArgs {
    /// Folder of board photos.
    #[arg(long)]
    images: PathBuf,
    /// Inner corners (or dots) per row.
    #[arg(long)]
    cols: u32,
    #[arg(long)]
    rows: u32,
    /// Square edge or dot pitch in metres.
    #[arg(long)]
    square_size: f64,
    /// Asymmetric dot grid instead of a chessboard.
    #[arg(long)]
    dots: bool,
    #[arg(long)]
    fisheye: bool,
    /// Store the result in this camera config.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the coefficients as JSON.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Init { name, fov, out } => run_init(&name, fov, &out),
        Commands::List { config } => run_list(&config),
        Commands::Add { config, kind, name } => run_add(&config, kind.into(), &name),
        Commands::Set(args) => run_set(&args),
        Commands::Run(args) => run_pipeline(&args),
        Commands::Calibrate(args) => run_calibrate(&args),
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: &str) -> CliResult<()> {
    use log::LevelFilter;
    use std::str::FromStr;

    let level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);
    sightline::core::init_with_level(level)?;
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_logging(_level: &str) -> CliResult<()> {
    sightline::core::init_tracing(false);
    Ok(())
}

fn run_init(name: &str, fov: f64, out: &Path) -> CliResult<()> {
    let mut config = CameraConfig::new(name, fov);
    let manager = config.build_manager()?;
    config.store_manager(&manager);
    config.write_json(out)?;
    info!("wrote {}", out.display());
    Ok(())
}

fn run_list(path: &Path) -> CliResult<()> {
    let config = CameraConfig::load_json(path)?;
    let manager = config.build_manager()?;
    for (i, s) in manager.user_pipelines().iter().enumerate() {
        let marker = if i as i32 == manager.current_index() { "*" } else { " " };
        println!("{marker} {i:>3}  {:<24} {:?}", s.nickname(), s.pipeline_type());
    }
    Ok(())
}

fn run_add(path: &Path, kind: PipelineType, name: &str) -> CliResult<()> {
    let mut config = CameraConfig::load_json(path)?;
    let mut manager = config.build_manager()?;
    let index = manager.add(kind, name)?;
    println!("{index}");
    config.store_manager(&manager);
    config.write_json(path)?;
    Ok(())
}

fn run_set(args: &SetArgs) -> CliResult<()> {
    let value: FieldValue = serde_json::from_str(&args.value)
        .map_err(|e| format!("--value {:?} is not a field value: {e}", args.value))?;
    let mut config = CameraConfig::load_json(&args.config)?;
    let mut manager = config.build_manager()?;
    manager.set_field(args.pipeline, &args.field, value)?;
    config.store_manager(&manager);
    config.write_json(&args.config)?;
    info!("pipeline {}: {} = {}", args.pipeline, args.field, args.value);
    Ok(())
}

fn run_pipeline(args: &RunArgs) -> CliResult<()> {
    let config = CameraConfig::load_json(&args.config)?;
    let name = config.name.clone();
    let source = ImageFileSource::from_dir(&args.images)?;
    if source.remaining() == 0 {
        return Err(format!("no images in {}", args.images.display()).into());
    }

    let mut ctx = VisionContext::new();
    let camera = ctx.add_camera(config)?;
    if let Some(index) = args.pipeline {
        sightline::pipeline::lock_camera(&camera)
            .manager
            .set_current(index)?;
    }
    ctx.attach_source(&name, Box::new(source) as Box<dyn FrameSource>)?;
    if let Some(dir) = &args.annotated {
        fs::create_dir_all(dir)?;
    }

    let mut out: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(BufWriter::new(fs::File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };

    let (tx, rx) = crossbeam_channel::unbounded::<PipelineResult>();
    let worker = ctx.start(&name, Box::new(tx))?;
    for result in rx.iter() {
        writeln!(out, "{}", serde_json::to_string(&FrameReport::from(&result))?)?;
        if let (Some(dir), Some(image)) = (&args.annotated, &result.annotated_frame) {
            image.save(dir.join(format!("frame_{:05}.png", result.sequence)))?;
        }
    }
    out.flush()?;
    let stats = worker.stop();
    info!(
        "{} frames, {} capture errors",
        stats.frames, stats.capture_errors
    );
    Ok(())
}

fn run_calibrate(args: &CalibrateArgs) -> CliResult<()> {
    let board = if args.dots {
        BoardSpec::dot_grid(args.cols, args.rows, args.square_size)
    } else {
        BoardSpec::chessboard(args.cols, args.rows, args.square_size)
    };
    let params = CalibrationParams {
        lens: if args.fisheye {
            LensKind::Fisheye
        } else {
            LensKind::Pinhole
        },
        ..CalibrationParams::default()
    };

    let mut source = ImageFileSource::from_dir(&args.images)?;
    let mut session: Option<CalibrationSession> = None;
    for frame in 0usize.. {
        let capture = match source.next_frame() {
            Ok(capture) => capture,
            Err(FrameSourceError::EndOfStream) => break,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        let resolution = Resolution::new(capture.image.width(), capture.image.height());
        let session = session.get_or_insert_with(|| {
            CalibrationSession::new(board, resolution, params.clone())
        });
        if session.resolution() != resolution {
            warn!(
                "frame {frame}: skipping {}x{} image, calibrating {}x{}",
                resolution.width,
                resolution.height,
                session.resolution().width,
                session.resolution().height
            );
            continue;
        }
        if !session.take_snapshot(&capture.image) {
            warn!("frame {frame}: board not found");
        }
    }
    let mut session = session.ok_or_else(|| format!("no images in {}", args.images.display()))?;
    let coefficients = session.run_calibration()?;
    println!(
        "rms reprojection error {:.4} px over {} views",
        coefficients.rms_error,
        session.snapshot_count()
    );

    if let Some(out) = &args.out {
        fs::write(out, serde_json::to_string_pretty(&coefficients)?)?;
    }
    if let Some(path) = &args.config {
        let mut config = CameraConfig::load_json(path)?;
        config.add_calibration(coefficients);
        config.write_json(path)?;
        info!("stored calibration in {}", path.display());
    }
    Ok(())
}
