//! High-level facade for the `sightline-*` workspace.
//!
//! This crate provides:
//! - re-exports of the geometry, pipe, calibration and pipeline crates
//! - [`report`]: compact JSON-friendly summaries of pipeline results
//! - (feature `cli`) the `sightline` binary, which runs a camera's pipelines
//!   over image files and calibrates cameras from board photos
//!
//! ## Quickstart
//!
//! ```no_run
//! use sightline::pipeline::{CameraConfig, ImageFileSource, VisionContext};
//! use sightline::report::FrameReport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ctx = VisionContext::new();
//! ctx.add_camera(CameraConfig::load_json("front.json")?)?;
//! ctx.attach_source("front", Box::new(ImageFileSource::from_dir("frames")?))?;
//!
//! let (tx, rx) = crossbeam_channel::unbounded();
//! let worker = ctx.start("front", Box::new(tx))?;
//! for result in rx.iter() {
//!     println!("{}", serde_json::to_string(&FrameReport::from(&result))?);
//! }
//! worker.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `sightline::core`: camera models, coordinate systems, PnP and pose math.
//! - `sightline::pipes`: the timed image-processing stages.
//! - `sightline::calib`: board detection and camera calibration.
//! - `sightline::pipeline`: settings, pipelines, the pipeline manager,
//!   persistence and camera workers.

pub use sightline_calib as calib;
pub use sightline_core as core;
pub use sightline_pipeline as pipeline;
pub use sightline_pipes as pipes;

pub use sightline_core::{
    CameraCalibrationCoefficients, CoordinateSystem, FrameStaticProperties, PnpResult,
    TargetModel,
};
pub use sightline_pipeline::{
    CameraConfig, FieldValue, PipelineManager, PipelineResult, PipelineSettings, PipelineType,
    VisionContext, VisionPipeline,
};
pub use sightline_pipes::{Frame, TrackedTarget};

pub mod report;
