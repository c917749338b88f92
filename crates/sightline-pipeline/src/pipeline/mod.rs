//! Pipelines: fixed pipe chains bound to one settings record.
//!
//! A run has two phases. [`Pipeline::bind`] recomputes every stage's
//! parameters from the settings and the frame geometry; only then does
//! [`Pipeline::execute`] thread the frame through the chain. Both take
//! `&mut self`, so a pipeline instance never runs twice at once.

mod calibration;
mod colored_shape;
mod driver_mode;
mod reflective;
mod stages;

pub use calibration::{Calibration3dPipeline, CalibrationProgress};
pub use colored_shape::ColoredShapePipeline;
pub use driver_mode::DriverModePipeline;
pub use reflective::ReflectivePipeline;
pub use stages::output_properties;

use image::RgbImage;
use log::debug;
use nalgebra::Isometry3;
use sightline_core::FrameStaticProperties;
use sightline_pipes::{Frame, PipeResult, TrackedTarget};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::settings::{PipelineSettings, PipelineType};

/// Everything one run hands to the result consumer.
#[derive(Clone, Debug, Default)]
pub struct PipelineResult {
    /// Per-worker run counter, assigned by the worker.
    pub sequence: u64,
    pub capture_timestamp_nanos: i64,
    /// Sum of the stage times of this run.
    pub latency_millis: f64,
    pub targets: Vec<TrackedTarget>,
    /// Camera-to-target pose of the best target with a solved pose.
    pub best_pose: Option<Isometry3<f64>>,
    pub annotated_frame: Option<RgbImage>,
    pub calibration: Option<CalibrationProgress>,
}

impl PipelineResult {
    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }
}

/// Running total of stage times within one run.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Latency {
    nanos: i64,
}

impl Latency {
    /// Record a stage's time and unwrap its output.
    pub(crate) fn take<T>(&mut self, r: PipeResult<T>) -> T {
        self.nanos = self.nanos.saturating_add(r.elapsed_nanos);
        r.output
    }

    pub(crate) fn millis(self) -> f64 {
        self.nanos as f64 / 1.0e6
    }
}

/// A fixed chain of pipes driven by one settings type.
pub trait Pipeline {
    type Settings;

    /// Recompute every stage's parameters. `input` describes the frames
    /// the following runs receive, before rotation and resizing.
    fn bind(&mut self, settings: &Self::Settings, input: &FrameStaticProperties);

    /// Run the bound chain on one frame.
    fn execute(&mut self, frame: Frame) -> PipelineResult;

    fn run(&mut self, frame: Frame, settings: &Self::Settings) -> PipelineResult {
        self.bind(settings, &frame.properties);
        self.execute(frame)
    }
}

/// The pipeline matching a [`PipelineSettings`] variant.
#[derive(Debug)]
pub enum VisionPipeline {
    Reflective(ReflectivePipeline),
    ColoredShape(ColoredShapePipeline),
    DriverMode(DriverModePipeline),
    Calibration3d(Calibration3dPipeline),
}

impl Default for VisionPipeline {
    fn default() -> Self {
        Self::for_type(PipelineType::Reflective)
    }
}

impl VisionPipeline {
    pub fn for_type(kind: PipelineType) -> Self {
        match kind {
            PipelineType::Reflective => VisionPipeline::Reflective(Default::default()),
            PipelineType::ColoredShape => VisionPipeline::ColoredShape(Default::default()),
            PipelineType::DriverMode => VisionPipeline::DriverMode(Default::default()),
            PipelineType::Calibration3d => VisionPipeline::Calibration3d(Default::default()),
        }
    }

    pub fn pipeline_type(&self) -> PipelineType {
        match self {
            VisionPipeline::Reflective(_) => PipelineType::Reflective,
            VisionPipeline::ColoredShape(_) => PipelineType::ColoredShape,
            VisionPipeline::DriverMode(_) => PipelineType::DriverMode,
            VisionPipeline::Calibration3d(_) => PipelineType::Calibration3d,
        }
    }

    pub fn as_calibration_mut(&mut self) -> Option<&mut Calibration3dPipeline> {
        match self {
            VisionPipeline::Calibration3d(p) => Some(p),
            _ => None,
        }
    }

    /// Bind `settings` and run one frame, replacing the pipeline first when
    /// the settings belong to another pipeline type.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip_all,
            fields(pipeline = settings.nickname(), w = frame.width(), h = frame.height())
        )
    )]
    pub fn run(&mut self, frame: Frame, settings: &PipelineSettings) -> PipelineResult {
        if self.pipeline_type() != settings.pipeline_type() {
            debug!(
                "switching pipeline {:?} -> {:?}",
                self.pipeline_type(),
                settings.pipeline_type()
            );
            *self = Self::for_type(settings.pipeline_type());
        }
        match (self, settings) {
            (VisionPipeline::Reflective(p), PipelineSettings::Reflective(s)) => p.run(frame, s),
            (VisionPipeline::ColoredShape(p), PipelineSettings::ColoredShape(s)) => p.run(frame, s),
            (VisionPipeline::DriverMode(p), PipelineSettings::DriverMode(s)) => p.run(frame, s),
            (VisionPipeline::Calibration3d(p), PipelineSettings::Calibration3d(s)) => {
                p.run(frame, s)
            }
            _ => PipelineResult {
                capture_timestamp_nanos: frame.timestamp_nanos,
                ..PipelineResult::default()
            },
        }
    }
}
