//! Pipelines, their settings and the per-camera machinery that runs them.
//!
//! - [`settings`]: flat, persistable settings per pipeline type, edited
//!   field by field through [`PipelineSettings::set_field`].
//! - [`pipeline`]: the reflective, colored-shape, driver-mode and
//!   calibration pipelines built from `sightline-pipes` stages.
//! - [`PipelineManager`]: a camera's pipeline list, selection and naming.
//! - [`CameraConfig`]: JSON persistence of one camera.
//! - [`VisionContext`] and [`CameraWorker`]: cameras registered at startup
//!   and one worker thread per camera.
//!
//! ## Quickstart
//!
//! ```
//! use image::RgbImage;
//! use sightline_pipeline::{FieldValue, PipelineManager, VisionPipeline};
//! use sightline_pipes::Frame;
//!
//! let mut manager = PipelineManager::default();
//! manager.set_field(0, "hsv_hue", FieldValue::IntPair([50, 70])).unwrap();
//!
//! let frame = Frame::with_fov(RgbImage::new(64, 48), 0, 70.0, None);
//! let mut pipeline = VisionPipeline::default();
//! let result = pipeline.run(frame, &manager.snapshot());
//! assert!(!result.has_targets());
//! ```

pub mod context;
pub mod fields;
pub mod io;
pub mod manager;
pub mod pipeline;
pub mod settings;
pub mod worker;

pub use context::{lock_camera, CameraState, ContextError, SharedCamera, VisionContext};
pub use fields::{Field, FieldRegistry, FieldValue, SettingsError};
pub use io::{CameraConfig, ConfigError, ConfigIoError};
pub use manager::{ManagerError, PipelineManager, CALIBRATION_INDEX, DRIVER_MODE_INDEX};
pub use pipeline::{
    output_properties, Calibration3dPipeline, CalibrationProgress, ColoredShapePipeline,
    DriverModePipeline, Pipeline, PipelineResult, ReflectivePipeline, VisionPipeline,
};
pub use settings::{
    BaseSettings, Calibration3dSettings, ColoredShapeSettings, DriverModeSettings,
    PipelineSettings, PipelineType, ReflectiveSettings, TargetModelKind, TargetingSettings,
};
pub use worker::{
    CameraWorker, Capture, ConsumerClosed, FrameSource, FrameSourceError, ImageFileSource,
    ResultConsumer, WorkerError, WorkerStats, MAX_CONSECUTIVE_CAPTURE_ERRORS,
};
