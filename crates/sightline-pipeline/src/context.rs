//! Startup-constructed registry of cameras, their settings and frame
//! sources.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::info;
use sightline_core::{CameraCalibrationCoefficients, FrameStaticProperties, Resolution};

use crate::io::{CameraConfig, ConfigError};
use crate::manager::PipelineManager;
use crate::worker::{CameraWorker, FrameSource, ResultConsumer};

#[derive(thiserror::Error, Debug)]
pub enum ContextError {
    #[error("camera {0:?} has no frame source")]
    NoFrameSource(String),
    #[error("unknown camera {0:?}")]
    UnknownCamera(String),
    #[error("camera {0:?} is already registered")]
    DuplicateCamera(String),
    #[error("camera {camera:?}: {source}")]
    Config {
        camera: String,
        #[source]
        source: ConfigError,
    },
    #[error("failed to start worker for {camera:?}: {source}")]
    Spawn {
        camera: String,
        #[source]
        source: std::io::Error,
    },
}

/// Settings and calibrations of one camera, shared between the worker and
/// configuration callers.
#[derive(Debug)]
pub struct CameraState {
    pub config: CameraConfig,
    pub manager: PipelineManager,
}

impl CameraState {
    pub fn from_config(config: CameraConfig) -> Result<Self, ConfigError> {
        let manager = config.build_manager()?;
        Ok(Self { config, manager })
    }

    /// Geometry of a `width x height` frame, calibrated when a matching
    /// calibration is recorded.
    pub fn frame_properties(&self, width: u32, height: u32) -> FrameStaticProperties {
        let calibration = self
            .config
            .calibration_for(Resolution::new(width, height))
            .cloned();
        FrameStaticProperties::new(width, height, self.config.fov_deg, calibration)
    }

    pub fn add_calibration(&mut self, coefficients: CameraCalibrationCoefficients) {
        info!(
            "camera {:?}: stored {}x{} calibration (rms {:.3} px)",
            self.config.name,
            coefficients.resolution.width,
            coefficients.resolution.height,
            coefficients.rms_error
        );
        self.config.add_calibration(coefficients);
    }

    /// Current settings in persistable form.
    pub fn to_config(&self) -> CameraConfig {
        let mut config = self.config.clone();
        config.store_manager(&self.manager);
        config
    }
}

pub type SharedCamera = Arc<Mutex<CameraState>>;

/// Lock a camera, recovering the state if a holder panicked.
pub fn lock_camera(camera: &SharedCamera) -> MutexGuard<'_, CameraState> {
    camera.lock().unwrap_or_else(PoisonError::into_inner)
}

struct CameraEntry {
    state: SharedCamera,
    source: Option<Box<dyn FrameSource>>,
}

/// Every camera known to the process.
///
/// Constructed once at startup and handed to whatever drives the cameras;
/// there is no global instance.
#[derive(Default)]
pub struct VisionContext {
    cameras: BTreeMap<String, CameraEntry>,
}

impl VisionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a camera from its persisted settings.
    pub fn add_camera(&mut self, config: CameraConfig) -> Result<SharedCamera, ContextError> {
        let name = config.name.clone();
        if self.cameras.contains_key(&name) {
            return Err(ContextError::DuplicateCamera(name));
        }
        let state = CameraState::from_config(config).map_err(|source| ContextError::Config {
            camera: name.clone(),
            source,
        })?;
        let state = Arc::new(Mutex::new(state));
        self.cameras.insert(
            name,
            CameraEntry {
                state: Arc::clone(&state),
                source: None,
            },
        );
        Ok(state)
    }

    pub fn camera_names(&self) -> impl Iterator<Item = &str> {
        self.cameras.keys().map(String::as_str)
    }

    pub fn camera(&self, name: &str) -> Result<SharedCamera, ContextError> {
        self.cameras
            .get(name)
            .map(|e| Arc::clone(&e.state))
            .ok_or_else(|| ContextError::UnknownCamera(name.to_string()))
    }

    /// Attach the frame source a later [`Self::start`] hands to the worker.
    pub fn attach_source(
        &mut self,
        name: &str,
        source: Box<dyn FrameSource>,
    ) -> Result<(), ContextError> {
        let entry = self
            .cameras
            .get_mut(name)
            .ok_or_else(|| ContextError::UnknownCamera(name.to_string()))?;
        entry.source = Some(source);
        Ok(())
    }

    /// Start the worker of camera `name`, moving its frame source into it.
    pub fn start(
        &mut self,
        name: &str,
        consumer: Box<dyn ResultConsumer>,
    ) -> Result<CameraWorker, ContextError> {
        let entry = self
            .cameras
            .get_mut(name)
            .ok_or_else(|| ContextError::UnknownCamera(name.to_string()))?;
        let source = entry
            .source
            .take()
            .ok_or_else(|| ContextError::NoFrameSource(name.to_string()))?;
        CameraWorker::spawn(name, Arc::clone(&entry.state), source, consumer).map_err(|source| {
            ContextError::Spawn {
                camera: name.to_string(),
                source,
            }
        })
    }

    /// Persistable settings of every camera.
    pub fn configs(&self) -> Vec<CameraConfig> {
        self.cameras
            .values()
            .map(|e| lock_camera(&e.state).to_config())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_camera_and_source_are_typed_failures() {
        let mut ctx = VisionContext::new();
        assert!(matches!(
            ctx.camera("front"),
            Err(ContextError::UnknownCamera(_))
        ));
        ctx.add_camera(CameraConfig::new("front", 70.0)).expect("add");
        assert!(matches!(
            ctx.add_camera(CameraConfig::new("front", 70.0)),
            Err(ContextError::DuplicateCamera(_))
        ));
        let (tx, _rx) = crossbeam_channel::unbounded();
        assert!(matches!(
            ctx.start("front", Box::new(tx)),
            Err(ContextError::NoFrameSource(_))
        ));
        assert_eq!(ctx.camera_names().collect::<Vec<_>>(), ["front"]);
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut ctx = VisionContext::new();
        let err = ctx
            .add_camera(CameraConfig::new("front", 0.0))
            .expect_err("bad fov");
        assert!(matches!(
            err,
            ContextError::Config {
                source: ConfigError::FieldOfView(_),
                ..
            }
        ));
    }

    #[test]
    fn frame_properties_pick_matching_calibration() {
        use sightline_core::{Camera, CameraIntrinsics};
        let mut cfg = CameraConfig::new("front", 70.0);
        let cam = Camera::ideal(CameraIntrinsics::new(500.0, 510.0, 300.0, 250.0));
        cfg.add_calibration(CameraCalibrationCoefficients::new(
            Resolution::new(640, 480),
            &cam,
            vec![],
            0.2,
        ));
        let state = CameraState::from_config(cfg).expect("valid");
        let calibrated = state.frame_properties(640, 480);
        assert_eq!(calibrated.center_x, 300.0);
        assert_eq!(calibrated.horizontal_focal_length, 500.0);
        assert!(state.frame_properties(320, 240).calibration.is_none());
    }
}
