//! JSON persistence of a camera's pipelines and calibrations.

use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use sightline_core::{CameraCalibrationCoefficients, Resolution};

use crate::fields::SettingsError;
use crate::manager::{PipelineManager, CALIBRATION_INDEX, DRIVER_MODE_INDEX};
use crate::settings::{PipelineSettings, PipelineType};

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("pipeline {index} ({nickname:?}): {source}")]
    Settings {
        index: usize,
        nickname: String,
        #[source]
        source: SettingsError,
    },
    #[error("{slot} settings must be {expected:?}, found {found:?}")]
    WrongBuiltIn {
        slot: &'static str,
        expected: PipelineType,
        found: PipelineType,
    },
    #[error("field of view {0} deg is outside (0, 180)")]
    FieldOfView(f64),
}

fn default_fov() -> f64 {
    70.0
}

/// Everything persisted for one camera.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    /// Diagonal field of view used when no calibration matches the frame.
    #[serde(default = "default_fov")]
    pub fov_deg: f64,
    #[serde(default)]
    pub calibrations: Vec<CameraCalibrationCoefficients>,
    #[serde(default)]
    pub current_index: i32,
    #[serde(default)]
    pub pipelines: Vec<PipelineSettings>,
    #[serde(default)]
    pub driver_mode: Option<PipelineSettings>,
    #[serde(default)]
    pub calibration_settings: Option<PipelineSettings>,
}

impl CameraConfig {
    pub fn new(name: impl Into<String>, fov_deg: f64) -> Self {
        Self {
            name: name.into(),
            fov_deg,
            calibrations: Vec::new(),
            current_index: 0,
            pipelines: Vec::new(),
            driver_mode: None,
            calibration_settings: None,
        }
    }

    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Calibration recorded for frames of `resolution`.
    pub fn calibration_for(&self, resolution: Resolution) -> Option<&CameraCalibrationCoefficients> {
        self.calibrations.iter().find(|c| c.resolution == resolution)
    }

    /// Record `coefficients`, replacing any calibration of the same size.
    pub fn add_calibration(&mut self, coefficients: CameraCalibrationCoefficients) {
        self.calibrations
            .retain(|c| c.resolution != coefficients.resolution);
        self.calibrations.push(coefficients);
    }

    /// Reject settings a configuration interface could not have produced.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fov_deg > 0.0 && self.fov_deg < 180.0) {
            return Err(ConfigError::FieldOfView(self.fov_deg));
        }
        for (index, s) in self.pipelines.iter().enumerate() {
            s.validate().map_err(|source| ConfigError::Settings {
                index,
                nickname: s.nickname().to_string(),
                source,
            })?;
        }
        let builtins = [
            ("driver mode", &self.driver_mode, PipelineType::DriverMode),
            ("calibration", &self.calibration_settings, PipelineType::Calibration3d),
        ];
        for (slot, settings, expected) in builtins {
            if let Some(s) = settings {
                if s.pipeline_type() != expected {
                    return Err(ConfigError::WrongBuiltIn {
                        slot,
                        expected,
                        found: s.pipeline_type(),
                    });
                }
                s.validate().map_err(|source| ConfigError::Settings {
                    index: 0,
                    nickname: s.nickname().to_string(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Validated pipeline manager for these settings.
    pub fn build_manager(&self) -> Result<PipelineManager, ConfigError> {
        self.validate()?;
        let mut manager = PipelineManager::new(self.pipelines.clone());
        let driver = self.driver_mode.clone().unwrap_or_else(|| manager.driver_mode().clone());
        let calibration = self
            .calibration_settings
            .clone()
            .unwrap_or_else(|| manager.calibration().clone());
        manager = manager.with_builtins(driver, calibration);
        if manager.set_current(self.current_index).is_err() {
            warn!(
                "camera {:?}: no pipeline {}, starting on 0",
                self.name,
                self.current_index
            );
        }
        Ok(manager)
    }

    /// Copy the manager's settings back into this config.
    pub fn store_manager(&mut self, manager: &PipelineManager) {
        self.pipelines = manager.user_pipelines().to_vec();
        self.driver_mode = manager.settings(DRIVER_MODE_INDEX).cloned();
        self.calibration_settings = manager.settings(CALIBRATION_INDEX).cloned();
        self.current_index = manager.current_index();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;

    #[test]
    fn minimal_config_takes_defaults() {
        let cfg: CameraConfig = serde_json::from_str(r#"{"name":"front"}"#).expect("parse");
        assert_eq!(cfg.fov_deg, 70.0);
        let manager = cfg.build_manager().expect("valid");
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.current_index(), 0);
    }

    #[test]
    fn invalid_pipeline_is_rejected_on_load() {
        let mut s = PipelineSettings::new(PipelineType::Reflective, "tape", 0);
        if let PipelineSettings::Reflective(r) = &mut s {
            r.targeting.max_targets = 0;
        }
        let mut cfg = CameraConfig::new("front", 70.0);
        cfg.pipelines.push(s);
        assert!(matches!(
            cfg.build_manager(),
            Err(ConfigError::Settings { index: 0, .. })
        ));
    }

    #[test]
    fn builtin_slots_are_type_checked() {
        let mut cfg = CameraConfig::new("front", 70.0);
        cfg.driver_mode = Some(PipelineSettings::new(PipelineType::Reflective, "oops", 0));
        assert!(matches!(cfg.validate(), Err(ConfigError::WrongBuiltIn { .. })));
    }

    #[test]
    fn manager_state_is_stored_back() {
        let cfg = CameraConfig::new("front", 70.0);
        let mut manager = cfg.build_manager().expect("valid");
        let i = manager.add(PipelineType::ColoredShape, "Ball").expect("add");
        manager.set_field(i, "desired_shape", FieldValue::Int(3)).expect("quad");
        manager.set_current(i).expect("select");

        let mut stored = cfg.clone();
        stored.store_manager(&manager);
        assert_eq!(stored.current_index, 1);
        assert_eq!(stored.pipelines.len(), 2);
        let rebuilt = stored.build_manager().expect("valid");
        assert_eq!(rebuilt.current_settings(), manager.current_settings());
    }

    #[test]
    fn calibrations_are_keyed_by_resolution() {
        use sightline_core::{Camera, CameraIntrinsics};
        let cam = Camera::ideal(CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0));
        let mut cfg = CameraConfig::new("front", 70.0);
        cfg.add_calibration(CameraCalibrationCoefficients::new(Resolution::new(640, 480), &cam, vec![], 0.3));
        cfg.add_calibration(CameraCalibrationCoefficients::new(Resolution::new(640, 480), &cam, vec![], 0.2));
        assert_eq!(cfg.calibrations.len(), 1);
        let c = cfg.calibration_for(Resolution::new(640, 480)).expect("stored");
        assert_eq!(c.rms_error, 0.2);
        assert!(cfg.calibration_for(Resolution::new(320, 240)).is_none());
    }
}
