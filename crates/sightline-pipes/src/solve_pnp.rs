use log::debug;
use sightline_core::{solve_planar_target, Camera, TargetModel};

use crate::pipe::{Pipe, PipeError};
use crate::target::TrackedTarget;

#[derive(Clone, Debug, PartialEq)]
pub struct SolvePnpParams {
    /// Calibrated camera; without one targets pass through without a pose.
    pub camera: Option<Camera>,
    pub model: TargetModel,
}

impl Default for SolvePnpParams {
    fn default() -> Self {
        Self {
            camera: None,
            model: TargetModel::apriltag_36h11(),
        }
    }
}

/// Solves the camera-to-target pose of every target with four corners.
#[derive(Debug, Default)]
pub struct SolvePnpPipe {
    params: SolvePnpParams,
}

impl Pipe for SolvePnpPipe {
    type Input<'a> = Vec<TrackedTarget>;
    type Output = Vec<TrackedTarget>;
    type Params = SolvePnpParams;

    fn name(&self) -> &'static str {
        "solve_pnp"
    }

    fn params(&self) -> &SolvePnpParams {
        &self.params
    }

    fn set_params(&mut self, params: SolvePnpParams) {
        self.params = params;
    }

    fn process(&mut self, targets: Vec<TrackedTarget>) -> Result<Vec<TrackedTarget>, PipeError> {
        let Some(camera) = self.params.camera.as_ref() else {
            debug!("no calibration, skipping pose estimation");
            return Ok(targets);
        };
        let model = &self.params.model;
        Ok(targets
            .into_iter()
            .map(|t| match t.corners {
                Some(corners) => {
                    let pnp = solve_planar_target(camera, model, &corners);
                    t.with_pose(&pnp)
                }
                None => t,
            })
            .collect())
    }
}
