use image::{DynamicImage, RgbImage};
use log::{info, warn};
use sightline_core::{CameraCalibrationCoefficients, Resolution};

use crate::board::{BoardObservation, BoardSpec};
use crate::calibrate::{calibrate, CalibrationError, CalibrationParams, CalibrationResult};
use crate::detect::find_board_corners;

/// Snapshot accumulator behind the calibration workflow.
///
/// Frames are offered one at a time; those showing the whole board are kept
/// until enough have been collected to run the solver.
#[derive(Clone, Debug)]
pub struct CalibrationSession {
    board: BoardSpec,
    resolution: Resolution,
    params: CalibrationParams,
    min_snapshots: usize,
    observations: Vec<BoardObservation>,
    last: Option<CalibrationResult>,
}

impl CalibrationSession {
    pub const DEFAULT_MIN_SNAPSHOTS: usize = 12;

    pub fn new(board: BoardSpec, resolution: Resolution, params: CalibrationParams) -> Self {
        Self {
            board,
            resolution,
            params,
            min_snapshots: Self::DEFAULT_MIN_SNAPSHOTS,
            observations: Vec::new(),
            last: None,
        }
    }

    pub fn with_min_snapshots(mut self, min: usize) -> Self {
        self.min_snapshots = min;
        self
    }

    pub fn board(&self) -> &BoardSpec {
        &self.board
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    pub fn snapshot_count(&self) -> usize {
        self.observations.len()
    }

    pub fn min_snapshots(&self) -> usize {
        self.min_snapshots.max(self.params.min_views)
    }

    pub fn observations(&self) -> &[BoardObservation] {
        &self.observations
    }

    /// Result of the last successful [`Self::run_calibration`].
    pub fn last_result(&self) -> Option<&CalibrationResult> {
        self.last.as_ref()
    }

    /// Detect the board in `image` and keep the observation.
    ///
    /// Returns `false` when the board is not visible or the image size does
    /// not match the session.
    pub fn take_snapshot(&mut self, image: &RgbImage) -> bool {
        let got = Resolution::new(image.width(), image.height());
        if got != self.resolution {
            warn!(
                "{}",
                CalibrationError::ResolutionMismatch {
                    expected: self.resolution,
                    got,
                }
            );
            return false;
        }
        let gray = DynamicImage::ImageRgb8(image.clone()).into_luma8();
        match find_board_corners(&gray, &self.board) {
            Some(obs) => self.add_observation(obs),
            None => false,
        }
    }

    /// Keep an observation detected elsewhere, e.g. by
    /// [`crate::FindBoardCornersPipe`] on a frame of this session's size.
    ///
    /// Observations that do not cover the whole board are refused.
    pub fn add_observation(&mut self, obs: BoardObservation) -> bool {
        let need = self.board.point_count();
        if obs.len() != need || obs.object_points.len() != need {
            warn!(
                "refusing snapshot with {} of {} board points",
                obs.len(),
                need
            );
            return false;
        }
        self.observations.push(obs);
        info!(
            "calibration snapshot {}/{}",
            self.observations.len(),
            self.min_snapshots()
        );
        true
    }

    pub fn has_enough_snapshots(&self) -> bool {
        self.observations.len() >= self.min_snapshots()
    }

    /// Drop every snapshot taken so far.
    pub fn clear(&mut self) {
        self.observations.clear();
    }

    pub fn run_calibration(&mut self) -> Result<CameraCalibrationCoefficients, CalibrationError> {
        let need = self.min_snapshots();
        if self.observations.len() < need {
            return Err(CalibrationError::NotEnoughViews {
                need,
                got: self.observations.len(),
            });
        }
        let result = calibrate(&self.observations, self.resolution, &self.params)?;
        let coefficients = result.coefficients(self.resolution);
        self.last = Some(result);
        Ok(coefficients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_resolution_is_refused() {
        let mut session = CalibrationSession::new(
            BoardSpec::chessboard(4, 3, 0.03),
            Resolution::new(64, 48),
            CalibrationParams::default(),
        );
        assert!(!session.take_snapshot(&RgbImage::new(32, 24)));
        assert!(!session.take_snapshot(&RgbImage::new(64, 48)));
        assert_eq!(session.snapshot_count(), 0);
        assert!(!session.has_enough_snapshots());
        assert!(matches!(
            session.run_calibration(),
            Err(CalibrationError::NotEnoughViews { need: 12, got: 0 })
        ));
    }

    #[test]
    fn partial_observations_are_refused() {
        let board = BoardSpec::chessboard(4, 3, 0.03);
        let mut session = CalibrationSession::new(board, Resolution::new(64, 48), CalibrationParams::default())
            .with_min_snapshots(3);
        let full = BoardObservation {
            image_points: board
                .object_points()
                .iter()
                .map(|p| nalgebra::Point2::new(10.0 + 300.0 * p.x, 10.0 + 300.0 * p.y))
                .collect(),
            object_points: board.object_points(),
        };
        let mut partial = full.clone();
        partial.image_points.pop();
        partial.object_points.pop();

        assert!(!session.add_observation(partial));
        assert!(session.add_observation(full));
        assert_eq!(session.snapshot_count(), 1);
        assert_eq!(session.params(), &CalibrationParams::default());
        session.clear();
        assert_eq!(session.snapshot_count(), 0);
    }
}
