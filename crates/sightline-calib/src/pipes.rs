//! Calibration stages in [`Pipe`] form for the calibration pipeline.

use image::{DynamicImage, RgbImage};
use sightline_core::Resolution;
use sightline_pipes::{Pipe, PipeError};

use crate::board::{BoardObservation, BoardSpec};
use crate::calibrate::{calibrate, CalibrationParams, CalibrationResult};
use crate::detect::find_board_corners;

/// Board detection on a colour frame; `None` when the board is not visible.
#[derive(Debug, Default)]
pub struct FindBoardCornersPipe {
    params: BoardSpec,
}

impl Pipe for FindBoardCornersPipe {
    type Input<'a> = &'a RgbImage;
    type Output = Option<BoardObservation>;
    type Params = BoardSpec;

    fn name(&self) -> &'static str {
        "find_board_corners"
    }

    fn params(&self) -> &BoardSpec {
        &self.params
    }

    fn set_params(&mut self, params: BoardSpec) {
        self.params = params;
    }

    fn process(&mut self, frame: &RgbImage) -> Result<Option<BoardObservation>, PipeError> {
        if self.params.cols < 2 || self.params.rows < 2 {
            return Err(PipeError::InvalidParams(format!(
                "board must be at least 2x2, got {}x{}",
                self.params.cols, self.params.rows
            )));
        }
        let gray = DynamicImage::ImageRgb8(frame.clone()).into_luma8();
        Ok(find_board_corners(&gray, &self.params))
    }
}

/// Calibration over accumulated observations.
#[derive(Debug, Default)]
pub struct CalibrateCameraPipe {
    params: CalibrationParams,
}

impl Pipe for CalibrateCameraPipe {
    type Input<'a> = (&'a [BoardObservation], Resolution);
    type Output = Option<CalibrationResult>;
    type Params = CalibrationParams;

    fn name(&self) -> &'static str {
        "calibrate_camera"
    }

    fn params(&self) -> &CalibrationParams {
        &self.params
    }

    fn set_params(&mut self, params: CalibrationParams) {
        self.params = params;
    }

    fn process(
        &mut self,
        (observations, resolution): (&[BoardObservation], Resolution),
    ) -> Result<Option<CalibrationResult>, PipeError> {
        calibrate(observations, resolution, &self.params)
            .map(Some)
            .map_err(|e| PipeError::InvalidInput(e.to_string()))
    }
}
