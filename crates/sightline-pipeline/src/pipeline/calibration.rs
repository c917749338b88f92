use log::{debug, info};
use serde::Serialize;
use sightline_calib::{
    BoardSpec, CalibrationError, CalibrationParams, CalibrationSession, FindBoardCornersPipe,
};
use sightline_core::{CameraCalibrationCoefficients, FrameStaticProperties, LensKind, Resolution};
use sightline_pipes::{DrawCornersParams, DrawCornersPipe, Frame, Pipe};

use super::stages::FrameStages;
use super::{Latency, Pipeline, PipelineResult};
use crate::settings::Calibration3dSettings;

/// Snapshot progress reported with every calibration run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CalibrationProgress {
    pub board_visible: bool,
    pub snapshots: usize,
    pub required: usize,
}

/// Board detection with an overlay, plus the snapshot session that turns
/// accepted frames into a camera calibration.
///
/// The session lives as long as the board, lens model and frame size stay
/// the same; changing any of them starts over.
#[derive(Debug, Default)]
pub struct Calibration3dPipeline {
    frame: FrameStages,
    find_corners: FindBoardCornersPipe,
    draw_corners: DrawCornersPipe,
    session: Option<CalibrationSession>,
    snapshot_requested: bool,
    overlay_enabled: bool,
}

fn session_params(s: &Calibration3dSettings) -> (BoardSpec, CalibrationParams) {
    let board = BoardSpec {
        board_type: s.board_type,
        cols: s.board_cols,
        rows: s.board_rows,
        square_size: s.square_size,
    };
    let params = CalibrationParams {
        lens: if s.use_fisheye {
            LensKind::Fisheye
        } else {
            LensKind::Pinhole
        },
        ..CalibrationParams::default()
    };
    (board, params)
}

impl Calibration3dPipeline {
    /// Keep the board seen in the next frame, if any.
    pub fn request_snapshot(&mut self) {
        self.snapshot_requested = true;
    }

    pub fn snapshot_count(&self) -> usize {
        self.session.as_ref().map_or(0, CalibrationSession::snapshot_count)
    }

    pub fn has_enough_snapshots(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(CalibrationSession::has_enough_snapshots)
    }

    pub fn session(&self) -> Option<&CalibrationSession> {
        self.session.as_ref()
    }

    /// Solve the calibration from the snapshots taken so far.
    pub fn run_calibration(&mut self) -> Result<CameraCalibrationCoefficients, CalibrationError> {
        match self.session.as_mut() {
            Some(session) => session.run_calibration(),
            None => Err(CalibrationError::NotEnoughViews {
                need: CalibrationParams::default().min_views,
                got: 0,
            }),
        }
    }

    fn progress(&self, board_visible: bool) -> CalibrationProgress {
        CalibrationProgress {
            board_visible,
            snapshots: self.snapshot_count(),
            required: self
                .session
                .as_ref()
                .map_or(0, CalibrationSession::min_snapshots),
        }
    }
}

impl Pipeline for Calibration3dPipeline {
    type Settings = Calibration3dSettings;

    fn bind(&mut self, s: &Calibration3dSettings, input: &FrameStaticProperties) {
        let props = self.frame.bind(&s.base, input);
        let (board, params) = session_params(s);
        let resolution = Resolution::new(props.width, props.height);
        let stale = self.session.as_ref().is_none_or(|session| {
            *session.board() != board
                || session.resolution() != resolution
                || *session.params() != params
                || session.min_snapshots() != s.min_snapshots.max(params.min_views)
        });
        if stale {
            if self.snapshot_count() > 0 {
                info!("calibration setup changed, dropping {} snapshots", self.snapshot_count());
            }
            self.session = Some(
                CalibrationSession::new(board, resolution, params)
                    .with_min_snapshots(s.min_snapshots),
            );
        }
        self.find_corners.set_params(board);
        self.draw_corners.set_params(DrawCornersParams::default());
        self.overlay_enabled = s.base.draw_overlay;
    }

    fn execute(&mut self, frame: Frame) -> PipelineResult {
        let mut latency = Latency::default();
        let mut image = self.frame.apply(frame.image, &mut latency);
        let observation = latency.take(self.find_corners.apply(&image));

        let corners = observation
            .as_ref()
            .map(|o| o.image_points.clone())
            .unwrap_or_default();
        if std::mem::take(&mut self.snapshot_requested) {
            match (observation, self.session.as_mut()) {
                (Some(obs), Some(session)) => {
                    session.add_observation(obs);
                }
                _ => debug!("snapshot requested but no board in view"),
            }
        }
        if self.overlay_enabled && !corners.is_empty() {
            latency.take(self.draw_corners.apply((&mut image, corners.as_slice())));
        }

        PipelineResult {
            capture_timestamp_nanos: frame.timestamp_nanos,
            latency_millis: latency.millis(),
            annotated_frame: self.overlay_enabled.then_some(image),
            calibration: Some(self.progress(!corners.is_empty())),
            ..PipelineResult::default()
        }
    }
}
