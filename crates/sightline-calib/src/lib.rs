//! Calibration board detection and camera calibration.
//!
//! Two board types are supported: chessboards (inner-corner grid) and
//! asymmetric dot grids. Detection returns the features in row-major board
//! order paired with their board-frame coordinates; frames where the whole
//! board is not visible yield `None` and are skipped.
//!
//! [`calibrate`] solves intrinsics, distortion (pinhole `k1, k2, p1, p2, k3`
//! or fisheye `k1..k4`) and per-view poses. The distortion vector length of
//! the resulting [`sightline_core::CameraCalibrationCoefficients`] selects
//! the lens model everywhere it is consumed.
//!
//! [`CalibrationSession`] wraps both into the snapshot workflow used by the
//! calibration pipeline.

mod board;
mod calibrate;
mod chessboard;
mod detect;
mod dots;
mod lattice;
mod pipes;
mod session;
mod subpix;
mod threshold;

pub use board::{BoardObservation, BoardSpec, BoardType};
pub use calibrate::{calibrate, CalibrationError, CalibrationParams, CalibrationResult};
pub use detect::{collect_observations, find_board_corners};
pub use pipes::{CalibrateCameraPipe, FindBoardCornersPipe};
pub use session::CalibrationSession;
pub use subpix::{refine_corner, SubPixParams};
pub use threshold::{dark_mask, otsu_threshold};
