//! Core geometry and pose math for the sightline vision pipeline.
//!
//! This crate is image-type agnostic: it knows about contours, cameras,
//! calibrations and poses, but not about pixel buffers. Everything that
//! touches pixels lives in `sightline-pipes` and `sightline-calib`.

mod calibration;
mod camera;
mod coords;
mod frame_props;
mod geometry;
mod homography;
mod lm;
mod logger;
mod pnp;
mod pose;
mod rigid;
mod target_model;

pub use calibration::{
    CalibrationDataError, CameraCalibrationCoefficients, FlatMat, Resolution, CV_64F,
};
pub use camera::{
    probe as lens_probe, BrownConrady, Camera, CameraIntrinsics, KannalaBrandt, LensKind,
    LensModel, UndistortConfig,
};
pub use coords::{
    convert_point, convert_pose, convert_rotation, convert_translation, CoordinateSystem,
};
pub use frame_props::FrameStaticProperties;
pub use geometry::{
    convex_hull, fit_circle, line_intersection, min_area_rect, order_quad_clockwise, BoundingBox,
    Contour, ExtremePoints, RotatedRect,
};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use lm::{levenberg_marquardt, numeric_jacobian, LeastSquaresProblem, LmParams, LmReport};
pub use pnp::{
    refine_pose, reorder_circular, solve_multi_target, solve_planar_target, PnpError, PnpResult,
};
pub use pose::{isometry_from_rvec_tvec, project_points, reprojection_rms, rvec_of};
pub use rigid::estimate_rigid_transform;
pub use target_model::{TargetModel, TargetModelError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
