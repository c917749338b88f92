use nalgebra::{Isometry3, Point2};
use serde::Serialize;
use sightline_core::{Contour, PnpResult, RotatedRect};

use crate::modes::ContourShape;
use crate::shape::PotentialTarget;

/// One detected target as reported to consumers.
///
/// Built once per run by the 2D collection stage and only refined by later
/// stages through the consuming `with_*` methods. Angles are in degrees,
/// transforms are camera-to-target in NWU.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackedTarget {
    pub contour: Contour,
    pub sub_contours: Vec<Contour>,
    pub rect: RotatedRect,
    /// Contour area in pixels.
    pub area: f64,
    pub centroid: Point2<f64>,
    pub shape: Option<ContourShape>,
    pub target_offset_point: Point2<f64>,
    pub robot_offset_point: Point2<f64>,
    pub yaw: f64,
    pub pitch: f64,
    /// Contour area as a percentage of the image.
    pub area_percent: f64,
    pub skew: f64,
    /// Top-left, top-right, bottom-right, bottom-left.
    pub corners: Option<[Point2<f64>; 4]>,
    pub best_camera_to_target: Isometry3<f64>,
    pub alt_camera_to_target: Isometry3<f64>,
    pub best_reproj_error: f64,
    pub alt_reproj_error: f64,
    pub ambiguity: f64,
    pub pose_valid: bool,
}

impl TrackedTarget {
    pub(crate) fn from_potential(t: PotentialTarget) -> Self {
        Self {
            contour: t.contour,
            sub_contours: t.sub_contours,
            rect: t.rect,
            area: t.area,
            centroid: t.centroid,
            shape: t.shape,
            target_offset_point: t.centroid,
            robot_offset_point: t.centroid,
            yaw: 0.0,
            pitch: 0.0,
            area_percent: 0.0,
            skew: 0.0,
            corners: None,
            best_camera_to_target: Isometry3::identity(),
            alt_camera_to_target: Isometry3::identity(),
            best_reproj_error: 0.0,
            alt_reproj_error: 0.0,
            ambiguity: 0.0,
            pose_valid: false,
        }
    }

    pub fn with_corners(self, corners: Option<[Point2<f64>; 4]>) -> Self {
        Self { corners, ..self }
    }

    pub fn with_pose(self, pnp: &PnpResult) -> Self {
        Self {
            best_camera_to_target: pnp.best,
            alt_camera_to_target: pnp.alt,
            best_reproj_error: pnp.best_reproj_err,
            alt_reproj_error: pnp.alt_reproj_err,
            ambiguity: pnp.ambiguity,
            pose_valid: pnp.is_present,
            ..self
        }
    }

    /// Pose outputs as a [`PnpResult`].
    pub fn pose(&self) -> PnpResult {
        if !self.pose_valid {
            return PnpResult::empty();
        }
        PnpResult {
            is_present: true,
            best: self.best_camera_to_target,
            best_reproj_err: self.best_reproj_error,
            alt: self.alt_camera_to_target,
            alt_reproj_err: self.alt_reproj_error,
            ambiguity: self.ambiguity,
        }
    }
}
