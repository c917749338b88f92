use serde::{Deserialize, Serialize};

use crate::calibration::CameraCalibrationCoefficients;
use crate::camera::Camera;

/// Geometry of a camera mode, fixed for every frame it produces.
///
/// View angles are in radians and focal lengths in pixels. With a
/// calibration the principal point and focal lengths come from its
/// intrinsics; otherwise they follow from the diagonal field of view with the
/// principal point at the image centre.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameStaticProperties {
    pub width: u32,
    pub height: u32,
    pub fov_deg: f64,
    pub image_area: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub diagonal_view: f64,
    pub horizontal_view: f64,
    pub vertical_view: f64,
    pub horizontal_focal_length: f64,
    pub vertical_focal_length: f64,
    pub calibration: Option<CameraCalibrationCoefficients>,
}

impl FrameStaticProperties {
    pub fn new(
        width: u32,
        height: u32,
        fov_deg: f64,
        calibration: Option<CameraCalibrationCoefficients>,
    ) -> Self {
        let w = width as f64;
        let h = height as f64;
        let diagonal_view = fov_deg.to_radians();
        let diag = w.hypot(h);

        let intrinsics = calibration
            .as_ref()
            .and_then(|c| c.camera().ok())
            .map(|c| c.intrinsics);

        let (center_x, center_y, fx, fy) = match intrinsics {
            Some(k) => (k.cx, k.cy, k.fx, k.fy),
            None => {
                let half = (diagonal_view / 2.0).tan();
                let hv = 2.0 * (half * w / diag).atan();
                let vv = 2.0 * (half * h / diag).atan();
                (
                    (w - 1.0) / 2.0,
                    (h - 1.0) / 2.0,
                    w / (2.0 * (hv / 2.0).tan()),
                    h / (2.0 * (vv / 2.0).tan()),
                )
            }
        };

        let horizontal_view = 2.0 * (w / (2.0 * fx)).atan();
        let vertical_view = 2.0 * (h / (2.0 * fy)).atan();

        Self {
            width,
            height,
            fov_deg,
            image_area: w * h,
            center_x,
            center_y,
            diagonal_view,
            horizontal_view,
            vertical_view,
            horizontal_focal_length: fx,
            vertical_focal_length: fy,
            calibration,
        }
    }

    /// Camera model from the calibration, if one is attached and readable.
    pub fn camera(&self) -> Option<Camera> {
        self.calibration.as_ref().and_then(|c| c.camera().ok())
    }
}
