use nalgebra::{Isometry3, Point2, Point3, Translation3, UnitQuaternion, Vector3};

use crate::camera::Camera;

/// Rigid transform from an axis-angle rotation vector and a translation.
pub fn isometry_from_rvec_tvec(rvec: &Vector3<f64>, tvec: &Vector3<f64>) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::from(*tvec),
        UnitQuaternion::from_scaled_axis(*rvec),
    )
}

/// Axis-angle rotation vector of a transform.
pub fn rvec_of(pose: &Isometry3<f64>) -> Vector3<f64> {
    pose.rotation.scaled_axis()
}

/// Project target-frame points through `camera_to_target` into pixels.
/// Points that fall behind the camera are skipped.
pub fn project_points(
    camera: &Camera,
    camera_to_target: &Isometry3<f64>,
    object: &[Point3<f64>],
) -> Vec<Point2<f64>> {
    object
        .iter()
        .filter_map(|p| camera.project(&(camera_to_target * p)))
        .collect()
}

/// RMS pixel distance between observed points and reprojected model points.
///
/// A point that cannot be projected counts as an infinite error.
pub fn reprojection_rms(
    camera: &Camera,
    camera_to_target: &Isometry3<f64>,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
) -> f64 {
    if object.is_empty() || object.len() != image.len() {
        return f64::INFINITY;
    }
    let mut sum = 0.0;
    for (p, obs) in object.iter().zip(image) {
        match camera.project(&(camera_to_target * p)) {
            Some(px) => sum += (px - obs).norm_squared(),
            None => return f64::INFINITY,
        }
    }
    (sum / object.len() as f64).sqrt()
}
