//! Physical target shapes used by pose estimation.
//!
//! Corners are expressed in the target's own NWU frame: x points out of the
//! target face towards the viewer, y to the target's left, z up. Planar
//! models list corners in the order an observer sees them: top-left,
//! top-right, bottom-right, bottom-left.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::coords::{convert_point, CoordinateSystem};

const INCH: f64 = 0.0254;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TargetModelError {
    #[error("planar target models need exactly 4 corners, got {0}")]
    CornerCount(usize),
    #[error("planar target corners are degenerate (collinear or coincident)")]
    Degenerate,
    #[error("planar target corners are not coplanar (off-plane distance {0:.3e} m)")]
    NotCoplanar(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetModel {
    name: String,
    corners: Vec<Point3<f64>>,
    width: f64,
    height: f64,
    is_planar: bool,
}

impl TargetModel {
    /// Planar model from four coplanar corners.
    pub fn planar(
        name: impl Into<String>,
        corners: Vec<Point3<f64>>,
    ) -> Result<Self, TargetModelError> {
        if corners.len() != 4 {
            return Err(TargetModelError::CornerCount(corners.len()));
        }
        let a = corners[1] - corners[0];
        let b = corners[2] - corners[0];
        let normal = a.cross(&b);
        let scale = a.norm().max(b.norm());
        if normal.norm() <= 1e-12 * scale * scale.max(1.0) || scale <= 1e-12 {
            return Err(TargetModelError::Degenerate);
        }
        let n = normal.normalize();
        let off = (corners[3] - corners[0]).dot(&n).abs();
        if off > 1e-6 * scale.max(1.0) {
            return Err(TargetModelError::NotCoplanar(off));
        }
        let (width, height) = extents(&corners);
        Ok(Self {
            name: name.into(),
            corners,
            width,
            height,
            is_planar: true,
        })
    }

    /// Axis-aligned rectangle in the target's y-z plane.
    pub fn rectangle(name: impl Into<String>, width: f64, height: f64) -> Self {
        let (w, h) = (0.5 * width, 0.5 * height);
        Self {
            name: name.into(),
            corners: vec![
                Point3::new(0.0, -w, h),
                Point3::new(0.0, w, h),
                Point3::new(0.0, w, -h),
                Point3::new(0.0, -w, -h),
            ],
            width,
            height,
            is_planar: true,
        }
    }

    /// Ball target; the four silhouette extremes stand in for corners.
    pub fn sphere(name: impl Into<String>, diameter: f64) -> Self {
        let r = 0.5 * diameter;
        Self {
            name: name.into(),
            corners: vec![
                Point3::new(0.0, -r, 0.0),
                Point3::new(0.0, 0.0, -r),
                Point3::new(0.0, r, 0.0),
                Point3::new(0.0, 0.0, r),
            ],
            width: diameter,
            height: diameter,
            is_planar: false,
        }
    }

    /// 6.5 in tag of the 36h11 family.
    pub fn apriltag_36h11() -> Self {
        Self::rectangle("AprilTag 36h11", 6.5 * INCH, 6.5 * INCH)
    }

    /// 6 in tag of the 16h5 family.
    pub fn apriltag_16h5() -> Self {
        Self::rectangle("AprilTag 16h5", 6.0 * INCH, 6.0 * INCH)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn corners(&self) -> &[Point3<f64>] {
        &self.corners
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_planar(&self) -> bool {
        self.is_planar
    }

    /// Corners in the solver (EDN) convention.
    pub fn corners_edn(&self) -> Vec<Point3<f64>> {
        self.corners
            .iter()
            .map(|p| convert_point(p, CoordinateSystem::Nwu, CoordinateSystem::Edn))
            .collect()
    }

    /// Corners pushed `depth` metres behind the face, for box overlays.
    pub fn back_face(&self, depth: f64) -> Vec<Point3<f64>> {
        let back = Vector3::new(-depth, 0.0, 0.0);
        self.corners.iter().map(|p| p + back).collect()
    }
}

fn extents(corners: &[Point3<f64>]) -> (f64, f64) {
    let span = |f: fn(&Point3<f64>) -> f64| {
        let lo = corners.iter().map(f).fold(f64::INFINITY, f64::min);
        let hi = corners.iter().map(f).fold(f64::NEG_INFINITY, f64::max);
        hi - lo
    };
    (span(|p| p.y), span(|p| p.z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rectangle_dimensions() {
        let m = TargetModel::apriltag_36h11();
        assert!(m.is_planar());
        assert_eq!(m.corners().len(), 4);
        assert_relative_eq!(m.width(), 0.1651, epsilon = 1e-12);
        assert_relative_eq!(m.area(), 0.1651 * 0.1651, epsilon = 1e-12);
    }

    #[test]
    fn planar_rejects_wrong_corner_count() {
        let corners = vec![Point3::origin(); 3];
        assert_eq!(
            TargetModel::planar("x", corners),
            Err(TargetModelError::CornerCount(3))
        );
    }

    #[test]
    fn planar_rejects_off_plane_corner() {
        let corners = vec![
            Point3::new(0.0, -0.1, 0.1),
            Point3::new(0.0, 0.1, 0.1),
            Point3::new(0.0, 0.1, -0.1),
            Point3::new(0.05, -0.1, -0.1),
        ];
        assert!(matches!(
            TargetModel::planar("x", corners),
            Err(TargetModelError::NotCoplanar(_))
        ));
    }

    #[test]
    fn planar_accepts_tilted_plane() {
        let corners = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.1, 0.0),
            Point3::new(0.1, 0.1, 0.2),
            Point3::new(0.0, 0.0, 0.2),
        ];
        let m = TargetModel::planar("tilted", corners).expect("planar");
        assert_relative_eq!(m.height(), 0.2, epsilon = 1e-12);
    }
}
