//! Camera intrinsics and the two lens distortion models.
//!
//! The lens model is chosen from the length of the distortion vector: four
//! coefficients select the Kannala–Brandt fisheye model, anything else the
//! Brown–Conrady pinhole model. Every projection, undistortion and PnP call
//! that consumes a calibration goes through [`LensModel`], so the choice is
//! made exactly once.

use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Returns `true` when all values are finite and focal lengths non-zero.
    pub fn is_valid(self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    pub fn matrix(self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    pub fn pixel_to_normalized(self, pixel: Point2<f64>) -> Point2<f64> {
        Point2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }

    pub fn normalized_to_pixel(self, normalized: Point2<f64>) -> Point2<f64> {
        Point2::new(
            self.fx * normalized.x + self.cx,
            self.fy * normalized.y + self.cy,
        )
    }
}

/// Brown–Conrady radial-tangential coefficients, OpenCV order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BrownConrady {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl BrownConrady {
    pub fn distort(self, p: Point2<f64>) -> Point2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Point2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Fixed-point inversion of [`Self::distort`].
    pub fn undistort(self, distorted: Point2<f64>, cfg: UndistortConfig) -> Point2<f64> {
        let (mut x, mut y) = (distorted.x, distorted.y);
        for _ in 0..cfg.max_iters.max(1) {
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
            if !radial.is_finite() || radial.abs() < 1e-12 {
                break;
            }
            let dx_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            let x_next = (distorted.x - dx_tan) / radial;
            let y_next = (distorted.y - dy_tan) / radial;
            if !x_next.is_finite() || !y_next.is_finite() {
                break;
            }
            let step = ((x_next - x).powi(2) + (y_next - y).powi(2)).sqrt();
            x = x_next;
            y = y_next;
            if step <= cfg.eps {
                break;
            }
        }
        Point2::new(x, y)
    }
}

/// Kannala–Brandt equidistant fisheye coefficients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct KannalaBrandt {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
}

impl KannalaBrandt {
    fn theta_d(self, theta: f64) -> f64 {
        let t2 = theta * theta;
        theta * (1.0 + t2 * (self.k1 + t2 * (self.k2 + t2 * (self.k3 + t2 * self.k4))))
    }

    pub fn distort(self, p: Point2<f64>) -> Point2<f64> {
        let r = (p.x * p.x + p.y * p.y).sqrt();
        if r < 1e-12 {
            return p;
        }
        let theta = r.atan();
        let scale = self.theta_d(theta) / r;
        Point2::new(p.x * scale, p.y * scale)
    }

    /// Newton inversion of `theta_d(theta)`.
    pub fn undistort(self, distorted: Point2<f64>, cfg: UndistortConfig) -> Point2<f64> {
        let theta_d = (distorted.x * distorted.x + distorted.y * distorted.y).sqrt();
        if theta_d < 1e-12 {
            return distorted;
        }
        let theta_d = theta_d.min(std::f64::consts::FRAC_PI_2);
        let mut theta = theta_d;
        for _ in 0..cfg.max_iters.max(1) {
            let t2 = theta * theta;
            let f = self.theta_d(theta) - theta_d;
            let df = 1.0
                + t2 * (3.0 * self.k1 + t2 * (5.0 * self.k2 + t2 * (7.0 * self.k3 + t2 * 9.0 * self.k4)));
            if !df.is_finite() || df.abs() < 1e-12 {
                break;
            }
            let step = f / df;
            theta -= step;
            if step.abs() <= cfg.eps {
                break;
            }
        }
        let scale = theta.tan() / theta_d;
        Point2::new(distorted.x * scale, distorted.y * scale)
    }
}

/// Distortion inversion settings used by iterative undistortion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UndistortConfig {
    /// Maximum iterations.
    pub max_iters: usize,
    /// Stop when the update norm is below this threshold.
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LensKind {
    Pinhole,
    Fisheye,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum LensModel {
    Pinhole(BrownConrady),
    Fisheye(KannalaBrandt),
}

impl Default for LensModel {
    fn default() -> Self {
        LensModel::Pinhole(BrownConrady::default())
    }
}

impl LensModel {
    /// Four coefficients select the fisheye model; any other length is read
    /// as `k1, k2, p1, p2, k3` with missing entries zero.
    pub fn from_coefficients(coeffs: &[f64]) -> Self {
        if coeffs.len() == 4 {
            return LensModel::Fisheye(KannalaBrandt {
                k1: coeffs[0],
                k2: coeffs[1],
                k3: coeffs[2],
                k4: coeffs[3],
            });
        }
        let c = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        LensModel::Pinhole(BrownConrady {
            k1: c(0),
            k2: c(1),
            p1: c(2),
            p2: c(3),
            k3: c(4),
        })
    }

    pub fn coefficients(&self) -> Vec<f64> {
        match *self {
            LensModel::Pinhole(d) => vec![d.k1, d.k2, d.p1, d.p2, d.k3],
            LensModel::Fisheye(d) => vec![d.k1, d.k2, d.k3, d.k4],
        }
    }

    pub fn kind(&self) -> LensKind {
        match self {
            LensModel::Pinhole(_) => LensKind::Pinhole,
            LensModel::Fisheye(_) => LensKind::Fisheye,
        }
    }

    #[inline]
    pub fn is_fisheye(&self) -> bool {
        self.kind() == LensKind::Fisheye
    }

    pub fn distort(&self, normalized: Point2<f64>) -> Point2<f64> {
        probe::record(self.kind());
        match *self {
            LensModel::Pinhole(d) => d.distort(normalized),
            LensModel::Fisheye(d) => d.distort(normalized),
        }
    }

    pub fn undistort(&self, distorted: Point2<f64>, cfg: UndistortConfig) -> Point2<f64> {
        probe::record(self.kind());
        match *self {
            LensModel::Pinhole(d) => d.undistort(distorted, cfg),
            LensModel::Fisheye(d) => d.undistort(distorted, cfg),
        }
    }
}

/// Intrinsics plus lens model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Camera {
    pub intrinsics: CameraIntrinsics,
    pub lens: LensModel,
}

impl Camera {
    pub fn new(intrinsics: CameraIntrinsics, lens: LensModel) -> Self {
        Self { intrinsics, lens }
    }

    /// Distortion-free camera.
    pub fn ideal(intrinsics: CameraIntrinsics) -> Self {
        Self::new(intrinsics, LensModel::default())
    }

    /// Project a point in the camera (EDN) frame. Points behind the camera
    /// have no projection.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= 1e-12 {
            return None;
        }
        let n = Point2::new(p.x / p.z, p.y / p.z);
        let d = self.lens.distort(n);
        let px = self.intrinsics.normalized_to_pixel(d);
        (px.x.is_finite() && px.y.is_finite()).then_some(px)
    }

    /// Pixel to undistorted normalized image coordinates.
    pub fn normalize(&self, pixel: Point2<f64>) -> Point2<f64> {
        let d = self.intrinsics.pixel_to_normalized(pixel);
        self.lens.undistort(d, UndistortConfig::default())
    }

    /// Pixel to the pixel an ideal camera with the same intrinsics would see.
    pub fn undistort_pixel(&self, pixel: Point2<f64>) -> Point2<f64> {
        self.intrinsics.normalized_to_pixel(self.normalize(pixel))
    }
}

/// Per-thread counters of which lens path ran, used to check dispatch.
pub mod probe {
    use super::LensKind;
    use std::cell::Cell;

    thread_local! {
        static PINHOLE: Cell<usize> = const { Cell::new(0) };
        static FISHEYE: Cell<usize> = const { Cell::new(0) };
    }

    pub(crate) fn record(kind: LensKind) {
        match kind {
            LensKind::Pinhole => PINHOLE.with(|c| c.set(c.get() + 1)),
            LensKind::Fisheye => FISHEYE.with(|c| c.set(c.get() + 1)),
        }
    }

    /// `(pinhole, fisheye)` calls on this thread since the last reset.
    pub fn counts() -> (usize, usize) {
        (PINHOLE.with(Cell::get), FISHEYE.with(Cell::get))
    }

    pub fn reset() {
        PINHOLE.with(|c| c.set(0));
        FISHEYE.with(|c| c.set(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics::new(600.0, 610.0, 320.0, 240.0)
    }

    #[test]
    fn coefficient_count_selects_model() {
        assert!(LensModel::from_coefficients(&[0.1, 0.01, 0.0, 0.0]).is_fisheye());
        assert!(!LensModel::from_coefficients(&[0.1, 0.01, 0.0, 0.0, 0.0]).is_fisheye());
        assert!(!LensModel::from_coefficients(&[]).is_fisheye());
    }

    #[test]
    fn pinhole_undistort_inverts_distort() {
        let lens = LensModel::from_coefficients(&[-0.2, 0.05, 0.001, -0.0005, 0.0]);
        let p = Point2::new(0.3, -0.2);
        let back = lens.undistort(lens.distort(p), UndistortConfig::default());
        assert_relative_eq!(back, p, epsilon = 1e-9);
    }

    #[test]
    fn fisheye_undistort_inverts_distort() {
        let lens = LensModel::from_coefficients(&[0.05, -0.01, 0.002, -0.0003]);
        let p = Point2::new(0.8, 0.5);
        let back = lens.undistort(lens.distort(p), UndistortConfig::default());
        assert_relative_eq!(back, p, epsilon = 1e-9);
    }

    #[test]
    fn camera_project_and_normalize_agree() {
        let cam = Camera::new(
            intrinsics(),
            LensModel::from_coefficients(&[-0.1, 0.02, 0.0, 0.0, 0.0]),
        );
        let p = Point3::new(0.4, -0.3, 2.0);
        let px = cam.project(&p).expect("in front");
        let n = cam.normalize(px);
        assert_relative_eq!(n, Point2::new(0.2, -0.15), epsilon = 1e-9);
        assert!(cam.project(&Point3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn dispatch_is_recorded_per_model() {
        probe::reset();
        let fisheye = Camera::new(intrinsics(), LensModel::from_coefficients(&[0.0; 4]));
        fisheye.project(&Point3::new(0.1, 0.1, 1.0));
        fisheye.normalize(Point2::new(330.0, 250.0));
        assert_eq!(probe::counts(), (0, 2));

        probe::reset();
        let pinhole = Camera::new(intrinsics(), LensModel::from_coefficients(&[0.0; 5]));
        pinhole.project(&Point3::new(0.1, 0.1, 1.0));
        assert_eq!(probe::counts(), (1, 0));
    }
}
