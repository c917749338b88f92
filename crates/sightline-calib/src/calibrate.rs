//! Camera calibration from planar board views.
//!
//! Intrinsics are initialised in closed form from per-view homographies
//! (zero skew, no distortion) and then refined jointly with the distortion
//! coefficients and every view's pose by Levenberg–Marquardt on pixel
//! reprojection error.

use log::{debug, info};
use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, Matrix6, Point2, Translation3, UnitQuaternion, Vector3,
};
use serde::{Deserialize, Serialize};
use sightline_core::{
    estimate_homography, isometry_from_rvec_tvec, levenberg_marquardt, rvec_of, Camera,
    CameraCalibrationCoefficients, CameraIntrinsics, LeastSquaresProblem, LensKind, LensModel,
    LmParams, LmReport, Resolution,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::board::BoardObservation;

/// Leading coefficients of `tan(theta)`: a fisheye model starting here
/// reproduces the distortion-free pinhole initial guess.
const TAN_SERIES: [f64; 4] = [1.0 / 3.0, 2.0 / 15.0, 17.0 / 315.0, 62.0 / 2835.0];

/// Residual assigned to each axis of a point that cannot be projected.
const UNPROJECTABLE: f64 = 1e3;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CalibrationError {
    #[error("need at least {need} board views, got {got}")]
    NotEnoughViews { need: usize, got: usize },
    #[error("view {view}: {reason}")]
    InvalidView { view: usize, reason: String },
    #[error("board views do not constrain the intrinsics")]
    Degenerate,
    #[error("image is {got:?}, session expects {expected:?}")]
    ResolutionMismatch { expected: Resolution, got: Resolution },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Distortion model to solve for.
    pub lens: LensKind,
    pub min_views: usize,
    pub lm: LmParams,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            lens: LensKind::Pinhole,
            min_views: 3,
            lm: LmParams {
                max_iters: 200,
                ..LmParams::default()
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct CalibrationResult {
    pub camera: Camera,
    /// Board-to-camera transform of every view, in input order.
    pub extrinsics: Vec<Isometry3<f64>>,
    /// RMS reprojection error over all points, pixels.
    pub rms_error: f64,
    /// RMS reprojection error of each view, pixels.
    pub per_view_errors: Vec<f64>,
    pub report: LmReport,
}

impl CalibrationResult {
    pub fn coefficients(&self, resolution: Resolution) -> CameraCalibrationCoefficients {
        CameraCalibrationCoefficients::new(
            resolution,
            &self.camera,
            self.per_view_errors.clone(),
            self.rms_error,
        )
    }
}

/// Zhang's `v_ij` row for homography columns `i` and `j`.
fn v_row(h: &Matrix3<f64>, i: usize, j: usize) -> [f64; 6] {
    let (a, b) = (h.column(i), h.column(j));
    [
        a[0] * b[0],
        a[0] * b[1] + a[1] * b[0],
        a[1] * b[1],
        a[2] * b[0] + a[0] * b[2],
        a[2] * b[1] + a[1] * b[2],
        a[2] * b[2],
    ]
}

/// Zero-skew intrinsics from board homographies into normalised pixels.
fn closed_form_intrinsics(homographies: &[Matrix3<f64>]) -> Result<Matrix3<f64>, CalibrationError> {
    let mut vtv = Matrix6::<f64>::zeros();
    let mut add = |row: [f64; 6]| {
        let v = nalgebra::Vector6::from_row_slice(&row);
        vtv += v * v.transpose();
    };
    for h in homographies {
        let h = h / h.norm();
        let v12 = v_row(&h, 0, 1);
        let v11 = v_row(&h, 0, 0);
        let v22 = v_row(&h, 1, 1);
        add(v12);
        add(std::array::from_fn(|k| v11[k] - v22[k]));
    }
    add([0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);

    let eig = vtv.symmetric_eigen();
    let idx = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .ok_or(CalibrationError::Degenerate)?;
    let b = eig.eigenvectors.column(idx);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let den = b11 * b22 - b12 * b12;
    if den.abs() < 1e-300 || b11.abs() < 1e-300 {
        return Err(CalibrationError::Degenerate);
    }
    let v0 = (b12 * b13 - b11 * b23) / den;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let alpha2 = lambda / b11;
    let beta2 = lambda * b11 / den;
    if !(alpha2 > 0.0 && beta2 > 0.0) {
        return Err(CalibrationError::Degenerate);
    }
    let u0 = -b13 / b11;
    Ok(Matrix3::new(
        alpha2.sqrt(),
        0.0,
        u0,
        0.0,
        beta2.sqrt(),
        v0,
        0.0,
        0.0,
        1.0,
    ))
}

/// Board pose from its homography and the intrinsics it was taken with.
fn pose_from_homography(k_inv: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<Isometry3<f64>> {
    let a = k_inv * h;
    let (h1, h2, h3) = (a.column(0), a.column(1), a.column(2));
    let norm = 0.5 * (h1.norm() + h2.norm());
    if norm < 1e-12 {
        return None;
    }
    let mut s = 1.0 / norm;
    if h3[2] * s < 0.0 {
        s = -s;
    }
    let r1 = h1 * s;
    let r2 = h2 * s;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1.into_owned(), r2.into_owned(), r3]);
    let t: Vector3<f64> = h3 * s;
    Some(Isometry3::from_parts(
        Translation3::from(t),
        UnitQuaternion::from_matrix(&r),
    ))
}

struct CalibrationProblem<'a> {
    views: &'a [BoardObservation],
    lens: LensKind,
    /// First residual row of each view.
    offsets: Vec<usize>,
    residual_count: usize,
}

impl<'a> CalibrationProblem<'a> {
    fn new(views: &'a [BoardObservation], lens: LensKind) -> Self {
        let mut offsets = Vec::with_capacity(views.len());
        let mut total = 0;
        for v in views {
            offsets.push(total);
            total += 2 * v.len();
        }
        Self {
            views,
            lens,
            offsets,
            residual_count: total,
        }
    }

    fn lens_len(&self) -> usize {
        match self.lens {
            LensKind::Pinhole => 5,
            LensKind::Fisheye => 4,
        }
    }

    fn intrinsic_len(&self) -> usize {
        4 + self.lens_len()
    }

    fn camera(&self, x: &DVector<f64>) -> Camera {
        let n = self.intrinsic_len();
        Camera::new(
            CameraIntrinsics::new(x[0], x[1], x[2], x[3]),
            LensModel::from_coefficients(&x.as_slice()[4..n]),
        )
    }

    fn pose(&self, x: &DVector<f64>, view: usize) -> Isometry3<f64> {
        let b = self.intrinsic_len() + 6 * view;
        isometry_from_rvec_tvec(
            &Vector3::new(x[b], x[b + 1], x[b + 2]),
            &Vector3::new(x[b + 3], x[b + 4], x[b + 5]),
        )
    }

    fn view_residuals(&self, camera: &Camera, pose: &Isometry3<f64>, view: usize, out: &mut [f64]) {
        let obs = &self.views[view];
        for (i, (p, uv)) in obs.object_points.iter().zip(&obs.image_points).enumerate() {
            let (rx, ry) = match camera.project(&(pose * p)) {
                Some(px) => (px.x - uv.x, px.y - uv.y),
                None => (UNPROJECTABLE, UNPROJECTABLE),
            };
            out[2 * i] = rx;
            out[2 * i + 1] = ry;
        }
    }

    fn pack(&self, camera: &Camera, poses: &[Isometry3<f64>]) -> DVector<f64> {
        let i = camera.intrinsics;
        let mut x = vec![i.fx, i.fy, i.cx, i.cy];
        x.extend(camera.lens.coefficients());
        for pose in poses {
            let r = rvec_of(pose);
            let t = pose.translation.vector;
            x.extend([r.x, r.y, r.z, t.x, t.y, t.z]);
        }
        DVector::from_vec(x)
    }
}

impl LeastSquaresProblem for CalibrationProblem<'_> {
    fn num_params(&self) -> usize {
        self.intrinsic_len() + 6 * self.views.len()
    }

    fn num_residuals(&self) -> usize {
        self.residual_count
    }

    fn residuals(&self, x: &DVector<f64>, out: &mut DVector<f64>) {
        let camera = self.camera(x);
        for v in 0..self.views.len() {
            let start = self.offsets[v];
            let rows = 2 * self.views[v].len();
            let slice = &mut out.as_mut_slice()[start..start + rows];
            self.view_residuals(&camera, &self.pose(x, v), v, slice);
        }
    }

    /// Central differences; a view's pose only moves that view's rows.
    fn jacobian(&self, x: &DVector<f64>, jac: &mut DMatrix<f64>) {
        jac.fill(0.0);
        let step = |v: f64| 1e-6 * v.abs().max(1e-3);
        let m = self.num_residuals();
        let mut xp = x.clone();
        let mut rp = DVector::zeros(m);
        let mut rm = DVector::zeros(m);
        for j in 0..self.intrinsic_len() {
            let h = step(x[j]);
            xp[j] = x[j] + h;
            self.residuals(&xp, &mut rp);
            xp[j] = x[j] - h;
            self.residuals(&xp, &mut rm);
            xp[j] = x[j];
            jac.set_column(j, &((&rp - &rm) / (2.0 * h)));
        }

        let camera = self.camera(x);
        for v in 0..self.views.len() {
            let rows = 2 * self.views[v].len();
            let start = self.offsets[v];
            let mut vp = vec![0.0; rows];
            let mut vm = vec![0.0; rows];
            for k in 0..6 {
                let col = self.intrinsic_len() + 6 * v + k;
                let h = step(x[col]);
                xp[col] = x[col] + h;
                self.view_residuals(&camera, &self.pose(&xp, v), v, &mut vp);
                xp[col] = x[col] - h;
                self.view_residuals(&camera, &self.pose(&xp, v), v, &mut vm);
                xp[col] = x[col];
                for r in 0..rows {
                    jac[(start + r, col)] = (vp[r] - vm[r]) / (2.0 * h);
                }
            }
        }
    }
}

fn validate(observations: &[BoardObservation], params: &CalibrationParams) -> Result<(), CalibrationError> {
    let need = params.min_views.max(2);
    if observations.len() < need {
        return Err(CalibrationError::NotEnoughViews {
            need,
            got: observations.len(),
        });
    }
    for (view, obs) in observations.iter().enumerate() {
        let reason = if obs.image_points.len() != obs.object_points.len() {
            "image and board point counts differ"
        } else if obs.len() < 4 {
            "fewer than four points"
        } else if obs.object_points.iter().any(|p| p.z.abs() > 1e-9) {
            "board points are not on the z = 0 plane"
        } else {
            continue;
        };
        return Err(CalibrationError::InvalidView {
            view,
            reason: reason.to_string(),
        });
    }
    Ok(())
}

/// Solve intrinsics, distortion and per-view poses from board observations.
///
/// `resolution` sets the pixel normalisation for the closed-form start. The
/// returned `per_view_errors` has one entry per observation.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(views = observations.len(), lens = ?params.lens)))]
pub fn calibrate(
    observations: &[BoardObservation],
    resolution: Resolution,
    params: &CalibrationParams,
) -> Result<CalibrationResult, CalibrationError> {
    validate(observations, params)?;

    let (w, h) = (resolution.width as f64, resolution.height as f64);
    let scale = w.max(h).max(1.0);
    let norm = Matrix3::new(
        1.0 / scale,
        0.0,
        -0.5 * w / scale,
        0.0,
        1.0 / scale,
        -0.5 * h / scale,
        0.0,
        0.0,
        1.0,
    );

    let mut homographies = Vec::with_capacity(observations.len());
    for (view, obs) in observations.iter().enumerate() {
        let src: Vec<Point2<f64>> = obs.object_points.iter().map(|p| Point2::new(p.x, p.y)).collect();
        let dst: Vec<Point2<f64>> = obs
            .image_points
            .iter()
            .map(|p| Point2::from((norm * p.to_homogeneous()).xy()))
            .collect();
        let hom = estimate_homography(&src, &dst).ok_or_else(|| CalibrationError::InvalidView {
            view,
            reason: "board homography is degenerate".to_string(),
        })?;
        homographies.push(hom.h);
    }

    let k_norm = closed_form_intrinsics(&homographies)?;
    let k_inv = k_norm.try_inverse().ok_or(CalibrationError::Degenerate)?;
    let poses = homographies
        .iter()
        .map(|hm| pose_from_homography(&k_inv, hm))
        .collect::<Option<Vec<_>>>()
        .ok_or(CalibrationError::Degenerate)?;

    let intrinsics = CameraIntrinsics::new(
        k_norm[(0, 0)] * scale,
        k_norm[(1, 1)] * scale,
        k_norm[(0, 2)] * scale + 0.5 * w,
        k_norm[(1, 2)] * scale + 0.5 * h,
    );
    debug!(
        "closed-form intrinsics fx={:.1} fy={:.1} cx={:.1} cy={:.1}",
        intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy
    );
    let lens = match params.lens {
        LensKind::Pinhole => LensModel::default(),
        LensKind::Fisheye => LensModel::from_coefficients(&TAN_SERIES),
    };

    let problem = CalibrationProblem::new(observations, params.lens);
    let mut x = problem.pack(&Camera::new(intrinsics, lens), &poses);
    let report = levenberg_marquardt(&problem, &mut x, &params.lm);

    let camera = problem.camera(&x);
    if !camera.intrinsics.is_valid() {
        return Err(CalibrationError::Degenerate);
    }
    let mut residuals = DVector::zeros(problem.num_residuals());
    problem.residuals(&x, &mut residuals);

    let mut per_view_errors = Vec::with_capacity(observations.len());
    let mut total = 0.0;
    for (v, obs) in observations.iter().enumerate() {
        let start = problem.offsets[v];
        let sq: f64 = residuals.rows(start, 2 * obs.len()).norm_squared();
        total += sq;
        per_view_errors.push((sq / obs.len() as f64).sqrt());
    }
    let points: usize = observations.iter().map(BoardObservation::len).sum();
    let rms_error = (total / points as f64).sqrt();
    let extrinsics = (0..observations.len()).map(|v| problem.pose(&x, v)).collect();

    info!(
        "calibrated {:?} camera from {} views: rms {:.4} px after {} iterations",
        params.lens,
        observations.len(),
        rms_error,
        report.iterations
    );
    Ok(CalibrationResult {
        camera,
        extrinsics,
        rms_error,
        per_view_errors,
        report,
    })
}
