//! Perspective-n-point pose estimation.
//!
//! Planar point sets are solved with IPPE (Collins & Bartoli, "Infinitesimal
//! Plane-Based Pose Estimation"), which yields the two poses a planar target
//! is ambiguous between. General 3D point sets use a normalized DLT followed
//! by Levenberg–Marquardt on the pixel reprojection error.
//!
//! The solvers work in the EDN convention; the public entry points accept
//! NWU models and return NWU poses. Failures never escape: they produce
//! [`PnpResult::empty`].

use log::debug;
use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, Point2, Point3, Rotation3, SymmetricEigen, Translation3,
    UnitQuaternion, Vector3,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::camera::Camera;
use crate::coords::{convert_point, convert_pose, CoordinateSystem};
use crate::homography::{argmin_singular, estimate_homography};
use crate::lm::{levenberg_marquardt, LeastSquaresProblem, LmParams};
use crate::pose::{isometry_from_rvec_tvec, reprojection_rms, rvec_of};
use crate::target_model::TargetModel;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PnpError {
    #[error("need at least {need} correspondences, got {got}")]
    TooFewPoints { need: usize, got: usize },
    #[error("object and image point counts differ ({object} vs {image})")]
    LengthMismatch { object: usize, image: usize },
    #[error("target model is not planar")]
    NotPlanar,
    #[error("degenerate point configuration")]
    Degenerate,
}

/// Outcome of a PnP solve. Transforms are camera-to-target in NWU.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PnpResult {
    pub is_present: bool,
    pub best: Isometry3<f64>,
    pub best_reproj_err: f64,
    pub alt: Isometry3<f64>,
    pub alt_reproj_err: f64,
    pub ambiguity: f64,
}

impl Default for PnpResult {
    fn default() -> Self {
        Self::empty()
    }
}

impl PnpResult {
    /// No solution: identity transforms, zero errors.
    pub fn empty() -> Self {
        Self {
            is_present: false,
            best: Isometry3::identity(),
            best_reproj_err: 0.0,
            alt: Isometry3::identity(),
            alt_reproj_err: 0.0,
            ambiguity: 0.0,
        }
    }

    /// Unambiguous solution; the alternate mirrors the best.
    pub fn single(best: Isometry3<f64>, err: f64) -> Self {
        Self {
            is_present: true,
            best,
            best_reproj_err: err,
            alt: best,
            alt_reproj_err: err,
            ambiguity: 0.0,
        }
    }

    fn pair(best: (Isometry3<f64>, f64), alt: (Isometry3<f64>, f64)) -> Self {
        let ambiguity = if alt.1 > 0.0 { best.1 / alt.1 } else { 0.0 };
        Self {
            is_present: true,
            best: best.0,
            best_reproj_err: best.1,
            alt: alt.0,
            alt_reproj_err: alt.1,
            ambiguity,
        }
    }
}

/// Rotate a list by `shift` places. Forward moves element `shift` to the
/// front; backward undoes a forward shift of the same size.
pub fn reorder_circular<T: Clone>(items: &[T], backwards: bool, shift: usize) -> Vec<T> {
    let n = items.len();
    if n == 0 {
        return Vec::new();
    }
    let k = shift % n;
    (0..n)
        .map(|i| {
            let j = if backwards { (i + n - k) % n } else { (i + k) % n };
            items[j].clone()
        })
        .collect()
}

/// Pose of a single planar target from its four observed corners.
///
/// `image_corners` are ordered like the model corners (top-left first,
/// clockwise on screen).
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(target = model.name())))]
pub fn solve_planar_target(
    camera: &Camera,
    model: &TargetModel,
    image_corners: &[Point2<f64>],
) -> PnpResult {
    match try_solve_planar_target(camera, model, image_corners) {
        Ok(r) => r,
        Err(e) => {
            debug!("planar pnp failed for {}: {e}", model.name());
            PnpResult::empty()
        }
    }
}

fn try_solve_planar_target(
    camera: &Camera,
    model: &TargetModel,
    image_corners: &[Point2<f64>],
) -> Result<PnpResult, PnpError> {
    if !model.is_planar() {
        return Err(PnpError::NotPlanar);
    }
    let object = model.corners_edn();
    if object.len() != image_corners.len() {
        return Err(PnpError::LengthMismatch {
            object: object.len(),
            image: image_corners.len(),
        });
    }
    // The solver expects the winding to start at the opposite corner.
    let object = reorder_circular(&object, false, 2);
    let image = reorder_circular(image_corners, false, 2);

    let normalized: Vec<Point2<f64>> = image.iter().map(|&p| camera.normalize(p)).collect();
    let [a, b] = ippe(&object, &normalized)?;

    let mut scored = [
        (a, reprojection_rms(camera, &a, &object, &image)),
        (b, reprojection_rms(camera, &b, &object, &image)),
    ];
    scored.sort_by(|x, y| x.1.total_cmp(&y.1));
    if !scored[0].1.is_finite() {
        return Err(PnpError::Degenerate);
    }
    let to_nwu = |p: &Isometry3<f64>| convert_pose(p, CoordinateSystem::Edn, CoordinateSystem::Nwu);
    let best = (to_nwu(&scored[0].0), scored[0].1);
    if !scored[1].1.is_finite() {
        return Ok(PnpResult::single(best.0, best.1));
    }
    Ok(PnpResult::pair(best, (to_nwu(&scored[1].0), scored[1].1)))
}

/// Single best-fit pose from many correspondences, e.g. every corner of all
/// visible field targets. `object` points are NWU in the field frame.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(n = object.len())))]
pub fn solve_multi_target(
    camera: &Camera,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
) -> PnpResult {
    match try_solve_multi_target(camera, object, image) {
        Ok(r) => r,
        Err(e) => {
            debug!("multi-target pnp failed: {e}");
            PnpResult::empty()
        }
    }
}

fn try_solve_multi_target(
    camera: &Camera,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
) -> Result<PnpResult, PnpError> {
    if object.len() != image.len() {
        return Err(PnpError::LengthMismatch {
            object: object.len(),
            image: image.len(),
        });
    }
    if object.len() < 4 {
        return Err(PnpError::TooFewPoints {
            need: 4,
            got: object.len(),
        });
    }
    let object: Vec<Point3<f64>> = object
        .iter()
        .map(|p| convert_point(p, CoordinateSystem::Nwu, CoordinateSystem::Edn))
        .collect();
    let normalized: Vec<Point2<f64>> = image.iter().map(|&p| camera.normalize(p)).collect();

    let initial = if is_coplanar(&object) {
        let candidates = ippe(&object, &normalized)?;
        let ea = reprojection_rms(camera, &candidates[0], &object, image);
        let eb = reprojection_rms(camera, &candidates[1], &object, image);
        if ea <= eb {
            candidates[0]
        } else {
            candidates[1]
        }
    } else {
        if object.len() < 6 {
            return Err(PnpError::TooFewPoints {
                need: 6,
                got: object.len(),
            });
        }
        dlt(&object, &normalized)?
    };

    let refined = refine_pose(camera, &object, image, initial);
    let err = reprojection_rms(camera, &refined, &object, image);
    if !err.is_finite() {
        return Err(PnpError::Degenerate);
    }
    Ok(PnpResult::single(
        convert_pose(&refined, CoordinateSystem::Edn, CoordinateSystem::Nwu),
        err,
    ))
}

fn centroid(points: &[Point3<f64>]) -> Vector3<f64> {
    points.iter().fold(Vector3::zeros(), |a, p| a + p.coords) / points.len() as f64
}

fn scatter(points: &[Point3<f64>], c: &Vector3<f64>) -> Matrix3<f64> {
    points.iter().fold(Matrix3::zeros(), |acc, p| {
        let d = p.coords - c;
        acc + d * d.transpose()
    })
}

fn is_coplanar(points: &[Point3<f64>]) -> bool {
    let c = centroid(points);
    let eig = SymmetricEigen::new(scatter(points, &c));
    let max = eig.eigenvalues.max();
    let min = eig.eigenvalues.min();
    max > 0.0 && min.max(0.0) <= 1e-10 * max
}

/// Rotation whose rows span the best-fit plane (x, y) and its normal (z).
fn plane_frame(points: &[Point3<f64>], c: &Vector3<f64>) -> Result<Rotation3<f64>, PnpError> {
    let eig = SymmetricEigen::new(scatter(points, c));
    let imin = eig.eigenvalues.imin();
    let normal: Vector3<f64> = eig.eigenvectors.column(imin).into_owned();
    let far = points
        .iter()
        .map(|p| p.coords - c)
        .max_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()))
        .ok_or(PnpError::Degenerate)?;
    let e1 = far - normal * far.dot(&normal);
    if e1.norm() < 1e-12 {
        return Err(PnpError::Degenerate);
    }
    let e1 = e1.normalize();
    let e2 = normal.cross(&e1);
    let m = Matrix3::from_rows(&[e1.transpose(), e2.transpose(), normal.transpose()]);
    Ok(Rotation3::from_matrix_unchecked(m))
}

/// Rotation taking the unit z axis onto the direction of `v`.
fn rotate_z_to(v: &Vector3<f64>) -> Rotation3<f64> {
    Rotation3::rotation_between(&Vector3::z(), v).unwrap_or_else(|| {
        // v points along -z: any half turn about an axis in the xy plane.
        Rotation3::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI)
    })
}

/// Both IPPE rotations for a plane whose homography Jacobian at the origin
/// is `j` and whose origin projects to `(p, q)`.
fn ippe_rotations(j: &nalgebra::Matrix2<f64>, p: f64, q: f64) -> Result<[Matrix3<f64>; 2], PnpError> {
    let rv = rotate_z_to(&Vector3::new(p, q, 1.0));
    let rv = rv.matrix();

    let b = nalgebra::Matrix2::new(
        rv[(0, 0)] - p * rv[(2, 0)],
        rv[(0, 1)] - p * rv[(2, 1)],
        rv[(1, 0)] - q * rv[(2, 0)],
        rv[(1, 1)] - q * rv[(2, 1)],
    );
    let a = b.try_inverse().ok_or(PnpError::Degenerate)? * j;

    let ata = a * a.transpose();
    let tr = ata[(0, 0)] + ata[(1, 1)];
    let disc = ((ata[(0, 0)] - ata[(1, 1)]).powi(2) + 4.0 * ata[(0, 1)] * ata[(0, 1)]).sqrt();
    let gamma = (0.5 * (tr + disc)).sqrt();
    if !gamma.is_finite() || gamma < f64::from(f32::EPSILON) {
        return Err(PnpError::Degenerate);
    }

    let r = a / gamma;
    let b0 = (1.0 - r[(0, 0)].powi(2) - r[(1, 0)].powi(2)).max(0.0).sqrt();
    let mut b1 = (1.0 - r[(0, 1)].powi(2) - r[(1, 1)].powi(2)).max(0.0).sqrt();
    if -r[(0, 0)] * r[(0, 1)] - r[(1, 0)] * r[(1, 1)] < 0.0 {
        b1 = -b1;
    }

    let build = |b0: f64, b1: f64| {
        let c0 = Vector3::new(r[(0, 0)], r[(1, 0)], b0);
        let c1 = Vector3::new(r[(0, 1)], r[(1, 1)], b1);
        let c2 = c0.cross(&c1);
        rv * Matrix3::from_columns(&[c0, c1, c2])
    };
    Ok([build(b0, b1), build(-b0, -b1)])
}

/// Linear least-squares translation for a known rotation, from plane points
/// (z = 0) and normalized image points.
fn ippe_translation(
    plane: &[Point2<f64>],
    normalized: &[Point2<f64>],
    r: &Matrix3<f64>,
) -> Result<Vector3<f64>, PnpError> {
    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for (m, u) in plane.iter().zip(normalized) {
        let rp = r * Vector3::new(m.x, m.y, 0.0);
        // t_x - u t_z = u (Rp)_z - (Rp)_x, and likewise for y.
        let rows = [
            (Vector3::new(1.0, 0.0, -u.x), u.x * rp.z - rp.x),
            (Vector3::new(0.0, 1.0, -u.y), u.y * rp.z - rp.y),
        ];
        for (row, rhs) in rows {
            ata += row * row.transpose();
            atb += row * rhs;
        }
    }
    ata.lu().solve(&atb).ok_or(PnpError::Degenerate)
}

fn orthonormalize(m: &Matrix3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_matrix(m)
}

/// IPPE on any coplanar set of four or more points.
fn ippe(object: &[Point3<f64>], normalized: &[Point2<f64>]) -> Result<[Isometry3<f64>; 2], PnpError> {
    if object.len() < 4 {
        return Err(PnpError::TooFewPoints {
            need: 4,
            got: object.len(),
        });
    }
    let c = centroid(object);
    let frame = plane_frame(object, &c)?;
    let plane: Vec<Point2<f64>> = object
        .iter()
        .map(|p| {
            let q = frame * (p.coords - c);
            Point2::new(q.x, q.y)
        })
        .collect();

    let h = estimate_homography(&plane, normalized).ok_or(PnpError::Degenerate)?.h;
    // Jacobian of the homography at the plane origin, with h33 = 1.
    let (p, q) = (h[(0, 2)], h[(1, 2)]);
    let j = nalgebra::Matrix2::new(
        h[(0, 0)] - h[(2, 0)] * p,
        h[(0, 1)] - h[(2, 1)] * p,
        h[(1, 0)] - h[(2, 0)] * q,
        h[(1, 1)] - h[(2, 1)] * q,
    );

    let rotations = ippe_rotations(&j, p, q)?;
    let mut out = [Isometry3::identity(); 2];
    for (slot, r) in out.iter_mut().zip(rotations.iter()) {
        let t = ippe_translation(&plane, normalized, r)?;
        // Compose camera<-plane with plane<-object.
        let rot = orthonormalize(&(r * frame.matrix()));
        let trans = t - rot * c;
        *slot = Isometry3::from_parts(Translation3::from(trans), rot);
    }
    Ok(out)
}

/// Normalized DLT for six or more non-coplanar points.
fn dlt(object: &[Point3<f64>], normalized: &[Point2<f64>]) -> Result<Isometry3<f64>, PnpError> {
    let n = object.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 12);
    for (i, (obj, u)) in object.iter().zip(normalized).enumerate() {
        let (xw, yw, zw) = (obj.x, obj.y, obj.z);
        let r0 = 2 * i;
        let r1 = r0 + 1;
        a[(r0, 0)] = xw;
        a[(r0, 1)] = yw;
        a[(r0, 2)] = zw;
        a[(r0, 3)] = 1.0;
        a[(r0, 8)] = -u.x * xw;
        a[(r0, 9)] = -u.x * yw;
        a[(r0, 10)] = -u.x * zw;
        a[(r0, 11)] = -u.x;

        a[(r1, 4)] = xw;
        a[(r1, 5)] = yw;
        a[(r1, 6)] = zw;
        a[(r1, 7)] = 1.0;
        a[(r1, 8)] = -u.y * xw;
        a[(r1, 9)] = -u.y * yw;
        a[(r1, 10)] = -u.y * zw;
        a[(r1, 11)] = -u.y;
    }

    let ata = a.transpose() * &a;
    let svd = ata.svd(true, true);
    let vt = svd.v_t.ok_or(PnpError::Degenerate)?;
    let idx = argmin_singular(&svd.singular_values).ok_or(PnpError::Degenerate)?;
    let mut p: Vec<f64> = vt.row(idx).iter().copied().collect();

    // Pick the sign that puts the points in front of the camera.
    let depth: f64 = object
        .iter()
        .map(|o| p[8] * o.x + p[9] * o.y + p[10] * o.z + p[11])
        .sum();
    if depth < 0.0 {
        p.iter_mut().for_each(|v| *v = -*v);
    }

    let m = Matrix3::new(p[0], p[1], p[2], p[4], p[5], p[6], p[8], p[9], p[10]);
    let svd_m = m.svd(true, true);
    let u = svd_m.u.ok_or(PnpError::Degenerate)?;
    let vt_m = svd_m.v_t.ok_or(PnpError::Degenerate)?;
    let r = u * vt_m;
    let scale = svd_m.singular_values.sum() / 3.0;
    if scale.abs() < 1e-12 || r.determinant() < 0.0 {
        return Err(PnpError::Degenerate);
    }
    let t = Vector3::new(p[3], p[7], p[11]) / scale;
    Ok(Isometry3::from_parts(
        Translation3::from(t),
        UnitQuaternion::from_matrix(&r),
    ))
}

struct PoseRefinement<'a> {
    camera: &'a Camera,
    object: &'a [Point3<f64>],
    image: &'a [Point2<f64>],
}

impl LeastSquaresProblem for PoseRefinement<'_> {
    fn num_params(&self) -> usize {
        6
    }

    fn num_residuals(&self) -> usize {
        2 * self.object.len()
    }

    fn residuals(&self, x: &DVector<f64>, out: &mut DVector<f64>) {
        let pose = isometry_from_rvec_tvec(
            &Vector3::new(x[0], x[1], x[2]),
            &Vector3::new(x[3], x[4], x[5]),
        );
        for (i, (p, obs)) in self.object.iter().zip(self.image).enumerate() {
            let (rx, ry) = match self.camera.project(&(pose * p)) {
                Some(px) => (px.x - obs.x, px.y - obs.y),
                None => (1e6, 1e6),
            };
            out[2 * i] = rx;
            out[2 * i + 1] = ry;
        }
    }
}

/// Levenberg–Marquardt refinement of a pose on pixel reprojection error.
pub fn refine_pose(
    camera: &Camera,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    initial: Isometry3<f64>,
) -> Isometry3<f64> {
    let problem = PoseRefinement {
        camera,
        object,
        image,
    };
    let r = rvec_of(&initial);
    let t = initial.translation.vector;
    let mut x = DVector::from_vec(vec![r.x, r.y, r.z, t.x, t.y, t.z]);
    let report = levenberg_marquardt(&problem, &mut x, &LmParams::default());
    debug!(
        "pose refinement: {} iterations, cost {:.3e} -> {:.3e}",
        report.iterations, report.initial_cost, report.final_cost
    );
    isometry_from_rvec_tvec(
        &Vector3::new(x[0], x[1], x[2]),
        &Vector3::new(x[3], x[4], x[5]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{probe, CameraIntrinsics, LensModel};
    use crate::pose::project_points;
    use approx::assert_relative_eq;

    fn camera() -> Camera {
        Camera::ideal(CameraIntrinsics::new(900.0, 900.0, 640.0, 360.0))
    }

    /// Observe a target placed at `pose` (NWU camera-to-target).
    fn observe(camera: &Camera, model: &TargetModel, pose: &Isometry3<f64>) -> Vec<Point2<f64>> {
        let edn = convert_pose(pose, CoordinateSystem::Nwu, CoordinateSystem::Edn);
        project_points(camera, &edn, &model.corners_edn())
    }

    #[test]
    fn circular_reorder_round_trips() {
        let l = vec![1, 2, 3, 4, 5];
        for k in 0..12 {
            for back in [false, true] {
                let once = reorder_circular(&l, back, k);
                assert_eq!(reorder_circular(&once, !back, k), l);
            }
        }
        assert_eq!(reorder_circular(&l, false, 2), vec![3, 4, 5, 1, 2]);
        assert_eq!(reorder_circular(&l, true, 2), vec![4, 5, 1, 2, 3]);
    }

    #[test]
    fn planar_target_pose_is_recovered() {
        let cam = camera();
        let model = TargetModel::apriltag_36h11();
        // Tag 2 m ahead, slightly left and below, turned 20 degrees.
        let truth = Isometry3::from_parts(
            Translation3::new(2.0, 0.3, -0.2),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::PI + 0.35),
        );
        let image = observe(&cam, &model, &truth);
        assert_eq!(image.len(), 4);

        let result = solve_planar_target(&cam, &model, &image);
        assert!(result.is_present);
        let dt = (result.best.translation.vector - truth.translation.vector).norm();
        assert!(dt < 1e-3, "translation error {dt}");
        assert!(result.best.rotation.angle_to(&truth.rotation).to_degrees() < 0.1);
        assert!(result.best_reproj_err <= result.alt_reproj_err);
        assert!(result.ambiguity >= 0.0 && result.ambiguity <= 1.0);
    }

    #[test]
    fn non_planar_model_yields_empty_result() {
        let cam = camera();
        let model = TargetModel::sphere("ball", 0.2);
        let image = vec![Point2::new(600.0, 300.0); 4];
        assert_eq!(solve_planar_target(&cam, &model, &image), PnpResult::empty());
    }

    #[test]
    fn multi_target_coplanar_and_general() {
        let cam = camera();
        let truth = Isometry3::from_parts(
            Translation3::new(3.0, -0.4, 0.5),
            UnitQuaternion::from_euler_angles(0.05, -0.1, std::f64::consts::PI + 0.2),
        );
        // Two tags on a wall plane.
        let mut wall = Vec::new();
        for dy in [-0.5, 0.5] {
            for c in TargetModel::apriltag_16h5().corners() {
                wall.push(Point3::new(c.x, c.y + dy, c.z));
            }
        }
        let edn = convert_pose(&truth, CoordinateSystem::Nwu, CoordinateSystem::Edn);
        let to_img = |pts: &[Point3<f64>]| -> Vec<Point2<f64>> {
            pts.iter()
                .map(|p| {
                    let q = convert_point(p, CoordinateSystem::Nwu, CoordinateSystem::Edn);
                    cam.project(&(edn * q)).expect("visible")
                })
                .collect()
        };

        let planar = solve_multi_target(&cam, &wall, &to_img(&wall));
        assert!(planar.is_present);
        assert_eq!(planar.ambiguity, 0.0);
        assert_relative_eq!(
            planar.best.translation.vector,
            truth.translation.vector,
            epsilon = 1e-6
        );

        // Add a second, recessed wall so the point set is not coplanar.
        let mut mixed = wall.clone();
        for c in TargetModel::apriltag_16h5().corners() {
            mixed.push(Point3::new(c.x - 0.4, c.y, c.z + 0.6));
        }
        let general = solve_multi_target(&cam, &mixed, &to_img(&mixed));
        assert!(general.is_present);
        assert_relative_eq!(
            general.best.translation.vector,
            truth.translation.vector,
            epsilon = 1e-6
        );
        assert!(general.best.rotation.angle_to(&truth.rotation) < 1e-6);
    }

    #[test]
    fn fisheye_calibration_drives_fisheye_path() {
        let cam = Camera::new(
            CameraIntrinsics::new(400.0, 400.0, 640.0, 360.0),
            LensModel::from_coefficients(&[0.02, -0.01, 0.0, 0.0]),
        );
        let model = TargetModel::apriltag_36h11();
        let truth = Isometry3::from_parts(
            Translation3::new(1.5, 0.0, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::PI),
        );
        let image = observe(&cam, &model, &truth);
        probe::reset();
        let result = solve_planar_target(&cam, &model, &image);
        let (pinhole, fisheye) = probe::counts();
        assert!(result.is_present);
        assert_eq!(pinhole, 0);
        assert!(fisheye > 0);
        assert!((result.best.translation.vector - truth.translation.vector).norm() < 1e-3);
    }

    #[test]
    fn mismatched_lengths_give_empty_result() {
        let cam = camera();
        let r = solve_multi_target(&cam, &[Point3::origin(); 5], &[Point2::origin(); 4]);
        assert!(!r.is_present);
        assert_eq!(r.best, Isometry3::identity());
    }
}
