use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Least-squares rigid transform `T` with `dst ≈ T * src` (Kabsch).
///
/// Needs at least three non-collinear correspondences.
pub fn estimate_rigid_transform(src: &[Point3<f64>], dst: &[Point3<f64>]) -> Option<Isometry3<f64>> {
    if src.len() != dst.len() || src.len() < 3 {
        return None;
    }
    let n = src.len() as f64;
    let cs = src.iter().fold(Vector3::zeros(), |a, p| a + p.coords) / n;
    let cd = dst.iter().fold(Vector3::zeros(), |a, p| a + p.coords) / n;

    let mut h = Matrix3::<f64>::zeros();
    for (s, d) in src.iter().zip(dst) {
        h += (s.coords - cs) * (d.coords - cd).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut sv = svd.singular_values;
    sv.as_mut_slice().sort_by(|a, b| b.total_cmp(a));
    if sv[1] < 1e-12 * sv[0].max(1e-300) {
        // Collinear or coincident points leave the rotation undetermined.
        return None;
    }

    let mut d = Matrix3::identity();
    if (v_t.transpose() * u.transpose()).determinant() < 0.0 {
        d[(2, 2)] = -1.0;
    }
    let r = v_t.transpose() * d * u.transpose();
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    let t = cd - rot * cs;
    Some(Isometry3::from_parts(Translation3::from(t), rot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_known_transform() {
        let truth = Isometry3::new(Vector3::new(0.5, -1.0, 2.0), Vector3::new(0.3, -0.2, 0.9));
        let src = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.3, 0.7, -0.2),
        ];
        let dst: Vec<_> = src.iter().map(|p| truth * p).collect();
        let est = estimate_rigid_transform(&src, &dst).expect("transform");
        assert_relative_eq!(
            est.translation.vector,
            truth.translation.vector,
            epsilon = 1e-9
        );
        assert!(est.rotation.angle_to(&truth.rotation) < 1e-9);
    }

    #[test]
    fn collinear_points_are_rejected() {
        let src: Vec<_> = (0..4).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        assert!(estimate_rigid_transform(&src, &src).is_none());
    }
}
