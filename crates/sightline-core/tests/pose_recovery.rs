use nalgebra::{Isometry3, Point2, Translation3, UnitQuaternion};
use sightline_core::{
    convert_pose, project_points, solve_planar_target, Camera, CameraIntrinsics, CoordinateSystem,
    LensModel, TargetModel,
};

fn camera() -> Camera {
    Camera::new(
        CameraIntrinsics::new(1100.0, 1100.0, 800.0, 600.0),
        LensModel::from_coefficients(&[-0.05, 0.01, 0.0005, -0.0003, 0.0]),
    )
}

fn observe(cam: &Camera, model: &TargetModel, pose: &Isometry3<f64>) -> Vec<Point2<f64>> {
    let edn = convert_pose(pose, CoordinateSystem::Nwu, CoordinateSystem::Edn);
    project_points(cam, &edn, &model.corners_edn())
}

#[test]
fn synthetic_tag_poses_are_recovered() {
    let cam = camera();
    let model = TargetModel::apriltag_36h11();

    let poses = [
        (1.0, 0.0, 0.0, 0.0, 0.0, 0.0),
        (2.5, 0.4, 0.1, 0.1, -0.05, 0.3),
        (3.0, -0.6, -0.3, -0.15, 0.1, -0.4),
        (4.0, 0.2, 0.5, 0.0, 0.2, 0.25),
    ];

    for (x, y, z, roll, pitch, yaw) in poses {
        let truth = Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, std::f64::consts::PI + yaw),
        );
        let image = observe(&cam, &model, &truth);
        let result = solve_planar_target(&cam, &model, &image);
        assert!(result.is_present, "no solution for {truth:?}");

        let dt = (result.best.translation.vector - truth.translation.vector).norm();
        let dr = result.best.rotation.angle_to(&truth.rotation).to_degrees();
        assert!(dt < 1e-3, "translation error {dt} m at {truth:?}");
        assert!(dr < 0.1, "rotation error {dr} deg at {truth:?}");
        assert!(result.best_reproj_err < 1e-6);
    }
}

#[test]
fn coordinate_round_trip_within_tolerance() {
    for i in 0..20 {
        let t = i as f64 * 0.37;
        let pose = Isometry3::from_parts(
            Translation3::new(t.sin() * 3.0, t.cos(), t - 2.0),
            UnitQuaternion::from_euler_angles(t, -0.5 * t, 0.25 * t),
        );
        for (a, b) in [
            (CoordinateSystem::Nwu, CoordinateSystem::Edn),
            (CoordinateSystem::Edn, CoordinateSystem::Nwu),
        ] {
            let back = convert_pose(&convert_pose(&pose, a, b), b, a);
            assert!((back.translation.vector - pose.translation.vector).norm() < 1e-9);
            assert!(back.rotation.angle_to(&pose.rotation) < 1e-9);
        }
    }
}
