use image::{Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use sightline_core::{
    convert_pose, project_points, Camera, CameraCalibrationCoefficients, CameraIntrinsics,
    CoordinateSystem, LensModel, Resolution, TargetModel,
};
use sightline_pipeline::{
    CameraConfig, FieldValue, PipelineManager, PipelineType, VisionPipeline,
};
use sightline_pipes::Frame;

const W: u32 = 640;
const H: u32 = 480;

fn camera() -> Camera {
    Camera::new(
        CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0),
        LensModel::default(),
    )
}

fn calibration() -> CameraCalibrationCoefficients {
    CameraCalibrationCoefficients::new(Resolution::new(W, H), &camera(), vec![0.1], 0.1)
}

fn truth() -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::new(1.5, 0.1, -0.05),
        UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::PI + 0.3),
    )
}

fn render_tag() -> RgbImage {
    let model = TargetModel::apriltag_36h11();
    let edn = convert_pose(&truth(), CoordinateSystem::Nwu, CoordinateSystem::Edn);
    let corners = project_points(&camera(), &edn, &model.corners_edn());
    let poly: Vec<Point<i32>> = corners
        .iter()
        .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
        .collect();
    let mut img = RgbImage::from_pixel(W, H, Rgb([30, 30, 30]));
    draw_polygon_mut(&mut img, &poly, Rgb([0, 255, 0]));
    img
}

fn green_tag_manager() -> PipelineManager {
    let mut manager = PipelineManager::default();
    for (name, value) in [
        ("hsv_hue", FieldValue::IntPair([50, 70])),
        ("hsv_saturation", FieldValue::IntPair([100, 255])),
        ("hsv_value", FieldValue::IntPair([100, 255])),
        ("solve_pnp", FieldValue::Bool(true)),
        ("target_model", FieldValue::Int(0)),
    ] {
        manager.set_field(0, name, value).expect(name);
    }
    manager
}

#[test]
fn reflective_pipeline_locates_and_poses_tag() {
    let manager = green_tag_manager();
    let frame = Frame::with_fov(render_tag(), 42, 70.0, Some(calibration()));

    let mut pipeline = VisionPipeline::default();
    let result = pipeline.run(frame, &manager.snapshot());

    assert_eq!(result.capture_timestamp_nanos, 42);
    assert_eq!(result.targets.len(), 1);
    let target = &result.targets[0];
    assert!(target.yaw < 0.0, "target is left of centre");
    assert!(target.pose_valid);
    let pose = result.best_pose.expect("pose");
    let dt = (pose.translation.vector - truth().translation.vector).norm();
    assert!(dt < 0.1, "translation error {dt}");
    let annotated = result.annotated_frame.expect("overlay on by default");
    assert_eq!(annotated.dimensions(), (W, H));
    assert!(result.latency_millis >= 0.0);
}

#[test]
fn uncalibrated_frame_reports_targets_without_pose() {
    let manager = green_tag_manager();
    let frame = Frame::with_fov(render_tag(), 0, 70.0, None);
    let result = VisionPipeline::default().run(frame, &manager.snapshot());
    assert_eq!(result.targets.len(), 1);
    assert!(!result.targets[0].pose_valid);
    assert!(result.best_pose.is_none());
}

#[test]
fn divisor_halves_output_frame() {
    let mut manager = green_tag_manager();
    manager.set_field(0, "divisor", FieldValue::Int(1)).expect("half");
    let frame = Frame::with_fov(render_tag(), 0, 70.0, Some(calibration()));
    let result = VisionPipeline::default().run(frame, &manager.snapshot());
    let annotated = result.annotated_frame.expect("overlay");
    assert_eq!(annotated.dimensions(), (W / 2, H / 2));
    assert_eq!(result.targets.len(), 1);
}

#[test]
fn driver_mode_passes_frame_through() {
    let mut manager = green_tag_manager();
    manager.set_driver_mode(true);
    assert_eq!(manager.current_settings().pipeline_type(), PipelineType::DriverMode);

    let frame = Frame::with_fov(render_tag(), 0, 70.0, None);
    let mut pipeline = VisionPipeline::default();
    let result = pipeline.run(frame, &manager.snapshot());
    assert_eq!(pipeline.pipeline_type(), PipelineType::DriverMode);
    assert!(result.targets.is_empty());
    assert!(result.annotated_frame.is_some());

    manager.set_driver_mode(false);
    assert_eq!(manager.current_index(), 0);
}

#[test]
fn config_round_trips_through_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("front.json");

    let mut config = CameraConfig::new("front", 68.5);
    config.add_calibration(calibration());
    let mut manager = green_tag_manager();
    let i = manager.add(PipelineType::ColoredShape, "Cargo").expect("add");
    manager.set_current(i).expect("select");
    config.store_manager(&manager);
    config.write_json(&path).expect("write");

    let loaded = CameraConfig::load_json(&path).expect("load");
    assert_eq!(loaded, config);
    let rebuilt = loaded.build_manager().expect("valid");
    assert_eq!(rebuilt.nicknames(), manager.nicknames());
    assert_eq!(rebuilt.current_index(), i);
    assert_eq!(rebuilt.current_settings(), manager.current_settings());
}
