use image::{Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use nalgebra::{Isometry3, Point2, Translation3, UnitQuaternion};
use sightline_core::{
    convert_pose, project_points, Camera, CameraIntrinsics, CoordinateSystem, LensModel,
    TargetModel,
};
use sightline_pipes::{
    Collect2dTargetsParams, Collect2dTargetsPipe, CornerDetectionParams, CornerDetectionPipe,
    FilterContoursParams, FilterContoursPipe, FindContoursPipe, GroupContoursPipe, HsvParams,
    HsvPipe, Pipe, PotentialTarget, SolvePnpParams, SolvePnpPipe, SortContoursParams,
    SortContoursPipe, ValueRange,
};

const W: u32 = 640;
const H: u32 = 480;

fn camera() -> Camera {
    Camera::new(
        CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0),
        LensModel::default(),
    )
}

fn render(model: &TargetModel, pose: &Isometry3<f64>) -> (RgbImage, Vec<Point2<f64>>) {
    let edn = convert_pose(pose, CoordinateSystem::Nwu, CoordinateSystem::Edn);
    let corners = project_points(&camera(), &edn, &model.corners_edn());
    let poly: Vec<Point<i32>> = corners
        .iter()
        .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
        .collect();
    let mut img = RgbImage::from_pixel(W, H, Rgb([30, 30, 30]));
    draw_polygon_mut(&mut img, &poly, Rgb([0, 255, 0]));
    (img, corners)
}

#[test]
fn green_tag_is_located_and_posed() {
    let model = TargetModel::apriltag_36h11();
    let truth = Isometry3::from_parts(
        Translation3::new(1.5, 0.1, -0.05),
        UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::PI + 0.3),
    );
    let (frame, true_corners) = render(&model, &truth);
    let image_area = (W * H) as f64;

    let mut hsv = HsvPipe::default();
    hsv.set_params(HsvParams {
        hue: ValueRange::new(50, 70),
        saturation: ValueRange::new(100, 255),
        value: ValueRange::new(100, 255),
        hue_inverted: false,
    });
    let mask = hsv.apply(&frame);
    assert!(mask.elapsed_nanos >= 0);

    let contours = FindContoursPipe::default().apply(&mask.output).output;
    let mut filter = FilterContoursPipe::default();
    filter.set_params(FilterContoursParams {
        area: ValueRange::new(0.5, 50.0),
        frame_area: image_area,
        ..Default::default()
    });
    let contours = filter.apply(contours).output;
    assert_eq!(contours.len(), 1);

    let candidates: Vec<PotentialTarget> =
        contours.into_iter().map(PotentialTarget::from_contour).collect();
    let grouped = GroupContoursPipe::default().apply(candidates).output;
    let mut sort = SortContoursPipe::default();
    sort.set_params(SortContoursParams {
        frame_center: Point2::new(319.5, 239.5),
        ..Default::default()
    });
    let sorted = sort.apply(grouped).output;

    let mut collect = Collect2dTargetsPipe::default();
    collect.set_params(Collect2dTargetsParams {
        frame_center: Point2::new(320.0, 240.0),
        horizontal_focal_length: 600.0,
        vertical_focal_length: 600.0,
        image_area,
        ..Default::default()
    });
    let targets = collect.apply(sorted).output;
    assert_eq!(targets.len(), 1);
    // Target sits left of centre in NWU, so it appears left in the image.
    assert!(targets[0].yaw < 0.0);

    let mut corners = CornerDetectionPipe::default();
    corners.set_params(CornerDetectionParams::default());
    let targets = corners.apply(targets).output;
    let found = targets[0].corners.expect("four corners");
    for (f, t) in found.iter().zip(&true_corners) {
        assert!((f - t).norm() < 2.0, "corner {f:?} vs {t:?}");
    }

    let mut pnp = SolvePnpPipe::default();
    pnp.set_params(SolvePnpParams {
        camera: Some(camera()),
        model,
    });
    let targets = pnp.apply(targets).output;
    assert!(targets[0].pose_valid);
    let dt = (targets[0].best_camera_to_target.translation.vector - truth.translation.vector).norm();
    assert!(dt < 0.1, "translation error {dt}");
}
