//! Stage groups shared by several pipelines.

use image::RgbImage;
use log::debug;
use nalgebra::Point2;
use sightline_core::{
    Camera, CameraCalibrationCoefficients, CameraIntrinsics, Contour, FrameStaticProperties,
    Resolution,
};
use sightline_pipes::{
    Collect2dTargetsParams, Collect2dTargetsPipe, CornerDetectionParams, CornerDetectionPipe,
    Draw2dTargetsParams, Draw2dTargetsPipe, Draw3dTargetsParams, Draw3dTargetsPipe,
    DualOffsetPoints, ErodeDilateParams, ErodeDilatePipe, FindContoursPipe, GroupContoursParams,
    GroupContoursPipe, HsvParams, HsvPipe, ImageRotationMode, Pipe, PotentialTarget,
    ResizeImageParams, ResizeImagePipe, RotateImageParams, RotateImagePipe, RobotOffsetPointMode,
    SolvePnpParams, SolvePnpPipe, SortContoursParams, SortContoursPipe, SpeckleRejectParams,
    SpeckleRejectPipe, TrackedTarget,
};

use super::{Latency, PipelineResult};
use crate::settings::{BaseSettings, TargetingSettings};

/// Geometry of the frames a pipeline sees after rotation and resizing.
///
/// A calibration is carried over, rescaled, when only the divisor changes
/// the frame; rotated frames and frames whose size does not match the
/// calibration lose it.
pub fn output_properties(input: &FrameStaticProperties, base: &BaseSettings) -> FrameStaticProperties {
    let k = base.divisor.factor();
    let (mut w, mut h) = ((input.width / k).max(1), (input.height / k).max(1));
    if base.rotation.is_transposing() {
        std::mem::swap(&mut w, &mut h);
    }
    let calibration = match &input.calibration {
        Some(_) if base.rotation != ImageRotationMode::Deg0 => {
            debug!("rotated frames are not calibrated");
            None
        }
        Some(c) => rescaled(c, input, w, h),
        None => None,
    };
    FrameStaticProperties::new(w, h, input.fov_deg, calibration)
}

fn rescaled(
    c: &CameraCalibrationCoefficients,
    input: &FrameStaticProperties,
    w: u32,
    h: u32,
) -> Option<CameraCalibrationCoefficients> {
    if c.resolution != Resolution::new(input.width, input.height) {
        debug!(
            "calibration is for {}x{}, frame is {}x{}",
            c.resolution.width, c.resolution.height, input.width, input.height
        );
        return None;
    }
    if (w, h) == (input.width, input.height) {
        return Some(c.clone());
    }
    let camera = c.camera().ok()?;
    let sx = w as f64 / input.width as f64;
    let sy = h as f64 / input.height as f64;
    let k = camera.intrinsics;
    let scaled = Camera::new(
        CameraIntrinsics::new(k.fx * sx, k.fy * sy, k.cx * sx, k.cy * sy),
        camera.lens,
    );
    Some(CameraCalibrationCoefficients::new(
        Resolution::new(w, h),
        &scaled,
        c.per_view_errors.clone(),
        c.rms_error,
    ))
}

/// Rotation then resizing.
#[derive(Debug, Default)]
pub(crate) struct FrameStages {
    rotate: RotateImagePipe,
    resize: ResizeImagePipe,
}

impl FrameStages {
    /// Bind both stages and return the geometry of their output.
    pub(crate) fn bind(
        &mut self,
        base: &BaseSettings,
        input: &FrameStaticProperties,
    ) -> FrameStaticProperties {
        self.rotate.set_params(RotateImageParams {
            rotation: base.rotation,
        });
        self.resize.set_params(ResizeImageParams {
            divisor: base.divisor,
            smooth: base.smooth_resize,
        });
        output_properties(input, base)
    }

    pub(crate) fn apply(&mut self, image: RgbImage, latency: &mut Latency) -> RgbImage {
        let image = latency.take(self.rotate.apply(image));
        latency.take(self.resize.apply(image))
    }
}

/// Threshold, contour, grouping, sorting, pose and overlay stages shared by
/// the reflective and colored-shape pipelines.
#[derive(Debug, Default)]
pub(crate) struct TargetingStages {
    hsv: HsvPipe,
    erode_dilate: ErodeDilatePipe,
    find_contours: FindContoursPipe,
    speckle: SpeckleRejectPipe,
    group: GroupContoursPipe,
    sort: SortContoursPipe,
    collect: Collect2dTargetsPipe,
    corners: CornerDetectionPipe,
    solve_pnp: SolvePnpPipe,
    draw_2d: Draw2dTargetsPipe,
    draw_3d: Draw3dTargetsPipe,
    pose_enabled: bool,
    overlay_enabled: bool,
}

impl TargetingStages {
    pub(crate) fn bind(
        &mut self,
        base: &BaseSettings,
        s: &TargetingSettings,
        props: &FrameStaticProperties,
    ) {
        self.hsv.set_params(HsvParams {
            hue: s.hsv_hue,
            saturation: s.hsv_saturation,
            value: s.hsv_value,
            hue_inverted: s.hue_inverted,
        });
        self.erode_dilate.set_params(ErodeDilateParams {
            erode: s.erode,
            dilate: s.dilate,
            radius: s.morph_radius,
        });
        self.speckle.set_params(SpeckleRejectParams {
            min_percent_of_largest: s.speckle_percent,
        });
        self.group.set_params(GroupContoursParams {
            mode: s.contour_grouping,
            intersection: s.contour_intersection,
        });
        self.sort.set_params(SortContoursParams {
            mode: s.contour_sort_mode,
            max_targets: s.max_targets as usize,
            frame_center: Point2::new(props.center_x, props.center_y),
        });
        let dual = (s.robot_offset_mode == RobotOffsetPointMode::Dual).then(|| DualOffsetPoints {
            first: Point2::from(s.robot_offset_first),
            first_area: s.robot_offset_first_area,
            second: Point2::from(s.robot_offset_second),
            second_area: s.robot_offset_second_area,
        });
        self.collect.set_params(
            Collect2dTargetsParams {
                offset_edge: s.offset_edge,
                orientation: s.target_orientation,
                robot_offset_mode: s.robot_offset_mode,
                robot_offset_single: Point2::from(s.robot_offset_point),
                robot_offset_dual: dual,
                ..Collect2dTargetsParams::default()
            }
            .with_frame(props),
        );
        self.corners.set_params(CornerDetectionParams {
            strategy: s.corner_strategy,
            use_convex_hull: s.corner_use_convex_hull,
            accuracy_percentage: s.corner_accuracy_percentage,
        });
        let camera = props.camera();
        let model = s.model();
        self.solve_pnp.set_params(SolvePnpParams {
            camera,
            model: model.clone(),
        });
        self.draw_3d.set_params(Draw3dTargetsParams {
            camera,
            model,
            ..Draw3dTargetsParams::default()
        });
        self.draw_2d.set_params(Draw2dTargetsParams {
            draw_corners: s.solve_pnp,
            ..Draw2dTargetsParams::default()
        });
        self.pose_enabled = s.solve_pnp;
        self.overlay_enabled = base.draw_overlay;
    }

    /// Threshold `image` and extract the surviving blobs.
    pub(crate) fn contours(&mut self, image: &RgbImage, latency: &mut Latency) -> Vec<Contour> {
        let mask = latency.take(self.hsv.apply(image));
        let mask = latency.take(self.erode_dilate.apply(mask));
        let contours = latency.take(self.find_contours.apply(&mask));
        latency.take(self.speckle.apply(contours))
    }

    /// Group, sort and report candidates, then solve their poses.
    pub(crate) fn targets(
        &mut self,
        candidates: Vec<PotentialTarget>,
        latency: &mut Latency,
    ) -> Vec<TrackedTarget> {
        let grouped = latency.take(self.group.apply(candidates));
        let sorted = latency.take(self.sort.apply(grouped));
        let targets = latency.take(self.collect.apply(sorted));
        if !self.pose_enabled {
            return targets;
        }
        let targets = latency.take(self.corners.apply(targets));
        latency.take(self.solve_pnp.apply(targets))
    }

    /// Draw overlays onto `image` and assemble the run's result.
    pub(crate) fn finish(
        &mut self,
        mut image: RgbImage,
        targets: Vec<TrackedTarget>,
        mut latency: Latency,
        capture_timestamp_nanos: i64,
    ) -> PipelineResult {
        let annotated_frame = if self.overlay_enabled {
            latency.take(self.draw_2d.apply((&mut image, targets.as_slice())));
            if self.pose_enabled {
                latency.take(self.draw_3d.apply((&mut image, targets.as_slice())));
            }
            Some(image)
        } else {
            None
        };
        let best_pose = targets
            .iter()
            .find(|t| t.pose_valid)
            .map(|t| t.best_camera_to_target);
        PipelineResult {
            capture_timestamp_nanos,
            latency_millis: latency.millis(),
            targets,
            best_pose,
            annotated_frame,
            ..PipelineResult::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sightline_core::LensModel;
    use sightline_pipes::FrameDivisor;

    fn calibrated(w: u32, h: u32) -> FrameStaticProperties {
        let camera = Camera::new(
            CameraIntrinsics::new(800.0, 780.0, 320.0, 240.0),
            LensModel::from_coefficients(&[0.01, 0.0, 0.0, 0.0, 0.0]),
        );
        let c = CameraCalibrationCoefficients::new(Resolution::new(w, h), &camera, vec![0.1], 0.1);
        FrameStaticProperties::new(w, h, 70.0, Some(c))
    }

    #[test]
    fn divisor_rescales_calibration() {
        let base = BaseSettings {
            divisor: FrameDivisor::Half,
            ..BaseSettings::default()
        };
        let out = output_properties(&calibrated(640, 480), &base);
        assert_eq!((out.width, out.height), (320, 240));
        let k = out.camera().expect("calibration kept").intrinsics;
        assert_relative_eq!(k.fx, 400.0, epsilon = 1e-9);
        assert_relative_eq!(k.fy, 390.0, epsilon = 1e-9);
        assert_relative_eq!(k.cx, 160.0, epsilon = 1e-9);
        assert_relative_eq!(out.center_y, 120.0, epsilon = 1e-9);
    }

    #[test]
    fn rotation_drops_calibration_and_swaps_size() {
        let base = BaseSettings {
            rotation: ImageRotationMode::Deg90,
            ..BaseSettings::default()
        };
        let out = output_properties(&calibrated(640, 480), &base);
        assert_eq!((out.width, out.height), (480, 640));
        assert!(out.calibration.is_none());
    }

    #[test]
    fn mismatched_calibration_is_ignored() {
        let mut props = calibrated(640, 480);
        props.width = 1280;
        props.height = 720;
        let out = output_properties(&props, &BaseSettings::default());
        assert!(out.calibration.is_none());
    }
}
