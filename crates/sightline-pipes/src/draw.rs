//! Overlay rendering for the annotated output frame.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use nalgebra::{Point2, Point3};
use sightline_core::{
    convert_point, convert_pose, project_points, Camera, CoordinateSystem, TargetModel,
};

use crate::pipe::{Pipe, PipeError};
use crate::target::TrackedTarget;

pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);

fn line(image: &mut RgbImage, a: Point2<f64>, b: Point2<f64>, color: Rgb<u8>) {
    draw_line_segment_mut(
        image,
        (a.x as f32, a.y as f32),
        (b.x as f32, b.y as f32),
        color,
    );
}

/// Closed polyline through `points`.
pub fn polyline(image: &mut RgbImage, points: &[Point2<f64>], color: Rgb<u8>) {
    for (i, &a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        line(image, a, b, color);
    }
}

fn cross(image: &mut RgbImage, p: Point2<f64>, color: Rgb<u8>) {
    if p.x.is_finite() && p.y.is_finite() {
        draw_cross_mut(image, color, p.x.round() as i32, p.y.round() as i32);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Draw2dTargetsParams {
    pub draw_contours: bool,
    pub draw_rotated_rect: bool,
    pub draw_corners: bool,
    /// Only the first `max_drawn` targets are drawn.
    pub max_drawn: usize,
}

impl Default for Draw2dTargetsParams {
    fn default() -> Self {
        Self {
            draw_contours: true,
            draw_rotated_rect: true,
            draw_corners: true,
            max_drawn: usize::MAX,
        }
    }
}

/// Contours, rotated rects, corners and offset points of 2D targets.
#[derive(Debug, Default)]
pub struct Draw2dTargetsPipe {
    params: Draw2dTargetsParams,
}

impl Pipe for Draw2dTargetsPipe {
    type Input<'a> = (&'a mut RgbImage, &'a [TrackedTarget]);
    type Output = ();
    type Params = Draw2dTargetsParams;

    fn name(&self) -> &'static str {
        "draw_2d_targets"
    }

    fn params(&self) -> &Draw2dTargetsParams {
        &self.params
    }

    fn set_params(&mut self, params: Draw2dTargetsParams) {
        self.params = params;
    }

    fn process(&mut self, (image, targets): Self::Input<'_>) -> Result<(), PipeError> {
        for t in targets.iter().take(self.params.max_drawn) {
            if self.params.draw_contours {
                for sub in &t.sub_contours {
                    polyline(image, sub.points(), RED);
                }
            }
            if self.params.draw_rotated_rect {
                polyline(image, &t.rect.points(), BLUE);
            }
            if self.params.draw_corners {
                if let Some(corners) = &t.corners {
                    for c in corners {
                        draw_hollow_circle_mut(
                            image,
                            (c.x.round() as i32, c.y.round() as i32),
                            4,
                            YELLOW,
                        );
                    }
                }
            }
            cross(image, t.target_offset_point, GREEN);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Draw3dTargetsParams {
    pub camera: Option<Camera>,
    pub model: TargetModel,
    /// Depth of the drawn box behind the target face, metres.
    pub box_depth: f64,
}

impl Default for Draw3dTargetsParams {
    fn default() -> Self {
        Self {
            camera: None,
            model: TargetModel::apriltag_36h11(),
            box_depth: 0.1,
        }
    }
}

/// Projects the target model as a box at each target's best pose.
#[derive(Debug, Default)]
pub struct Draw3dTargetsPipe {
    params: Draw3dTargetsParams,
}

impl Draw3dTargetsPipe {
    fn project(camera: &Camera, t: &TrackedTarget, pts: &[Point3<f64>]) -> Vec<Point2<f64>> {
        let edn_pose = convert_pose(
            &t.best_camera_to_target,
            CoordinateSystem::Nwu,
            CoordinateSystem::Edn,
        );
        let edn_pts: Vec<Point3<f64>> = pts
            .iter()
            .map(|p| convert_point(p, CoordinateSystem::Nwu, CoordinateSystem::Edn))
            .collect();
        project_points(camera, &edn_pose, &edn_pts)
    }
}

impl Pipe for Draw3dTargetsPipe {
    type Input<'a> = (&'a mut RgbImage, &'a [TrackedTarget]);
    type Output = ();
    type Params = Draw3dTargetsParams;

    fn name(&self) -> &'static str {
        "draw_3d_targets"
    }

    fn params(&self) -> &Draw3dTargetsParams {
        &self.params
    }

    fn set_params(&mut self, params: Draw3dTargetsParams) {
        self.params = params;
    }

    fn process(&mut self, (image, targets): Self::Input<'_>) -> Result<(), PipeError> {
        let Some(camera) = self.params.camera else {
            return Ok(());
        };
        let front_model = self.params.model.corners().to_vec();
        let back_model = self.params.model.back_face(self.params.box_depth);
        for t in targets.iter().filter(|t| t.pose_valid) {
            let front = Self::project(&camera, t, &front_model);
            let back = Self::project(&camera, t, &back_model);
            // Points behind the camera are dropped by the projection.
            if front.len() != front_model.len() || back.len() != back_model.len() {
                continue;
            }
            polyline(image, &front, GREEN);
            polyline(image, &back, BLUE);
            for (a, b) in front.iter().zip(&back) {
                line(image, *a, *b, YELLOW);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawCornersParams {
    pub radius: i32,
    /// Connect consecutive corners, showing the detection order.
    pub connect: bool,
}

impl Default for DrawCornersParams {
    fn default() -> Self {
        Self {
            radius: 3,
            connect: true,
        }
    }
}

/// Marks board corners found during calibration.
#[derive(Debug, Default)]
pub struct DrawCornersPipe {
    params: DrawCornersParams,
}

impl Pipe for DrawCornersPipe {
    type Input<'a> = (&'a mut RgbImage, &'a [Point2<f64>]);
    type Output = ();
    type Params = DrawCornersParams;

    fn name(&self) -> &'static str {
        "draw_corners"
    }

    fn params(&self) -> &DrawCornersParams {
        &self.params
    }

    fn set_params(&mut self, params: DrawCornersParams) {
        self.params = params;
    }

    fn process(&mut self, (image, corners): Self::Input<'_>) -> Result<(), PipeError> {
        if self.params.connect {
            for w in corners.windows(2) {
                line(image, w[0], w[1], BLUE);
            }
        }
        for c in corners {
            draw_hollow_circle_mut(
                image,
                (c.x.round() as i32, c.y.round() as i32),
                self.params.radius,
                RED,
            );
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawCrosshairParams {
    /// Crosshair position; the image centre when unset.
    pub point: Option<Point2<f64>>,
    pub color: [u8; 3],
}

impl Default for DrawCrosshairParams {
    fn default() -> Self {
        Self {
            point: None,
            color: GREEN.0,
        }
    }
}

/// Full-frame crosshair for driver mode.
#[derive(Debug, Default)]
pub struct DrawCrosshairPipe {
    params: DrawCrosshairParams,
}

impl Pipe for DrawCrosshairPipe {
    type Input<'a> = &'a mut RgbImage;
    type Output = ();
    type Params = DrawCrosshairParams;

    fn name(&self) -> &'static str {
        "draw_crosshair"
    }

    fn params(&self) -> &DrawCrosshairParams {
        &self.params
    }

    fn set_params(&mut self, params: DrawCrosshairParams) {
        self.params = params;
    }

    fn process(&mut self, image: &mut RgbImage) -> Result<(), PipeError> {
        let (w, h) = (image.width() as f64, image.height() as f64);
        let p = self
            .params
            .point
            .unwrap_or_else(|| Point2::new((w - 1.0) / 2.0, (h - 1.0) / 2.0));
        let color = Rgb(self.params.color);
        line(image, Point2::new(0.0, p.y), Point2::new(w - 1.0, p.y), color);
        line(image, Point2::new(p.x, 0.0), Point2::new(p.x, h - 1.0), color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::PotentialTarget;
    use sightline_core::Contour;

    #[test]
    fn crosshair_spans_the_frame() {
        let mut img = RgbImage::new(21, 11);
        DrawCrosshairPipe::default().apply(&mut img);
        assert_eq!(img.get_pixel(0, 5), &GREEN);
        assert_eq!(img.get_pixel(20, 5), &GREEN);
        assert_eq!(img.get_pixel(10, 0), &GREEN);
        assert_eq!(img.get_pixel(3, 2), &Rgb([0, 0, 0]));
    }

    #[test]
    fn two_d_overlay_outlines_the_contour() {
        let contour = Contour::from_xy(&[[10.0, 10.0], [30.0, 10.0], [30.0, 20.0], [10.0, 20.0]]);
        let target = TrackedTarget::from_potential(PotentialTarget::from_contour(contour));
        let mut img = RgbImage::new(40, 30);
        let mut pipe = Draw2dTargetsPipe::default();
        pipe.set_params(Draw2dTargetsParams {
            draw_rotated_rect: false,
            ..Default::default()
        });
        pipe.apply((&mut img, std::slice::from_ref(&target)));
        assert_eq!(img.get_pixel(20, 10), &RED);
        assert_eq!(img.get_pixel(10, 15), &RED);
        assert_eq!(img.get_pixel(2, 2), &Rgb([0, 0, 0]));
    }

    #[test]
    fn corners_are_connected_in_order() {
        let mut img = RgbImage::new(40, 40);
        let corners = [Point2::new(5.0, 5.0), Point2::new(35.0, 5.0)];
        DrawCornersPipe::default().apply((&mut img, &corners));
        assert_eq!(img.get_pixel(20, 5), &BLUE);
    }

    #[test]
    fn three_d_overlay_needs_a_camera() {
        let mut img = RgbImage::new(10, 10);
        let before = img.clone();
        Draw3dTargetsPipe::default().apply((&mut img, &[]));
        assert_eq!(img, before);
    }
}
