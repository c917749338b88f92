//! 2D target reporting: offset points, angles and size.

use nalgebra::Point2;
use sightline_core::{FrameStaticProperties, RotatedRect};

use crate::modes::{RobotOffsetPointMode, TargetOffsetPointEdge, TargetOrientation};
use crate::pipe::{Pipe, PipeError};
use crate::shape::PotentialTarget;
use crate::target::TrackedTarget;

/// Crosshair calibration for [`RobotOffsetPointMode::Dual`]: the offset
/// point measured at two target sizes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DualOffsetPoints {
    pub first: Point2<f64>,
    pub first_area: f64,
    pub second: Point2<f64>,
    pub second_area: f64,
}

impl DualOffsetPoints {
    /// Linear interpolation by target area, clamped to the two samples.
    pub fn at_area(&self, area: f64) -> Point2<f64> {
        let span = self.second_area - self.first_area;
        if span.abs() < f64::EPSILON {
            return self.first;
        }
        let t = ((area - self.first_area) / span).clamp(0.0, 1.0);
        self.first + (self.second - self.first) * t
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Collect2dTargetsParams {
    pub offset_edge: TargetOffsetPointEdge,
    pub orientation: TargetOrientation,
    pub robot_offset_mode: RobotOffsetPointMode,
    pub robot_offset_single: Point2<f64>,
    pub robot_offset_dual: Option<DualOffsetPoints>,
    pub frame_center: Point2<f64>,
    pub horizontal_focal_length: f64,
    pub vertical_focal_length: f64,
    pub image_area: f64,
}

impl Default for Collect2dTargetsParams {
    fn default() -> Self {
        Self {
            offset_edge: TargetOffsetPointEdge::Center,
            orientation: TargetOrientation::Landscape,
            robot_offset_mode: RobotOffsetPointMode::None,
            robot_offset_single: Point2::origin(),
            robot_offset_dual: None,
            frame_center: Point2::origin(),
            horizontal_focal_length: 1.0,
            vertical_focal_length: 1.0,
            image_area: 1.0,
        }
    }
}

impl Collect2dTargetsParams {
    /// Copy the frame-dependent fields from `props`.
    pub fn with_frame(self, props: &FrameStaticProperties) -> Self {
        Self {
            frame_center: Point2::new(props.center_x, props.center_y),
            horizontal_focal_length: props.horizontal_focal_length,
            vertical_focal_length: props.vertical_focal_length,
            image_area: props.image_area,
            ..self
        }
    }

    fn robot_offset(&self, area: f64) -> Point2<f64> {
        match self.robot_offset_mode {
            RobotOffsetPointMode::None => self.frame_center,
            RobotOffsetPointMode::Single => self.robot_offset_single,
            RobotOffsetPointMode::Dual => self
                .robot_offset_dual
                .map_or(self.frame_center, |d| d.at_area(area)),
        }
    }
}

/// Midpoint of the chosen edge of `rect`.
///
/// In landscape orientation the long sides are top and bottom; in portrait
/// the short ones are. Ties in image position resolve to the first side.
pub fn target_offset_point(
    rect: &RotatedRect,
    edge: TargetOffsetPointEdge,
    orientation: TargetOrientation,
) -> Point2<f64> {
    if edge == TargetOffsetPointEdge::Center {
        return rect.center;
    }
    let p = rect.points();
    let mid = |i: usize| Point2::from((p[i].coords + p[(i + 1) % 4].coords) * 0.5);
    // Sides 0 and 2 run along `width`, sides 1 and 3 along `height`.
    let width_pair = [mid(0), mid(2)];
    let height_pair = [mid(1), mid(3)];
    let (long, short) = if rect.width >= rect.height {
        (width_pair, height_pair)
    } else {
        (height_pair, width_pair)
    };
    let (vertical_pair, horizontal_pair) = match orientation {
        TargetOrientation::Landscape => (long, short),
        TargetOrientation::Portrait => (short, long),
    };
    match edge {
        TargetOffsetPointEdge::Center => rect.center,
        TargetOffsetPointEdge::Top => extreme(vertical_pair, |q| q.y, true),
        TargetOffsetPointEdge::Bottom => extreme(vertical_pair, |q| q.y, false),
        TargetOffsetPointEdge::Left => extreme(horizontal_pair, |q| q.x, true),
        TargetOffsetPointEdge::Right => extreme(horizontal_pair, |q| q.x, false),
    }
}

fn extreme(
    pair: [Point2<f64>; 2],
    key: impl Fn(&Point2<f64>) -> f64,
    lowest: bool,
) -> Point2<f64> {
    let (a, b) = (key(&pair[0]), key(&pair[1]));
    let first_wins = if lowest { a <= b } else { a >= b };
    if first_wins {
        pair[0]
    } else {
        pair[1]
    }
}

/// Yaw and pitch in degrees of `target` relative to `origin`; positive yaw
/// is to the right, positive pitch is up.
pub fn yaw_pitch(target: Point2<f64>, origin: Point2<f64>, fx: f64, fy: f64) -> (f64, f64) {
    let yaw = ((target.x - origin.x) / fx).atan().to_degrees();
    let pitch = ((origin.y - target.y) / fy).atan().to_degrees();
    (yaw, pitch)
}

/// Turns candidate targets into reported [`TrackedTarget`]s.
#[derive(Debug, Default)]
pub struct Collect2dTargetsPipe {
    params: Collect2dTargetsParams,
}

impl Pipe for Collect2dTargetsPipe {
    type Input<'a> = Vec<PotentialTarget>;
    type Output = Vec<TrackedTarget>;
    type Params = Collect2dTargetsParams;

    fn name(&self) -> &'static str {
        "collect_2d_targets"
    }

    fn params(&self) -> &Collect2dTargetsParams {
        &self.params
    }

    fn set_params(&mut self, params: Collect2dTargetsParams) {
        self.params = params;
    }

    fn process(
        &mut self,
        targets: Vec<PotentialTarget>,
    ) -> Result<Vec<TrackedTarget>, PipeError> {
        let p = &self.params;
        if p.horizontal_focal_length <= 0.0 || p.vertical_focal_length <= 0.0 {
            return Err(PipeError::InvalidParams("non-positive focal length".into()));
        }
        Ok(targets
            .into_iter()
            .map(|t| {
                let offset = target_offset_point(&t.rect, p.offset_edge, p.orientation);
                let robot = p.robot_offset(t.area);
                let (yaw, pitch) = yaw_pitch(
                    offset,
                    robot,
                    p.horizontal_focal_length,
                    p.vertical_focal_length,
                );
                let area_percent = 100.0 * t.area / p.image_area.max(f64::EPSILON);
                let skew = t.rect.angle_deg;
                TrackedTarget {
                    target_offset_point: offset,
                    robot_offset_point: robot,
                    yaw,
                    pitch,
                    area_percent,
                    skew,
                    ..TrackedTarget::from_potential(t)
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sightline_core::Contour;

    fn rect_target(x: f64, y: f64, w: f64, h: f64) -> PotentialTarget {
        PotentialTarget::from_contour(Contour::from_xy(&[
            [x, y],
            [x + w, y],
            [x + w, y + h],
            [x, y + h],
        ]))
    }

    fn params() -> Collect2dTargetsParams {
        Collect2dTargetsParams {
            frame_center: Point2::new(320.0, 240.0),
            horizontal_focal_length: 500.0,
            vertical_focal_length: 500.0,
            image_area: 640.0 * 480.0,
            ..Default::default()
        }
    }

    #[test]
    fn centred_target_has_zero_angles() {
        let mut pipe = Collect2dTargetsPipe::default();
        pipe.set_params(params());
        let out = pipe.apply(vec![rect_target(300.0, 230.0, 40.0, 20.0)]).output;
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].yaw, 0.0, epsilon = 1e-9);
        assert_relative_eq!(out[0].pitch, 0.0, epsilon = 1e-9);
        assert_relative_eq!(
            out[0].area_percent,
            100.0 * 800.0 / 307_200.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn yaw_right_and_pitch_up_are_positive() {
        let (yaw, pitch) = yaw_pitch(
            Point2::new(820.0, -260.0),
            Point2::new(320.0, 240.0),
            500.0,
            500.0,
        );
        assert_relative_eq!(yaw, 45.0, epsilon = 1e-9);
        assert_relative_eq!(pitch, 45.0, epsilon = 1e-9);
    }

    #[test]
    fn landscape_edges_use_long_sides_for_top_and_bottom() {
        let t = rect_target(100.0, 100.0, 40.0, 10.0);
        let at = |edge| target_offset_point(&t.rect, edge, TargetOrientation::Landscape);
        let top = at(TargetOffsetPointEdge::Top);
        let bottom = at(TargetOffsetPointEdge::Bottom);
        let left = at(TargetOffsetPointEdge::Left);
        assert_relative_eq!(top.x, 120.0, epsilon = 1e-6);
        assert_relative_eq!(top.y, 100.0, epsilon = 1e-6);
        assert_relative_eq!(bottom.y, 110.0, epsilon = 1e-6);
        assert_relative_eq!(left.x, 100.0, epsilon = 1e-6);
        assert_relative_eq!(left.y, 105.0, epsilon = 1e-6);
    }

    #[test]
    fn dual_robot_offset_interpolates_by_area() {
        let dual = DualOffsetPoints {
            first: Point2::new(300.0, 200.0),
            first_area: 100.0,
            second: Point2::new(340.0, 260.0),
            second_area: 300.0,
        };
        assert_eq!(dual.at_area(200.0), Point2::new(320.0, 230.0));
        assert_eq!(dual.at_area(10.0), dual.first);
        assert_eq!(dual.at_area(1e6), dual.second);

        let mut pipe = Collect2dTargetsPipe::default();
        pipe.set_params(Collect2dTargetsParams {
            robot_offset_mode: RobotOffsetPointMode::Dual,
            robot_offset_dual: Some(dual),
            ..params()
        });
        // 10 x 20 target, area 200.
        let out = pipe.apply(vec![rect_target(0.0, 0.0, 10.0, 20.0)]).output;
        assert_relative_eq!(out[0].robot_offset_point.x, 320.0, epsilon = 1e-9);
        assert_relative_eq!(out[0].robot_offset_point.y, 230.0, epsilon = 1e-9);
    }

    #[test]
    fn invalid_focal_length_yields_no_targets() {
        let mut pipe = Collect2dTargetsPipe::default();
        pipe.set_params(Collect2dTargetsParams {
            horizontal_focal_length: 0.0,
            ..params()
        });
        assert!(pipe
            .apply(vec![rect_target(0.0, 0.0, 4.0, 4.0)])
            .output
            .is_empty());
    }
}
