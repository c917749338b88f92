use sightline_core::FrameStaticProperties;
use sightline_pipes::{
    ContourShape, FilterShapesParams, FilterShapesPipe, FindCirclesParams, FindCirclesPipe,
    FindPolygonParams, FindPolygonPipe, Frame, Pipe, PotentialTarget,
};

use super::stages::{FrameStages, TargetingStages};
use super::{Latency, Pipeline, PipelineResult};
use crate::settings::ColoredShapeSettings;

/// Colored objects classified as circles or polygons before grouping.
#[derive(Debug, Default)]
pub struct ColoredShapePipeline {
    frame: FrameStages,
    find_polygons: FindPolygonPipe,
    find_circles: FindCirclesPipe,
    filter: FilterShapesPipe,
    targeting: TargetingStages,
    circles: bool,
}

impl Pipeline for ColoredShapePipeline {
    type Settings = ColoredShapeSettings;

    fn bind(&mut self, s: &ColoredShapeSettings, input: &FrameStaticProperties) {
        let props = self.frame.bind(&s.base, input);
        self.circles = s.desired_shape == ContourShape::Circle;
        self.find_polygons.set_params(FindPolygonParams {
            accuracy_percentage: s.accuracy_percentage,
        });
        self.find_circles.set_params(FindCirclesParams {
            min_radius: s.circle_radius.min,
            max_radius: s.circle_radius.max,
            edge_threshold: s.circle_edge_threshold,
            accuracy: s.circle_accuracy,
            min_dist: s.circle_min_dist,
        });
        self.filter.set_params(FilterShapesParams {
            desired_shape: s.desired_shape,
            area: s.contour_area,
            perimeter: s.contour_perimeter,
            frame_area: props.image_area,
        });
        self.targeting.bind(&s.base, &s.targeting, &props);
    }

    fn execute(&mut self, frame: Frame) -> PipelineResult {
        let mut latency = Latency::default();
        let image = self.frame.apply(frame.image, &mut latency);
        let contours = self.targeting.contours(&image, &mut latency);
        let shapes = if self.circles {
            latency.take(self.find_circles.apply(contours))
        } else {
            latency.take(self.find_polygons.apply(contours))
        };
        let shapes = latency.take(self.filter.apply(shapes));
        let candidates = shapes.into_iter().map(PotentialTarget::from_shape).collect();
        let targets = self.targeting.targets(candidates, &mut latency);
        self.targeting
            .finish(image, targets, latency, frame.timestamp_nanos)
    }
}
