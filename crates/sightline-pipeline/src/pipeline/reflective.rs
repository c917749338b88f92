use sightline_core::FrameStaticProperties;
use sightline_pipes::{FilterContoursParams, FilterContoursPipe, Frame, Pipe, PotentialTarget};

use super::stages::{FrameStages, TargetingStages};
use super::{Latency, Pipeline, PipelineResult};
use crate::settings::ReflectiveSettings;

/// Retro-reflective tape: HSV threshold, contour filtering by area, aspect
/// ratio and fullness, then grouping, sorting and optional pose.
#[derive(Debug, Default)]
pub struct ReflectivePipeline {
    frame: FrameStages,
    filter: FilterContoursPipe,
    targeting: TargetingStages,
}

impl Pipeline for ReflectivePipeline {
    type Settings = ReflectiveSettings;

    fn bind(&mut self, s: &ReflectiveSettings, input: &FrameStaticProperties) {
        let props = self.frame.bind(&s.base, input);
        self.filter.set_params(FilterContoursParams {
            area: s.contour_area,
            ratio: s.contour_ratio,
            fullness: s.contour_fullness,
            orientation: s.targeting.target_orientation,
            frame_area: props.image_area,
        });
        self.targeting.bind(&s.base, &s.targeting, &props);
    }

    fn execute(&mut self, frame: Frame) -> PipelineResult {
        let mut latency = Latency::default();
        let image = self.frame.apply(frame.image, &mut latency);
        let contours = self.targeting.contours(&image, &mut latency);
        let contours = latency.take(self.filter.apply(contours));
        let candidates = contours
            .into_iter()
            .map(PotentialTarget::from_contour)
            .collect();
        let targets = self.targeting.targets(candidates, &mut latency);
        self.targeting
            .finish(image, targets, latency, frame.timestamp_nanos)
    }
}
