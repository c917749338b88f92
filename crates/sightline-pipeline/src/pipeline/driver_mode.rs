use sightline_core::FrameStaticProperties;
use sightline_pipes::{DrawCrosshairParams, DrawCrosshairPipe, Frame, Pipe};

use super::stages::FrameStages;
use super::{Latency, Pipeline, PipelineResult};
use crate::settings::DriverModeSettings;

/// Passes the frame through for a human driver, with a centre crosshair.
#[derive(Debug, Default)]
pub struct DriverModePipeline {
    frame: FrameStages,
    crosshair: DrawCrosshairPipe,
    overlay_enabled: bool,
}

impl Pipeline for DriverModePipeline {
    type Settings = DriverModeSettings;

    fn bind(&mut self, s: &DriverModeSettings, input: &FrameStaticProperties) {
        self.frame.bind(&s.base, input);
        self.crosshair.set_params(DrawCrosshairParams::default());
        self.overlay_enabled = s.base.draw_overlay;
    }

    fn execute(&mut self, frame: Frame) -> PipelineResult {
        let mut latency = Latency::default();
        let mut image = self.frame.apply(frame.image, &mut latency);
        if self.overlay_enabled {
            latency.take(self.crosshair.apply(&mut image));
        }
        PipelineResult {
            capture_timestamp_nanos: frame.timestamp_nanos,
            latency_millis: latency.millis(),
            annotated_frame: Some(image),
            ..PipelineResult::default()
        }
    }
}
