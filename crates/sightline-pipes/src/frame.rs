use image::RgbImage;
use sightline_core::{CameraCalibrationCoefficients, FrameStaticProperties};

/// One captured image and the camera-mode geometry it was taken with.
///
/// Owned by the frame source until handed to a pipeline, then by that
/// pipeline for the duration of one run.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RgbImage,
    /// Capture time on the source's monotonic clock.
    pub timestamp_nanos: i64,
    pub properties: FrameStaticProperties,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp_nanos: i64, properties: FrameStaticProperties) -> Self {
        Self {
            image,
            timestamp_nanos,
            properties,
        }
    }

    /// Frame whose properties are derived from the image size.
    pub fn with_fov(
        image: RgbImage,
        timestamp_nanos: i64,
        fov_deg: f64,
        calibration: Option<CameraCalibrationCoefficients>,
    ) -> Self {
        let properties =
            FrameStaticProperties::new(image.width(), image.height(), fov_deg, calibration);
        Self::new(image, timestamp_nanos, properties)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
