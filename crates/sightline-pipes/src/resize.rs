//! Geometric frame preparation: rotation and down-scaling.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::modes::{FrameDivisor, ImageRotationMode};
use crate::pipe::{Pipe, PipeError};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RotateImageParams {
    pub rotation: ImageRotationMode,
}

#[derive(Debug, Default)]
pub struct RotateImagePipe {
    params: RotateImageParams,
}

impl Pipe for RotateImagePipe {
    type Input<'a> = RgbImage;
    type Output = RgbImage;
    type Params = RotateImageParams;

    fn name(&self) -> &'static str {
        "rotate"
    }

    fn params(&self) -> &RotateImageParams {
        &self.params
    }

    fn set_params(&mut self, params: RotateImageParams) {
        self.params = params;
    }

    fn process(&mut self, image: RgbImage) -> Result<RgbImage, PipeError> {
        Ok(match self.params.rotation {
            ImageRotationMode::Deg0 => image,
            ImageRotationMode::Deg90 => imageops::rotate90(&image),
            ImageRotationMode::Deg180 => imageops::rotate180(&image),
            ImageRotationMode::Deg270 => imageops::rotate270(&image),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResizeImageParams {
    pub divisor: FrameDivisor,
    /// Nearest neighbour when false, bilinear (triangle) when true.
    pub smooth: bool,
}

impl Default for ResizeImageParams {
    fn default() -> Self {
        Self {
            divisor: FrameDivisor::None,
            smooth: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResizeImagePipe {
    params: ResizeImageParams,
}

impl Pipe for ResizeImagePipe {
    type Input<'a> = RgbImage;
    type Output = RgbImage;
    type Params = ResizeImageParams;

    fn name(&self) -> &'static str {
        "resize"
    }

    fn params(&self) -> &ResizeImageParams {
        &self.params
    }

    fn set_params(&mut self, params: ResizeImageParams) {
        self.params = params;
    }

    fn process(&mut self, image: RgbImage) -> Result<RgbImage, PipeError> {
        let f = self.params.divisor.factor();
        if f == 1 {
            return Ok(image);
        }
        let w = (image.width() / f).max(1);
        let h = (image.height() / f).max(1);
        let filter = if self.params.smooth {
            FilterType::Triangle
        } else {
            FilterType::Nearest
        };
        Ok(imageops::resize(&image, w, h, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn rotation_swaps_dimensions() {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(3, 0, Rgb([255, 0, 0]));
        let mut pipe = RotateImagePipe::default();
        pipe.set_params(RotateImageParams {
            rotation: ImageRotationMode::Deg90,
        });
        let out = pipe.apply(img).output;
        assert_eq!(out.dimensions(), (2, 4));
        // Top-right goes to bottom-right under a clockwise quarter turn.
        assert_eq!(out.get_pixel(1, 3), &Rgb([255, 0, 0]));
    }

    #[test]
    fn divisor_scales_down() {
        let mut pipe = ResizeImagePipe::default();
        pipe.set_params(ResizeImageParams {
            divisor: FrameDivisor::Quarter,
            smooth: true,
        });
        let out = pipe.apply(RgbImage::new(640, 480)).output;
        assert_eq!(out.dimensions(), (160, 120));
    }
}
