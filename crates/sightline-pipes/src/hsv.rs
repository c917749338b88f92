//! Colour thresholding in HSV space.
//!
//! Uses the 8-bit OpenCV convention: hue in `[0, 180)`, saturation and value
//! in `[0, 255]`.

use image::{GrayImage, RgbImage};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::pipe::{Pipe, PipeError};
use crate::range::ValueRange;

#[derive(Clone, Debug, PartialEq)]
pub struct HsvParams {
    pub hue: ValueRange<u8>,
    pub saturation: ValueRange<u8>,
    pub value: ValueRange<u8>,
    /// Keep hues outside `hue` instead of inside it (red wraps around 0).
    pub hue_inverted: bool,
}

impl Default for HsvParams {
    fn default() -> Self {
        Self {
            hue: ValueRange::new(50, 180),
            saturation: ValueRange::new(50, 255),
            value: ValueRange::new(50, 255),
            hue_inverted: false,
        }
    }
}

impl HsvParams {
    #[inline]
    pub fn accepts(&self, [h, s, v]: [u8; 3]) -> bool {
        let hue_ok = if self.hue_inverted {
            h <= self.hue.min || h >= self.hue.max
        } else {
            self.hue.contains(h)
        };
        hue_ok && self.saturation.contains(s) && self.value.contains(v)
    }
}

/// RGB to 8-bit HSV.
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = v - min;
    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };
    let h = if diff <= 0.0 {
        0.0
    } else if v == rf {
        60.0 * (gf - bf) / diff
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    let h = if h < 0.0 { h + 360.0 } else { h };
    let h = (h / 2.0).round() as u16 % 180;
    [h as u8, s.round() as u8, v as u8]
}

/// Produces a binary mask (255 = in range) from an RGB frame.
#[derive(Debug, Default)]
pub struct HsvPipe {
    params: HsvParams,
    /// Converted pixels, reused between frames.
    hsv: Vec<[u8; 3]>,
}

impl Pipe for HsvPipe {
    type Input<'a> = &'a RgbImage;
    type Output = GrayImage;
    type Params = HsvParams;

    fn name(&self) -> &'static str {
        "hsv"
    }

    fn params(&self) -> &HsvParams {
        &self.params
    }

    fn set_params(&mut self, params: HsvParams) {
        self.params = params;
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(w = image.width(), h = image.height())))]
    fn process(&mut self, image: &RgbImage) -> Result<GrayImage, PipeError> {
        let (w, h) = image.dimensions();
        self.hsv.clear();
        self.hsv.extend(image.pixels().map(|p| rgb_to_hsv(p.0)));
        let data: Vec<u8> = self
            .hsv
            .iter()
            .map(|&px| if self.params.accepts(px) { 255 } else { 0 })
            .collect();
        GrayImage::from_raw(w, h, data)
            .ok_or_else(|| PipeError::InvalidInput(format!("mask buffer for {w}x{h}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn primary_colours_map_to_opencv_hues() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
        assert_eq!(rgb_to_hsv([128, 128, 128]), [0, 0, 128]);
    }

    #[test]
    fn mask_selects_green() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([0, 255, 0]));
        img.put_pixel(1, 0, Rgb([255, 0, 0]));
        img.put_pixel(2, 0, Rgb([20, 20, 20]));
        let mut pipe = HsvPipe::default();
        pipe.set_params(HsvParams {
            hue: ValueRange::new(50, 70),
            saturation: ValueRange::new(100, 255),
            value: ValueRange::new(100, 255),
            hue_inverted: false,
        });
        let mask = pipe.apply(&img).output;
        assert_eq!(mask.as_raw(), &vec![255, 0, 0]);
        // Scratch reuse must not change the result.
        assert_eq!(pipe.apply(&img).output.as_raw(), &vec![255, 0, 0]);
    }

    #[test]
    fn inverted_hue_wraps_red() {
        let params = HsvParams {
            hue: ValueRange::new(10, 170),
            saturation: ValueRange::new(100, 255),
            value: ValueRange::new(100, 255),
            hue_inverted: true,
        };
        assert!(params.accepts(rgb_to_hsv([255, 0, 0])));
        assert!(params.accepts(rgb_to_hsv([255, 0, 20])));
        assert!(!params.accepts(rgb_to_hsv([0, 255, 0])));
    }
}
