//! Mask clean-up and contour extraction.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};
use log::debug;
use nalgebra::Point2;
use sightline_core::{Contour, RotatedRect};

use crate::modes::TargetOrientation;
use crate::pipe::{Pipe, PipeError};
use crate::range::ValueRange;

#[derive(Clone, Debug, PartialEq)]
pub struct ErodeDilateParams {
    pub erode: bool,
    pub dilate: bool,
    /// Square kernel of side `2 * radius + 1`.
    pub radius: u8,
}

impl Default for ErodeDilateParams {
    fn default() -> Self {
        Self {
            erode: false,
            dilate: false,
            radius: 1,
        }
    }
}

/// Erosion followed by dilation on a binary mask.
#[derive(Debug, Default)]
pub struct ErodeDilatePipe {
    params: ErodeDilateParams,
}

impl Pipe for ErodeDilatePipe {
    type Input<'a> = GrayImage;
    type Output = GrayImage;
    type Params = ErodeDilateParams;

    fn name(&self) -> &'static str {
        "erode_dilate"
    }

    fn params(&self) -> &ErodeDilateParams {
        &self.params
    }

    fn set_params(&mut self, params: ErodeDilateParams) {
        self.params = params;
    }

    fn process(&mut self, mask: GrayImage) -> Result<GrayImage, PipeError> {
        let k = self.params.radius;
        let mut out = mask;
        if self.params.erode && k > 0 {
            out = erode(&out, Norm::LInf, k);
        }
        if self.params.dilate && k > 0 {
            out = dilate(&out, Norm::LInf, k);
        }
        Ok(out)
    }
}

/// Outermost contours of a binary mask.
#[derive(Debug, Default)]
pub struct FindContoursPipe {
    params: (),
}

impl Pipe for FindContoursPipe {
    type Input<'a> = &'a GrayImage;
    type Output = Vec<Contour>;
    type Params = ();

    fn name(&self) -> &'static str {
        "find_contours"
    }

    fn params(&self) -> &() {
        &self.params
    }

    fn set_params(&mut self, params: ()) {
        self.params = params;
    }

    fn process(&mut self, mask: &GrayImage) -> Result<Vec<Contour>, PipeError> {
        let contours = find_contours::<i32>(mask)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .map(|c| {
                Contour::new(
                    c.points
                        .iter()
                        .map(|p| Point2::new(p.x as f64, p.y as f64))
                        .collect(),
                )
            })
            .collect();
        Ok(contours)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpeckleRejectParams {
    /// Minimum area as a percentage of the largest contour's area.
    pub min_percent_of_largest: f64,
}

impl Default for SpeckleRejectParams {
    fn default() -> Self {
        Self {
            min_percent_of_largest: 5.0,
        }
    }
}

/// Drops blobs that are small relative to the largest one.
#[derive(Debug, Default)]
pub struct SpeckleRejectPipe {
    params: SpeckleRejectParams,
}

impl Pipe for SpeckleRejectPipe {
    type Input<'a> = Vec<Contour>;
    type Output = Vec<Contour>;
    type Params = SpeckleRejectParams;

    fn name(&self) -> &'static str {
        "speckle_reject"
    }

    fn params(&self) -> &SpeckleRejectParams {
        &self.params
    }

    fn set_params(&mut self, params: SpeckleRejectParams) {
        self.params = params;
    }

    fn process(&mut self, contours: Vec<Contour>) -> Result<Vec<Contour>, PipeError> {
        let largest = contours.iter().map(Contour::area).fold(0.0, f64::max);
        let min_area = self.params.min_percent_of_largest / 100.0 * largest;
        let before = contours.len();
        let kept: Vec<Contour> = contours
            .into_iter()
            .filter(|c| c.area() >= min_area)
            .collect();
        debug!("speckle reject kept {}/{}", kept.len(), before);
        Ok(kept)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterContoursParams {
    /// Contour area as a percentage of the frame.
    pub area: ValueRange<f64>,
    /// Rotated-rect aspect ratio, read per `orientation`.
    pub ratio: ValueRange<f64>,
    /// Contour area as a percentage of its rotated rect.
    pub fullness: ValueRange<f64>,
    pub orientation: TargetOrientation,
    pub frame_area: f64,
}

impl Default for FilterContoursParams {
    fn default() -> Self {
        Self {
            area: ValueRange::new(0.0, 100.0),
            ratio: ValueRange::new(0.0, 20.0),
            fullness: ValueRange::new(0.0, 100.0),
            orientation: TargetOrientation::Landscape,
            frame_area: 1.0,
        }
    }
}

/// Long side over short side for landscape, the inverse for portrait.
pub fn aspect_ratio(rect: &RotatedRect, orientation: TargetOrientation) -> f64 {
    let long = rect.width.max(rect.height);
    let short = rect.width.min(rect.height);
    if long <= 0.0 || short <= 0.0 {
        return 0.0;
    }
    match orientation {
        TargetOrientation::Landscape => long / short,
        TargetOrientation::Portrait => short / long,
    }
}

impl FilterContoursParams {
    pub fn area_ok(&self, c: &Contour) -> bool {
        self.area
            .contains(100.0 * c.area() / self.frame_area.max(f64::EPSILON))
    }

    pub fn ratio_ok(&self, rect: &RotatedRect) -> bool {
        self.ratio.contains(aspect_ratio(rect, self.orientation))
    }

    pub fn fullness_ok(&self, c: &Contour, rect: &RotatedRect) -> bool {
        let rect_area = rect.area();
        let fullness = if rect_area > 0.0 {
            100.0 * c.area() / rect_area
        } else {
            0.0
        };
        self.fullness.contains(fullness)
    }

    pub fn accepts(&self, c: &Contour) -> bool {
        let rect = c.min_area_rect();
        self.area_ok(c) && self.ratio_ok(&rect) && self.fullness_ok(c, &rect)
    }
}

/// Area, aspect and fullness gate for reflective-tape contours.
#[derive(Debug, Default)]
pub struct FilterContoursPipe {
    params: FilterContoursParams,
}

impl Pipe for FilterContoursPipe {
    type Input<'a> = Vec<Contour>;
    type Output = Vec<Contour>;
    type Params = FilterContoursParams;

    fn name(&self) -> &'static str {
        "filter_contours"
    }

    fn params(&self) -> &FilterContoursParams {
        &self.params
    }

    fn set_params(&mut self, params: FilterContoursParams) {
        self.params = params;
    }

    fn process(&mut self, contours: Vec<Contour>) -> Result<Vec<Contour>, PipeError> {
        Ok(contours
            .into_iter()
            .filter(|c| self.params.accepts(c))
            .collect())
    }
}
