//! Timed, parameterised image-processing stages ("pipes").
//!
//! Every stage implements [`Pipe`]: parameters are replaced wholesale with
//! [`Pipe::set_params`] before a run, and [`Pipe::apply`] times the call and
//! contains stage failures, so one malfunctioning stage yields an empty
//! result instead of aborting the frame.
//!
//! ## Quickstart
//!
//! ```
//! use image::{Rgb, RgbImage};
//! use sightline_pipes::{FindContoursPipe, HsvParams, HsvPipe, Pipe, ValueRange};
//!
//! let mut frame = RgbImage::new(64, 48);
//! for y in 10..20 {
//!     for x in 10..30 {
//!         frame.put_pixel(x, y, Rgb([0, 255, 0]));
//!     }
//! }
//!
//! let mut hsv = HsvPipe::default();
//! hsv.set_params(HsvParams {
//!     hue: ValueRange::new(50, 70),
//!     ..HsvParams::default()
//! });
//! let mask = hsv.apply(&frame);
//! let contours = FindContoursPipe::default().apply(&mask.output);
//! assert_eq!(contours.output.len(), 1);
//! ```
//!
//! Stage order in the bundled pipelines:
//! 1. rotate and resize the frame,
//! 2. HSV threshold and erode/dilate,
//! 3. contours, speckle rejection and contour or shape filtering,
//! 4. grouping and sorting,
//! 5. 2D collection, corner detection and pose estimation,
//! 6. overlays.

mod collect;
mod contours;
mod corners;
mod draw;
mod frame;
mod group;
mod hsv;
mod modes;
mod pipe;
mod range;
mod resize;
mod shape;
mod shapes;
mod solve_pnp;
mod sort;
mod target;

pub use collect::{
    target_offset_point, yaw_pitch, Collect2dTargetsParams, Collect2dTargetsPipe, DualOffsetPoints,
};
pub use contours::{
    aspect_ratio, ErodeDilateParams, ErodeDilatePipe, FilterContoursParams, FilterContoursPipe,
    FindContoursPipe, SpeckleRejectParams, SpeckleRejectPipe,
};
pub use corners::{detect_corners, CornerDetectionParams, CornerDetectionPipe};
pub use draw::{
    polyline, Draw2dTargetsParams, Draw2dTargetsPipe, Draw3dTargetsParams, Draw3dTargetsPipe,
    DrawCornersParams, DrawCornersPipe, DrawCrosshairParams, DrawCrosshairPipe, BLUE, GREEN, RED,
    YELLOW,
};
pub use frame::Frame;
pub use group::{pair_intersects, GroupContoursParams, GroupContoursPipe};
pub use hsv::{rgb_to_hsv, HsvParams, HsvPipe};
pub use modes::{
    ContourGroupingMode, ContourIntersectionDirection, ContourShape, ContourSortMode,
    CornerDetectionStrategy, FrameDivisor, ImageRotationMode, OrdinalError, RobotOffsetPointMode,
    TargetOffsetPointEdge, TargetOrientation,
};
pub use pipe::{Pipe, PipeError, PipeResult};
pub use range::ValueRange;
pub use resize::{ResizeImageParams, ResizeImagePipe, RotateImageParams, RotateImagePipe};
pub use shape::{PotentialTarget, Shape};
pub use shapes::{
    approximate_polygon, FilterShapesParams, FilterShapesPipe, FindCirclesParams, FindCirclesPipe,
    FindPolygonParams, FindPolygonPipe,
};
pub use solve_pnp::{SolvePnpParams, SolvePnpPipe};
pub use sort::{compare_targets, truncated_len, SortContoursParams, SortContoursPipe};
pub use target::TrackedTarget;
