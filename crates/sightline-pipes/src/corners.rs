//! Four-corner extraction for pose estimation.

use log::debug;
use nalgebra::Point2;
use sightline_core::{min_area_rect, order_quad_clockwise, Contour};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::modes::CornerDetectionStrategy;
use crate::pipe::{Pipe, PipeError};
use crate::shapes::approximate_polygon;
use crate::target::TrackedTarget;

const SIDE_SEARCH_ITERS: usize = 40;
/// Vertices this close along an axis count as equally extreme.
const EXTREME_TIE_PX: f64 = 0.5;

#[derive(Clone, Debug, PartialEq)]
pub struct CornerDetectionParams {
    pub strategy: CornerDetectionStrategy,
    pub use_convex_hull: bool,
    /// Polygon tolerance as a percentage of the perimeter.
    pub accuracy_percentage: f64,
}

impl Default for CornerDetectionParams {
    fn default() -> Self {
        Self {
            strategy: CornerDetectionStrategy::ApproxPolyExtremes,
            use_convex_hull: true,
            accuracy_percentage: 5.0,
        }
    }
}

fn as_quad(points: &[Point2<f64>]) -> Option<[Point2<f64>; 4]> {
    match points {
        [a, b, c, d] => Some(order_quad_clockwise([*a, *b, *c, *d])),
        _ => None,
    }
}

fn distinct(quad: &[Point2<f64>; 4]) -> bool {
    (0..4).all(|i| (i + 1..4).all(|j| (quad[i] - quad[j]).norm() > EXTREME_TIE_PX))
}

/// Vertex with the smallest `key`; near-ties go to the vertex closest to
/// one of `anchors`.
fn extreme_by(
    poly: &[Point2<f64>],
    anchors: &[Point2<f64>; 4],
    key: impl Fn(&Point2<f64>) -> f64,
) -> Option<Point2<f64>> {
    let best = poly.iter().map(&key).min_by(f64::total_cmp)?;
    let to_anchor = |p: &Point2<f64>| {
        anchors
            .iter()
            .map(|a| (p - a).norm())
            .fold(f64::INFINITY, f64::min)
    };
    poly.iter()
        .filter(|p| key(*p) <= best + EXTREME_TIE_PX)
        .min_by(|a, b| to_anchor(*a).total_cmp(&to_anchor(*b)))
        .copied()
}

/// Leftmost, topmost, rightmost and bottommost vertices, ordered TL, TR,
/// BR, BL. When two extremes share a vertex (axis-aligned sides) each
/// rotated-rect corner takes its nearest vertex instead.
fn axis_extremes(poly: &[Point2<f64>]) -> Option<[Point2<f64>; 4]> {
    if poly.len() < 4 {
        return None;
    }
    let rect = min_area_rect(poly).points();
    let quad = [
        extreme_by(poly, &rect, |p| p.x)?,
        extreme_by(poly, &rect, |p| p.y)?,
        extreme_by(poly, &rect, |p| -p.x)?,
        extreme_by(poly, &rect, |p| -p.y)?,
    ];
    if distinct(&quad) {
        return Some(order_quad_clockwise(quad));
    }
    let nearest = rect.map(|c| extreme_by(poly, &rect, |p| (p - c).norm()));
    let quad = [nearest[0]?, nearest[1]?, nearest[2]?, nearest[3]?];
    distinct(&quad).then(|| order_quad_clockwise(quad))
}

/// Polygon with exactly four vertices, searching over the tolerance.
fn four_sided_fit(contour: &Contour) -> Option<[Point2<f64>; 4]> {
    let mut lo = 0.0;
    let mut hi = contour.perimeter();
    for _ in 0..SIDE_SEARCH_ITERS {
        let eps = 0.5 * (lo + hi);
        let poly = approximate_polygon(contour, eps);
        match poly.len() {
            4 => return as_quad(&poly),
            n if n > 4 => lo = eps,
            _ => hi = eps,
        }
    }
    None
}

/// Finds the four corners of a contour with the configured strategy.
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(n = contour.len())))]
pub fn detect_corners(
    contour: &Contour,
    params: &CornerDetectionParams,
) -> Option<[Point2<f64>; 4]> {
    let hull;
    let contour = if params.use_convex_hull {
        hull = contour.convex_hull();
        &hull
    } else {
        contour
    };
    if contour.len() < 4 {
        return None;
    }
    let eps = params.accuracy_percentage / 100.0 * contour.perimeter();
    match params.strategy {
        CornerDetectionStrategy::ApproxPoly => as_quad(&approximate_polygon(contour, eps)),
        CornerDetectionStrategy::ApproxPolyExtremes => {
            axis_extremes(&approximate_polygon(contour, eps))
        }
        CornerDetectionStrategy::ExactSideCount => four_sided_fit(contour),
    }
}

/// Attaches TL, TR, BR, BL image corners to each target.
#[derive(Debug, Default)]
pub struct CornerDetectionPipe {
    params: CornerDetectionParams,
}

impl Pipe for CornerDetectionPipe {
    type Input<'a> = Vec<TrackedTarget>;
    type Output = Vec<TrackedTarget>;
    type Params = CornerDetectionParams;

    fn name(&self) -> &'static str {
        "corner_detection"
    }

    fn params(&self) -> &CornerDetectionParams {
        &self.params
    }

    fn set_params(&mut self, params: CornerDetectionParams) {
        self.params = params;
    }

    fn process(&mut self, targets: Vec<TrackedTarget>) -> Result<Vec<TrackedTarget>, PipeError> {
        Ok(targets
            .into_iter()
            .map(|t| {
                let corners = detect_corners(&t.contour, &self.params);
                if corners.is_none() {
                    debug!("no four corners for target at {:?}", t.centroid);
                }
                t.with_corners(corners)
            })
            .collect())
    }
}
