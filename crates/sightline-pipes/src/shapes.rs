//! Shape extraction (polygons and circles) and shape filtering.

use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;
use log::debug;
use nalgebra::Point2;
use sightline_core::{fit_circle, Contour};

use crate::modes::ContourShape;
use crate::pipe::{Pipe, PipeError};
use crate::range::ValueRange;
use crate::shape::Shape;

/// Douglas–Peucker approximation of a closed contour.
///
/// The contour is split into two open chains between its point farthest from
/// the centroid and the point farthest from that one, so the result does not
/// depend on where the tracer started.
pub fn approximate_polygon(contour: &Contour, epsilon: f64) -> Vec<Point2<f64>> {
    let pts: Vec<Point<i32>> = contour
        .points()
        .iter()
        .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
        .collect();
    if pts.len() < 3 {
        return contour.points().to_vec();
    }
    let centroid = contour.centroid();
    let dist2 = |p: &Point<i32>, q: Point2<f64>| {
        let (dx, dy) = (p.x as f64 - q.x, p.y as f64 - q.y);
        dx * dx + dy * dy
    };
    let farthest_from = |q: Point2<f64>| {
        (0..pts.len())
            .max_by(|&i, &j| dist2(&pts[i], q).total_cmp(&dist2(&pts[j], q)))
            .unwrap_or(0)
    };
    let a = farthest_from(centroid);
    let b = farthest_from(Point2::new(pts[a].x as f64, pts[a].y as f64));
    if pts[a] == pts[b] {
        return vec![Point2::new(pts[a].x as f64, pts[a].y as f64)];
    }

    let n = pts.len();
    let chain = |from: usize, to: usize| -> Vec<Point<i32>> {
        let len = (to + n - from) % n + 1;
        (0..len).map(|k| pts[(from + k) % n]).collect()
    };
    let eps = epsilon.max(1e-6);
    let first = approximate_polygon_dp(&chain(a, b), eps, false);
    let second = approximate_polygon_dp(&chain(b, a), eps, false);

    let mut out: Vec<Point2<f64>> = Vec::with_capacity(first.len() + second.len());
    for p in first.iter().chain(second.iter().skip(1)) {
        let q = Point2::new(p.x as f64, p.y as f64);
        if out.last() != Some(&q) {
            out.push(q);
        }
    }
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

#[derive(Clone, Debug, PartialEq)]
pub struct FindPolygonParams {
    /// Approximation tolerance as a percentage of the contour perimeter.
    pub accuracy_percentage: f64,
}

impl Default for FindPolygonParams {
    fn default() -> Self {
        Self {
            accuracy_percentage: 10.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct FindPolygonPipe {
    params: FindPolygonParams,
}

impl Pipe for FindPolygonPipe {
    type Input<'a> = Vec<Contour>;
    type Output = Vec<Shape>;
    type Params = FindPolygonParams;

    fn name(&self) -> &'static str {
        "find_polygons"
    }

    fn params(&self) -> &FindPolygonParams {
        &self.params
    }

    fn set_params(&mut self, params: FindPolygonParams) {
        self.params = params;
    }

    fn process(&mut self, contours: Vec<Contour>) -> Result<Vec<Shape>, PipeError> {
        Ok(contours
            .into_iter()
            .map(|contour| {
                let eps = self.params.accuracy_percentage / 100.0 * contour.perimeter();
                let polygon = approximate_polygon(&contour, eps);
                Shape {
                    kind: ContourShape::from_vertex_count(polygon.len()),
                    contour,
                    polygon,
                    circle: None,
                }
            })
            .collect())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FindCirclesParams {
    pub min_radius: f64,
    pub max_radius: f64,
    /// Minimum fraction (0..=1) of contour points that must vote for the
    /// fitted circle.
    pub edge_threshold: f64,
    /// Allowed radial deviation of a voting point, percent of the radius.
    pub accuracy: f64,
    /// Minimum centre distance between two reported circles, pixels.
    pub min_dist: f64,
}

impl Default for FindCirclesParams {
    fn default() -> Self {
        Self {
            min_radius: 0.0,
            max_radius: f64::INFINITY,
            edge_threshold: 0.8,
            accuracy: 10.0,
            min_dist: 10.0,
        }
    }
}

/// Circle detection by least-squares fitting and per-point voting.
#[derive(Debug, Default)]
pub struct FindCirclesPipe {
    params: FindCirclesParams,
}

impl FindCirclesPipe {
    fn score(&self, contour: &Contour) -> Option<(Point2<f64>, f64, f64)> {
        if contour.len() < 5 {
            return None;
        }
        let (center, radius) = fit_circle(contour.points())?;
        if radius < self.params.min_radius || radius > self.params.max_radius {
            return None;
        }
        let tol = self.params.accuracy / 100.0 * radius;
        let votes = contour
            .points()
            .iter()
            .filter(|p| ((*p - center).norm() - radius).abs() <= tol)
            .count();
        let fraction = votes as f64 / contour.len() as f64;
        (fraction >= self.params.edge_threshold).then_some((center, radius, fraction))
    }
}

impl Pipe for FindCirclesPipe {
    type Input<'a> = Vec<Contour>;
    type Output = Vec<Shape>;
    type Params = FindCirclesParams;

    fn name(&self) -> &'static str {
        "find_circles"
    }

    fn params(&self) -> &FindCirclesParams {
        &self.params
    }

    fn set_params(&mut self, params: FindCirclesParams) {
        self.params = params;
    }

    fn process(&mut self, contours: Vec<Contour>) -> Result<Vec<Shape>, PipeError> {
        let mut candidates: Vec<(usize, Point2<f64>, f64, f64)> = contours
            .iter()
            .enumerate()
            .filter_map(|(i, c)| self.score(c).map(|(ctr, r, f)| (i, ctr, r, f)))
            .collect();

        // Strongest support wins a duplicate cluster.
        candidates.sort_by(|a, b| b.3.total_cmp(&a.3).then(a.0.cmp(&b.0)));
        let mut kept: Vec<(usize, Point2<f64>, f64)> = Vec::new();
        for (i, center, radius, _) in candidates {
            if kept
                .iter()
                .all(|(_, c, _)| (c - center).norm() >= self.params.min_dist)
            {
                kept.push((i, center, radius));
            }
        }
        kept.sort_by_key(|k| k.0);
        debug!("circles: {} of {} contours", kept.len(), contours.len());

        let mut contours: Vec<Option<Contour>> = contours.into_iter().map(Some).collect();
        Ok(kept
            .into_iter()
            .filter_map(|(i, center, radius)| {
                contours[i].take().map(|contour| Shape {
                    contour,
                    polygon: Vec::new(),
                    kind: ContourShape::Circle,
                    circle: Some((center, radius)),
                })
            })
            .collect())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterShapesParams {
    pub desired_shape: ContourShape,
    /// Contour area as a percentage of the frame.
    pub area: ValueRange<f64>,
    /// Contour perimeter in pixels.
    pub perimeter: ValueRange<f64>,
    pub frame_area: f64,
}

impl Default for FilterShapesParams {
    fn default() -> Self {
        Self {
            desired_shape: ContourShape::Custom,
            area: ValueRange::new(0.0, 100.0),
            perimeter: ValueRange::new(0.0, f64::MAX),
            frame_area: 1.0,
        }
    }
}

impl FilterShapesParams {
    pub fn shape_ok(&self, s: &Shape) -> bool {
        s.kind == self.desired_shape
    }

    pub fn area_ok(&self, s: &Shape) -> bool {
        self.area
            .contains(100.0 * s.area() / self.frame_area.max(f64::EPSILON))
    }

    pub fn perimeter_ok(&self, s: &Shape) -> bool {
        self.perimeter.contains(s.perimeter())
    }

    /// Conjunction of the independent checks above.
    pub fn accepts(&self, s: &Shape) -> bool {
        self.shape_ok(s) && self.area_ok(s) && self.perimeter_ok(s)
    }
}

#[derive(Debug, Default)]
pub struct FilterShapesPipe {
    params: FilterShapesParams,
}

impl Pipe for FilterShapesPipe {
    type Input<'a> = Vec<Shape>;
    type Output = Vec<Shape>;
    type Params = FilterShapesParams;

    fn name(&self) -> &'static str {
        "filter_shapes"
    }

    fn params(&self) -> &FilterShapesParams {
        &self.params
    }

    fn set_params(&mut self, params: FilterShapesParams) {
        self.params = params;
    }

    fn process(&mut self, shapes: Vec<Shape>) -> Result<Vec<Shape>, PipeError> {
        Ok(shapes
            .into_iter()
            .filter(|s| self.params.accepts(s))
            .collect())
    }
}
