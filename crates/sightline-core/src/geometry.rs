//! Planar geometry on contours: area, moments, hulls and rotated rectangles.
//!
//! Contours are stored as closed polylines in pixel coordinates (x right,
//! y down). Pixel centres sit on integer coordinates.

use nalgebra::{Matrix3, Point2, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[inline]
    pub fn center(&self) -> Point2<f64> {
        Point2::new(
            0.5 * (self.min_x + self.max_x),
            0.5 * (self.min_y + self.max_y),
        )
    }
}

/// Minimum-area enclosing rectangle.
///
/// `width` is measured along the direction given by `angle_deg` and
/// `height` along its perpendicular.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotatedRect {
    pub center: Point2<f64>,
    pub width: f64,
    pub height: f64,
    pub angle_deg: f64,
}

impl RotatedRect {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Unit vector along the `width` side.
    pub fn width_axis(&self) -> Vector2<f64> {
        let a = self.angle_deg.to_radians();
        Vector2::new(a.cos(), a.sin())
    }

    /// Unit vector along the longer side.
    pub fn major_axis(&self) -> Vector2<f64> {
        let u = self.width_axis();
        if self.width >= self.height {
            u
        } else {
            Vector2::new(-u.y, u.x)
        }
    }

    /// Corners in the order `center ± u·w/2 ± v·h/2`, walking around the rectangle.
    pub fn points(&self) -> [Point2<f64>; 4] {
        let u = self.width_axis() * (0.5 * self.width);
        let v = Vector2::new(-u.y, u.x) * (self.height / self.width.max(f64::EPSILON));
        let v = if self.width > f64::EPSILON {
            v
        } else {
            Vector2::new(0.0, 0.5 * self.height)
        };
        let c = self.center;
        [c - u - v, c + u - v, c + u + v, c - u + v]
    }
}

/// The four axis-extreme points of a contour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtremePoints {
    pub leftmost: Point2<f64>,
    pub rightmost: Point2<f64>,
    pub topmost: Point2<f64>,
    pub bottommost: Point2<f64>,
}

/// A closed polyline in pixel coordinates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    points: Vec<Point2<f64>>,
}

impl Contour {
    pub fn new(points: Vec<Point2<f64>>) -> Self {
        Self { points }
    }

    pub fn from_xy(points: &[[f64; 2]]) -> Self {
        Self::new(points.iter().map(|p| Point2::new(p[0], p[1])).collect())
    }

    #[inline]
    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Signed shoelace area (positive when counter-clockwise in a y-up frame).
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut acc = 0.0;
        for i in 0..n {
            let p = self.points[i];
            let q = self.points[(i + 1) % n];
            acc += p.x * q.y - q.x * p.y;
        }
        0.5 * acc
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Closed perimeter length.
    pub fn perimeter(&self) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| (self.points[(i + 1) % n] - self.points[i]).norm())
            .sum()
    }

    /// Area centroid from first-order moments, falling back to the vertex
    /// mean for degenerate (zero-area) contours.
    pub fn centroid(&self) -> Point2<f64> {
        let n = self.points.len();
        if n == 0 {
            return Point2::origin();
        }
        let a = self.signed_area();
        if a.abs() < 1e-9 {
            let sum = self
                .points
                .iter()
                .fold(Vector2::zeros(), |acc, p| acc + p.coords);
            return Point2::from(sum / n as f64);
        }
        let mut cx = 0.0;
        let mut cy = 0.0;
        for i in 0..n {
            let p = self.points[i];
            let q = self.points[(i + 1) % n];
            let cross = p.x * q.y - q.x * p.y;
            cx += (p.x + q.x) * cross;
            cy += (p.y + q.y) * cross;
        }
        Point2::new(cx / (6.0 * a), cy / (6.0 * a))
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bb = BoundingBox {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for p in &self.points {
            bb.min_x = bb.min_x.min(p.x);
            bb.min_y = bb.min_y.min(p.y);
            bb.max_x = bb.max_x.max(p.x);
            bb.max_y = bb.max_y.max(p.y);
        }
        if self.points.is_empty() {
            bb = BoundingBox {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 0.0,
                max_y: 0.0,
            };
        }
        bb
    }

    pub fn convex_hull(&self) -> Contour {
        Contour::new(convex_hull(&self.points))
    }

    pub fn min_area_rect(&self) -> RotatedRect {
        min_area_rect(&self.points)
    }

    pub fn extreme_points(&self) -> Option<ExtremePoints> {
        let first = *self.points.first()?;
        let mut ext = ExtremePoints {
            leftmost: first,
            rightmost: first,
            topmost: first,
            bottommost: first,
        };
        for &p in &self.points[1..] {
            if p.x < ext.leftmost.x {
                ext.leftmost = p;
            }
            if p.x > ext.rightmost.x {
                ext.rightmost = p;
            }
            if p.y < ext.topmost.y {
                ext.topmost = p;
            }
            if p.y > ext.bottommost.y {
                ext.bottommost = p;
            }
        }
        Some(ext)
    }

    /// Convex hull of the union of two contours.
    pub fn merged(&self, other: &Contour) -> Contour {
        let mut all = Vec::with_capacity(self.len() + other.len());
        all.extend_from_slice(&self.points);
        all.extend_from_slice(&other.points);
        Contour::new(convex_hull(&all))
    }
}

fn cross(o: Point2<f64>, a: Point2<f64>, b: Point2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Andrew's monotone chain. Collinear points on the hull are dropped.
pub fn convex_hull(points: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut pts: Vec<Point2<f64>> = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point2<f64>> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Point2<f64>> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Rotating-calipers minimum-area rectangle over the convex hull.
pub fn min_area_rect(points: &[Point2<f64>]) -> RotatedRect {
    let hull = convex_hull(points);
    match hull.len() {
        0 => {
            return RotatedRect {
                center: Point2::origin(),
                width: 0.0,
                height: 0.0,
                angle_deg: 0.0,
            }
        }
        1 => {
            return RotatedRect {
                center: hull[0],
                width: 0.0,
                height: 0.0,
                angle_deg: 0.0,
            }
        }
        2 => {
            let d = hull[1] - hull[0];
            return RotatedRect {
                center: Point2::from((hull[0].coords + hull[1].coords) * 0.5),
                width: d.norm(),
                height: 0.0,
                angle_deg: d.y.atan2(d.x).to_degrees(),
            };
        }
        _ => {}
    }

    let mut best: Option<(f64, RotatedRect)> = None;
    let n = hull.len();
    for i in 0..n {
        let edge = hull[(i + 1) % n] - hull[i];
        let len = edge.norm();
        if len < 1e-12 {
            continue;
        }
        let u = edge / len;
        let v = Vector2::new(-u.y, u.x);

        let (mut min_u, mut max_u, mut min_v, mut max_v) = (
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
        );
        for p in &hull {
            let pu = p.coords.dot(&u);
            let pv = p.coords.dot(&v);
            min_u = min_u.min(pu);
            max_u = max_u.max(pu);
            min_v = min_v.min(pv);
            max_v = max_v.max(pv);
        }
        let area = (max_u - min_u) * (max_v - min_v);
        if best.as_ref().is_none_or(|(a, _)| area < *a - 1e-12) {
            let cu = 0.5 * (min_u + max_u);
            let cv = 0.5 * (min_v + max_v);
            let center = Point2::from(u * cu + v * cv);
            let mut angle = u.y.atan2(u.x).to_degrees();
            let (mut w, mut h) = (max_u - min_u, max_v - min_v);
            // Canonical angle in (-90, 0]; swap sides when rotating by 90.
            while angle > 0.0 {
                angle -= 90.0;
                std::mem::swap(&mut w, &mut h);
            }
            while angle <= -90.0 {
                angle += 90.0;
                std::mem::swap(&mut w, &mut h);
            }
            best = Some((
                area,
                RotatedRect {
                    center,
                    width: w,
                    height: h,
                    angle_deg: angle,
                },
            ));
        }
    }
    best.map(|(_, r)| r).unwrap_or(RotatedRect {
        center: hull[0],
        width: 0.0,
        height: 0.0,
        angle_deg: 0.0,
    })
}

/// Intersection of two infinite lines given as point + direction.
pub fn line_intersection(
    p1: Point2<f64>,
    d1: Vector2<f64>,
    p2: Point2<f64>,
    d2: Vector2<f64>,
) -> Option<Point2<f64>> {
    let denom = d1.x * d2.y - d1.y * d2.x;
    if denom.abs() < 1e-12 {
        return None;
    }
    let w = p2 - p1;
    let t = (w.x * d2.y - w.y * d2.x) / denom;
    Some(p1 + d1 * t)
}

/// Algebraic (Kasa) circle fit: returns `(center, radius)`.
pub fn fit_circle(points: &[Point2<f64>]) -> Option<(Point2<f64>, f64)> {
    if points.len() < 3 {
        return None;
    }
    // Normal equations of x^2 + y^2 + D x + E y + F = 0.
    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for p in points {
        let row = Vector3::new(p.x, p.y, 1.0);
        let rhs = -(p.x * p.x + p.y * p.y);
        ata += row * row.transpose();
        atb += row * rhs;
    }
    let sol = ata.lu().solve(&atb)?;
    let (d, e, f) = (sol[0], sol[1], sol[2]);
    let cx = -0.5 * d;
    let cy = -0.5 * e;
    let r2 = cx * cx + cy * cy - f;
    if !(r2.is_finite() && r2 > 0.0) {
        return None;
    }
    Some((Point2::new(cx, cy), r2.sqrt()))
}

/// Order four points as top-left, top-right, bottom-right, bottom-left
/// (clockwise in image coordinates).
pub fn order_quad_clockwise(points: [Point2<f64>; 4]) -> [Point2<f64>; 4] {
    let c = Point2::from(points.iter().fold(Vector2::zeros(), |a, p| a + p.coords) / 4.0);
    let mut sorted = points;
    // atan2 with y down: increasing angle walks clockwise on screen.
    sorted.sort_by(|a, b| {
        let aa = (a.y - c.y).atan2(a.x - c.x);
        let bb = (b.y - c.y).atan2(b.x - c.x);
        aa.total_cmp(&bb)
    });
    let start = (0..4)
        .min_by(|&i, &j| {
            let si = sorted[i].x + sorted[i].y;
            let sj = sorted[j].x + sorted[j].y;
            si.total_cmp(&sj)
        })
        .unwrap_or(0);
    [
        sorted[start],
        sorted[(start + 1) % 4],
        sorted[(start + 2) % 4],
        sorted[(start + 3) % 4],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x0: f64, y0: f64, s: f64) -> Contour {
        Contour::from_xy(&[[x0, y0], [x0 + s, y0], [x0 + s, y0 + s], [x0, y0 + s]])
    }

    #[test]
    fn square_area_perimeter_centroid() {
        let c = square(10.0, 20.0, 4.0);
        assert_relative_eq!(c.area(), 16.0);
        assert_relative_eq!(c.perimeter(), 16.0);
        let m = c.centroid();
        assert_relative_eq!(m.x, 12.0);
        assert_relative_eq!(m.y, 22.0);
    }

    #[test]
    fn hull_drops_interior_points() {
        let mut pts = square(0.0, 0.0, 10.0).points().to_vec();
        pts.push(Point2::new(5.0, 5.0));
        pts.push(Point2::new(5.0, 0.0));
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
    }

    #[test]
    fn min_area_rect_of_rotated_square() {
        let pts = [
            Point2::new(0.0, 5.0),
            Point2::new(5.0, 0.0),
            Point2::new(10.0, 5.0),
            Point2::new(5.0, 10.0),
        ];
        let r = min_area_rect(&pts);
        assert_relative_eq!(r.area(), 50.0, epsilon = 1e-9);
        assert_relative_eq!(r.center.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(r.center.y, 5.0, epsilon = 1e-9);
        assert_relative_eq!(r.angle_deg, -45.0, epsilon = 1e-9);
    }

    #[test]
    fn circle_fit_recovers_center_and_radius() {
        let pts: Vec<Point2<f64>> = (0..36)
            .map(|i| {
                let t = i as f64 * 10f64.to_radians();
                Point2::new(40.0 + 12.0 * t.cos(), -3.0 + 12.0 * t.sin())
            })
            .collect();
        let (c, r) = fit_circle(&pts).expect("fit");
        assert_relative_eq!(c.x, 40.0, epsilon = 1e-9);
        assert_relative_eq!(c.y, -3.0, epsilon = 1e-9);
        assert_relative_eq!(r, 12.0, epsilon = 1e-9);
    }

    #[test]
    fn quad_ordering_starts_top_left() {
        let q = order_quad_clockwise([
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 10.0),
            Point2::new(10.0, 0.0),
        ]);
        assert_eq!(q[0], Point2::new(0.0, 0.0));
        assert_eq!(q[1], Point2::new(10.0, 0.0));
        assert_eq!(q[2], Point2::new(10.0, 10.0));
        assert_eq!(q[3], Point2::new(0.0, 10.0));
    }

    #[test]
    fn perpendicular_lines_intersect() {
        let p = line_intersection(
            Point2::new(0.0, 0.0),
            Vector2::new(1.0, 1.0),
            Point2::new(4.0, 0.0),
            Vector2::new(-1.0, 1.0),
        )
        .expect("intersection");
        assert_relative_eq!(p.x, 2.0);
        assert_relative_eq!(p.y, 2.0);
    }
}
