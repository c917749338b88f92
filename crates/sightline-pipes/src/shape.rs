use nalgebra::Point2;
use sightline_core::{Contour, RotatedRect};

use crate::modes::ContourShape;

/// A contour classified by polygon approximation or circle fitting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Shape {
    pub contour: Contour,
    /// Approximated polygon vertices; empty for circles.
    pub polygon: Vec<Point2<f64>>,
    pub kind: ContourShape,
    /// Fitted centre and radius, circles only.
    pub circle: Option<(Point2<f64>, f64)>,
}

impl Shape {
    pub fn area(&self) -> f64 {
        self.contour.area()
    }

    pub fn perimeter(&self) -> f64 {
        self.contour.perimeter()
    }
}

/// One candidate target: a single contour or a merged group.
#[derive(Clone, Debug, PartialEq)]
pub struct PotentialTarget {
    /// Hull of all grouped contours, or the contour itself.
    pub contour: Contour,
    pub sub_contours: Vec<Contour>,
    pub rect: RotatedRect,
    pub area: f64,
    pub centroid: Point2<f64>,
    pub shape: Option<ContourShape>,
}

impl PotentialTarget {
    pub fn from_contour(contour: Contour) -> Self {
        let rect = contour.min_area_rect();
        let area = contour.area();
        let centroid = contour.centroid();
        Self {
            sub_contours: vec![contour.clone()],
            contour,
            rect,
            area,
            centroid,
            shape: None,
        }
    }

    pub fn from_shape(shape: Shape) -> Self {
        let kind = shape.kind;
        let mut t = Self::from_contour(shape.contour);
        if let Some((center, _)) = shape.circle {
            t.centroid = center;
        }
        t.shape = Some(kind);
        t
    }

    /// Merge two targets into the convex hull of their contours.
    pub fn merged(a: &PotentialTarget, b: &PotentialTarget) -> Self {
        let hull = a.contour.merged(&b.contour);
        let mut t = Self::from_contour(hull);
        t.sub_contours = a
            .sub_contours
            .iter()
            .chain(&b.sub_contours)
            .cloned()
            .collect();
        t
    }
}
