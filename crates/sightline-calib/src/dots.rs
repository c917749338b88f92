//! Asymmetric dot-grid detection.
//!
//! Dots are dark blobs of consistent size; each is linked to its diagonal
//! neighbours (the closest ones on an asymmetric grid), the links are
//! labelled along the two diagonals and the labels are rotated back onto the
//! board's `(2 * i + j % 2, j)` lattice.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use log::debug;
use nalgebra::Point2;
use sightline_core::Contour;

use crate::board::BoardSpec;
use crate::lattice::{label_grid, match_lattice};
use crate::threshold::{dark_mask, otsu_threshold};

/// Neighbour links reach this far relative to the median nearest-neighbour
/// distance. Diagonal neighbours sit at `sqrt(2)` pitches, row neighbours at 2.
const LINK_TOLERANCE: f64 = 1.2;

fn dot_centres(mask: &GrayImage) -> Vec<(Point2<f64>, f64)> {
    let mut blobs = Vec::new();
    for c in find_contours::<i32>(mask) {
        if c.border_type != BorderType::Outer || c.points.len() < 4 {
            continue;
        }
        let contour = Contour::new(
            c.points
                .iter()
                .map(|p| Point2::new(p.x as f64, p.y as f64))
                .collect(),
        );
        let area = contour.area();
        if area < 4.0 {
            continue;
        }
        let rect = contour.min_area_rect();
        let (long, short) = (rect.width.max(rect.height), rect.width.min(rect.height));
        if short <= 0.0 || long / short > 3.0 {
            continue;
        }
        // An ellipse fills pi/4 of its bounding rectangle.
        let fill = area / rect.area();
        if !(0.6..=0.95).contains(&fill) {
            continue;
        }
        blobs.push((contour.centroid(), area));
    }

    if blobs.is_empty() {
        return blobs;
    }
    let mut areas: Vec<f64> = blobs.iter().map(|b| b.1).collect();
    areas.sort_by(f64::total_cmp);
    let median = areas[areas.len() / 2];
    blobs.retain(|b| b.1 >= 0.3 * median && b.1 <= 3.0 * median);
    blobs
}

fn link_neighbours(points: &[Point2<f64>]) -> Vec<Vec<usize>> {
    let n = points.len();
    let mut nearest: Vec<f64> = (0..n)
        .map(|a| {
            (0..n)
                .filter(|&b| b != a)
                .map(|b| (points[a] - points[b]).norm())
                .fold(f64::INFINITY, f64::min)
        })
        .filter(|d| d.is_finite())
        .collect();
    let mut adjacency = vec![Vec::new(); n];
    if nearest.is_empty() {
        return adjacency;
    }
    nearest.sort_by(f64::total_cmp);
    let limit = LINK_TOLERANCE * nearest[nearest.len() / 2];
    for a in 0..n {
        for b in (a + 1)..n {
            if (points[a] - points[b]).norm() <= limit {
                adjacency[a].push(b);
                adjacency[b].push(a);
            }
        }
    }
    adjacency
}

/// Dot centres in row-major lattice order, or `None` if the full grid is not
/// visible.
pub(crate) fn detect_dot_grid(gray: &GrayImage, spec: &BoardSpec) -> Option<Vec<Point2<f64>>> {
    let lattice = spec.lattice();
    let mask = dark_mask(gray, otsu_threshold(gray));
    let points: Vec<Point2<f64>> = dot_centres(&mask).into_iter().map(|b| b.0).collect();
    if points.len() < lattice.len() {
        debug!("dot grid: {} blobs, need {}", points.len(), lattice.len());
        return None;
    }

    let adjacency = link_neighbours(&points);
    // Steps along the two diagonals become (+1, +1) and (+1, -1) on the lattice.
    let labels: Vec<Option<[i32; 2]>> = label_grid(&points, &adjacency)
        .into_iter()
        .map(|l| l.map(|[a, b]| [a + b, a - b]))
        .collect();
    let order = match_lattice(&points, &labels, &lattice)?;
    Some(order.into_iter().map(|k| points[k]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_circle_mut;

    #[test]
    fn asymmetric_grid_is_ordered() {
        let spec = BoardSpec::dot_grid(4, 5, 0.01);
        let mut img = GrayImage::from_pixel(200, 160, Luma([230]));
        let expected: Vec<Point2<f64>> = spec
            .lattice()
            .iter()
            .map(|&[x, y]| Point2::new(30.0 + 18.0 * x as f64, 30.0 + 18.0 * y as f64))
            .collect();
        for p in &expected {
            draw_filled_circle_mut(&mut img, (p.x as i32, p.y as i32), 5, Luma([20]));
        }

        let found = detect_dot_grid(&img, &spec).expect("grid");
        assert_eq!(found.len(), expected.len());
        for (f, e) in found.iter().zip(&expected) {
            assert!((f - e).norm() < 1.0, "{f:?} vs {e:?}");
        }
    }
}
