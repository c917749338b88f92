//! Chessboard inner-corner detection.
//!
//! Black squares are isolated by eroding the dark mask until diagonal
//! neighbours no longer touch, each blob is reduced to a quadrilateral, and
//! vertices of two different quads that face each other across a corner are
//! paired. The pair midpoint is the inner corner; quad sides link corners
//! into the lattice graph.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::erode;
use log::{debug, trace};
use nalgebra::Point2;
use sightline_core::Contour;
use sightline_pipes::approximate_polygon;

use crate::board::BoardSpec;
use crate::lattice::{label_grid, match_lattice};
use crate::subpix::{refine_corner, SubPixParams};
use crate::threshold::{dark_mask, otsu_threshold};

/// Erosion radii tried in order until the pattern is found.
const EROSION_RADII: [u8; 3] = [1, 2, 3];

#[derive(Clone, Debug)]
struct Quad {
    vertices: [Point2<f64>; 4],
    side: f64,
}

fn is_convex(v: &[Point2<f64>; 4]) -> bool {
    let mut sign = 0.0;
    for k in 0..4 {
        let a = v[k];
        let b = v[(k + 1) % 4];
        let c = v[(k + 2) % 4];
        let cross = (b - a).perp(&(c - b));
        if cross.abs() < 1e-9 {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Convex quadrilaterals among the outer contours of `mask`, with sizes near
/// the median.
fn extract_quads(mask: &GrayImage) -> Vec<Quad> {
    let mut quads = Vec::new();
    for c in find_contours::<i32>(mask) {
        if c.border_type != BorderType::Outer || c.points.len() < 8 {
            continue;
        }
        let contour = Contour::new(
            c.points
                .iter()
                .map(|p| Point2::new(p.x as f64, p.y as f64))
                .collect(),
        );
        let eps = (0.03 * contour.perimeter()).max(1.5);
        let poly = approximate_polygon(&contour, eps);
        let Ok(vertices) = <[Point2<f64>; 4]>::try_from(poly) else {
            continue;
        };
        if !is_convex(&vertices) {
            continue;
        }
        let area = Contour::new(vertices.to_vec()).area();
        if area < 9.0 {
            continue;
        }
        let fill = contour.area() / area;
        if !(0.8..=1.25).contains(&fill) {
            continue;
        }
        quads.push(Quad {
            vertices,
            side: area.sqrt(),
        });
    }

    if quads.is_empty() {
        return quads;
    }
    let mut sides: Vec<f64> = quads.iter().map(|q| q.side).collect();
    sides.sort_by(f64::total_cmp);
    let median = sides[sides.len() / 2];
    quads.retain(|q| q.side >= 0.5 * median && q.side <= 2.0 * median);
    quads
}

/// Inner corners and their lattice links.
fn pair_corners(quads: &[Quad]) -> (Vec<Point2<f64>>, Vec<Vec<usize>>) {
    let mut candidates: Vec<(f64, usize, usize, usize, usize)> = Vec::new();
    for (qa, a) in quads.iter().enumerate() {
        for (qb, b) in quads.iter().enumerate().skip(qa + 1) {
            let limit = 0.5 * a.side.min(b.side);
            for (ka, pa) in a.vertices.iter().enumerate() {
                for (kb, pb) in b.vertices.iter().enumerate() {
                    let d = (pa - pb).norm();
                    if d < limit {
                        candidates.push((d, qa, ka, qb, kb));
                    }
                }
            }
        }
    }
    candidates.sort_by(|x, y| x.0.total_cmp(&y.0));

    let mut corner_of: Vec<[Option<usize>; 4]> = vec![[None; 4]; quads.len()];
    let mut corners: Vec<Point2<f64>> = Vec::new();
    for (_, qa, ka, qb, kb) in candidates {
        if corner_of[qa][ka].is_some() || corner_of[qb][kb].is_some() {
            continue;
        }
        let mid = nalgebra::center(&quads[qa].vertices[ka], &quads[qb].vertices[kb]);
        corner_of[qa][ka] = Some(corners.len());
        corner_of[qb][kb] = Some(corners.len());
        corners.push(mid);
    }

    let mut adjacency = vec![Vec::new(); corners.len()];
    for ids in &corner_of {
        for k in 0..4 {
            if let (Some(a), Some(b)) = (ids[k], ids[(k + 1) % 4]) {
                if a != b && !adjacency[a].contains(&b) {
                    adjacency[a].push(b);
                    adjacency[b].push(a);
                }
            }
        }
    }
    (corners, adjacency)
}

fn median_link(points: &[Point2<f64>], adjacency: &[Vec<usize>]) -> f64 {
    let mut d: Vec<f64> = adjacency
        .iter()
        .enumerate()
        .flat_map(|(a, ns)| ns.iter().map(move |&b| (points[a] - points[b]).norm()))
        .collect();
    if d.is_empty() {
        return 0.0;
    }
    d.sort_by(f64::total_cmp);
    d[d.len() / 2]
}

/// Inner corners of a chessboard in row-major lattice order, refined to
/// sub-pixel accuracy, or `None` if the full pattern is not visible.
pub(crate) fn detect_chessboard(gray: &GrayImage, spec: &BoardSpec) -> Option<Vec<Point2<f64>>> {
    if spec.cols < 2 || spec.rows < 2 {
        return None;
    }
    let lattice = spec.lattice();
    let mask = dark_mask(gray, otsu_threshold(gray));

    for radius in EROSION_RADII {
        let eroded = erode(&mask, Norm::LInf, radius);
        let quads = extract_quads(&eroded);
        let (corners, adjacency) = pair_corners(&quads);
        trace!(
            "erosion {radius}: {} quads, {} corner candidates",
            quads.len(),
            corners.len()
        );
        if corners.len() < lattice.len() {
            continue;
        }
        let labels = label_grid(&corners, &adjacency);
        let Some(order) = match_lattice(&corners, &labels, &lattice) else {
            continue;
        };

        let window = (median_link(&corners, &adjacency) / 4.0).floor().clamp(2.0, 5.0) as u32;
        let params = SubPixParams {
            window_radius: window,
            ..SubPixParams::default()
        };
        debug!("chessboard found at erosion {radius}, subpixel window {window}");
        return Some(
            order
                .into_iter()
                .map(|k| refine_corner(gray, corners[k], &params))
                .collect(),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn board_image(cols: u32, rows: u32, square: u32, margin: u32) -> GrayImage {
        let w = (cols + 1) * square + 2 * margin;
        let h = (rows + 1) * square + 2 * margin;
        GrayImage::from_fn(w, h, |x, y| {
            if x < margin || y < margin || x >= w - margin || y >= h - margin {
                return Luma([235]);
            }
            let (i, j) = ((x - margin) / square, (y - margin) / square);
            Luma([if (i + j) % 2 == 0 { 25 } else { 235 }])
        })
    }

    #[test]
    fn axis_aligned_board_is_found_in_order() {
        let img = board_image(5, 4, 20, 20);
        let spec = BoardSpec::chessboard(5, 4, 0.02);
        let corners = detect_chessboard(&img, &spec).expect("board");
        assert_eq!(corners.len(), 20);
        for (k, p) in corners.iter().enumerate() {
            let (i, j) = ((k % 5) as f64, (k / 5) as f64);
            // Square edges fall between pixels 39 and 40, 59 and 60, ...
            let ex = 20.0 + 20.0 * (i + 1.0) - 0.5;
            let ey = 20.0 + 20.0 * (j + 1.0) - 0.5;
            assert!((p.x - ex).abs() < 0.5 && (p.y - ey).abs() < 0.5, "{k}: {p:?}");
        }
    }

    #[test]
    fn blank_image_has_no_board() {
        let img = GrayImage::from_pixel(120, 90, Luma([200]));
        assert!(detect_chessboard(&img, &BoardSpec::chessboard(5, 4, 0.02)).is_none());
    }
}
