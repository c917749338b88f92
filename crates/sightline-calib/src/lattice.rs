//! Integer labelling of detected grid features.
//!
//! Features are linked to their grid neighbours by the detectors; this module
//! walks the link graph from a seed, assigns integer coordinates, and then
//! finds the dihedral transform that maps the labelled set onto the board's
//! lattice with a consistent on-screen orientation.

use std::collections::{HashMap, VecDeque};

use nalgebra::{Matrix3, Point2, Vector2, Vector3};

/// Integer 2×2 transform `(i', j') = (a*i + b*j, c*i + d*j)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct GridTransform {
    pub a: i32,
    pub b: i32,
    pub c: i32,
    pub d: i32,
}

impl GridTransform {
    #[inline]
    pub fn apply(&self, [i, j]: [i32; 2]) -> [i32; 2] {
        [self.a * i + self.b * j, self.c * i + self.d * j]
    }
}

/// The 8 rotations and reflections of the square grid.
pub(crate) const GRID_TRANSFORMS_D4: [GridTransform; 8] = [
    GridTransform { a: 1, b: 0, c: 0, d: 1 },
    GridTransform { a: 0, b: 1, c: -1, d: 0 },
    GridTransform { a: -1, b: 0, c: 0, d: -1 },
    GridTransform { a: 0, b: -1, c: 1, d: 0 },
    GridTransform { a: -1, b: 0, c: 0, d: 1 },
    GridTransform { a: 1, b: 0, c: 0, d: -1 },
    GridTransform { a: 0, b: 1, c: 1, d: 0 },
    GridTransform { a: 0, b: -1, c: -1, d: 0 },
];

/// Breadth-first integer labelling of the component containing the best
/// connected node.
///
/// Each labelled node carries its local `+i` and `+j` image directions; a
/// link is classified by whichever local axis it is more parallel to, so
/// perspective can bend the axes gradually across the board. Nodes that
/// would collide with an existing label are left unlabelled.
pub(crate) fn label_grid(points: &[Point2<f64>], adjacency: &[Vec<usize>]) -> Vec<Option<[i32; 2]>> {
    let n = points.len();
    let mut labels: Vec<Option<[i32; 2]>> = vec![None; n];
    let Some(seed) = (0..n).max_by_key(|&i| (adjacency[i].len(), std::cmp::Reverse(i))) else {
        return labels;
    };
    let Some(&first) = adjacency[seed].first() else {
        return labels;
    };

    let u0 = points[first] - points[seed];
    let v0 = adjacency[seed]
        .iter()
        .map(|&m| points[m] - points[seed])
        .min_by(|a, b| cos_abs(a, &u0).total_cmp(&cos_abs(b, &u0)))
        .filter(|v| cos_abs(v, &u0) < 0.5)
        .unwrap_or_else(|| Vector2::new(-u0.y, u0.x));

    let mut axes: Vec<(Vector2<f64>, Vector2<f64>)> = vec![(u0, v0); n];
    let mut taken: HashMap<[i32; 2], usize> = HashMap::new();
    labels[seed] = Some([0, 0]);
    taken.insert([0, 0], seed);

    let mut queue = VecDeque::from([seed]);
    while let Some(node) = queue.pop_front() {
        let Some([i, j]) = labels[node] else {
            continue;
        };
        let (u, v) = axes[node];
        let (un, vn) = (u.normalize(), v.normalize());
        for &m in &adjacency[node] {
            if labels[m].is_some() {
                continue;
            }
            let d = points[m] - points[node];
            let (du, dv) = (d.dot(&un), d.dot(&vn));
            let (coord, next_axes) = if du.abs() >= dv.abs() {
                let s = du.signum();
                ([i + s as i32, j], (d * s, v))
            } else {
                let s = dv.signum();
                ([i, j + s as i32], (u, d * s))
            };
            if taken.contains_key(&coord) {
                continue;
            }
            taken.insert(coord, m);
            labels[m] = Some(coord);
            axes[m] = next_axes;
            queue.push_back(m);
        }
    }
    labels
}

fn cos_abs(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    let d = a.norm() * b.norm();
    if d <= 0.0 {
        1.0
    } else {
        (a.dot(b) / d).abs()
    }
}

/// Affine fit `image ≈ A * grid + t`; returns `A` as its two columns.
fn affine_axes(samples: &[([i32; 2], Point2<f64>)]) -> Option<(Vector2<f64>, Vector2<f64>)> {
    let mut ata = Matrix3::<f64>::zeros();
    let mut atx = Vector3::<f64>::zeros();
    let mut aty = Vector3::<f64>::zeros();
    for ([i, j], p) in samples {
        let row = Vector3::new(*i as f64, *j as f64, 1.0);
        ata += row * row.transpose();
        atx += row * p.x;
        aty += row * p.y;
    }
    let lu = ata.lu();
    let sx = lu.solve(&atx)?;
    let sy = lu.solve(&aty)?;
    Some((Vector2::new(sx[0], sy[0]), Vector2::new(sx[1], sy[1])))
}

/// Order labelled points to match `lattice`.
///
/// Tries every dihedral transform of the labels (after shifting to the
/// origin) and keeps those reproducing `lattice` exactly. Among them it
/// prefers a right-handed on-screen frame (`+i` then `+j` turning clockwise
/// in image coordinates) whose `+i` axis points most to the right. Returns
/// point indices in `lattice` order.
pub(crate) fn match_lattice(
    points: &[Point2<f64>],
    labels: &[Option<[i32; 2]>],
    lattice: &[[i32; 2]],
) -> Option<Vec<usize>> {
    let labelled: Vec<(usize, [i32; 2])> = labels
        .iter()
        .enumerate()
        .filter_map(|(k, l)| l.map(|c| (k, c)))
        .collect();
    if labelled.len() != lattice.len() {
        return None;
    }

    let mut best: Option<(bool, f64, Vec<usize>)> = None;
    for t in GRID_TRANSFORMS_D4 {
        let moved: Vec<(usize, [i32; 2])> = labelled.iter().map(|&(k, c)| (k, t.apply(c))).collect();
        let min_i = moved.iter().map(|(_, c)| c[0]).min()?;
        let min_j = moved.iter().map(|(_, c)| c[1]).min()?;
        let by_coord: HashMap<[i32; 2], usize> = moved
            .iter()
            .map(|&(k, [i, j])| ([i - min_i, j - min_j], k))
            .collect();
        let Some(order) = lattice
            .iter()
            .map(|c| by_coord.get(c).copied())
            .collect::<Option<Vec<usize>>>()
        else {
            continue;
        };

        let samples: Vec<([i32; 2], Point2<f64>)> =
            lattice.iter().zip(&order).map(|(c, &k)| (*c, points[k])).collect();
        let Some((ai, aj)) = affine_axes(&samples) else {
            continue;
        };
        let right_handed = ai.x * aj.y - ai.y * aj.x > 0.0;
        let rightward = ai.x / ai.norm().max(f64::EPSILON);
        let better = match &best {
            None => true,
            Some((rh, score, _)) => (right_handed, rightward) > (*rh, *score),
        };
        if better {
            best = Some((right_handed, rightward, order));
        }
    }
    best.map(|(_, _, order)| order)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Grid points with 4-neighbour links, rotated by `angle`.
    fn grid(cols: i32, rows: i32, angle: f64) -> (Vec<Point2<f64>>, Vec<Vec<usize>>) {
        let (s, c) = angle.sin_cos();
        let mut pts = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                let (x, y) = (i as f64 * 10.0, j as f64 * 10.0);
                pts.push(Point2::new(100.0 + c * x - s * y, 100.0 + s * x + c * y));
            }
        }
        let idx = |i: i32, j: i32| (j * cols + i) as usize;
        let mut adj = vec![Vec::new(); pts.len()];
        for j in 0..rows {
            for i in 0..cols {
                for (di, dj) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                    let (ni, nj) = (i + di, j + dj);
                    if (0..cols).contains(&ni) && (0..rows).contains(&nj) {
                        adj[idx(i, j)].push(idx(ni, nj));
                    }
                }
            }
        }
        (pts, adj)
    }

    fn lattice(cols: i32, rows: i32) -> Vec<[i32; 2]> {
        (0..rows).flat_map(|j| (0..cols).map(move |i| [i, j])).collect()
    }

    #[test]
    fn upright_grid_keeps_row_major_order() {
        let (pts, adj) = grid(4, 3, 0.0);
        let labels = label_grid(&pts, &adj);
        let order = match_lattice(&pts, &labels, &lattice(4, 3)).expect("matched");
        assert_eq!(order, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn upside_down_grid_is_reoriented() {
        let (pts, adj) = grid(4, 3, std::f64::consts::PI);
        let labels = label_grid(&pts, &adj);
        let order = match_lattice(&pts, &labels, &lattice(4, 3)).expect("matched");
        // The first corner is now the top-left one on screen.
        let first = pts[order[0]];
        assert!(pts.iter().all(|p| p.x >= first.x - 1e-9 && p.y >= first.y - 1e-9));
    }

    #[test]
    fn wrong_size_is_rejected() {
        let (pts, adj) = grid(4, 3, 0.2);
        let labels = label_grid(&pts, &adj);
        assert!(match_lattice(&pts, &labels, &lattice(5, 3)).is_none());
    }
}
