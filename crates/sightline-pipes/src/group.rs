//! Grouping contours into candidate targets.

use log::debug;
use nalgebra::Point2;
use sightline_core::line_intersection;

use crate::modes::{ContourGroupingMode, ContourIntersectionDirection};
use crate::pipe::{Pipe, PipeError};
use crate::shape::PotentialTarget;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupContoursParams {
    pub mode: ContourGroupingMode,
    pub intersection: ContourIntersectionDirection,
}

/// Whether the major axes of `a` and `b` meet on the configured side of the
/// pair. Parallel axes never meet.
pub fn pair_intersects(
    a: &PotentialTarget,
    b: &PotentialTarget,
    direction: ContourIntersectionDirection,
) -> bool {
    if direction == ContourIntersectionDirection::None {
        return true;
    }
    let Some(p) = line_intersection(
        a.rect.center,
        a.rect.major_axis(),
        b.rect.center,
        b.rect.major_axis(),
    ) else {
        return false;
    };
    let mid = Point2::from((a.centroid.coords + b.centroid.coords) * 0.5);
    match direction {
        ContourIntersectionDirection::None => true,
        ContourIntersectionDirection::Up => p.y < mid.y,
        ContourIntersectionDirection::Down => p.y > mid.y,
        ContourIntersectionDirection::Left => p.x < mid.x,
        ContourIntersectionDirection::Right => p.x > mid.x,
    }
}

/// Turns single contours, or left-to-right adjacent pairs of them, into
/// candidate targets.
#[derive(Debug, Default)]
pub struct GroupContoursPipe {
    params: GroupContoursParams,
}

impl Pipe for GroupContoursPipe {
    type Input<'a> = Vec<PotentialTarget>;
    type Output = Vec<PotentialTarget>;
    type Params = GroupContoursParams;

    fn name(&self) -> &'static str {
        "group_contours"
    }

    fn params(&self) -> &GroupContoursParams {
        &self.params
    }

    fn set_params(&mut self, params: GroupContoursParams) {
        self.params = params;
    }

    fn process(
        &mut self,
        mut targets: Vec<PotentialTarget>,
    ) -> Result<Vec<PotentialTarget>, PipeError> {
        if self.params.mode == ContourGroupingMode::Single {
            return Ok(targets);
        }

        targets.sort_by(|a, b| a.centroid.x.total_cmp(&b.centroid.x));
        let mut out = Vec::with_capacity(targets.len() / 2);
        let mut i = 0;
        while i + 1 < targets.len() {
            let (a, b) = (&targets[i], &targets[i + 1]);
            if pair_intersects(a, b, self.params.intersection) {
                out.push(PotentialTarget::merged(a, b));
                i += 2;
            } else {
                i += 1;
            }
        }
        debug!("grouped {} contours into {} pairs", targets.len(), out.len());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;
    use sightline_core::Contour;

    /// Strip of `len` x 4 px centred at `c`, long side along `dir`.
    fn strip(c: Point2<f64>, dir: Vector2<f64>, len: f64) -> PotentialTarget {
        let u = dir.normalize() * (len / 2.0);
        let v = Vector2::new(-u.y, u.x).normalize() * 2.0;
        PotentialTarget::from_contour(Contour::new(vec![
            c - u - v,
            c + u - v,
            c + u + v,
            c - u + v,
        ]))
    }

    fn leaning_pair() -> Vec<PotentialTarget> {
        // Tops lean towards each other: axes meet above the pair.
        vec![
            strip(Point2::new(60.0, 50.0), Vector2::new(-0.3, -1.0), 30.0),
            strip(Point2::new(40.0, 50.0), Vector2::new(0.3, -1.0), 30.0),
        ]
    }

    fn dual(direction: ContourIntersectionDirection) -> GroupContoursPipe {
        let mut pipe = GroupContoursPipe::default();
        pipe.set_params(GroupContoursParams {
            mode: ContourGroupingMode::Dual,
            intersection: direction,
        });
        pipe
    }

    #[test]
    fn single_mode_passes_through() {
        let out = GroupContoursPipe::default().apply(leaning_pair()).output;
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn dual_mode_merges_pairs_meeting_upwards() {
        let out = dual(ContourIntersectionDirection::Up)
            .apply(leaning_pair())
            .output;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].sub_contours.len(), 2);
        assert!((out[0].centroid.x - 50.0).abs() < 1e-6);
    }

    #[test]
    fn dual_mode_rejects_wrong_direction() {
        assert!(dual(ContourIntersectionDirection::Down)
            .apply(leaning_pair())
            .output
            .is_empty());
        assert_eq!(
            dual(ContourIntersectionDirection::None)
                .apply(leaning_pair())
                .output
                .len(),
            1
        );
    }

    #[test]
    fn unpaired_contours_are_dropped() {
        let mut targets = leaning_pair();
        targets.push(strip(Point2::new(120.0, 50.0), Vector2::new(0.0, 1.0), 20.0));
        let out = dual(ContourIntersectionDirection::Up).apply(targets).output;
        assert_eq!(out.len(), 1);
    }
}
