//! Target ordering and truncation.

use std::cmp::Ordering;

use nalgebra::Point2;

use crate::modes::ContourSortMode;
use crate::pipe::{Pipe, PipeError};
use crate::shape::PotentialTarget;

#[derive(Clone, Debug, PartialEq)]
pub struct SortContoursParams {
    pub mode: ContourSortMode,
    /// One more than the number of targets kept.
    pub max_targets: usize,
    /// Reference point for [`ContourSortMode::Centermost`].
    pub frame_center: Point2<f64>,
}

impl Default for SortContoursParams {
    fn default() -> Self {
        Self {
            mode: ContourSortMode::Largest,
            max_targets: 20,
            frame_center: Point2::origin(),
        }
    }
}

/// Ordering of two targets under `mode`; "better" targets compare less.
pub fn compare_targets(
    mode: ContourSortMode,
    center: Point2<f64>,
    a: &PotentialTarget,
    b: &PotentialTarget,
) -> Ordering {
    match mode {
        ContourSortMode::Largest => b.area.total_cmp(&a.area),
        ContourSortMode::Smallest => a.area.total_cmp(&b.area),
        ContourSortMode::Highest => a.centroid.y.total_cmp(&b.centroid.y),
        ContourSortMode::Lowest => b.centroid.y.total_cmp(&a.centroid.y),
        ContourSortMode::Leftmost => a.centroid.x.total_cmp(&b.centroid.x),
        ContourSortMode::Rightmost => b.centroid.x.total_cmp(&a.centroid.x),
        ContourSortMode::Centermost => {
            let da = (a.centroid - center).norm_squared();
            let db = (b.centroid - center).norm_squared();
            da.total_cmp(&db)
        }
    }
}

/// Number of targets left after truncation: one fewer than `max_targets`.
pub fn truncated_len(n: usize, max_targets: usize) -> usize {
    n.min(max_targets.saturating_sub(1))
}

/// Stable sort, then keep `min(n, max_targets - 1)` targets.
#[derive(Debug, Default)]
pub struct SortContoursPipe {
    params: SortContoursParams,
}

impl Pipe for SortContoursPipe {
    type Input<'a> = Vec<PotentialTarget>;
    type Output = Vec<PotentialTarget>;
    type Params = SortContoursParams;

    fn name(&self) -> &'static str {
        "sort_contours"
    }

    fn params(&self) -> &SortContoursParams {
        &self.params
    }

    fn set_params(&mut self, params: SortContoursParams) {
        self.params = params;
    }

    fn process(
        &mut self,
        mut targets: Vec<PotentialTarget>,
    ) -> Result<Vec<PotentialTarget>, PipeError> {
        let SortContoursParams {
            mode,
            max_targets,
            frame_center,
        } = self.params;
        targets.sort_by(|a, b| compare_targets(mode, frame_center, a, b));
        targets.truncate(truncated_len(targets.len(), max_targets));
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightline_core::Contour;

    fn square(x: f64, y: f64, s: f64) -> PotentialTarget {
        PotentialTarget::from_contour(Contour::from_xy(&[
            [x, y],
            [x + s, y],
            [x + s, y + s],
            [x, y + s],
        ]))
    }

    fn fixture() -> Vec<PotentialTarget> {
        vec![
            square(0.0, 0.0, 10.0),
            square(50.0, 40.0, 20.0),
            square(100.0, 0.0, 10.0),
            square(20.0, 80.0, 5.0),
            square(70.0, 70.0, 20.0),
        ]
    }

    #[test]
    fn result_is_a_stable_sorted_prefix() {
        let input = fixture();
        let center = Point2::new(60.0, 50.0);
        for &mode in ContourSortMode::ALL {
            for max_targets in 0..8 {
                let mut pipe = SortContoursPipe::default();
                pipe.set_params(SortContoursParams {
                    mode,
                    max_targets,
                    frame_center: center,
                });
                let out = pipe.apply(input.clone()).output;
                assert_eq!(out.len(), input.len().min(max_targets.saturating_sub(1)));

                // Reference: stable insertion order among equals.
                let mut indices: Vec<usize> = (0..input.len()).collect();
                indices.sort_by(|&i, &j| {
                    compare_targets(mode, center, &input[i], &input[j]).then(i.cmp(&j))
                });
                for (k, t) in out.iter().enumerate() {
                    assert_eq!(t, &input[indices[k]], "mode {mode:?} slot {k}");
                }
            }
        }
    }

    #[test]
    fn ties_keep_detection_order() {
        let input = fixture();
        let mut pipe = SortContoursPipe::default();
        pipe.set_params(SortContoursParams {
            mode: ContourSortMode::Largest,
            max_targets: 10,
            frame_center: Point2::origin(),
        });
        let out = pipe.apply(input.clone()).output;
        // Equal areas: index 1 before 4, then 0 before 2.
        let expected: Vec<PotentialTarget> =
            [1, 4, 0, 2, 3].iter().map(|&i| input[i].clone()).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn truncation_drops_one_more_than_configured() {
        assert_eq!(truncated_len(10, 5), 4);
        assert_eq!(truncated_len(2, 5), 2);
        assert_eq!(truncated_len(3, 0), 0);
        assert_eq!(truncated_len(3, 1), 0);
    }
}
