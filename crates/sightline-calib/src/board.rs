use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use sightline_pipes::ordinal_enum;

ordinal_enum! {
    /// Calibration pattern printed on the board.
    #[derive(Default)]
    pub enum BoardType {
        /// Inner-corner grid of a black and white chessboard.
        #[default]
        Chessboard = 0,
        /// Asymmetric grid of dark dots, odd rows offset by half a pitch.
        DotGrid = 1,
    }
}

/// Geometry of a calibration board.
///
/// For a chessboard `cols x rows` counts inner corners. For a dot grid it
/// counts dots per row and rows; dots in odd rows sit half a pitch to the
/// right, so a row spans `2 * cols - 1` pitches.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardSpec {
    pub board_type: BoardType,
    pub cols: u32,
    pub rows: u32,
    /// Square edge (chessboard) or grid pitch (dots), metres.
    pub square_size: f64,
}

impl Default for BoardSpec {
    fn default() -> Self {
        Self {
            board_type: BoardType::Chessboard,
            cols: 8,
            rows: 8,
            square_size: 0.0254,
        }
    }
}

impl BoardSpec {
    pub fn chessboard(cols: u32, rows: u32, square_size: f64) -> Self {
        Self {
            board_type: BoardType::Chessboard,
            cols,
            rows,
            square_size,
        }
    }

    pub fn dot_grid(cols: u32, rows: u32, pitch: f64) -> Self {
        Self {
            board_type: BoardType::DotGrid,
            cols,
            rows,
            square_size: pitch,
        }
    }

    pub fn point_count(&self) -> usize {
        (self.cols * self.rows) as usize
    }

    /// Integer lattice position of every feature, row-major.
    ///
    /// Chessboard corners sit at `(i, j)`; dots at `(2 * i + j % 2, j)`.
    pub fn lattice(&self) -> Vec<[i32; 2]> {
        let (cols, rows) = (self.cols as i32, self.rows as i32);
        let mut out = Vec::with_capacity(self.point_count());
        for j in 0..rows {
            for i in 0..cols {
                out.push(match self.board_type {
                    BoardType::Chessboard => [i, j],
                    BoardType::DotGrid => [2 * i + j % 2, j],
                });
            }
        }
        out
    }

    /// Board-frame coordinates (z = 0 plane, metres) matching [`Self::lattice`].
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        let s = self.square_size;
        self.lattice()
            .into_iter()
            .map(|[x, y]| Point3::new(x as f64 * s, y as f64 * s, 0.0))
            .collect()
    }
}

/// Board features found in one image, paired with their board coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardObservation {
    pub image_points: Vec<Point2<f64>>,
    pub object_points: Vec<Point3<f64>>,
}

impl BoardObservation {
    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_grid_rows_are_offset() {
        let spec = BoardSpec::dot_grid(3, 2, 0.02);
        assert_eq!(
            spec.lattice(),
            vec![[0, 0], [2, 0], [4, 0], [1, 1], [3, 1], [5, 1]]
        );
        let obj = spec.object_points();
        assert!((obj[3].x - 0.02).abs() < 1e-12 && (obj[3].y - 0.02).abs() < 1e-12);
    }

    #[test]
    fn board_type_is_an_ordinal() {
        assert_eq!(serde_json::to_string(&BoardType::DotGrid).expect("json"), "1");
        assert!(serde_json::from_str::<BoardType>("7").is_err());
    }
}
