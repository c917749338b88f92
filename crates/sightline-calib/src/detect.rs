use image::GrayImage;
use log::debug;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::board::{BoardObservation, BoardSpec, BoardType};
use crate::chessboard::detect_chessboard;
use crate::dots::detect_dot_grid;

/// Locate the board in `gray` and pair its features with board coordinates.
///
/// Returns `None` when the complete pattern is not visible; callers skip
/// such frames.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(board = ?spec.board_type, cols = spec.cols, rows = spec.rows)))]
pub fn find_board_corners(gray: &GrayImage, spec: &BoardSpec) -> Option<BoardObservation> {
    let image_points = match spec.board_type {
        BoardType::Chessboard => detect_chessboard(gray, spec),
        BoardType::DotGrid => detect_dot_grid(gray, spec),
    };
    let Some(image_points) = image_points else {
        debug!(
            "{:?} {}x{} not found in {}x{} image",
            spec.board_type,
            spec.cols,
            spec.rows,
            gray.width(),
            gray.height()
        );
        return None;
    };
    Some(BoardObservation {
        image_points,
        object_points: spec.object_points(),
    })
}

/// Board observations from a sequence of images; images without a visible
/// board are skipped.
pub fn collect_observations<'a, I>(images: I, spec: &BoardSpec) -> Vec<BoardObservation>
where
    I: IntoIterator<Item = &'a GrayImage>,
{
    images
        .into_iter()
        .filter_map(|img| find_board_corners(img, spec))
        .collect()
}
