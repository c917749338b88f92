//! Calibration coefficients and their flat, persisted form.
//!
//! Matrices are stored as `{rows, cols, type, data}` records. `type` is the
//! OpenCV depth tag and is always [`CV_64F`] for data written here.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::camera::{Camera, CameraIntrinsics, LensModel};

/// OpenCV depth tag for 64-bit floats.
pub const CV_64F: i32 = 6;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationDataError {
    #[error("matrix shape {rows}x{cols} does not match {len} values")]
    Shape { rows: usize, cols: usize, len: usize },
    #[error("unsupported matrix type tag {0}")]
    UnsupportedType(i32),
    #[error("expected a {expected} matrix, got {rows}x{cols}")]
    UnexpectedDims {
        expected: &'static str,
        rows: usize,
        cols: usize,
    },
    #[error("is_fisheye = {flag} disagrees with {len} distortion coefficients")]
    LensMismatch { flag: bool, len: usize },
}

/// Row-major flat matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlatMat {
    pub rows: usize,
    pub cols: usize,
    #[serde(rename = "type")]
    pub mat_type: i32,
    pub data: Vec<f64>,
}

impl FlatMat {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, CalibrationDataError> {
        let m = Self {
            rows,
            cols,
            mat_type: CV_64F,
            data,
        };
        m.validate()?;
        Ok(m)
    }

    pub fn from_matrix3(m: &Matrix3<f64>) -> Self {
        let mut data = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                data.push(m[(r, c)]);
            }
        }
        Self {
            rows: 3,
            cols: 3,
            mat_type: CV_64F,
            data,
        }
    }

    pub fn column(values: &[f64]) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            mat_type: CV_64F,
            data: values.to_vec(),
        }
    }

    pub fn validate(&self) -> Result<(), CalibrationDataError> {
        if self.mat_type != CV_64F {
            return Err(CalibrationDataError::UnsupportedType(self.mat_type));
        }
        if self.rows * self.cols != self.data.len() {
            return Err(CalibrationDataError::Shape {
                rows: self.rows,
                cols: self.cols,
                len: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn to_matrix3(&self) -> Result<Matrix3<f64>, CalibrationDataError> {
        self.validate()?;
        if self.rows != 3 || self.cols != 3 {
            return Err(CalibrationDataError::UnexpectedDims {
                expected: "3x3",
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(Matrix3::from_row_slice(&self.data))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Result of a camera calibration; immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibrationCoefficients {
    pub resolution: Resolution,
    pub camera_intrinsics: FlatMat,
    pub dist_coeffs: FlatMat,
    #[serde(default)]
    pub per_view_errors: Vec<f64>,
    #[serde(default)]
    pub rms_error: f64,
    pub is_fisheye: bool,
}

impl CameraCalibrationCoefficients {
    pub fn new(
        resolution: Resolution,
        camera: &Camera,
        per_view_errors: Vec<f64>,
        rms_error: f64,
    ) -> Self {
        Self {
            resolution,
            camera_intrinsics: FlatMat::from_matrix3(&camera.intrinsics.matrix()),
            dist_coeffs: FlatMat::column(&camera.lens.coefficients()),
            per_view_errors,
            rms_error,
            is_fisheye: camera.lens.is_fisheye(),
        }
    }

    /// Camera model described by these coefficients.
    pub fn camera(&self) -> Result<Camera, CalibrationDataError> {
        let k = self.camera_intrinsics.to_matrix3()?;
        self.dist_coeffs.validate()?;
        let lens = LensModel::from_coefficients(&self.dist_coeffs.data);
        if lens.is_fisheye() != self.is_fisheye {
            return Err(CalibrationDataError::LensMismatch {
                flag: self.is_fisheye,
                len: self.dist_coeffs.data.len(),
            });
        }
        Ok(Camera::new(CameraIntrinsics::from_matrix(&k), lens))
    }
}
