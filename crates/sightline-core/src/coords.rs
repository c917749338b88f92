//! Conversion between the public NWU frame and the solver's EDN frame.
//!
//! NWU: x forward, y left, z up. EDN: x right (east), y down, z forward
//! (north). Every conversion goes through the same orthonormal basis change,
//! so converting there and back is exact up to rounding.

use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// North-west-up, the convention of every public pose.
    Nwu,
    /// East-down-north, the convention of the PnP solver and pixel rays.
    Edn,
}

impl CoordinateSystem {
    /// Rotation taking coordinates expressed in `self` to NWU.
    pub fn to_nwu(self) -> Rotation3<f64> {
        match self {
            CoordinateSystem::Nwu => Rotation3::identity(),
            CoordinateSystem::Edn => {
                // x_nwu = z_edn, y_nwu = -x_edn, z_nwu = -y_edn
                Rotation3::from_matrix_unchecked(Matrix3::new(
                    0.0, 0.0, 1.0, //
                    -1.0, 0.0, 0.0, //
                    0.0, -1.0, 0.0,
                ))
            }
        }
    }

    /// Basis change taking coordinates in `from` to coordinates in `to`.
    pub fn basis_change(from: CoordinateSystem, to: CoordinateSystem) -> Rotation3<f64> {
        to.to_nwu().inverse() * from.to_nwu()
    }
}

pub fn convert_point(
    p: &Point3<f64>,
    from: CoordinateSystem,
    to: CoordinateSystem,
) -> Point3<f64> {
    CoordinateSystem::basis_change(from, to) * p
}

pub fn convert_translation(
    t: &Vector3<f64>,
    from: CoordinateSystem,
    to: CoordinateSystem,
) -> Vector3<f64> {
    CoordinateSystem::basis_change(from, to) * t
}

/// Conjugates a rotation: `R' = M R M^T`.
pub fn convert_rotation(
    r: &UnitQuaternion<f64>,
    from: CoordinateSystem,
    to: CoordinateSystem,
) -> UnitQuaternion<f64> {
    let m = UnitQuaternion::from_rotation_matrix(&CoordinateSystem::basis_change(from, to));
    m * r * m.inverse()
}

pub fn convert_pose(
    pose: &Isometry3<f64>,
    from: CoordinateSystem,
    to: CoordinateSystem,
) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::from(convert_translation(&pose.translation.vector, from, to)),
        convert_rotation(&pose.rotation, from, to),
    )
}
