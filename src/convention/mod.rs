//! Axis-convention conversion between world space and calibration space.
//!
//! World space is x right, y up, z forward. The calibration solvers expect
//! x right, y forward, z up, with the calibration plane at z = 0. The
//! conversion is a fixed permutation of the Y and Z axes with no scaling or
//! translation, so a floor plane (y = 0) in world space lands exactly on the
//! solver's rig plane.

use nalgebra::{Matrix4, Point3, Vector3};

/// The fixed 4x4 permutation mapping world axes (y up) to calibration axes
/// (z up). Swaps the Y and Z rows; no scaling, no translation.
pub fn world_to_calibration_matrix() -> Matrix4<f64> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0, //
    )
}

/// Inverse of [`world_to_calibration_matrix`].
///
/// A permutation matrix is orthogonal, so its inverse is the transpose and
/// carries no floating-point error.
pub fn calibration_to_world_matrix() -> Matrix4<f64> {
    world_to_calibration_matrix().transpose()
}

/// Map a world-space position into calibration space.
pub fn world_to_calibration_point(position: &Vector3<f64>) -> Point3<f64> {
    world_to_calibration_matrix().transform_point(&Point3::from(*position))
}

/// Map a calibration-space position back into world space.
pub fn calibration_to_world_point(position: &Point3<f64>) -> Vector3<f64> {
    calibration_to_world_matrix().transform_point(position).coords
}
