//! Diagnostic reprojection check for a finished planar solve.
//!
//! Reconstructs world positions from the solved camera matrices and the
//! observed view coordinates, and compares them against the supplied world
//! points. Per-point deltas are logged at `debug`, a summary at `info`.
//! The check never alters the camera model; callers treat a failure here as
//! a diagnostic signal, not a solve failure.

use log::{debug, info};
use nalgebra::{Point3, Rotation3, Vector3};

use super::points::PointGroups;
use crate::camera::CalibrationError;
use crate::convention;
use crate::solver::planar::project_point;
use crate::solver::PlanarSolveResult;

/// Residual statistics gathered by [`check_reprojection`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReprojectionStats {
    /// Mean pixel distance between observed and re-projected view points.
    pub mean_pixel_error: f64,
    pub max_pixel_error: f64,
    /// Mean world-space distance between supplied and reconstructed points.
    pub mean_world_error: f64,
    pub max_world_error: f64,
    pub point_count: usize,
}

/// Verify a solve by re-projecting every correspondence and by casting each
/// observed pixel back onto the rig plane (z = 0 in the rig frame).
pub fn check_reprojection(
    result: &PlanarSolveResult,
    groups: &PointGroups,
) -> Result<ReprojectionStats, CalibrationError> {
    let k_inv = result
        .camera_matrix
        .try_inverse()
        .ok_or(CalibrationError::SingularMatrix)?;

    let mut stats = ReprojectionStats::default();
    let mut pixel_sum = 0.0;
    let mut world_sum = 0.0;

    for (g, (obj, img)) in groups
        .object_points
        .iter()
        .zip(&groups.image_points)
        .enumerate()
    {
        let rvec = result.rotations.get(g).ok_or_else(|| {
            CalibrationError::SolveFailed("solver returned no pose for an image group".to_string())
        })?;
        let tvec = result.translations.get(g).ok_or_else(|| {
            CalibrationError::SolveFailed("solver returned no pose for an image group".to_string())
        })?;
        let rotation = Rotation3::new(*rvec);

        for (i, (object_point, image_point)) in obj.iter().zip(img).enumerate() {
            let projected = project_point(
                &result.camera_matrix,
                &result.distortion,
                &rotation,
                tvec,
                object_point,
            )
            .map_err(|e| CalibrationError::SolveFailed(e.to_string()))?;
            let pixel_error = (projected - image_point).norm();

            // Cast the observed pixel ray onto the rig plane.
            let ray = k_inv * Vector3::new(image_point.x, image_point.y, 1.0);
            let normal = rotation * Vector3::z();
            let denom = normal.dot(&ray);
            if denom.abs() <= f64::EPSILON {
                debug!("reprojection {g}/{i}: ray parallel to the calibration plane, skipped");
                continue;
            }
            let s = normal.dot(tvec) / denom;
            let reconstructed_cam = ray * s;
            let reconstructed_rig = rotation.inverse() * (reconstructed_cam - tvec);
            let world = convention::calibration_to_world_point(&Point3::from(reconstructed_rig));
            let expected = convention::calibration_to_world_point(object_point);
            let world_error = (world - expected).norm();

            debug!("reprojection {g}/{i}: pixel delta {pixel_error:.6}, world delta {world_error:.6}");

            pixel_sum += pixel_error;
            world_sum += world_error;
            stats.max_pixel_error = stats.max_pixel_error.max(pixel_error);
            stats.max_world_error = stats.max_world_error.max(world_error);
            stats.point_count += 1;
        }
    }

    if stats.point_count > 0 {
        stats.mean_pixel_error = pixel_sum / stats.point_count as f64;
        stats.mean_world_error = world_sum / stats.point_count as f64;
    }

    info!(
        "reprojection check over {} points: mean pixel error {:.6}, mean world error {:.6}",
        stats.point_count, stats.mean_pixel_error, stats.mean_world_error
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    fn synthetic_solve() -> (PlanarSolveResult, PointGroups) {
        let camera_matrix = Matrix3::new(
            800.0, 0.0, 500.0, //
            0.0, 800.0, 375.0, //
            0.0, 0.0, 1.0, //
        );
        let rotation = Rotation3::from_euler_angles(0.2, -0.15, 0.1);
        let translation = Vector3::new(0.25, -0.1, 4.0);

        let mut object_points = Vec::new();
        let mut image_points = Vec::new();
        for i in 0..3 {
            for j in 0..3 {
                let p = Point3::new(i as f64 - 1.0, j as f64 - 1.0, 0.0);
                let pixel =
                    project_point(&camera_matrix, &[0.0; 5], &rotation, &translation, &p).unwrap();
                object_points.push(p);
                image_points.push(pixel);
            }
        }

        let result = PlanarSolveResult {
            mean_reprojection_error: 0.0,
            camera_matrix,
            distortion: [0.0; 5],
            rotations: vec![rotation.scaled_axis()],
            translations: vec![translation],
        };
        let groups = PointGroups {
            object_points: vec![object_points],
            image_points: vec![image_points],
        };
        (result, groups)
    }

    #[test]
    fn test_noise_free_solve_reconstructs_exactly() {
        let (result, groups) = synthetic_solve();
        let stats = check_reprojection(&result, &groups).unwrap();
        assert_eq!(stats.point_count, 9);
        assert!(stats.max_pixel_error < 1e-9);
        assert!(stats.max_world_error < 1e-9);
    }

    #[test]
    fn test_perturbed_pose_shows_residuals() {
        let (mut result, groups) = synthetic_solve();
        result.translations[0].x += 0.05;
        let stats = check_reprojection(&result, &groups).unwrap();
        assert!(stats.mean_pixel_error > 1.0);
        assert!(stats.mean_world_error > 0.01);
    }

    #[test]
    fn test_missing_pose_is_an_error() {
        let (mut result, groups) = synthetic_solve();
        result.rotations.clear();
        assert!(matches!(
            check_reprojection(&result, &groups),
            Err(CalibrationError::SolveFailed(_))
        ));
    }

    #[test]
    fn test_singular_camera_matrix_is_an_error() {
        let (mut result, groups) = synthetic_solve();
        result.camera_matrix = Matrix3::zeros();
        assert!(matches!(
            check_reprojection(&result, &groups),
            Err(CalibrationError::SingularMatrix)
        ));
    }
}
