//! Closed-form planar camera calibration.
//!
//! Solves for a camera matrix and per-group pose from correspondences
//! between rig points on the z = 0 plane and their pixel observations. Each
//! group contributes one plane-to-image homography; the camera matrix is
//! seeded from the homography orthogonality constraints with the principal
//! point assumed at the image centre, and the pose is recovered by
//! decomposing the homography with the known intrinsics.
//!
//! There is no nonlinear refinement stage: the solve is exact on noise-free
//! pinhole data and the provided distortion coefficients are passed through
//! untouched (they do participate in the reported reprojection error).

use nalgebra::{DMatrix, DVector, Matrix3, Point2, Point3, Rotation3, Vector2, Vector3};

use super::homography::DltHomographySolver;
use super::{
    CalibrationFlags, HomographyEstimator, PlanarCalibrationSolver, PlanarSolveResult, SolveError,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearPlanarSolver;

/// Project a rig point through (R, t) and the camera matrix, applying the
/// radial/tangential distortion model (k1, k2, p1, p2, k3).
pub fn project_point(
    camera_matrix: &Matrix3<f64>,
    distortion: &[f64; 5],
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
    object_point: &Point3<f64>,
) -> Result<Point2<f64>, SolveError> {
    let p_cam = rotation * object_point.coords + translation;
    if p_cam.z < f64::EPSILON.sqrt() {
        return Err(SolveError::Numerical(
            "point projects behind the camera".to_string(),
        ));
    }

    let [k1, k2, p1, p2, k3] = *distortion;

    let x_prime = p_cam.x / p_cam.z;
    let y_prime = p_cam.y / p_cam.z;

    let r2 = x_prime * x_prime + y_prime * y_prime;
    let r4 = r2 * r2;
    let r6 = r4 * r2;

    let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;
    let x_distorted =
        x_prime * radial + 2.0 * p1 * x_prime * y_prime + p2 * (r2 + 2.0 * x_prime * x_prime);
    let y_distorted =
        y_prime * radial + p1 * (r2 + 2.0 * y_prime * y_prime) + 2.0 * p2 * x_prime * y_prime;

    let u = camera_matrix[(0, 0)] * x_distorted + camera_matrix[(0, 2)];
    let v = camera_matrix[(1, 1)] * y_distorted + camera_matrix[(1, 2)];

    Ok(Point2::new(u, v))
}

impl LinearPlanarSolver {
    /// Seed the camera matrix from plane homographies.
    ///
    /// The principal point is assumed at the image centre; each homography
    /// then contributes two linear constraints on (1/fx^2, 1/fy^2) from the
    /// orthogonality and equal-norm conditions on the first two rotation
    /// columns. With `fix_aspect_ratio` the fx/fy ratio of the guess matrix
    /// is kept and a single unknown is solved.
    fn intrinsics_from_homographies(
        homographies: &[Matrix3<f64>],
        image_size: Vector2<f64>,
        guess: &Matrix3<f64>,
        fix_aspect_ratio: bool,
    ) -> Result<Matrix3<f64>, SolveError> {
        let cx = image_size.x * 0.5;
        let cy = image_size.y * 0.5;
        let ratio = if fix_aspect_ratio && guess[(1, 1)].abs() > f64::EPSILON {
            guess[(0, 0)] / guess[(1, 1)]
        } else {
            1.0
        };

        let m = homographies.len();
        let unknowns = if fix_aspect_ratio { 1 } else { 2 };
        let mut a = DMatrix::<f64>::zeros(2 * m, unknowns);
        let mut b = DVector::<f64>::zeros(2 * m);

        // Move the principal point to the origin before reading constraints.
        let t_inv = Matrix3::new(
            1.0, 0.0, -cx, //
            0.0, 1.0, -cy, //
            0.0, 0.0, 1.0, //
        );

        for (k, h) in homographies.iter().enumerate() {
            let g = t_inv * h;
            let g1 = g.column(0);
            let g2 = g.column(1);

            let coeff_fx = [g1[0] * g2[0], g1[0] * g1[0] - g2[0] * g2[0]];
            let coeff_fy = [g1[1] * g2[1], g1[1] * g1[1] - g2[1] * g2[1]];
            let rhs = [-(g1[2] * g2[2]), -(g1[2] * g1[2] - g2[2] * g2[2])];

            for row in 0..2 {
                if fix_aspect_ratio {
                    a[(2 * k + row, 0)] = coeff_fx[row] / (ratio * ratio) + coeff_fy[row];
                } else {
                    a[(2 * k + row, 0)] = coeff_fx[row];
                    a[(2 * k + row, 1)] = coeff_fy[row];
                }
                b[2 * k + row] = rhs[row];
            }
        }

        let svd = a.svd(true, true);
        let solution = match svd.solve(&b, 1e-12) {
            Ok(sol) => sol,
            Err(err_msg) => {
                return Err(SolveError::Numerical(err_msg.to_string()));
            }
        };

        let (inv_fx2, inv_fy2) = if fix_aspect_ratio {
            (solution[0] / (ratio * ratio), solution[0])
        } else {
            (solution[0], solution[1])
        };

        if !(inv_fx2.is_finite() && inv_fy2.is_finite()) || inv_fx2 <= 0.0 || inv_fy2 <= 0.0 {
            return Err(SolveError::DegenerateConfiguration);
        }

        let fx = 1.0 / inv_fx2.sqrt();
        let fy = 1.0 / inv_fy2.sqrt();

        Ok(Matrix3::new(
            fx, 0.0, cx, //
            0.0, fy, cy, //
            0.0, 0.0, 1.0, //
        ))
    }

    /// Decompose a plane-to-image homography into (R, t) given intrinsics.
    ///
    /// Scales lambda * K^-1 [h1 h2 h3] into [r1 r2 t], completes r3 = r1 x r2
    /// and projects the rotation onto SO(3) via SVD. The sign is chosen so
    /// the rig sits in front of the camera (t.z > 0).
    fn pose_from_homography(
        camera_matrix: &Matrix3<f64>,
        h: &Matrix3<f64>,
    ) -> Result<(Matrix3<f64>, Vector3<f64>), SolveError> {
        let k_inv = camera_matrix
            .try_inverse()
            .ok_or_else(|| SolveError::Numerical("camera matrix is not invertible".to_string()))?;

        let b1 = k_inv * h.column(0);
        let b2 = k_inv * h.column(1);
        let b3 = k_inv * h.column(2);

        let norm1 = b1.norm();
        let norm2 = b2.norm();
        if norm1 <= 1e-12 || norm2 <= 1e-12 {
            return Err(SolveError::DegenerateConfiguration);
        }
        let lambda = 2.0 / (norm1 + norm2);

        let mut r1 = b1 * lambda;
        let mut r2 = b2 * lambda;
        let mut t = b3 * lambda;
        if t.z < 0.0 {
            r1 = -r1;
            r2 = -r2;
            t = -t;
        }

        let r3 = r1.cross(&r2);
        if r3.norm() <= 1e-12 {
            return Err(SolveError::DegenerateConfiguration);
        }

        let mut r = Matrix3::zeros();
        r.set_column(0, &r1);
        r.set_column(1, &r2);
        r.set_column(2, &r3);

        // Project onto SO(3) (polar decomposition via SVD).
        let svd = r.svd(true, true);
        let u = svd
            .u
            .ok_or_else(|| SolveError::Numerical("svd failed".to_string()))?;
        let v_t = svd
            .v_t
            .ok_or_else(|| SolveError::Numerical("svd failed".to_string()))?;
        let mut r_orth = u * v_t;
        if r_orth.determinant() < 0.0 {
            let mut u_flipped = u;
            u_flipped.column_mut(2).neg_mut();
            r_orth = u_flipped * v_t;
        }

        Ok((r_orth, t))
    }
}

impl PlanarCalibrationSolver for LinearPlanarSolver {
    fn calibrate(
        &self,
        object_points: &[Vec<Point3<f64>>],
        image_points: &[Vec<Point2<f64>>],
        image_size: Vector2<f64>,
        camera_matrix: &Matrix3<f64>,
        distortion: &[f64; 5],
        flags: CalibrationFlags,
    ) -> Result<PlanarSolveResult, SolveError> {
        if object_points.is_empty() || object_points.len() != image_points.len() {
            return Err(SolveError::Numerical(
                "object and image group counts differ".to_string(),
            ));
        }

        for (obj, img) in object_points.iter().zip(image_points) {
            if obj.len() != img.len() {
                return Err(SolveError::Numerical(
                    "object and image point counts differ within a group".to_string(),
                ));
            }
            if obj.len() < 4 {
                return Err(SolveError::TooFewPoints(obj.len()));
            }

            let mut extent: f64 = 0.0;
            let mut max_z: f64 = 0.0;
            for p in obj {
                extent = extent.max(p.x.abs()).max(p.y.abs());
                max_z = max_z.max(p.z.abs());
            }
            if max_z > 1e-6 * extent.max(1.0) {
                return Err(SolveError::NonPlanarRig);
            }
        }

        // One plane-to-image homography per group.
        let dlt = DltHomographySolver;
        let mut homographies = Vec::with_capacity(object_points.len());
        for (obj, img) in object_points.iter().zip(image_points) {
            let plane: Vec<Point2<f64>> = obj.iter().map(|p| Point2::new(p.x, p.y)).collect();
            homographies.push(dlt.estimate(&plane, img)?);
        }

        let refined = if flags.use_intrinsic_guess {
            *camera_matrix
        } else {
            Self::intrinsics_from_homographies(
                &homographies,
                image_size,
                camera_matrix,
                flags.fix_aspect_ratio,
            )?
        };

        let mut rotations = Vec::with_capacity(homographies.len());
        let mut translations = Vec::with_capacity(homographies.len());
        for h in &homographies {
            let (r, t) = Self::pose_from_homography(&refined, h)?;
            rotations.push(Rotation3::from_matrix_unchecked(r).scaled_axis());
            translations.push(t);
        }

        // Root-mean-square pixel residual over every correspondence.
        let mut sum_sq = 0.0;
        let mut count = 0usize;
        for (g, (obj, img)) in object_points.iter().zip(image_points).enumerate() {
            let rotation = Rotation3::new(rotations[g]);
            for (o, i) in obj.iter().zip(img) {
                let projected = project_point(&refined, distortion, &rotation, &translations[g], o)?;
                sum_sq += (projected - i).norm_squared();
                count += 1;
            }
        }
        let mean_reprojection_error = (sum_sq / count as f64).sqrt();

        Ok(PlanarSolveResult {
            mean_reprojection_error,
            camera_matrix: refined,
            distortion: *distortion,
            rotations,
            translations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn synthetic_camera_matrix() -> Matrix3<f64> {
        Matrix3::new(
            800.0, 0.0, 500.0, //
            0.0, 800.0, 375.0, //
            0.0, 0.0, 1.0, //
        )
    }

    fn synthetic_rig() -> (Vec<Point3<f64>>, Vec<Point2<f64>>, Rotation3<f64>, Vector3<f64>) {
        let camera_matrix = synthetic_camera_matrix();
        let rotation = Rotation3::from_euler_angles(0.25, -0.1, 0.05);
        let translation = Vector3::new(0.1, -0.2, 3.0);

        let mut object_points = Vec::new();
        let mut image_points = Vec::new();
        for i in 0..3 {
            for j in 0..3 {
                let p = Point3::new(i as f64 - 1.0, j as f64 - 1.0, 0.0);
                let pixel = project_point(
                    &camera_matrix,
                    &[0.0; 5],
                    &rotation,
                    &translation,
                    &p,
                )
                .unwrap();
                object_points.push(p);
                image_points.push(pixel);
            }
        }
        (object_points, image_points, rotation, translation)
    }

    #[test]
    fn test_recovers_synthetic_camera() {
        let (object_points, image_points, rotation, translation) = synthetic_rig();
        let flags = CalibrationFlags {
            fix_aspect_ratio: true,
            use_intrinsic_guess: false,
        };

        let result = LinearPlanarSolver
            .calibrate(
                &[object_points],
                &[image_points],
                Vector2::new(1000.0, 750.0),
                &Matrix3::identity(),
                &[0.0; 5],
                flags,
            )
            .unwrap();

        assert!(result.mean_reprojection_error < 1e-6);
        assert_relative_eq!(result.camera_matrix, synthetic_camera_matrix(), epsilon = 1e-5);

        let recovered = Rotation3::new(result.rotations[0]);
        assert_relative_eq!(*recovered.matrix(), *rotation.matrix(), epsilon = 1e-6);
        assert_relative_eq!(result.translations[0], translation, epsilon = 1e-6);
    }

    #[test]
    fn test_reuses_intrinsic_guess() {
        let (object_points, image_points, _, translation) = synthetic_rig();
        let camera_matrix = synthetic_camera_matrix();
        let flags = CalibrationFlags {
            fix_aspect_ratio: true,
            use_intrinsic_guess: true,
        };

        let result = LinearPlanarSolver
            .calibrate(
                &[object_points],
                &[image_points],
                Vector2::new(1000.0, 750.0),
                &camera_matrix,
                &[0.0; 5],
                flags,
            )
            .unwrap();

        // The guess is used untouched and the pose still lines up.
        assert_relative_eq!(result.camera_matrix, camera_matrix);
        assert_relative_eq!(result.translations[0], translation, epsilon = 1e-6);
        assert!(result.mean_reprojection_error < 1e-6);
    }

    #[test]
    fn test_distortion_passes_through() {
        let (object_points, image_points, _, _) = synthetic_rig();
        let distortion = [0.05, -0.01, 0.002, -0.001, 0.0005];

        let result = LinearPlanarSolver
            .calibrate(
                &[object_points],
                &[image_points],
                Vector2::new(1000.0, 750.0),
                &synthetic_camera_matrix(),
                &distortion,
                CalibrationFlags {
                    fix_aspect_ratio: true,
                    use_intrinsic_guess: true,
                },
            )
            .unwrap();

        assert_eq!(result.distortion, distortion);
    }

    #[test]
    fn test_rejects_non_planar_rig() {
        let (mut object_points, image_points, _, _) = synthetic_rig();
        object_points[4] = Point3::new(0.0, 0.0, 0.5);

        let err = LinearPlanarSolver
            .calibrate(
                &[object_points],
                &[image_points],
                Vector2::new(1000.0, 750.0),
                &Matrix3::identity(),
                &[0.0; 5],
                CalibrationFlags::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SolveError::NonPlanarRig));
    }

    #[test]
    fn test_rejects_too_few_points() {
        let object_points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        let image_points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
        ];

        let err = LinearPlanarSolver
            .calibrate(
                &[object_points],
                &[image_points],
                Vector2::new(100.0, 100.0),
                &Matrix3::identity(),
                &[0.0; 5],
                CalibrationFlags::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SolveError::TooFewPoints(3)));
    }
}
