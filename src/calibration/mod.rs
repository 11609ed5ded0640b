//! The `calibration` module hosts the two caller-facing entry points:
//! [`calibrate_camera`], which drives a planar calibration solve and
//! populates a [`CameraModel`], and [`get_homography`], which estimates a
//! 3x3 plane-to-plane transform.
//!
//! Both drivers validate their configuration and point collections before
//! any numeric work, invoke an injected solver (closed-form defaults are
//! used by the plain entry points), and convert the solver's output back
//! into the consuming convention. Homographies operate in 2D image space
//! and are returned unconverted; only the 3D calibration path goes through
//! the axis remap.

pub mod points;
pub mod reprojection;

pub use points::{build_point_groups, PointGroups};
pub use reprojection::{check_reprojection, ReprojectionStats};

use log::{debug, info, warn};
use nalgebra::{Matrix3, Matrix4, Point2, Point3, Rotation3, Vector2, Vector3};

use crate::camera::{
    validation, CalibrationError, CalibrationParams, CameraModel, HomographyParams,
};
use crate::convention;
use crate::solver::{
    CalibrationFlags, DltHomographySolver, HomographyEstimator, LinearPlanarSolver,
    PlanarCalibrationSolver, PlanarSolveResult,
};

/// Sign flip reconciling the calibration library's Y/Z sign convention with
/// the consuming graphics convention.
fn invert_handedness_matrix() -> Matrix4<f64> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, -1.0, 0.0, 0.0, //
        0.0, 0.0, -1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0, //
    )
}

/// Calibrate a camera from paired world/view points with the built-in
/// closed-form planar solver.
///
/// See [`calibrate_camera_with`] for the full contract.
pub fn calibrate_camera(
    camera: &mut CameraModel,
    params: &CalibrationParams,
    world_points: &[Vector3<f64>],
    view_points: &[Vector2<f64>],
) -> Result<(), CalibrationError> {
    calibrate_camera_with(&LinearPlanarSolver, camera, params, world_points, view_points)
}

/// Calibrate a camera from paired world/view points using `solver`.
///
/// World points are remapped into calibration space and view points
/// (normalized to [0,1]) are scaled into pixels before the solve. On
/// success the camera model's calibration error is always updated;
/// intrinsic and extrinsic fields are populated according to
/// `params.calculate_intrinsic` / `params.calculate_extrinsic`.
///
/// # Errors
///
/// * [`CalibrationError::ImageSizeTooSmall`] when either image dimension is
///   below one pixel; checked before any point is touched.
/// * [`CalibrationError::PointCountMismatch`] /
///   [`CalibrationError::EmptyPointSet`] for malformed point collections.
/// * [`CalibrationError::SolveFailed`] wrapping any solver error.
/// * [`CalibrationError::InvalidErrorValue`] when the solver reports a
///   non-finite reprojection error.
///
/// On failure the camera model must not be consumed: stages that had
/// already run may have written partial results.
pub fn calibrate_camera_with<S: PlanarCalibrationSolver>(
    solver: &S,
    camera: &mut CameraModel,
    params: &CalibrationParams,
    world_points: &[Vector3<f64>],
    view_points: &[Vector2<f64>],
) -> Result<(), CalibrationError> {
    let image_size = params.image_size;
    validation::validate_image_size(&image_size)?;

    let groups = points::build_point_groups(world_points, view_points, image_size)?;

    // Identity-like initial guess; the forced ratio seeds the diagonal so a
    // fixed-aspect solve keeps fx/fy at the image ratio.
    let mut camera_matrix = Matrix3::identity();
    if params.force_image_aspect_ratio {
        let ratio = image_size.x / image_size.y;
        camera_matrix[(0, 0)] = ratio;
        camera_matrix[(1, 1)] = ratio;
    }
    let distortion = [0.0f64; 5];

    // The fx/fy ratio is always held fixed; the guess is only reused when
    // the caller did not ask for fresh intrinsics.
    let flags = CalibrationFlags {
        fix_aspect_ratio: true,
        use_intrinsic_guess: !params.calculate_intrinsic,
    };

    let result = solver
        .calibrate(
            &groups.object_points,
            &groups.image_points,
            image_size,
            &camera_matrix,
            &distortion,
            flags,
        )
        .map_err(|e| CalibrationError::SolveFailed(e.to_string()))?;

    if !result.mean_reprojection_error.is_finite() {
        return Err(CalibrationError::InvalidErrorValue);
    }
    camera.calibration_error = result.mean_reprojection_error;
    info!(
        "planar calibration solved, mean reprojection error {:.6} px",
        result.mean_reprojection_error
    );

    if params.calculate_intrinsic {
        apply_intrinsics(camera, params, &result);
    }

    if params.calculate_extrinsic {
        apply_extrinsics(camera, params, &result)?;
    }

    if params.check_reprojection {
        match reprojection::check_reprojection(&result, &groups) {
            Ok(stats) => debug!(
                "reprojection check: max pixel error {:.6}, max world error {:.6}",
                stats.max_pixel_error, stats.max_world_error
            ),
            Err(e) => warn!("reprojection check failed: {e}"),
        }
    }

    Ok(())
}

/// Populate the lens-related camera fields from the refined camera matrix.
fn apply_intrinsics(camera: &mut CameraModel, params: &CalibrationParams, result: &PlanarSolveResult) {
    let image_size = params.image_size;
    let k = &result.camera_matrix;
    let fx = k[(0, 0)];
    let fy = k[(1, 1)];
    let cx = k[(0, 2)];
    let cy = k[(1, 2)];

    // Normalize the matrix entries, then express them as a fraction of the
    // image size.
    camera.focal_size = Vector2::new(
        fx / image_size.x / image_size.x,
        fy / image_size.y / image_size.y,
    );
    camera.lens_offset = Vector2::new(
        cx / image_size.x / image_size.x,
        cy / image_size.y / image_size.y,
    );
    camera.principal_point = Vector2::new(cx, cy);

    camera.fov = Vector2::new(
        (2.0 * (image_size.x / (2.0 * fx)).atan()).to_degrees(),
        (2.0 * (image_size.y / (2.0 * fy)).atan()).to_degrees(),
    );
    camera.aspect_ratio = if params.force_image_aspect_ratio {
        image_size.x / image_size.y
    } else {
        fy / fx
    };
    camera.focal_length = fx * params.aperture_size.x / image_size.x;

    // Sign information from the solver is discarded here; downstream
    // consumers expect magnitudes only.
    let coefficients = if params.zero_radial_distortion {
        [0.0; 5]
    } else {
        result.distortion.map(f64::abs)
    };
    camera.radial_distortion = Vector2::new(coefficients[0], coefficients[1]);
    camera.tangential_distortion = Vector2::new(coefficients[2], coefficients[3]);
    camera.distortion_k3 = coefficients[4];
}

/// Convert the solver's object-relative pose into the consuming convention
/// and store the extrinsic and projection matrices.
fn apply_extrinsics(
    camera: &mut CameraModel,
    params: &CalibrationParams,
    result: &PlanarSolveResult,
) -> Result<(), CalibrationError> {
    let rvec = result.rotations.first().ok_or_else(|| {
        CalibrationError::SolveFailed("solver returned no rotation for the image group".to_string())
    })?;
    let tvec = result.translations.first().ok_or_else(|| {
        CalibrationError::SolveFailed(
            "solver returned no translation for the image group".to_string(),
        )
    })?;

    // Axis-angle to matrix expansion, then a 4x4 model-view embedding.
    let rotation = Rotation3::new(*rvec);
    let mut rt = Matrix4::identity();
    rt.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation.matrix());
    rt[(0, 3)] = tvec.x;
    rt[(1, 3)] = tvec.y;
    rt[(2, 3)] = tvec.z;

    // Transpose into row-vector layout, swap Y/Z back into world
    // convention, then reconcile the handedness sign difference.
    let mut model_view =
        rt.transpose() * convention::calibration_to_world_matrix() * invert_handedness_matrix();

    // The solver yields object-relative-to-camera; the model stores
    // camera-relative-to-object unless the caller opted out.
    if params.invert_extrinsic {
        model_view = model_view
            .try_inverse()
            .ok_or(CalibrationError::SingularMatrix)?;
    }
    camera.extrinsic = model_view;

    // Diagnostics: camera centre mapped back to world space, and the
    // solver's rotation as Euler degrees.
    let centre = -(rotation.inverse() * tvec);
    camera.world_position = convention::calibration_to_world_point(&Point3::from(centre));
    let (roll, pitch, yaw) = rotation.euler_angles();
    camera.rotation_deg = Vector3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees());

    // Projection matrix: the 3x3 camera matrix embedded with a homogeneous
    // last row/column, stored without any axis remap.
    let mut intrinsic = Matrix4::zeros();
    intrinsic
        .fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&result.camera_matrix);
    intrinsic[(3, 3)] = 1.0;
    camera.intrinsic = intrinsic;

    Ok(())
}

/// Estimate the homography mapping `points_a`-space to `points_b`-space
/// with the built-in normalized DLT estimator.
///
/// See [`get_homography_with`] for the full contract.
pub fn get_homography(
    params: &HomographyParams,
    points_a: &[Vector2<f64>],
    points_b: &[Vector2<f64>],
) -> Result<Matrix3<f64>, CalibrationError> {
    get_homography_with(&DltHomographySolver, params, points_a, points_b)
}

/// Estimate the homography mapping `points_a`-space to `points_b`-space
/// using `solver`.
///
/// Both collections are scaled element-wise by the image size into pixel
/// space before estimation. The result operates in 2D image space, so no
/// axis remap is applied.
pub fn get_homography_with<S: HomographyEstimator>(
    solver: &S,
    params: &HomographyParams,
    points_a: &[Vector2<f64>],
    points_b: &[Vector2<f64>],
) -> Result<Matrix3<f64>, CalibrationError> {
    validation::validate_image_size(&params.image_size)?;
    if points_a.is_empty() {
        return Err(CalibrationError::EmptyPointSet("first"));
    }
    if points_b.is_empty() {
        return Err(CalibrationError::EmptyPointSet("second"));
    }
    if points_a.len() != points_b.len() {
        return Err(CalibrationError::PointCountMismatch(
            points_a.len(),
            points_b.len(),
        ));
    }

    let scale = |points: &[Vector2<f64>]| -> Vec<Point2<f64>> {
        points
            .iter()
            .map(|p| Point2::new(p.x * params.image_size.x, p.y * params.image_size.y))
            .collect()
    };

    solver
        .estimate(&scale(points_a), &scale(points_b))
        .map_err(|e| CalibrationError::SolveFailed(e.to_string()))
}
