//! The `solver` module defines the contract for the numerical routines the
//! calibration and homography drivers consume, plus closed-form default
//! implementations.
//!
//! The routines are modelled as traits so the drivers' coordinate and
//! validation logic can be unit-tested against deterministic fakes,
//! decoupled from any particular optimizer. The defaults are linear
//! solvers: a planar (Zhang-style) calibration and a Hartley-normalized
//! DLT homography. Both are exact on noise-free pinhole data; neither
//! performs nonlinear refinement.

pub mod homography;
pub mod planar;

pub use homography::DltHomographySolver;
pub use planar::LinearPlanarSolver;

use nalgebra::{Matrix3, Point2, Point3, Vector2, Vector3};

#[derive(thiserror::Error, Debug)]
pub enum SolveError {
    #[error("need at least 4 point correspondences, got {0}")]
    TooFewPoints(usize),
    #[error("calibration rig points must lie on the z = 0 plane")]
    NonPlanarRig,
    #[error("degenerate point configuration")]
    DegenerateConfiguration,
    #[error("numerical failure: {0}")]
    Numerical(String),
}

/// Flag set passed to a planar calibration solve.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalibrationFlags {
    /// Keep the fx/fy ratio of the provided camera matrix fixed.
    pub fix_aspect_ratio: bool,
    /// Reuse the provided camera matrix instead of estimating intrinsics.
    pub use_intrinsic_guess: bool,
}

/// Output of a planar calibration solve.
#[derive(Debug, Clone)]
pub struct PlanarSolveResult {
    /// Root-mean-square reprojection error over all correspondences, pixels.
    pub mean_reprojection_error: f64,
    /// Refined 3x3 camera (intrinsic) matrix.
    pub camera_matrix: Matrix3<f64>,
    /// Distortion coefficients (k1, k2, p1, p2, k3).
    pub distortion: [f64; 5],
    /// One axis-angle rotation per image group.
    pub rotations: Vec<Vector3<f64>>,
    /// One translation per image group.
    pub translations: Vec<Vector3<f64>>,
}

/// A planar camera-calibration routine.
///
/// Accepts grouped 3D/2D point correspondences (rig points are expected on
/// the z = 0 plane of their own frame), the image size in pixels, an
/// initial camera-matrix guess, a distortion-coefficient buffer, and a flag
/// set. Returns the refined parameters plus one rotation and translation
/// per image group, or a [`SolveError`].
pub trait PlanarCalibrationSolver {
    fn calibrate(
        &self,
        object_points: &[Vec<Point3<f64>>],
        image_points: &[Vec<Point2<f64>>],
        image_size: Vector2<f64>,
        camera_matrix: &Matrix3<f64>,
        distortion: &[f64; 5],
        flags: CalibrationFlags,
    ) -> Result<PlanarSolveResult, SolveError>;
}

/// A homography-estimation routine.
///
/// Accepts two equal-length 2D point collections and returns the 3x3
/// transform mapping `from`-space to `to`-space.
pub trait HomographyEstimator {
    fn estimate(
        &self,
        from: &[Point2<f64>],
        to: &[Point2<f64>],
    ) -> Result<Matrix3<f64>, SolveError>;
}
