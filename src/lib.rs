//! Planar Calibration Library
//!
//! A Rust library for recovering camera models from planar 3D/2D point
//! correspondences. The library reconciles two coordinate conventions: a
//! world space (x right, y up, z forward) and the calibration space expected
//! by the numerical solvers (x right, y forward, z up). It provides:
//! - A fixed axis-permutation transform between the two conventions
//! - Validation and grouping of paired 3D world / 2D view point sets
//! - A calibration driver that populates a full camera model (intrinsics,
//!   extrinsics, distortion, field of view) from a planar solve
//! - A homography driver for plane-to-plane 2D transforms
//! - A reprojection checker that sanity-checks solved camera matrices
//!
//! The numerical solvers are injected through traits so the coordinate and
//! validation logic can be tested with deterministic fakes; closed-form
//! default implementations are included.

pub mod calibration;
pub mod camera;
pub mod convention;
pub mod solver;

// Re-export commonly used types
pub use camera::{
    CalibrationError, CalibrationParams, CameraModel, HomographyParams,
};

pub use calibration::{
    build_point_groups, calibrate_camera, calibrate_camera_with, get_homography,
    get_homography_with, PointGroups, ReprojectionStats,
};

pub use solver::{
    CalibrationFlags, DltHomographySolver, HomographyEstimator, LinearPlanarSolver,
    PlanarCalibrationSolver, PlanarSolveResult, SolveError,
};
