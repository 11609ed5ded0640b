use nalgebra::{Matrix4, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;

/// A camera model populated by a planar calibration solve.
///
/// The extrinsic matrix is stored in the consuming graphics convention
/// (row-vector layout, camera-relative-to-object after the default invert
/// policy); the intrinsic/projection matrix is stored unconverted in the
/// solver's convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraModel {
    /// Average reprojection error reported by the last solve, in pixels.
    pub calibration_error: f64,
    /// Extrinsic (model-view) matrix.
    pub extrinsic: Matrix4<f64>,
    /// Intrinsic (projection) matrix, no axis remap applied.
    pub intrinsic: Matrix4<f64>,
    /// Camera position in world space, for diagnostics.
    pub world_position: Vector3<f64>,
    /// Camera rotation as Euler angles in degrees, for diagnostics.
    pub rotation_deg: Vector3<f64>,
    /// Focal length in lens units, derived from the aperture size.
    pub focal_length: f64,
    /// Radial distortion coefficients (k1, k2).
    pub radial_distortion: Vector2<f64>,
    /// Tangential distortion coefficients (p1, p2).
    pub tangential_distortion: Vector2<f64>,
    /// Third radial distortion coefficient (k3).
    pub distortion_k3: f64,
    /// Focal size (fx, fy) expressed as a fraction of the image size.
    pub focal_size: Vector2<f64>,
    /// Principal point offset (cx, cy) expressed as a fraction of the image size.
    pub lens_offset: Vector2<f64>,
    /// Principal point (cx, cy) in pixels.
    pub principal_point: Vector2<f64>,
    /// Horizontal and vertical field of view in degrees.
    pub fov: Vector2<f64>,
    /// Image aspect ratio (forced to width/height when requested).
    pub aspect_ratio: f64,
}

impl Default for CameraModel {
    fn default() -> Self {
        CameraModel {
            calibration_error: 0.0,
            extrinsic: Matrix4::identity(),
            intrinsic: Matrix4::identity(),
            world_position: Vector3::zeros(),
            rotation_deg: Vector3::zeros(),
            focal_length: 1.0,
            radial_distortion: Vector2::zeros(),
            tangential_distortion: Vector2::zeros(),
            distortion_k3: 0.0,
            focal_size: Vector2::zeros(),
            lens_offset: Vector2::zeros(),
            principal_point: Vector2::zeros(),
            fov: Vector2::new(40.0, 40.0),
            aspect_ratio: 1.0,
        }
    }
}

impl CameraModel {
    /// Cast a ray from the camera through a normalized screen coordinate
    /// ([0,1] x [0,1], y down). Returns the ray origin (the camera's world
    /// position) and a unit direction in world space.
    ///
    /// Uses the stored field of view and the rotation part of the extrinsic
    /// matrix, so it is only meaningful after a successful extrinsic solve.
    pub fn screen_to_world_ray(&self, screen: Vector2<f64>) -> (Vector3<f64>, Vector3<f64>) {
        let ndc_x = screen.x * 2.0 - 1.0;
        let ndc_y = 1.0 - screen.y * 2.0;
        let half_tan_x = (self.fov.x.to_radians() * 0.5).tan();
        let half_tan_y = (self.fov.y.to_radians() * 0.5).tan();
        let view_dir = Vector3::new(ndc_x * half_tan_x, ndc_y * half_tan_y, 1.0);

        // Row-vector layout: a view-space direction maps to world space via
        // d * M, equivalently M^T * d in column form.
        let rotation = self.extrinsic.fixed_view::<3, 3>(0, 0).into_owned();
        let direction = (rotation.transpose() * view_dir).normalize();
        (self.world_position, direction)
    }

    /// Return the world-space point at `view_depth` along the ray through the
    /// given normalized screen coordinate.
    pub fn screen_to_world(&self, screen: Vector2<f64>, view_depth: f64) -> Vector3<f64> {
        let (origin, direction) = self.screen_to_world_ray(screen);
        origin + direction * view_depth
    }

    /// Load a camera model from a YAML file.
    pub fn load_from_yaml(path: &str) -> Result<Self, CalibrationError> {
        let contents = fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| CalibrationError::YamlError(e.to_string()))
    }

    /// Save the camera model to a YAML file.
    pub fn save_to_yaml(&self, path: &str) -> Result<(), CalibrationError> {
        let yaml_string =
            serde_yaml::to_string(self).map_err(|e| CalibrationError::YamlError(e.to_string()))?;

        let mut file =
            fs::File::create(path).map_err(|e| CalibrationError::IOError(e.to_string()))?;

        file.write_all(yaml_string.as_bytes())
            .map_err(|e| CalibrationError::IOError(e.to_string()))?;

        Ok(())
    }
}

/// Configuration for [`calibrate_camera`](crate::calibration::calibrate_camera).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Camera image size in pixels; both dimensions must be >= 1.
    pub image_size: Vector2<f64>,
    /// Compute intrinsics from scratch instead of reusing the provided guess.
    pub calculate_intrinsic: bool,
    /// Compute the extrinsic matrix and camera pose.
    pub calculate_extrinsic: bool,
    /// Force the reported aspect ratio to image width/height and seed the
    /// intrinsic guess diagonal with that ratio.
    pub force_image_aspect_ratio: bool,
    /// Zero out all distortion coefficients in the output.
    pub zero_radial_distortion: bool,
    /// Invert the converted extrinsic matrix, turning the solver's
    /// object-relative-to-camera transform into camera-relative-to-object.
    pub invert_extrinsic: bool,
    /// Run the reprojection checker after a successful solve.
    pub check_reprojection: bool,
    /// Physical sensor size used to express the focal length in lens units.
    pub aperture_size: Vector2<f64>,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        CalibrationParams {
            image_size: Vector2::new(100.0, 100.0),
            calculate_intrinsic: true,
            calculate_extrinsic: true,
            force_image_aspect_ratio: true,
            zero_radial_distortion: false,
            invert_extrinsic: true,
            check_reprojection: true,
            aperture_size: Vector2::new(0.1, 0.1),
        }
    }
}

/// Configuration for [`get_homography`](crate::calibration::get_homography).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomographyParams {
    /// Camera image size in pixels; both dimensions must be >= 1.
    pub image_size: Vector2<f64>,
}

impl Default for HomographyParams {
    fn default() -> Self {
        HomographyParams {
            image_size: Vector2::new(100.0, 100.0),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("camera image size too small: {0}x{1}")]
    ImageSizeTooSmall(f64, f64),
    #[error("point collections differ in length: {0} vs {1}")]
    PointCountMismatch(usize, usize),
    #[error("{0} point collection is empty")]
    EmptyPointSet(&'static str),
    #[error("calibration solve failed: {0}")]
    SolveFailed(String),
    #[error("calibration gave invalid error value")]
    InvalidErrorValue,
    #[error("matrix singularity detected")]
    SingularMatrix,
    #[error("failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CalibrationError {
    fn from(err: std::io::Error) -> Self {
        CalibrationError::IOError(err.to_string())
    }
}

/// Common validation functions for driver configuration
pub mod validation {
    use super::*;

    pub fn validate_image_size(image_size: &Vector2<f64>) -> Result<(), CalibrationError> {
        if image_size.x < 1.0 || image_size.y < 1.0 {
            return Err(CalibrationError::ImageSizeTooSmall(
                image_size.x,
                image_size.y,
            ));
        }
        Ok(())
    }
}
