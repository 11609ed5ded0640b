//! Validation and grouping of paired world/view point sets.

use nalgebra::{Point2, Point3, Vector2, Vector3};

use crate::camera::CalibrationError;
use crate::convention;

/// Point correspondences grouped per calibration image, in the layout the
/// planar solver expects: world points remapped into calibration space and
/// view points scaled into pixels.
#[derive(Debug, Clone)]
pub struct PointGroups {
    pub object_points: Vec<Vec<Point3<f64>>>,
    pub image_points: Vec<Vec<Point2<f64>>>,
}

/// Validate and reshape parallel world/view point collections into grouped
/// per-image form.
///
/// All correspondences are treated as belonging to a single calibration
/// image, so exactly one group is produced; multi-image rigs are not
/// supported. View points are expected normalized to [0,1] x [0,1] and are
/// scaled element-wise by `image_size` into pixel coordinates.
pub fn build_point_groups(
    world_points: &[Vector3<f64>],
    view_points: &[Vector2<f64>],
    image_size: Vector2<f64>,
) -> Result<PointGroups, CalibrationError> {
    if world_points.len() != view_points.len() {
        return Err(CalibrationError::PointCountMismatch(
            world_points.len(),
            view_points.len(),
        ));
    }
    if world_points.is_empty() {
        return Err(CalibrationError::EmptyPointSet("world"));
    }

    let mut object_group = Vec::with_capacity(world_points.len());
    let mut image_group = Vec::with_capacity(view_points.len());
    for (world, view) in world_points.iter().zip(view_points) {
        object_group.push(convention::world_to_calibration_point(world));
        image_group.push(Point2::new(
            view.x * image_size.x,
            view.y * image_size.y,
        ));
    }

    Ok(PointGroups {
        object_points: vec![object_group],
        image_points: vec![image_group],
    })
}
