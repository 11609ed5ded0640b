//! Normalized Direct Linear Transform homography estimation.
//!
//! Estimates `H` such that `x' ~ H x` for two planar point sets. Hartley
//! normalization (zero mean, average distance sqrt(2)) is applied to both
//! sets for numerical stability and the result is de-normalized before it
//! is returned, scaled so that `H[2,2] == 1` when possible.

use nalgebra::{DMatrix, Matrix3, Point2};

use super::{HomographyEstimator, SolveError};

#[derive(Debug, Clone, Copy, Default)]
pub struct DltHomographySolver;

/// Hartley normalization: translate to zero mean, scale so the average
/// distance from the origin is sqrt(2). Returns the normalized points and
/// the similarity transform that produced them.
fn normalize_points(points: &[Point2<f64>]) -> Option<(Vec<Point2<f64>>, Matrix3<f64>)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for p in points {
        cx += p.x;
        cy += p.y;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0;
    for p in points {
        let dx = p.x - cx;
        let dy = p.y - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;

    if mean_dist <= f64::EPSILON {
        return None;
    }

    let scale = (2.0_f64).sqrt() / mean_dist;
    let t = Matrix3::new(
        scale, 0.0, -scale * cx, //
        0.0, scale, -scale * cy, //
        0.0, 0.0, 1.0, //
    );

    let normalized = points
        .iter()
        .map(|p| Point2::new(scale * (p.x - cx), scale * (p.y - cy)))
        .collect();

    Some((normalized, t))
}

impl HomographyEstimator for DltHomographySolver {
    fn estimate(
        &self,
        from: &[Point2<f64>],
        to: &[Point2<f64>],
    ) -> Result<Matrix3<f64>, SolveError> {
        let n = from.len();
        if n < 4 || to.len() != n {
            return Err(SolveError::TooFewPoints(n.min(to.len())));
        }

        let (from_n, t_from) =
            normalize_points(from).ok_or(SolveError::DegenerateConfiguration)?;
        let (to_n, t_to) = normalize_points(to).ok_or(SolveError::DegenerateConfiguration)?;

        let mut a = DMatrix::<f64>::zeros(2 * n, 9);
        for (i, (pf, pt)) in from_n.iter().zip(to_n.iter()).enumerate() {
            let x = pf.x;
            let y = pf.y;
            let u = pt.x;
            let v = pt.y;

            let r0 = 2 * i;
            let r1 = 2 * i + 1;

            a[(r0, 0)] = -x;
            a[(r0, 1)] = -y;
            a[(r0, 2)] = -1.0;
            a[(r0, 6)] = u * x;
            a[(r0, 7)] = u * y;
            a[(r0, 8)] = u;

            a[(r1, 3)] = -x;
            a[(r1, 4)] = -y;
            a[(r1, 5)] = -1.0;
            a[(r1, 6)] = v * x;
            a[(r1, 7)] = v * y;
            a[(r1, 8)] = v;
        }

        // Solve A h = 0 via SVD, taking the singular vector of the smallest
        // singular value. Pad to square when there are fewer rows than
        // columns (the minimal 4-point case) so v_t has the full basis.
        let mut a_work = a;
        if a_work.nrows() < a_work.ncols() {
            let rows = a_work.nrows();
            let cols = a_work.ncols();
            let mut a_pad = DMatrix::<f64>::zeros(cols, cols);
            a_pad.view_mut((0, 0), (rows, cols)).copy_from(&a_work);
            a_work = a_pad;
        }

        let svd = a_work.svd(true, true);
        let v_t = svd
            .v_t
            .ok_or_else(|| SolveError::Numerical("svd failed".to_string()))?;
        let h_vec = v_t.row(v_t.nrows() - 1);

        let mut h = Matrix3::zeros();
        for r in 0..3 {
            for c in 0..3 {
                h[(r, c)] = h_vec[3 * r + c];
            }
        }

        let t_to_inv = t_to
            .try_inverse()
            .ok_or(SolveError::DegenerateConfiguration)?;
        h = t_to_inv * h * t_from;

        // Normalize such that H[2,2] = 1.
        let h_scale = h[(2, 2)];
        if h_scale.abs() > f64::EPSILON {
            h /= h_scale;
        }

        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square() -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(100.0, 100.0),
            Point2::new(0.0, 100.0),
            Point2::new(50.0, 25.0),
        ]
    }

    #[test]
    fn test_identity_for_identical_sets() {
        let points = square();
        let h = DltHomographySolver.estimate(&points, &points).unwrap();
        assert_relative_eq!(h, Matrix3::identity(), epsilon = 1e-9);
    }

    #[test]
    fn test_recovers_translation() {
        let from = square();
        let to: Vec<_> = from.iter().map(|p| Point2::new(p.x + 10.0, p.y - 5.0)).collect();
        let h = DltHomographySolver.estimate(&from, &to).unwrap();
        assert_relative_eq!(h[(0, 2)], 10.0, epsilon = 1e-9);
        assert_relative_eq!(h[(1, 2)], -5.0, epsilon = 1e-9);
        assert_relative_eq!(h[(0, 0)], 1.0, epsilon = 1e-9);
        assert_relative_eq!(h[(1, 1)], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_recovers_projective_transform() {
        let truth = Matrix3::new(
            0.9, 0.1, 4.0, //
            -0.05, 1.1, -2.0, //
            1e-4, -2e-4, 1.0, //
        );
        let from = square();
        let to: Vec<_> = from
            .iter()
            .map(|p| {
                let v = truth * nalgebra::Vector3::new(p.x, p.y, 1.0);
                Point2::new(v.x / v.z, v.y / v.z)
            })
            .collect();

        let h = DltHomographySolver.estimate(&from, &to).unwrap();
        assert_relative_eq!(h, truth, epsilon = 1e-6);
    }

    #[test]
    fn test_rejects_too_few_points() {
        let points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
        ];
        assert!(matches!(
            DltHomographySolver.estimate(&points, &points),
            Err(SolveError::TooFewPoints(3))
        ));
    }

    #[test]
    fn test_rejects_degenerate_configuration() {
        // All points coincide; normalization cannot scale them apart.
        let points = vec![Point2::new(5.0, 5.0); 4];
        assert!(matches!(
            DltHomographySolver.estimate(&points, &points),
            Err(SolveError::DegenerateConfiguration)
        ));
    }
}
