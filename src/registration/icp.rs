use nalgebra::{Matrix3, Quaternion, SymmetricEigen, UnitQuaternion};

use crate::error::{GeometryError, Result};
use crate::math::{Matrix4, Point3, PointOctree, RigidTransform, Vector3, TOLERANCE};

use super::{IcpParams, PointMatch};

/// Relative gap below which the two largest eigenvalues count as tied.
const EIGEN_GAP: f64 = 1e-9;

/// Closed-form rigid transform taking each `source` onto its `target` in
/// the least-squares sense (Horn's quaternion method).
///
/// Returns the identity for an empty slice and a pure translation when the
/// points have no spread relative to their own scale. When the two largest
/// eigenvalues of the quaternion matrix are tied the rotation is not
/// unique; a warning is logged and one of the solutions is returned.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::many_single_char_names)]
pub fn best_rigid(matches: &[PointMatch]) -> RigidTransform {
    if matches.is_empty() {
        return RigidTransform::identity();
    }
    let n = matches.len() as f64;
    let c1 = matches.iter().fold(Vector3::zeros(), |acc, m| acc + m.source.coords) / n;
    let c2 = matches.iter().fold(Vector3::zeros(), |acc, m| acc + m.target.coords) / n;

    // s[(i, j)] = sum of source_i * target_j over centered pairs.
    let s = matches.iter().fold(Matrix3::zeros(), |acc, m| {
        acc + (m.source.coords - c1) * (m.target.coords - c2).transpose()
    });
    // Squared spread of both sets about their centroids
    let spread: f64 = matches
        .iter()
        .map(|m| (m.source.coords - c1).norm_squared() + (m.target.coords - c2).norm_squared())
        .sum();
    let (sxx, sxy, sxz) = (s[(0, 0)], s[(0, 1)], s[(0, 2)]);
    let (syx, syy, syz) = (s[(1, 0)], s[(1, 1)], s[(1, 2)]);
    let (szx, szy, szz) = (s[(2, 0)], s[(2, 1)], s[(2, 2)]);

    #[rustfmt::skip]
    let big_n = Matrix4::new(
        sxx + syy + szz, syz - szy,        szx - sxz,        sxy - syx,
        syz - szy,       sxx - syy - szz,  sxy + syx,        szx + sxz,
        szx - sxz,       sxy + syx,        -sxx + syy - szz, syz + szy,
        sxy - syx,       szx + sxz,        syz + szy,        -sxx - syy + szz,
    );

    let eigen = SymmetricEigen::new(big_n);
    let mut order: Vec<usize> = (0..4).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    let (best, second) = (eigen.eigenvalues[order[0]], eigen.eigenvalues[order[1]]);
    if best <= TOLERANCE * spread {
        // Negligible spread: a single point or coincident points.
        return RigidTransform::new(UnitQuaternion::identity(), c2 - c1);
    }
    if best - second <= EIGEN_GAP * best.abs() {
        tracing::warn!(best, second, "ICP rotation is ill-conditioned");
    }

    let q = eigen.eigenvectors.column(order[0]);
    let rotation = UnitQuaternion::from_quaternion(Quaternion::new(q[0], q[1], q[2], q[3]));
    let translation = c2 - rotation * c1;
    RigidTransform::new(rotation, translation)
}

/// Result of an [`Icp`] run.
#[derive(Debug, Clone)]
pub struct IcpResult {
    /// Transform taking the source points onto the target points.
    pub transform: RigidTransform,
    /// Mean squared distance of the inlier matches after the final refit.
    pub mse: f64,
    /// Iterations run before convergence or the iteration cap.
    pub iterations: usize,
    /// Number of matches kept for the final refit.
    pub inliers: usize,
    /// Mean squared match distance after each iteration, non-increasing.
    pub mse_history: Vec<f64>,
    /// Displacement of the rotation center under `transform`.
    pub center_shift: Vector3,
}

/// Iterative closest point registration of `source` onto `target`.
///
/// Each iteration matches every transformed source point to its nearest
/// target point, fits the best rigid transform to those matches and applies
/// it. Iteration stops when the mean squared distance stops decreasing or
/// after `max_iterations`. The closest `ratio_to_use` fraction of the final
/// matches is then refit once so that points without a counterpart do not
/// bias the result.
pub struct Icp<'a> {
    source: &'a [Point3],
    target: &'a [Point3],
    center: Point3,
    initial: RigidTransform,
    params: IcpParams,
}

impl<'a> Icp<'a> {
    /// Creates a new `Icp` operation rotating about `center`.
    #[must_use]
    pub fn new(source: &'a [Point3], target: &'a [Point3], center: Point3, params: IcpParams) -> Self {
        Self {
            source,
            target,
            center,
            initial: RigidTransform::identity(),
            params,
        }
    }

    /// Starts from `initial` instead of the identity.
    #[must_use]
    pub fn with_initial(mut self, initial: RigidTransform) -> Self {
        self.initial = initial;
        self
    }

    fn matches(moving: &[Point3], tree: &PointOctree) -> Vec<PointMatch> {
        moving
            .iter()
            .filter_map(|p| tree.nearest(p).map(|n| PointMatch::new(*p, n.point)))
            .collect()
    }

    /// Executes the registration.
    ///
    /// # Errors
    ///
    /// Returns an error if either point set is empty or `ratio_to_use` is
    /// outside `(0, 1]`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn execute(&self) -> Result<IcpResult> {
        self.params.validate()?;
        if self.source.is_empty() {
            return Err(GeometryError::EmptyPointSet("ICP source").into());
        }
        if self.target.is_empty() {
            return Err(GeometryError::EmptyPointSet("ICP target").into());
        }

        // Iterate match and fit until the error stops decreasing
        let tree = PointOctree::from_points(self.target);
        let mut moving = self.initial.apply_all(self.source);
        let mut transform = self.initial;
        let mut mse_history: Vec<f64> = Vec::new();
        let mut iterations = 0;

        while iterations < self.params.max_iterations {
            let mut matches = Self::matches(&moving, &tree);
            let step = best_rigid(&matches);
            step.apply_in_place(&mut moving);
            for m in &mut matches {
                *m = PointMatch::new(step.apply(&m.source), m.target);
            }
            transform = transform.then(&step);
            iterations += 1;

            let mse = mean_distance_sq(&matches);
            tracing::debug!(iteration = iterations, mse, "ICP step");
            let stalled = mse_history.last().is_some_and(|&last| mse >= last);
            if !stalled {
                mse_history.push(mse);
            }
            if stalled || mse <= TOLERANCE * TOLERANCE {
                break;
            }
        }

        // Refit on the closest matches only
        let mut matches = Self::matches(&moving, &tree);
        matches.sort_by(|a, b| a.distance_sq.total_cmp(&b.distance_sq));
        let keep = ((self.params.ratio_to_use * matches.len() as f64).ceil() as usize)
            .clamp(1, matches.len());
        matches.truncate(keep);
        let refit = best_rigid(&matches);
        transform = transform.then(&refit);
        let inliers: Vec<PointMatch> = matches
            .iter()
            .map(|m| PointMatch::new(refit.apply(&m.source), m.target))
            .collect();
        let mse = mean_distance_sq(&inliers);

        tracing::info!(
            iterations,
            mse,
            inliers = inliers.len(),
            angle = transform.angle().to_degrees(),
            "ICP converged"
        );
        Ok(IcpResult {
            transform,
            mse,
            iterations,
            inliers: inliers.len(),
            mse_history,
            center_shift: transform.shift_at(&self.center),
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_distance_sq(matches: &[PointMatch]) -> f64 {
    if matches.is_empty() {
        return 0.0;
    }
    matches.iter().map(|m| m.distance_sq).sum::<f64>() / matches.len() as f64
}
