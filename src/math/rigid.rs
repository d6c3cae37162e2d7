use nalgebra::{Isometry3, Rotation3, Translation3, UnitQuaternion};

use crate::error::{GeometryError, Result};

use super::{Matrix4, Point3, Vector3};

/// Tolerance used when checking that a matrix holds a proper rotation.
const ROTATION_TOLERANCE: f64 = 1e-5;

/// A rotation followed by a translation.
///
/// Transforms are applied by value: [`apply`](Self::apply) and
/// [`apply_all`](Self::apply_all) return new points, only
/// [`apply_in_place`](Self::apply_in_place) mutates its input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    isometry: Isometry3<f64>,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// The identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            isometry: Isometry3::identity(),
        }
    }

    /// Creates a transform `p -> rotation * p + translation`.
    #[must_use]
    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3) -> Self {
        Self {
            isometry: Isometry3::from_parts(Translation3::from(translation), rotation),
        }
    }

    /// Creates a rotation that keeps `center` fixed.
    #[must_use]
    pub fn rotation_about(center: &Point3, rotation: UnitQuaternion<f64>) -> Self {
        let translation = center.coords - rotation * center.coords;
        Self::new(rotation, translation)
    }

    /// Builds a transform from a homogeneous matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix is not a proper rigid transform
    /// (non-orthonormal rotation block, reflection, or projective last row).
    pub fn from_matrix(m: &Matrix4) -> Result<Self> {
        let last_row_ok = m[(3, 0)].abs() < ROTATION_TOLERANCE
            && m[(3, 1)].abs() < ROTATION_TOLERANCE
            && m[(3, 2)].abs() < ROTATION_TOLERANCE
            && (m[(3, 3)] - 1.0).abs() < ROTATION_TOLERANCE;
        let r = m.fixed_view::<3, 3>(0, 0).into_owned();
        let orthonormal = (r.transpose() * r - nalgebra::Matrix3::identity()).norm()
            < ROTATION_TOLERANCE
            && r.determinant() > 0.0;
        if !last_row_ok || !orthonormal {
            return Err(
                GeometryError::Degenerate("matrix is not a rigid transform".into()).into(),
            );
        }
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
        let translation = Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
        Ok(Self::new(rotation, translation))
    }

    /// Returns the homogeneous 4x4 matrix.
    #[must_use]
    pub fn to_matrix(&self) -> Matrix4 {
        self.isometry.to_homogeneous()
    }

    #[must_use]
    pub fn rotation(&self) -> &UnitQuaternion<f64> {
        &self.isometry.rotation
    }

    #[must_use]
    pub fn translation(&self) -> Vector3 {
        self.isometry.translation.vector
    }

    /// Rotation angle in radians.
    #[must_use]
    pub fn angle(&self) -> f64 {
        self.isometry.rotation.angle()
    }

    /// Displacement of `center` under this transform.
    #[must_use]
    pub fn shift_at(&self, center: &Point3) -> Vector3 {
        self.apply(center) - center
    }

    #[must_use]
    pub fn apply(&self, p: &Point3) -> Point3 {
        self.isometry.transform_point(p)
    }

    /// Returns transformed copies of `points`.
    #[must_use]
    pub fn apply_all(&self, points: &[Point3]) -> Vec<Point3> {
        points.iter().map(|p| self.apply(p)).collect()
    }

    /// Transforms `points` in place.
    pub fn apply_in_place(&self, points: &mut [Point3]) {
        for p in points {
            *p = self.apply(p);
        }
    }

    /// Returns the transform that applies `self` first, then `next`.
    #[must_use]
    pub fn then(&self, next: &RigidTransform) -> RigidTransform {
        RigidTransform {
            isometry: next.isometry * self.isometry,
        }
    }

    #[must_use]
    pub fn inverse(&self) -> RigidTransform {
        RigidTransform {
            isometry: self.isometry.inverse(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn rotation_about_keeps_center() {
        let c = Point3::new(10.0, 20.0, 30.0);
        let t = RigidTransform::rotation_about(
            &c,
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
        );
        assert_relative_eq!(t.apply(&c), c, epsilon = 1e-12);
        let p = t.apply(&Point3::new(11.0, 20.0, 30.0));
        assert_relative_eq!(p, Point3::new(10.0, 21.0, 30.0), epsilon = 1e-12);
    }

    #[test]
    fn matrix_roundtrip() {
        let t = RigidTransform::new(
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
            Vector3::new(1.0, -2.0, 3.0),
        );
        let back = RigidTransform::from_matrix(&t.to_matrix()).unwrap();
        let p = Point3::new(4.0, 5.0, 6.0);
        assert_relative_eq!(t.apply(&p), back.apply(&p), epsilon = 1e-9);
    }

    #[test]
    fn scaling_matrix_is_rejected() {
        let m = Matrix4::new_scaling(2.0);
        assert!(RigidTransform::from_matrix(&m).is_err());
    }

    #[test]
    fn then_applies_in_order() {
        let a = RigidTransform::new(UnitQuaternion::identity(), Vector3::new(1.0, 0.0, 0.0));
        let b = RigidTransform::new(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
            Vector3::zeros(),
        );
        let p = a.then(&b).apply(&Point3::origin());
        assert_relative_eq!(p, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        let q = a.then(&a.inverse()).apply(&Point3::new(3.0, 4.0, 5.0));
        assert_relative_eq!(q, Point3::new(3.0, 4.0, 5.0), epsilon = 1e-12);
    }

    #[test]
    fn apply_all_leaves_input_untouched() {
        let pts = vec![Point3::new(1.0, 2.0, 3.0)];
        let t = RigidTransform::new(UnitQuaternion::identity(), Vector3::new(1.0, 1.0, 1.0));
        let moved = t.apply_all(&pts);
        assert_eq!(pts[0], Point3::new(1.0, 2.0, 3.0));
        assert_eq!(moved[0], Point3::new(2.0, 3.0, 4.0));
    }
}
