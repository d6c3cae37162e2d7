mod batch;
mod fuse;
mod mode;

pub use batch::{BatchReport, FuseTimepoints};
pub use fuse::Fusion;
pub use mode::histogram_mode;

use crate::error::{ConfigError, Result};
use crate::math::{transform_point, Matrix4, Point3};
use crate::weight::{camera_views, FusionWeight, WeightParams};

/// Parameters for blending views.
#[derive(Debug, Clone, Copy)]
pub struct FusionParams {
    /// Shift each view so its intensity mode matches the first view's.
    pub adjust_modes: bool,
    /// Half-width in bins of the box filter applied to the mode histogram.
    pub mode_smoothing: usize,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            adjust_modes: false,
            mode_smoothing: 2,
        }
    }
}

/// One input view of a fusion: its weight and the transform taking
/// reference vertices into the view's frame.
pub struct FusionView {
    pub weight: Box<dyn FusionWeight>,
    pub transform: Option<Matrix4>,
}

impl FusionView {
    #[must_use]
    pub fn new(weight: impl FusionWeight + 'static) -> Self {
        Self {
            weight: Box::new(weight),
            transform: None,
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Matrix4) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Weight of a reference-frame vertex.
    #[must_use]
    pub fn weight_at(&self, vertex: &Point3) -> f64 {
        match &self.transform {
            Some(m) => self.weight.weight(&transform_point(m, vertex)),
            None => self.weight.weight(vertex),
        }
    }
}

/// Views of a two-camera, double-sided rig imaged at `transforms.len()`
/// stage angles, ordered angle-major as returned by [`camera_views`].
///
/// `transforms[a]` maps the reference frame into angle `a`; `None` is the
/// identity.
///
/// # Errors
///
/// Returns an error if `transforms` is empty or the weight parameters are invalid.
pub fn rig_views(
    center: Point3,
    transforms: &[Option<Matrix4>],
    params: WeightParams,
) -> Result<Vec<FusionView>> {
    let n_angles = u32::try_from(transforms.len())
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| ConfigError::InvalidParameter("rig needs at least one angle".into()))?;
    let mut views = Vec::with_capacity(transforms.len() * 4);
    for transform in transforms {
        let c = transform.as_ref().map_or(center, |m| transform_point(m, &center));
        for (_, _, weight) in camera_views(c, n_angles, params)? {
            views.push(FusionView {
                weight: Box::new(weight),
                transform: *transform,
            });
        }
    }
    Ok(views)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Vector3;
    use crate::weight::UniformWeight;
    use approx::assert_relative_eq;

    #[test]
    fn view_weight_uses_transformed_vertex() {
        struct XRamp;
        impl FusionWeight for XRamp {
            fn weight(&self, p: &Point3) -> f64 {
                p.x
            }
        }
        let v = FusionView::new(XRamp)
            .with_transform(Matrix4::new_translation(&Vector3::new(0.25, 0.0, 0.0)));
        assert_relative_eq!(v.weight_at(&Point3::new(0.5, 0.0, 0.0)), 0.75);
        assert_relative_eq!(FusionView::new(UniformWeight(0.4)).weight_at(&Point3::origin()), 0.4);
    }

    #[test]
    fn rig_has_four_views_per_angle() {
        let c = Point3::new(1.0, 2.0, 3.0);
        let views = rig_views(c, &[None, None], WeightParams::default()).unwrap();
        assert_eq!(views.len(), 8);
        assert!(rig_views(c, &[], WeightParams::default()).is_err());
    }
}
