use crate::error::{ConfigError, Result};
use crate::math::Point3;

/// Maps a point to a blend weight in `[0, 1]`.
pub trait FusionWeight: Send + Sync {
    fn weight(&self, point: &Point3) -> f64;
}

/// Constant weight.
#[derive(Debug, Clone, Copy)]
pub struct UniformWeight(pub f64);

impl FusionWeight for UniformWeight {
    fn weight(&self, _point: &Point3) -> f64 {
        self.0
    }
}

/// Principal rotation axis of an angular sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Shape of the transition band between neighboring sectors.
#[derive(Debug, Clone, Copy)]
pub struct WeightParams {
    /// Full width of the transition band, in degrees.
    pub overlap: f64,
    /// Distance of the ramp from its asymptotes at the band edges.
    pub epsilon: f64,
}

impl Default for WeightParams {
    fn default() -> Self {
        Self {
            overlap: 20.0,
            epsilon: 1e-4,
        }
    }
}

/// Weight of an angular sector around one principal axis.
///
/// The sector is centered on `angle` and `aperture` degrees wide. Points
/// well inside get 1, points well outside get 0. Across a band of
/// `overlap` degrees centered on each sector edge the weight follows a
/// logistic ramp that is within `epsilon` of 0 or 1 at the band edges, so
/// two sectors sharing an edge sum to one everywhere in the band.
#[derive(Debug, Clone)]
pub struct AngleWeighter {
    axis: Axis,
    flipped: bool,
    angle: f64,
    aperture: f64,
    center: Point3,
    half_overlap: f64,
    steepness: f64,
}

impl AngleWeighter {
    /// Creates a weighter with the default transition band.
    ///
    /// # Errors
    ///
    /// Returns an error if `angle` or `aperture` is not finite, or the
    /// aperture is outside `(0, 360]`.
    pub fn new(axis: Axis, angle: f64, aperture: f64, center: Point3) -> Result<Self> {
        Self::with_params(axis, angle, aperture, center, WeightParams::default())
    }

    /// Creates a weighter with an explicit transition band.
    ///
    /// # Errors
    ///
    /// Returns an error if an angle is not finite, the aperture is outside
    /// `(0, 360]`, the overlap is not positive, or `epsilon` is outside `(0, 0.5)`.
    pub fn with_params(
        axis: Axis,
        angle: f64,
        aperture: f64,
        center: Point3,
        params: WeightParams,
    ) -> Result<Self> {
        if !angle.is_finite() {
            return Err(ConfigError::InvalidAngle {
                parameter: "angle",
                value: angle,
            }
            .into());
        }
        if !(aperture > 0.0 && aperture <= 360.0) {
            return Err(ConfigError::InvalidAngle {
                parameter: "aperture",
                value: aperture,
            }
            .into());
        }
        if !(params.overlap > 0.0) || !(params.epsilon > 0.0 && params.epsilon < 0.5) {
            return Err(ConfigError::InvalidParameter(format!(
                "weight overlap {} / epsilon {} out of range",
                params.overlap, params.epsilon
            ))
            .into());
        }
        let half_overlap = params.overlap / 2.0;
        Ok(Self {
            axis,
            flipped: false,
            angle,
            aperture,
            center,
            half_overlap,
            steepness: (1.0 / params.epsilon - 1.0).ln() / half_overlap,
        })
    }

    /// Measures angles in the opposite rotational sense.
    #[must_use]
    pub fn flipped(mut self) -> Self {
        self.flipped = !self.flipped;
        self
    }

    #[must_use]
    pub fn center(&self) -> &Point3 {
        &self.center
    }

    /// Signed angle of `point` relative to the sector center, in `[-180, 180]` degrees.
    #[must_use]
    pub fn angle_of(&self, point: &Point3) -> f64 {
        let d = point - self.center;
        let (d1, d2) = match self.axis {
            Axis::Z => (d.x, d.y),
            Axis::Y => (d.x, -d.z),
            Axis::X => (-d.z, d.y),
        };
        let d2 = if self.flipped { -d2 } else { d2 };
        let a = d2.atan2(d1).to_degrees() - self.angle;
        (a + 180.0).rem_euclid(360.0) - 180.0
    }

    /// Weight for a signed angle relative to the sector center.
    #[must_use]
    pub fn weight_for_angle(&self, angle: f64) -> f64 {
        let half = self.aperture / 2.0;
        if angle > -half + self.half_overlap && angle < half - self.half_overlap {
            return 1.0;
        }
        if angle < -half - self.half_overlap || angle > half + self.half_overlap {
            return 0.0;
        }
        if angle < 0.0 {
            logistic(self.steepness * (angle + half))
        } else {
            1.0 - logistic(self.steepness * (angle - half))
        }
    }
}

impl FusionWeight for AngleWeighter {
    fn weight(&self, point: &Point3) -> f64 {
        self.weight_for_angle(self.angle_of(point))
    }
}

fn logistic(t: f64) -> f64 {
    1.0 / (1.0 + (-t).exp())
}

/// Camera index of a two-camera rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Camera {
    First,
    Second,
}

/// Illumination side of a double-sided light sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Illumination {
    Left,
    Right,
}

/// Target angle of one camera/illumination combination at angle index
/// `angle_index`: camera 1 looks at 135°, camera 2 at 45°, right
/// illumination mirrors the angle, and each stage rotation adds `angle_increment`.
#[must_use]
pub fn view_angle(
    camera: Camera,
    illumination: Illumination,
    angle_index: u32,
    angle_increment: u32,
) -> u32 {
    let base = match camera {
        Camera::First => 135,
        Camera::Second => 45,
    };
    let base = match illumination {
        Illumination::Left => base,
        Illumination::Right => 360 - base,
    };
    base + angle_index * angle_increment
}

/// The four sector weights of a two-camera, double-sided rig around the
/// x-axis, each `90 / n_angles` degrees wide.
///
/// # Errors
///
/// Returns an error if `n_angles` is zero or the weight parameters are invalid.
pub fn camera_views(
    center: Point3,
    n_angles: u32,
    params: WeightParams,
) -> Result<Vec<(Camera, Illumination, AngleWeighter)>> {
    if n_angles == 0 {
        return Err(ConfigError::InvalidParameter("number of angles must be positive".into()).into());
    }
    let aperture = f64::from(90 / n_angles);
    let mut views = Vec::with_capacity(4);
    for (camera, illumination, angle) in [
        (Camera::First, Illumination::Left, 135.0),
        (Camera::First, Illumination::Right, -135.0),
        (Camera::Second, Illumination::Left, 45.0),
        (Camera::Second, Illumination::Right, -45.0),
    ] {
        views.push((
            camera,
            illumination,
            AngleWeighter::with_params(Axis::X, angle, aperture, center, params)?,
        ));
    }
    Ok(views)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn on_circle_x(center: &Point3, degrees: f64) -> Point3 {
        // Axis::X measures atan2(dy, -dz).
        let r = degrees.to_radians();
        Point3::new(center.x, center.y + r.sin(), center.z - r.cos())
    }

    #[test]
    fn inside_and_outside() {
        let c = Point3::origin();
        let w = AngleWeighter::new(Axis::X, 45.0, 90.0, c).unwrap();
        assert_relative_eq!(w.weight(&on_circle_x(&c, 45.0)), 1.0);
        assert_relative_eq!(w.weight(&on_circle_x(&c, 20.0)), 1.0);
        assert_relative_eq!(w.weight(&on_circle_x(&c, 180.0)), 0.0);
        assert_relative_eq!(w.weight(&on_circle_x(&c, -60.0)), 0.0);
    }

    #[test]
    fn ramp_reaches_epsilon_at_band_edges() {
        let w = AngleWeighter::new(Axis::Z, 0.0, 90.0, Point3::origin()).unwrap();
        assert_relative_eq!(w.weight_for_angle(35.0), 1.0 - 1e-4, epsilon = 1e-9);
        assert_relative_eq!(w.weight_for_angle(55.0), 1e-4, epsilon = 1e-9);
        assert_relative_eq!(w.weight_for_angle(45.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(w.weight_for_angle(-45.0), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn angle_wraps_around() {
        let c = Point3::origin();
        let w = AngleWeighter::new(Axis::Z, 170.0, 40.0, c).unwrap();
        let p = Point3::new((-170.0f64).to_radians().cos(), (-170.0f64).to_radians().sin(), 0.0);
        assert_relative_eq!(w.angle_of(&p), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn flipped_mirrors_the_sector() {
        let c = Point3::origin();
        let w = AngleWeighter::new(Axis::Z, 90.0, 60.0, c).unwrap();
        let f = w.clone().flipped();
        let up = Point3::new(0.0, 1.0, 0.0);
        let down = Point3::new(0.0, -1.0, 0.0);
        assert_relative_eq!(w.weight(&up), 1.0);
        assert_relative_eq!(w.weight(&down), 0.0);
        assert_relative_eq!(f.weight(&down), 1.0);
    }

    #[test]
    fn rejects_bad_aperture() {
        let c = Point3::origin();
        assert!(AngleWeighter::new(Axis::X, 0.0, 0.0, c).is_err());
        assert!(AngleWeighter::new(Axis::X, f64::NAN, 90.0, c).is_err());
        assert!(AngleWeighter::new(Axis::X, 0.0, 400.0, c).is_err());
    }

    #[test]
    fn camera_views_partition_the_circle() {
        let c = Point3::new(5.0, 5.0, 5.0);
        let views = camera_views(c, 1, WeightParams::default()).unwrap();
        for step in 0..720 {
            let p = on_circle_x(&c, f64::from(step) * 0.5);
            let sum: f64 = views.iter().map(|(_, _, w)| w.weight(&p)).sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn view_angles() {
        assert_eq!(view_angle(Camera::First, Illumination::Left, 0, 45), 135);
        assert_eq!(view_angle(Camera::First, Illumination::Right, 0, 45), 225);
        assert_eq!(view_angle(Camera::Second, Illumination::Right, 1, 45), 360);
    }
}
