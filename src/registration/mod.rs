mod icp;

pub use icp::{best_rigid, Icp, IcpResult};

use crate::error::{ConfigError, Result};
use crate::math::Point3;
use crate::mesh::Sphere;
use crate::sample::Sample;

/// Parameters of [`Icp`].
#[derive(Debug, Clone, Copy)]
pub struct IcpParams {
    /// Hard cap on ICP iterations.
    pub max_iterations: usize,
    /// Fraction of the closest correspondences kept for the final refit.
    pub ratio_to_use: f64,
    /// Minimum vertex value for a vertex to enter the point sets of
    /// [`register_buffers`].
    pub intensity_threshold: f64,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            ratio_to_use: 0.9,
            intensity_threshold: 1600.0,
        }
    }
}

impl IcpParams {
    fn validate(&self) -> Result<()> {
        if !(self.ratio_to_use > 0.0 && self.ratio_to_use <= 1.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "ICP inlier ratio {} must be in (0, 1]",
                self.ratio_to_use
            ))
            .into());
        }
        Ok(())
    }
}

/// A source point, its nearest target point and their squared distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointMatch {
    pub source: Point3,
    pub target: Point3,
    pub distance_sq: f64,
}

impl PointMatch {
    #[must_use]
    pub fn new(source: Point3, target: Point3) -> Self {
        Self {
            source,
            target,
            distance_sq: (target - source).norm_squared(),
        }
    }
}

/// Positions of the vertices whose value exceeds `threshold`.
///
/// # Errors
///
/// Returns an error if the buffer length differs from the vertex count.
pub fn threshold_points<T: Sample>(sphere: &Sphere, buffer: &[T], threshold: f64) -> Result<Vec<Point3>> {
    sphere.check_buffer_len(buffer.len())?;
    Ok(sphere
        .mesh()
        .vertices()
        .iter()
        .zip(buffer)
        .filter(|(_, v)| v.to_f64() > threshold)
        .map(|(p, _)| *p)
        .collect())
}

/// Positions of the vertices above `threshold` that are not exceeded by
/// any mesh neighbor.
///
/// # Errors
///
/// Returns an error if the buffer length differs from the vertex count.
pub fn local_maxima<T: Sample>(sphere: &Sphere, buffer: &[T], threshold: f64) -> Result<Vec<Point3>> {
    sphere.check_buffer_len(buffer.len())?;
    let vertices = sphere.mesh().vertices();
    Ok(sphere
        .adjacency()
        .iter()
        .enumerate()
        .filter(|&(v, neighbors)| {
            let value = buffer[v].to_f64();
            value > threshold
                && neighbors
                    .iter()
                    .all(|&n| buffer[n as usize].to_f64() <= value)
        })
        .map(|(v, _)| vertices[v])
        .collect())
}

/// Registers the bright vertices of `source` onto those of `target`, both
/// buffers living on `sphere`, rotating about the sphere center.
///
/// # Errors
///
/// Returns an error if a buffer does not match the sphere, the parameters
/// are invalid, or no vertex exceeds the intensity threshold.
pub fn register_buffers<T: Sample>(
    sphere: &Sphere,
    source: &[T],
    target: &[T],
    params: IcpParams,
) -> Result<IcpResult> {
    let src = threshold_points(sphere, source, params.intensity_threshold)?;
    let tgt = threshold_points(sphere, target, params.intensity_threshold)?;
    Icp::new(&src, &tgt, *sphere.center(), params).execute()
}
