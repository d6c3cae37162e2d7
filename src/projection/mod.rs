mod projector;
mod queue;
mod stack;
mod table;

pub use projector::{MaxProjector, Plane, StackStatus};
pub use queue::{consume_frames, frame_queue, Frame, FrameConsumer, FrameProducer};
pub use stack::{PlaneLoader, StackSource};
pub use table::{BuildCorrespondenceTable, Correspondence, CorrespondenceTable};

use crate::error::{ConfigError, Result};
use crate::math::Vector3;

/// Parameters of the ray sampling around each vertex.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionParams {
    /// Half-thickness of a sampled shell as a fraction of the sphere radius.
    pub shell_fraction: f64,
    /// Number of concentric shells sampled per vertex.
    pub layer_count: usize,
    /// Radial distance between consecutive shells, in calibrated units.
    /// Shell `l` is centered `l * layer_width` inside the sphere surface.
    pub layer_width: f64,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            shell_fraction: 0.2,
            layer_count: 1,
            layer_width: 140.0,
        }
    }
}

impl ProjectionParams {
    fn validate(&self) -> Result<()> {
        if !(self.shell_fraction >= 0.0 && self.shell_fraction.is_finite()) {
            return Err(ConfigError::InvalidParameter(format!(
                "shell fraction {} must be non-negative",
                self.shell_fraction
            ))
            .into());
        }
        if self.layer_count == 0 || self.layer_count > usize::from(u16::MAX) {
            return Err(ConfigError::InvalidParameter(format!(
                "layer count {} out of range",
                self.layer_count
            ))
            .into());
        }
        if self.layer_count > 1 && !(self.layer_width > 0.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "layer width {} must be positive",
                self.layer_width
            ))
            .into());
        }
        Ok(())
    }
}

/// Pixel dimensions and physical voxel size of the projected volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeGeometry {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    /// Physical size of one voxel along x, y and z.
    pub calibration: Vector3,
}

impl VolumeGeometry {
    /// Creates a volume description.
    ///
    /// # Errors
    ///
    /// Returns an error if a dimension is zero or a calibration entry is not positive.
    pub fn new(width: usize, height: usize, depth: usize, calibration: Vector3) -> Result<Self> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(ConfigError::InvalidParameter(format!(
                "volume {width}x{height}x{depth} has an empty dimension"
            ))
            .into());
        }
        if calibration.iter().any(|&c| !(c > 0.0 && c.is_finite())) {
            return Err(ConfigError::InvalidParameter(format!(
                "calibration {:?} must be positive",
                calibration.as_slice()
            ))
            .into());
        }
        Ok(Self {
            width,
            height,
            depth,
            calibration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_validation() {
        assert!(VolumeGeometry::new(1, 1, 1, Vector3::new(1.0, 1.0, 1.0)).is_ok());
        assert!(VolumeGeometry::new(0, 1, 1, Vector3::new(1.0, 1.0, 1.0)).is_err());
        assert!(VolumeGeometry::new(1, 1, 1, Vector3::new(1.0, 0.0, 1.0)).is_err());
    }

    #[test]
    fn params_validation() {
        assert!(ProjectionParams::default().validate().is_ok());
        let bad = ProjectionParams {
            layer_count: 0,
            ..ProjectionParams::default()
        };
        assert!(bad.validate().is_err());
        let bad = ProjectionParams {
            layer_count: 2,
            layer_width: 0.0,
            ..ProjectionParams::default()
        };
        assert!(bad.validate().is_err());
    }
}
