use rayon::prelude::*;

use crate::error::{ConfigError, Result};
use crate::mesh::Sphere;
use crate::sample::Sample;

use super::{histogram_mode, FusionParams, FusionView};

/// Blends per-view vertex buffers of one sphere into a single buffer.
///
/// Weights of every view at every vertex are evaluated once on
/// construction; each [`fuse`](Self::fuse) call is then a weighted average
/// per vertex. Vertices no view claims fuse to 0.
#[derive(Debug, Clone)]
pub struct Fusion {
    vertex_count: usize,
    weights: Vec<Vec<f64>>,
    params: FusionParams,
}

impl Fusion {
    /// Evaluates the weight of every view at every vertex of `sphere`.
    ///
    /// # Errors
    ///
    /// Returns an error if `views` is empty.
    pub fn new(sphere: &Sphere, views: &[FusionView], params: FusionParams) -> Result<Self> {
        if views.is_empty() {
            return Err(ConfigError::InvalidParameter("fusion needs at least one view".into()).into());
        }
        let vertices = sphere.mesh().vertices();
        let weights: Vec<Vec<f64>> = views
            .par_iter()
            .map(|view| vertices.iter().map(|v| view.weight_at(v)).collect())
            .collect();

        let unclaimed = (0..vertices.len())
            .filter(|&v| weights.iter().all(|w| w[v] <= 0.0))
            .count();
        if unclaimed > 0 {
            tracing::warn!(unclaimed, "vertices without any view weight fuse to zero");
        }

        Ok(Self {
            vertex_count: vertices.len(),
            weights,
            params,
        })
    }

    #[must_use]
    pub fn view_count(&self) -> usize {
        self.weights.len()
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    #[must_use]
    pub fn params(&self) -> &FusionParams {
        &self.params
    }

    /// Per-vertex weights of one view.
    #[must_use]
    pub fn weights(&self, view: usize) -> &[f64] {
        self.weights.get(view).map_or(&[], Vec::as_slice)
    }

    fn check_inputs(&self, lens: impl ExactSizeIterator<Item = usize>) -> Result<()> {
        if lens.len() != self.view_count() {
            return Err(ConfigError::ViewCountMismatch {
                expected: self.view_count(),
                actual: lens.len(),
            }
            .into());
        }
        for len in lens {
            if len != self.vertex_count {
                return Err(ConfigError::VertexCountMismatch {
                    expected: self.vertex_count,
                    actual: len,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Offset added to each view so that its histogram mode matches view 0.
    fn mode_offsets<T: Sample>(&self, buffers: &[&[T]]) -> Option<Vec<f64>> {
        if !self.params.adjust_modes {
            return None;
        }
        let modes: Vec<f64> = buffers
            .iter()
            .map(|b| histogram_mode(b, self.params.mode_smoothing))
            .collect();
        let reference = modes[0];
        tracing::debug!(?modes, "aligning view intensity modes");
        Some(modes.iter().map(|m| reference - m).collect())
    }

    /// Weighted average of `buffers`, one per view in construction order,
    /// as `f32`.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of buffers differs from the number of
    /// views or a buffer length differs from the vertex count.
    pub fn fuse<T: Sample>(&self, buffers: &[&[T]]) -> Result<Vec<f32>> {
        self.fuse_as(buffers)
    }

    /// Weighted average of `buffers` converted to `U`.
    ///
    /// Integer outputs are rounded and saturated, so fusing 16-bit views
    /// into `u16` keeps the file format of the projections.
    ///
    /// # Errors
    ///
    /// Same as [`fuse`](Self::fuse).
    pub fn fuse_as<T: Sample, U: Sample>(&self, buffers: &[&[T]]) -> Result<Vec<U>> {
        self.check_inputs(buffers.iter().map(|b| b.len()))?;
        let offsets = self.mode_offsets(buffers);
        Ok(self.fuse_with_offsets(buffers, offsets.as_deref()))
    }

    fn fuse_with_offsets<T: Sample, U: Sample>(
        &self,
        buffers: &[&[T]],
        offsets: Option<&[f64]>,
    ) -> Vec<U> {
        let mut zero_sum = 0usize;
        let fused = (0..self.vertex_count)
            .map(|v| {
                let mut sum = 0.0;
                let mut total = 0.0;
                for (i, (buffer, weights)) in buffers.iter().zip(&self.weights).enumerate() {
                    let w = weights[v];
                    if w <= 0.0 {
                        continue;
                    }
                    // Shifted values saturate in the source type
                    let value = match offsets {
                        Some(o) => T::from_f64(buffer[v].to_f64() + o[i]).to_f64(),
                        None => buffer[v].to_f64(),
                    };
                    sum += w * value;
                    total += w;
                }
                if total > 0.0 {
                    U::from_f64(sum / total)
                } else {
                    zero_sum += 1;
                    U::default()
                }
            })
            .collect();

        if zero_sum > 0 {
            tracing::warn!(vertices = zero_sum, "zero weight sum, fused value set to 0");
        }
        fused
    }

    /// Fuses multi-layer projections, `views[i][layer]`, layer by layer.
    ///
    /// Mode offsets are measured on layer 0 and applied to layer 0 only;
    /// the other layers are averaged as they are.
    ///
    /// # Errors
    ///
    /// Returns an error if the views disagree on the layer count or a layer
    /// has the wrong number of views or vertices.
    pub fn fuse_layers<T: Sample, U: Sample>(&self, views: &[Vec<Vec<T>>]) -> Result<Vec<Vec<U>>> {
        let layers = views.first().map_or(0, Vec::len);
        if let Some(bad) = views.iter().find(|v| v.len() != layers) {
            return Err(ConfigError::InvalidParameter(format!(
                "views have {} and {} layers",
                layers,
                bad.len()
            ))
            .into());
        }
        (0..layers)
            .map(|l| {
                let buffers: Vec<&[T]> = views.iter().map(|v| v[l].as_slice()).collect();
                self.check_inputs(buffers.iter().map(|b| b.len()))?;
                let offsets = if l == 0 { self.mode_offsets(&buffers) } else { None };
                Ok(self.fuse_with_offsets(&buffers, offsets.as_deref()))
            })
            .collect()
    }

    /// Packed `0xRRGGBB` overlay mixing each view's color by its weight.
    ///
    /// # Errors
    ///
    /// Returns an error if `colors` does not hold one color per view.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn contributions(&self, colors: &[u32]) -> Result<Vec<u32>> {
        if colors.len() != self.view_count() {
            return Err(ConfigError::ViewCountMismatch {
                expected: self.view_count(),
                actual: colors.len(),
            }
            .into());
        }
        let channels: Vec<[f64; 3]> = colors
            .iter()
            .map(|c| {
                [
                    f64::from((c >> 16) & 0xff),
                    f64::from((c >> 8) & 0xff),
                    f64::from(c & 0xff),
                ]
            })
            .collect();

        Ok((0..self.vertex_count)
            .map(|v| {
                let mut rgb = [0.0f64; 3];
                let mut total = 0.0;
                for (weights, color) in self.weights.iter().zip(&channels) {
                    let w = weights[v];
                    for (acc, c) in rgb.iter_mut().zip(color) {
                        *acc += w * c;
                    }
                    total += w;
                }
                if total <= 0.0 {
                    return 0;
                }
                rgb.iter()
                    .fold(0u32, |packed, c| (packed << 8) | (c / total).clamp(0.0, 255.0) as u32)
            })
            .collect())
    }

    /// Weights of one view scaled to `0..=100`.
    ///
    /// # Errors
    ///
    /// Returns an error if `view` is out of range.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn weight_map(&self, view: usize) -> Result<Vec<u16>> {
        let weights = self.weights.get(view).ok_or(ConfigError::ViewCountMismatch {
            expected: self.view_count(),
            actual: view + 1,
        })?;
        Ok(weights
            .iter()
            .map(|w| (100.0 * w).clamp(0.0, 100.0) as u16)
            .collect())
    }
}
