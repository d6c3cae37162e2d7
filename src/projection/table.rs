use parking_lot::Mutex;
use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::error::{ConfigError, Result};
use crate::math::{Matrix4, Point3, TOLERANCE};
use crate::mesh::Sphere;
use crate::weight::FusionWeight;

use super::{ProjectionParams, VolumeGeometry};

/// Vertices marched per unit of parallel work.
const CHUNK_VERTICES: usize = 256;

/// One voxel a vertex ray passes through, keyed by its depth plane in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Correspondence {
    pub y: u32,
    pub x: u32,
    pub vertex: u32,
    /// Shell index, 0 for single-layer tables.
    pub layer: u16,
}

/// Per-depth-plane lists of the voxels each vertex ray samples.
///
/// Immutable once built; share it between projectors with an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceTable {
    width: usize,
    height: usize,
    vertex_count: usize,
    layer_count: usize,
    planes: Vec<Vec<Correspondence>>,
}

impl CorrespondenceTable {
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of depth planes.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.planes.len()
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layer_count
    }

    /// Entries of depth plane `z`; empty if `z` is out of range.
    #[must_use]
    pub fn plane(&self, z: usize) -> &[Correspondence] {
        self.planes.get(z).map_or(&[], Vec::as_slice)
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.planes.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.planes.iter().all(Vec::is_empty)
    }

    /// All entries of one vertex as `(z, entry)` pairs.
    pub fn entries_for_vertex(&self, vertex: u32) -> impl Iterator<Item = (usize, &Correspondence)> {
        self.planes.iter().enumerate().flat_map(move |(z, plane)| {
            plane
                .iter()
                .filter(move |c| c.vertex == vertex)
                .map(move |c| (z, c))
        })
    }

    /// Marks the vertices that have at least one entry.
    #[must_use]
    pub fn covered_vertices(&self) -> Vec<bool> {
        let mut covered = vec![false; self.vertex_count];
        for c in self.planes.iter().flatten() {
            covered[c.vertex as usize] = true;
        }
        covered
    }
}

/// Builds the [`CorrespondenceTable`] of one view.
///
/// Every vertex casts a ray from the sphere center through itself. The ray
/// is walked in steps sized so that no voxel axis advances by more than one
/// voxel per step, `shell_fraction * radius` to either side of the vertex
/// (and of each deeper shell in multi-layer mode). Visited voxels inside the
/// volume are recorded under their depth plane.
///
/// Fixed-size vertex ranges are processed in parallel, each collecting
/// private per-plane lists that are appended to the shared table under one
/// lock. A cancel token is polled before every range.
pub struct BuildCorrespondenceTable<'a> {
    sphere: &'a Sphere,
    volume: VolumeGeometry,
    params: ProjectionParams,
    weight: Option<&'a dyn FusionWeight>,
    transform: Option<Matrix4>,
    cancel: Option<&'a CancelToken>,
}

impl<'a> BuildCorrespondenceTable<'a> {
    /// Creates a new `BuildCorrespondenceTable` operation.
    #[must_use]
    pub fn new(sphere: &'a Sphere, volume: VolumeGeometry, params: ProjectionParams) -> Self {
        Self {
            sphere,
            volume,
            params,
            weight: None,
            transform: None,
            cancel: None,
        }
    }

    /// Skips vertices whose weight for this view is zero.
    #[must_use]
    pub fn with_weight(mut self, weight: &'a dyn FusionWeight) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Moves the sphere into this view's coordinate frame before marching.
    #[must_use]
    pub fn with_transform(mut self, transform: Matrix4) -> Self {
        self.transform = Some(transform);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    /// Executes the build.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid, the mesh has more
    /// vertices than fit a `u32`, or the build was cancelled.
    #[allow(clippy::cast_possible_truncation)]
    pub fn execute(&self) -> Result<CorrespondenceTable> {
        self.params.validate()?;

        // Work in the view's frame when a transform is given
        let transformed;
        let sphere = match &self.transform {
            Some(m) => {
                transformed = self.sphere.transformed(m);
                &transformed
            }
            None => self.sphere,
        };
        let vertices = sphere.mesh().vertices();
        let center = *sphere.center();
        let radius = sphere.radius();
        let n = vertices.len();
        if u32::try_from(n).is_err() {
            return Err(ConfigError::InvalidParameter(format!("{n} vertices exceed u32 indices")).into());
        }

        // March fixed-size vertex ranges; cancellation is polled before each one
        let depth = self.volume.depth;
        let merged = Mutex::new(vec![Vec::new(); depth]);
        (0..n.div_ceil(CHUNK_VERTICES)).into_par_iter().for_each(|chunk| {
            if self.cancelled() {
                return;
            }
            let start = chunk * CHUNK_VERTICES;
            let end = (start + CHUNK_VERTICES).min(n);
            let mut local: Vec<Vec<Correspondence>> = vec![Vec::new(); depth];
            for (v, position) in (start..end).zip(&vertices[start..end]) {
                self.march(v as u32, position, &center, radius, &mut local);
            }
            let mut shared = merged.lock();
            for (plane, list) in shared.iter_mut().zip(&mut local) {
                plane.append(list);
            }
        });

        if let Some(cancel) = self.cancel {
            cancel.check()?;
        }

        // Sort each plane so the table does not depend on scheduling
        let mut planes = merged.into_inner();
        planes.par_iter_mut().for_each(|plane| {
            plane.sort_unstable();
            plane.dedup();
        });

        let table = CorrespondenceTable {
            width: self.volume.width,
            height: self.volume.height,
            vertex_count: n,
            layer_count: self.params.layer_count,
            planes,
        };
        tracing::info!(
            vertices = n,
            entries = table.len(),
            covered = table.covered_vertices().iter().filter(|&&c| c).count(),
            layers = table.layer_count,
            "built correspondence table"
        );
        Ok(table)
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn march(
        &self,
        vertex: u32,
        position: &Point3,
        center: &Point3,
        radius: f64,
        out: &mut [Vec<Correspondence>],
    ) {
        if self.weight.is_some_and(|w| w.weight(position) <= 0.0) {
            return;
        }
        let Some(dir) = (position - center).try_normalize(TOLERANCE) else {
            return;
        };

        let cal = &self.volume.calibration;
        let reach = (dir.x / cal.x)
            .abs()
            .max((dir.y / cal.y).abs())
            .max((dir.z / cal.z).abs());
        // Step so that no voxel axis advances by more than one voxel
        let step = 1.0 / reach;
        let k = (self.params.shell_fraction * radius / step).round() as i64;

        let (w, h, d) = (
            self.volume.width as f64,
            self.volume.height as f64,
            self.volume.depth as f64,
        );
        for layer in 0..self.params.layer_count {
            let base = position - dir * (layer as f64 * self.params.layer_width);
            for i in -k..=k {
                let pos = base + dir * (i as f64 * step);
                let x = (pos.x / cal.x).round();
                let y = (pos.y / cal.y).round();
                let z = (pos.z / cal.z).round();
                if x < 0.0 || y < 0.0 || z < 0.0 || x >= w || y >= h || z >= d {
                    continue;
                }
                out[z as usize].push(Correspondence {
                    y: y as u32,
                    x: x as u32,
                    vertex,
                    layer: layer as u16,
                });
            }
        }
    }
}
