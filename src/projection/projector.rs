use std::sync::Arc;

use crate::error::{ConfigError, Result, SequenceError};
use crate::sample::Sample;

use super::{CorrespondenceTable, StackSource};

/// A borrowed row-major image plane.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
}

impl<'a, T: Copy> Plane<'a, T> {
    /// Wraps `data` as a `width × height` plane.
    ///
    /// # Errors
    ///
    /// Returns an error if `data.len() != width * height`.
    pub fn new(data: &'a [T], width: usize, height: usize) -> Result<Self> {
        if width.checked_mul(height) != Some(data.len()) {
            return Err(ConfigError::InvalidParameter(format!(
                "plane of {} pixels is not {width}x{height}",
                data.len()
            ))
            .into());
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at column `x`, row `y`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are outside the plane.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }
}

/// Progress of the stack currently being projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    InProgress,
    /// The last depth plane has been applied.
    Complete,
}

/// Accumulates per-vertex maxima while the planes of one stack stream in.
///
/// Call [`reset`](Self::reset) before the first plane of every stack, then
/// [`project_plane`](Self::project_plane) once per depth index in increasing
/// order. Each call costs one table lookup per entry of that plane. The
/// projector is not shared between threads; run one per view.
#[derive(Debug, Clone)]
pub struct MaxProjector<T> {
    table: Arc<CorrespondenceTable>,
    buffers: Vec<Vec<T>>,
    next: Option<usize>,
}

impl<T: Sample> MaxProjector<T> {
    /// Creates a projector with one zeroed buffer per table layer.
    #[must_use]
    pub fn new(table: Arc<CorrespondenceTable>) -> Self {
        let buffers = vec![vec![T::default(); table.vertex_count()]; table.layer_count()];
        Self {
            table,
            buffers,
            next: None,
        }
    }

    #[must_use]
    pub fn table(&self) -> &Arc<CorrespondenceTable> {
        &self.table
    }

    /// Zeroes all buffers and expects depth plane 0 next.
    pub fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(T::default());
        }
        self.next = Some(0);
    }

    /// Folds depth plane `z` into the buffers.
    ///
    /// # Errors
    ///
    /// Returns a [`SequenceError`] if the projector was not reset, the stack
    /// is already complete, `z` is not the next depth index, or the plane is
    /// smaller than the table's image size. The buffers are unchanged on error.
    pub fn project_plane(&mut self, z: usize, plane: &Plane<'_, T>) -> Result<StackStatus> {
        let depth = self.table.depth();
        let Some(expected) = self.next else {
            return Err(SequenceError::NotReset { z }.into());
        };
        if expected >= depth {
            return Err(SequenceError::StackComplete { z }.into());
        }
        if z != expected {
            return Err(SequenceError::OutOfOrder { expected, got: z }.into());
        }
        if plane.width < self.table.width() || plane.height < self.table.height() {
            return Err(SequenceError::PlaneTooSmall {
                width: plane.width,
                height: plane.height,
                len: plane.data.len(),
                min_width: self.table.width(),
                min_height: self.table.height(),
            }
            .into());
        }

        for c in self.table.plane(z) {
            let value = plane.get(c.x as usize, c.y as usize);
            let slot = &mut self.buffers[usize::from(c.layer)][c.vertex as usize];
            if value > *slot {
                *slot = value;
            }
        }

        self.next = Some(z + 1);
        Ok(if z + 1 == depth {
            StackStatus::Complete
        } else {
            StackStatus::InProgress
        })
    }

    /// Resets and feeds every plane of `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source depth differs from the table depth, a
    /// plane cannot be loaded, or a plane is too small.
    pub fn project_stack(&mut self, source: &StackSource<T>) -> Result<()> {
        if source.depth() != self.table.depth() {
            return Err(ConfigError::InvalidParameter(format!(
                "stack has {} planes, table expects {}",
                source.depth(),
                self.table.depth()
            ))
            .into());
        }
        self.reset();
        for z in 0..source.depth() {
            let data = source.plane(z)?;
            let plane = Plane::new(&data, source.width(), source.height())?;
            self.project_plane(z, &plane)?;
        }
        Ok(())
    }

    /// Whether the last depth plane of the current stack has been applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.next == Some(self.table.depth())
    }

    /// The layer-0 buffer.
    #[must_use]
    pub fn buffer(&self) -> &[T] {
        self.layer(0)
    }

    /// Buffer of shell `layer`; empty if out of range.
    #[must_use]
    pub fn layer(&self, layer: usize) -> &[T] {
        self.buffers.get(layer).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn buffers(&self) -> &[Vec<T>] {
        &self.buffers
    }

    #[must_use]
    pub fn into_buffers(self) -> Vec<Vec<T>> {
        self.buffers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::SpimsphereError;
    use crate::math::{Point3, Vector3};
    use crate::mesh::{MakeSphere, Sphere};
    use crate::projection::{BuildCorrespondenceTable, ProjectionParams, VolumeGeometry};

    fn setup() -> (Sphere, Arc<CorrespondenceTable>) {
        let sphere = MakeSphere::new(Point3::new(16.0, 16.0, 16.0), 10.0, 4)
            .execute()
            .unwrap();
        let volume = VolumeGeometry::new(32, 32, 16, Vector3::new(1.0, 1.0, 2.0)).unwrap();
        let table = BuildCorrespondenceTable::new(&sphere, volume, ProjectionParams::default())
            .execute()
            .unwrap();
        (sphere, Arc::new(table))
    }

    fn gradient_stack(z_count: usize) -> Vec<Vec<u16>> {
        (0..z_count)
            .map(|z| {
                (0..32 * 32)
                    .map(|i| u16::try_from((i * 7 + z * 131) % 4096).unwrap())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn plane_before_reset_fails() {
        let (_, table) = setup();
        let mut projector = MaxProjector::<u16>::new(table);
        let data = vec![0u16; 32 * 32];
        let plane = Plane::new(&data, 32, 32).unwrap();
        let r = projector.project_plane(0, &plane);
        assert!(matches!(
            r,
            Err(SpimsphereError::Sequence(SequenceError::NotReset { z: 0 }))
        ));
    }

    #[test]
    fn out_of_order_plane_fails_and_keeps_state() {
        let (_, table) = setup();
        let mut projector = MaxProjector::<u16>::new(table);
        projector.reset();
        let data = vec![5u16; 32 * 32];
        let plane = Plane::new(&data, 32, 32).unwrap();
        let r = projector.project_plane(1, &plane);
        assert!(matches!(
            r,
            Err(SpimsphereError::Sequence(SequenceError::OutOfOrder {
                expected: 0,
                got: 1
            }))
        ));
        assert!(projector.buffer().iter().all(|&v| v == 0));
        assert!(projector.project_plane(0, &plane).is_ok());
    }

    #[test]
    fn small_plane_fails() {
        let (_, table) = setup();
        let mut projector = MaxProjector::<u16>::new(table);
        projector.reset();
        let data = vec![0u16; 16 * 16];
        let plane = Plane::new(&data, 16, 16).unwrap();
        assert!(matches!(
            projector.project_plane(0, &plane),
            Err(SpimsphereError::Sequence(SequenceError::PlaneTooSmall { .. }))
        ));
    }

    #[test]
    fn completes_after_last_plane() {
        let (_, table) = setup();
        let mut projector = MaxProjector::<u16>::new(table);
        projector.reset();
        let data = vec![1u16; 32 * 32];
        let plane = Plane::new(&data, 32, 32).unwrap();
        for z in 0..15 {
            assert_eq!(projector.project_plane(z, &plane).unwrap(), StackStatus::InProgress);
        }
        assert_eq!(projector.project_plane(15, &plane).unwrap(), StackStatus::Complete);
        assert!(projector.is_complete());
        assert!(matches!(
            projector.project_plane(16, &plane),
            Err(SpimsphereError::Sequence(SequenceError::StackComplete { z: 16 }))
        ));
    }

    #[test]
    fn buffer_holds_ray_maximum() {
        let (_, table) = setup();
        let stack = gradient_stack(16);
        let mut projector = MaxProjector::<u16>::new(Arc::clone(&table));
        projector.reset();
        for (z, data) in stack.iter().enumerate() {
            projector.project_plane(z, &Plane::new(data, 32, 32).unwrap()).unwrap();
        }
        let mut expected = vec![0u16; table.vertex_count()];
        for (z, data) in stack.iter().enumerate() {
            for c in table.plane(z) {
                let v = data[c.y as usize * 32 + c.x as usize];
                expected[c.vertex as usize] = expected[c.vertex as usize].max(v);
            }
        }
        assert_eq!(projector.buffer(), expected.as_slice());
    }

    #[test]
    fn projection_is_idempotent_after_reset() {
        let (_, table) = setup();
        let source = StackSource::InMemory {
            planes: gradient_stack(16),
            width: 32,
            height: 32,
        };
        let mut projector = MaxProjector::<u16>::new(table);
        projector.project_stack(&source).unwrap();
        let first = projector.buffer().to_vec();
        projector.project_stack(&source).unwrap();
        assert_eq!(projector.buffer(), first.as_slice());
    }

    #[test]
    fn project_stack_checks_depth() {
        let (_, table) = setup();
        let source = StackSource::InMemory {
            planes: gradient_stack(3),
            width: 32,
            height: 32,
        };
        let mut projector = MaxProjector::<u16>::new(table);
        assert!(projector.project_stack(&source).is_err());
    }
}
