use std::borrow::Cow;
use std::fmt;

use crate::error::{ConfigError, Result};
use crate::sample::Sample;

/// Loads depth plane `z` of a stack on demand.
pub type PlaneLoader<T> = Box<dyn Fn(usize) -> Result<Vec<T>> + Send + Sync>;

/// Where the planes of a stack come from.
pub enum StackSource<T> {
    /// All planes resident in memory, row-major.
    InMemory {
        planes: Vec<Vec<T>>,
        width: usize,
        height: usize,
    },
    /// Planes produced by a loader, one call per plane.
    Lazy {
        width: usize,
        height: usize,
        depth: usize,
        loader: PlaneLoader<T>,
    },
    /// Each plane is the pixelwise maximum of `group` consecutive planes of
    /// `inner`, e.g. both illumination sides of one depth index.
    Projected {
        inner: Box<StackSource<T>>,
        group: usize,
    },
}

impl<T> fmt::Debug for StackSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InMemory {
                planes,
                width,
                height,
            } => f
                .debug_struct("InMemory")
                .field("depth", &planes.len())
                .field("width", width)
                .field("height", height)
                .finish(),
            Self::Lazy {
                width,
                height,
                depth,
                ..
            } => f
                .debug_struct("Lazy")
                .field("depth", depth)
                .field("width", width)
                .field("height", height)
                .finish_non_exhaustive(),
            Self::Projected { inner, group } => f
                .debug_struct("Projected")
                .field("inner", inner)
                .field("group", group)
                .finish(),
        }
    }
}

impl<T: Sample> StackSource<T> {
    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            Self::InMemory { width, .. } | Self::Lazy { width, .. } => *width,
            Self::Projected { inner, .. } => inner.width(),
        }
    }

    #[must_use]
    pub fn height(&self) -> usize {
        match self {
            Self::InMemory { height, .. } | Self::Lazy { height, .. } => *height,
            Self::Projected { inner, .. } => inner.height(),
        }
    }

    /// Number of depth planes; a trailing partial group is dropped.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::InMemory { planes, .. } => planes.len(),
            Self::Lazy { depth, .. } => *depth,
            Self::Projected { inner, group } => inner.depth().checked_div(*group).unwrap_or(0),
        }
    }

    /// Plane `z`, borrowed when resident.
    ///
    /// # Errors
    ///
    /// Returns an error if `z` is out of range, the loader fails, or a
    /// plane does not have `width * height` samples.
    pub fn plane(&self, z: usize) -> Result<Cow<'_, [T]>> {
        if z >= self.depth() {
            return Err(ConfigError::InvalidParameter(format!(
                "plane {z} outside stack of depth {}",
                self.depth()
            ))
            .into());
        }
        let expected = self.width() * self.height();
        let plane = match self {
            Self::InMemory { planes, .. } => Cow::Borrowed(planes[z].as_slice()),
            Self::Lazy { loader, .. } => Cow::Owned(loader(z)?),
            Self::Projected { inner, group } => {
                let mut merged = inner.plane(z * group)?.into_owned();
                for i in 1..*group {
                    let next = inner.plane(z * group + i)?;
                    for (m, &v) in merged.iter_mut().zip(next.iter()) {
                        if v > *m {
                            *m = v;
                        }
                    }
                }
                Cow::Owned(merged)
            }
        };
        if plane.len() != expected {
            return Err(ConfigError::InvalidParameter(format!(
                "plane {z} has {} samples, expected {expected}",
                plane.len()
            ))
            .into());
        }
        Ok(plane)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn planes() -> Vec<Vec<u16>> {
        vec![vec![1, 9, 3, 4], vec![5, 2, 7, 0], vec![0, 0, 8, 8], vec![6, 6, 6, 6]]
    }

    #[test]
    fn in_memory_borrows() {
        let s = StackSource::InMemory {
            planes: planes(),
            width: 2,
            height: 2,
        };
        assert_eq!(s.depth(), 4);
        assert!(matches!(s.plane(1).unwrap(), Cow::Borrowed(_)));
        assert!(s.plane(4).is_err());
    }

    #[test]
    fn lazy_calls_loader_per_plane() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let s: StackSource<u16> = StackSource::Lazy {
            width: 2,
            height: 1,
            depth: 3,
            loader: Box::new(move |z| {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(vec![u16::try_from(z).unwrap(); 2])
            }),
        };
        assert_eq!(s.plane(2).unwrap().as_ref(), &[2, 2]);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn lazy_rejects_wrong_plane_size() {
        let s: StackSource<u16> = StackSource::Lazy {
            width: 2,
            height: 2,
            depth: 1,
            loader: Box::new(|_| Ok(vec![0; 3])),
        };
        assert!(s.plane(0).is_err());
    }

    #[test]
    fn projected_takes_pairwise_maximum() {
        let s = StackSource::Projected {
            inner: Box::new(StackSource::InMemory {
                planes: planes(),
                width: 2,
                height: 2,
            }),
            group: 2,
        };
        assert_eq!(s.depth(), 2);
        assert_eq!(s.plane(0).unwrap().as_ref(), &[5, 9, 7, 4]);
        assert_eq!(s.plane(1).unwrap().as_ref(), &[6, 6, 8, 8]);
    }
}
