use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{IoError, Result};

/// A scalar stored big-endian at a fixed width per vertex.
pub trait VertexScalar: Copy + Default {
    const WIDTH: usize;

    /// Decodes one value from exactly [`WIDTH`](Self::WIDTH) bytes.
    fn read_be(bytes: &[u8]) -> Self;

    fn write_be(self, out: &mut Vec<u8>);
}

macro_rules! vertex_scalar {
    ($($t:ty),*) => {$(
        impl VertexScalar for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();

            fn read_be(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(bytes);
                <$t>::from_be_bytes(raw)
            }

            fn write_be(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_be_bytes());
            }
        }
    )*};
}

vertex_scalar!(u16, i32, u32, f32);

/// Fills `buffer` from the raw big-endian file at `path`.
///
/// Extra bytes past `buffer.len()` values are ignored; if the file is
/// short, the remaining entries keep their current values. Returns the
/// number of values read.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_vertex_buffer<T: VertexScalar>(path: &Path, buffer: &mut [T]) -> Result<usize> {
    let bytes = fs::read(path).map_err(|e| IoError::access(path, "read", e))?;
    let available = bytes.len() / T::WIDTH;
    if available < buffer.len() {
        tracing::warn!(
            path = %path.display(),
            expected = buffer.len(),
            available,
            "vertex buffer file is short"
        );
    }
    let mut count = 0;
    for (slot, chunk) in buffer.iter_mut().zip(bytes.chunks_exact(T::WIDTH)) {
        *slot = T::read_be(chunk);
        count += 1;
    }
    Ok(count)
}

/// Reads a buffer of `vertex_count` values, zero-filling past a short file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn load_vertex_buffer<T: VertexScalar>(path: &Path, vertex_count: usize) -> Result<Vec<T>> {
    let mut buffer = vec![T::default(); vertex_count];
    read_vertex_buffer(path, &mut buffer)?;
    Ok(buffer)
}

/// Writes `buffer` as raw big-endian values.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_vertex_buffer<T: VertexScalar>(path: &Path, buffer: &[T]) -> Result<()> {
    let mut bytes = Vec::with_capacity(buffer.len() * T::WIDTH);
    for &value in buffer {
        value.write_be(&mut bytes);
    }
    let file = File::create(path).map_err(|e| IoError::access(path, "create", e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(&bytes)
        .map_err(|e| IoError::access(path, "write", e))?;
    writer
        .flush()
        .map_err(|e| IoError::access(path, "write", e))?;
    Ok(())
}
