use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::error::{IoError, Result};
use crate::math::Point3;
use crate::mesh::{IndexedMesh, Sphere};

fn parse_fields<T: FromStr, const N: usize>(
    path: &Path,
    line: usize,
    fields: &[&str],
) -> Result<[T; N]> {
    let parse_error = |message: String| IoError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    };
    if fields.len() != N {
        return Err(parse_error(format!("expected {N} values, found {}", fields.len())).into());
    }
    let mut values = Vec::with_capacity(N);
    for field in fields {
        values.push(
            field
                .parse::<T>()
                .map_err(|_| parse_error(format!("invalid number `{field}`")))?,
        );
    }
    values
        .try_into()
        .map_err(|_| parse_error("value count changed while parsing".into()).into())
}

/// Reads a mesh from `v x y z` and `f i j k` lines (0-based indices).
///
/// All vertex lines must precede the face lines. Blank lines and lines
/// starting with `#` are skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a line is malformed, or a
/// face references a missing vertex.
pub fn read_mesh(path: &Path) -> Result<IndexedMesh> {
    let file = File::open(path).map_err(|e| IoError::access(path, "open", e))?;
    let reader = BufReader::new(file);

    let mut vertices = Vec::new();
    let mut faces = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| IoError::access(path, "read", e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let tag = parts.next().unwrap_or_default();
        let fields: Vec<&str> = parts.collect();
        match tag {
            "v" => {
                if !faces.is_empty() {
                    return Err(IoError::Parse {
                        path: path.to_path_buf(),
                        line: line_no,
                        message: "vertex after face lines".into(),
                    }
                    .into());
                }
                let [x, y, z] = parse_fields::<f64, 3>(path, line_no, &fields)?;
                vertices.push(Point3::new(x, y, z));
            }
            "f" => faces.push(parse_fields::<u32, 3>(path, line_no, &fields)?),
            other => {
                return Err(IoError::Parse {
                    path: path.to_path_buf(),
                    line: line_no,
                    message: format!("unknown record `{other}`"),
                }
                .into());
            }
        }
    }
    IndexedMesh::new(vertices, faces)
}

/// Reads a sphere mesh, taking the vertex centroid as center and the mean
/// vertex distance from it as radius.
///
/// # Errors
///
/// Returns an error if the mesh cannot be read, has no vertices, or has no
/// extent.
#[allow(clippy::cast_precision_loss)]
pub fn read_sphere(path: &Path) -> Result<Sphere> {
    let mesh = read_mesh(path)?;
    let center = mesh.center_of_gravity();
    let radius = if mesh.vertex_count() == 0 {
        0.0
    } else {
        mesh.vertices().iter().map(|v| (v - center).norm()).sum::<f64>()
            / mesh.vertex_count() as f64
    };
    Sphere::new(mesh, center, radius)
}

/// Writes `mesh` as `v` lines followed by `f` lines.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_mesh(path: &Path, mesh: &IndexedMesh) -> Result<()> {
    let file = File::create(path).map_err(|e| IoError::access(path, "create", e))?;
    let mut writer = BufWriter::new(file);
    let write_error = |e| IoError::access(path, "write", e);
    for v in mesh.vertices() {
        writeln!(writer, "v {} {} {}", v.x, v.y, v.z).map_err(write_error)?;
    }
    for [a, b, c] in mesh.faces() {
        writeln!(writer, "f {a} {b} {c}").map_err(write_error)?;
    }
    writer.flush().map_err(write_error)?;
    Ok(())
}
