use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{IoError, Result};
use crate::math::Matrix4;

const NONE_TOKEN: &str = "null";

/// Reads one transform per line: 16 row-major values, or `null` for none.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a line is malformed.
pub fn read_transforms(path: &Path) -> Result<Vec<Option<Matrix4>>> {
    let file = File::open(path).map_err(|e| IoError::access(path, "open", e))?;
    let mut transforms = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| IoError::access(path, "read", e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == NONE_TOKEN {
            transforms.push(None);
            continue;
        }
        let parse_error = |message: String| IoError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            message,
        };
        let values = line
            .split_whitespace()
            .map(|t| {
                t.parse::<f64>()
                    .map_err(|_| parse_error(format!("invalid number `{t}`")))
            })
            .collect::<std::result::Result<Vec<f64>, IoError>>()?;
        if values.len() != 16 {
            return Err(parse_error(format!("expected 16 values, found {}", values.len())).into());
        }
        transforms.push(Some(Matrix4::from_row_slice(&values)));
    }
    Ok(transforms)
}

/// Writes transforms in the format of [`read_transforms`].
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_transforms(path: &Path, transforms: &[Option<Matrix4>]) -> Result<()> {
    let file = File::create(path).map_err(|e| IoError::access(path, "create", e))?;
    let mut writer = BufWriter::new(file);
    let write_error = |e| IoError::access(path, "write", e);
    for transform in transforms {
        let line = match transform {
            Some(m) => m
                .transpose()
                .iter()
                .map(f64::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            None => NONE_TOKEN.to_string(),
        };
        writeln!(writer, "{line}").map_err(write_error)?;
    }
    writer.flush().map_err(write_error)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::SpimsphereError;
    use crate::math::Vector3;
    use std::fs;

    #[test]
    fn null_lines_and_row_major_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transforms.txt");
        let shift = Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0));
        write_transforms(&path, &[None, Some(shift)]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "null");
        assert_eq!(lines[1], "1 0 0 1 0 1 0 2 0 0 1 3 0 0 0 1");

        assert_eq!(read_transforms(&path).unwrap(), vec![None, Some(shift)]);
    }

    #[test]
    fn short_line_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "null\n1 0 0 0\n").unwrap();
        assert!(matches!(
            read_transforms(&path).unwrap_err(),
            SpimsphereError::Io(IoError::Parse { line: 2, .. })
        ));
    }
}
