use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the spherical projection engine.
#[derive(Debug, Error)]
pub enum SpimsphereError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("operation cancelled")]
    Cancelled,
}

/// Errors related to geometric input.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("parameter {parameter} = {value} is out of range [{min}, {max}]")]
    ParameterOutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    #[error("empty point set: {0}")]
    EmptyPointSet(&'static str),
}

/// Errors detected while setting up a component.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid angle {value} for {parameter}")]
    InvalidAngle { parameter: &'static str, value: f64 },

    #[error("vertex count mismatch: expected {expected}, got {actual}")]
    VertexCountMismatch { expected: usize, actual: usize },

    #[error("view count mismatch: expected {expected}, got {actual}")]
    ViewCountMismatch { expected: usize, actual: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// File access and parse errors, annotated with the offending path.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot {operation} {}: {source}", path.display())]
    Access {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

impl IoError {
    /// Wraps a failed file operation on `path`.
    #[must_use]
    pub fn access(
        path: impl Into<PathBuf>,
        operation: &'static str,
        source: std::io::Error,
    ) -> Self {
        Self::Access {
            path: path.into(),
            operation,
            source,
        }
    }
}

/// Violations of the streaming projection call contract.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("plane {z} delivered before reset")]
    NotReset { z: usize },

    #[error("plane {got} delivered out of order, expected {expected}")]
    OutOfOrder { expected: usize, got: usize },

    #[error("plane {z} delivered after the stack was complete")]
    StackComplete { z: usize },

    #[error("plane is {width}x{height} ({len} samples), table needs {min_width}x{min_height}")]
    PlaneTooSmall {
        width: usize,
        height: usize,
        len: usize,
        min_width: usize,
        min_height: usize,
    },
}

/// Errors of the bounded frame queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("frame queue overflow: capacity {capacity} exhausted")]
    Overflow { capacity: usize },

    #[error("frame queue disconnected")]
    Disconnected,
}

/// Convenience type alias for results using [`SpimsphereError`].
pub type Result<T> = std::result::Result<T, SpimsphereError>;
