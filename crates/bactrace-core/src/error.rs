// crates/bactrace-core/src/error.rs

//! Error kinds surfaced by the engine.

use thiserror::Error;

/// Engine-level failures. Rejected change proposals are not errors; they
/// are skipped silently inside the annealing loop.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed configuration key.
    #[error("invalid config: {0}")]
    Config(String),

    /// An input image is not 8-bit grayscale, or could not be decoded.
    #[error(transparent)]
    ImageFormat(#[from] bactrace_imaging::ImagingError),

    /// Input frames must all share one shape.
    #[error("input frame {frame} has shape {got:?}, expected {expected:?}")]
    ShapeMismatch {
        frame: usize,
        got: (usize, usize),
        expected: (usize, usize),
    },

    /// The first-frame colony violates the per-cell invariants.
    #[error("initial colony violates constraints at cell \"{name}\"")]
    InitialConstraintViolation { name: String },

    /// Weighted frame selection disagreed with the per-frame cell counts.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
