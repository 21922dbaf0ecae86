use thiserror::Error;

/// Failures reported by the leveling and cropping pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LevelError {
    /// Zero-sized image, mismatched pixel buffer, or an unusable option value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// cos(2θ) is too close to zero for the inscribed-crop formula.
    #[error("rotation too close to 45° ({degrees:.2}°), cannot compute crop")]
    SingularRotation { degrees: f64 },

    /// The solver produced a crop with a non-positive side.
    #[error("crop would be empty ({width}x{height}px)")]
    DegenerateCrop { width: i64, height: i64 },
}

pub type Result<T> = std::result::Result<T, LevelError>;
