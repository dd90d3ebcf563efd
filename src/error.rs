//! Error types for chord decoding, estimation and network layers

use std::fmt;

/// Errors that can occur across the decoding, selection and layer modules
#[derive(Debug, Clone)]
pub enum ChordError {
    /// Decoding strategy name not recognized
    UnknownStrategy(String),

    /// Invalid caller-supplied parameter (penalty, window, hyperparameter, ...)
    InvalidParameter(String),

    /// Parallel sequences (decoded, labels, weights) disagree in length
    LengthMismatch(String),

    /// Assignment to a parameter name the layer never declared
    UndeclaredParameter(String),

    /// Nothing left to select from
    NoCandidates(String),

    /// Tensor shape incompatible with the declared or existing shape
    ShapeMismatch(String),

    /// A required input file does not exist
    MissingInputFile(String),

    /// Underlying I/O failure
    Io(String),

    /// JSON (de)serialization failure
    Serialization(String),
}

impl fmt::Display for ChordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChordError::UnknownStrategy(name) => write!(f, "Unknown decoding strategy: {}", name),
            ChordError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            ChordError::LengthMismatch(msg) => write!(f, "Length mismatch: {}", msg),
            ChordError::UndeclaredParameter(name) => write!(f, "Undeclared parameter: {}", name),
            ChordError::NoCandidates(msg) => write!(f, "No candidates: {}", msg),
            ChordError::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
            ChordError::MissingInputFile(path) => write!(f, "File does not exist: {}", path),
            ChordError::Io(msg) => write!(f, "I/O error: {}", msg),
            ChordError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for ChordError {}

impl From<std::io::Error> for ChordError {
    fn from(err: std::io::Error) -> Self {
        ChordError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChordError {
    fn from(err: serde_json::Error) -> Self {
        ChordError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ChordError {
    fn from(err: ndarray::ShapeError) -> Self {
        ChordError::ShapeMismatch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failure() {
        let err = ChordError::UnknownStrategy("beam".to_string());
        assert_eq!(err.to_string(), "Unknown decoding strategy: beam");

        let err = ChordError::MissingInputFile("/tmp/none.json".to_string());
        assert!(err.to_string().contains("/tmp/none.json"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ChordError = io.into();
        assert!(matches!(err, ChordError::Io(_)));
    }
}
