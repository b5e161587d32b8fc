//! Error types for performance inference

use thiserror::Error;

/// Performance inference error types
#[derive(Error, Debug)]
pub enum VrError {
    // ─── Configuration errors ────────────────────────────────────────────────
    /// Edge references a note outside `0..num_notes`
    #[error("Edge ({from} -> {to}) out of range for {num_notes} notes")]
    EdgeOutOfRange { from: i64, to: i64, num_notes: usize },

    /// Model dimensionality does not fit the data handed to it
    #[error("Model '{model}' {what} mismatch: expected {expected}, got {got}")]
    ModelDimensionMismatch {
        model: String,
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Latent vector length does not match the model
    #[error("Latent size mismatch for '{model}': expected {expected}, got {got}")]
    LatentSizeMismatch {
        model: String,
        expected: usize,
        got: usize,
    },

    /// Bin table disagrees with the raw prediction width
    #[error("Bin table mismatch: {reason}")]
    BinTableMismatch { reason: String },

    /// Normalization table too short for the continuous column map
    #[error("Normalization stats too short: need index {index} in group {group}, have {len}")]
    StatsTooShort { group: usize, index: usize, len: usize },

    /// Feature schema width disagrees with the decoded width
    #[error("Feature schema has {schema} names but decoded rows have {decoded} columns")]
    SchemaMismatch { schema: usize, decoded: usize },

    /// Any other invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ─── Shape errors ────────────────────────────────────────────────────────
    /// Invalid input shape
    #[error("Invalid input shape: expected {expected}, got {got}")]
    InvalidInputShape { expected: String, got: String },

    /// Invalid output shape
    #[error("Invalid output shape: expected {expected}, got {got}")]
    InvalidOutputShape { expected: String, got: String },

    /// Note belongs to a hierarchy unit the coarse prediction does not cover
    #[error("Note {note} maps to hierarchy unit {unit}, coarse prediction has {available} units")]
    SpanOutOfRange {
        note: usize,
        unit: usize,
        available: usize,
    },

    /// Row count differs between aligned tables
    #[error("Row count mismatch for {what}: expected {expected}, got {got}")]
    RowCountMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    // ─── Model / backend errors ──────────────────────────────────────────────
    /// Model file not found
    #[error("Model not found: {path}")]
    ModelNotFound { path: String },

    /// Model loading failed
    #[error("Failed to load model: {reason}")]
    ModelLoadFailed { reason: String },

    /// Inference failed
    #[error("Inference failed: {reason}")]
    InferenceFailed { reason: String },

    /// Tract error
    #[error("Tract error: {0}")]
    TractError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VrError {
    /// Configuration errors are never repaired; they abort the render.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            VrError::EdgeOutOfRange { .. }
                | VrError::ModelDimensionMismatch { .. }
                | VrError::LatentSizeMismatch { .. }
                | VrError::BinTableMismatch { .. }
                | VrError::StatsTooShort { .. }
                | VrError::SchemaMismatch { .. }
                | VrError::InvalidConfig(_)
        )
    }

    /// Tensor rank / dimension mismatch at a pipeline boundary
    pub fn is_shape(&self) -> bool {
        matches!(
            self,
            VrError::InvalidInputShape { .. }
                | VrError::InvalidOutputShape { .. }
                | VrError::SpanOutOfRange { .. }
                | VrError::RowCountMismatch { .. }
        )
    }
}

impl From<ndarray::ShapeError> for VrError {
    fn from(e: ndarray::ShapeError) -> Self {
        VrError::InvalidOutputShape {
            expected: "compatible tensor shapes".into(),
            got: e.to_string(),
        }
    }
}

/// Result type for inference operations
pub type VrResult<T> = Result<T, VrError>;
