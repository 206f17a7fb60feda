//! Error types for the imagery tile services.

use thiserror::Error;

/// Result type alias using TileError.
pub type TileResult<T> = Result<T, TileError>;

/// Primary error type for tile and archive operations.
#[derive(Debug, Error)]
pub enum TileError {
    // === Request Errors ===
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    // === Storage Errors ===
    #[error("Credential error: {0}")]
    CredentialError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Remote read failed: {0}")]
    RemoteRead(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    // === Raster Errors ===
    #[error("Invalid raster: {0}")]
    InvalidRaster(String),

    #[error("Unsupported raster layout: {0}")]
    UnsupportedRaster(String),

    // === Rendering Errors ===
    #[error("Rendering failed: {0}")]
    RenderError(String),

    // === Infrastructure Errors ===
    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl TileError {
    /// Shorthand for an invalid parameter error.
    pub fn invalid(param: impl Into<String>, message: impl Into<String>) -> Self {
        TileError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Machine-readable code used in structured error bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            TileError::MissingParameter(_) => "MissingParameter",
            TileError::InvalidParameter { .. } => "InvalidParameter",
            TileError::UnknownLayer(_) => "UnknownLayer",
            TileError::CredentialError(_) => "CredentialFailure",
            TileError::StorageError(_) | TileError::RemoteRead(_) => "RemoteReadFailure",
            TileError::NotFound(_) => "NotFound",
            TileError::InvalidRaster(_) | TileError::UnsupportedRaster(_) => "RasterError",
            TileError::RenderError(_) => "RenderError",
            TileError::InternalError(_) => "InternalError",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TileError::MissingParameter(_) | TileError::InvalidParameter { .. } => 400,

            TileError::UnknownLayer(_) | TileError::NotFound(_) => 404,

            _ => 500,
        }
    }

    /// True for errors caused by the caller rather than by storage or decoding.
    pub fn is_client_error(&self) -> bool {
        self.http_status_code() < 500
    }
}

impl From<std::io::Error> for TileError {
    fn from(err: std::io::Error) -> Self {
        TileError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for TileError {
    fn from(err: serde_json::Error) -> Self {
        TileError::InternalError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for TileError {
    fn from(err: serde_yaml::Error) -> Self {
        TileError::InternalError(format!("YAML error: {}", err))
    }
}
