use thiserror::Error;

#[derive(Error, Debug)]
pub enum VprojError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed file: {0}")]
    Format(String),

    #[error("Weights error: {0}")]
    Weights(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl VprojError {
    /// Process exit code for this error: 1 for bad input, 2 for everything
    /// that went wrong while reading or writing files.
    pub fn exit_code(&self) -> i32 {
        match self {
            VprojError::Validation(_) | VprojError::InvalidParameter(_) => 1,
            _ => 2,
        }
    }
}

impl From<rmp_serde::encode::Error> for VprojError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        VprojError::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for VprojError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        VprojError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for VprojError {
    fn from(err: serde_json::Error) -> Self {
        VprojError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VprojError>;
