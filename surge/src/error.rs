use surge_core::{exit_code, ConfigError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurgeError {
    #[error("invalid options: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to write summary: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode summary: {0}")]
    Json(#[from] serde_json::Error),
}

impl SurgeError {
    /// Process exit code for a run that could not complete.
    pub fn exit_code(&self) -> u8 {
        match self {
            SurgeError::Config(_) => exit_code::INVALID_CONFIG,
            SurgeError::Io(_) | SurgeError::Json(_) => 1,
        }
    }
}
