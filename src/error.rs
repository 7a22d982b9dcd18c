//! Error types for PosterBot.

use thiserror::Error;

/// Library-level error type for PosterBot operations.
#[derive(Error, Debug)]
pub enum PosterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Media collection failed: {0}")]
    MediaCollection(String),

    #[error("Video composition failed: {0}")]
    Composition(String),

    #[error("Distribution failed: {0}")]
    Distribution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PosterError {
    /// Whether this error comes from configuration rather than a runtime stage.
    pub fn is_configuration(&self) -> bool {
        matches!(self, PosterError::Config(_) | PosterError::TomlParse(_))
    }
}

/// Result type alias for PosterBot operations.
pub type Result<T> = std::result::Result<T, PosterError>;
