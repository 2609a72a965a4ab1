use thiserror::Error;

/// Main error type for the tempo normalizer
#[derive(Error, Debug)]
pub enum NormalizerError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Errors raised while obtaining decoded frames
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to load video source: {path}")]
    LoadFailed { path: String },

    #[error("Unsupported video format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Frame {index} unavailable: {reason}")]
    FrameUnavailable { index: usize, reason: String },

    #[error("Video decoding failed: {reason}")]
    DecodingFailed { reason: String },

    #[error("Frame {index} is {found:?}, expected {expected:?}")]
    InconsistentDimensions {
        index: usize,
        expected: (u32, u32),
        found: (u32, u32),
    },
}

/// Errors raised while writing the resampled sequence
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Video encoding failed: {reason}")]
    EncodingFailed { reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: String, reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using NormalizerError
pub type Result<T> = std::result::Result<T, NormalizerError>;

impl NormalizerError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Decode(DecodeError::LoadFailed { path }) => {
                format!("Could not open '{}'. Please check the file exists and is a supported video or frame directory.", path)
            }
            Self::Decode(DecodeError::FrameUnavailable { index, .. }) => {
                format!("Frame {} could not be decoded; the clip was not normalized.", index)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
