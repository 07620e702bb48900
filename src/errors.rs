use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to decode image: {message}")]
    DecodeError { message: String },

    #[error("Invalid raster: buffer holds {actual} bytes, dimensions require {expected}")]
    InvalidRaster { expected: usize, actual: usize },

    #[error("Unsupported channel count: {channels}")]
    UnsupportedChannels { channels: u8 },

    #[error("No image loaded")]
    NoImageLoaded,

    #[error("Chart encoding error: {message}")]
    EncodingError { message: String },

    #[error("Remote send error: {message}")]
    SendError { message: String },

    #[error("Settings error: {message}")]
    SettingsError { message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Returns true if this error is recoverable (the caller can retry with new input)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::DecodeError { .. }
                | PipelineError::NoImageLoaded
                | PipelineError::SendError { .. }
        )
    }

    /// Returns an error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::DecodeError { .. } => "DECODE_ERROR",
            PipelineError::InvalidRaster { .. } => "INVALID_RASTER",
            PipelineError::UnsupportedChannels { .. } => "UNSUPPORTED_CHANNELS",
            PipelineError::NoImageLoaded => "NO_IMAGE_LOADED",
            PipelineError::EncodingError { .. } => "ENCODING_ERROR",
            PipelineError::SendError { .. } => "SEND_ERROR",
            PipelineError::SettingsError { .. } => "SETTINGS_ERROR",
        }
    }
}
