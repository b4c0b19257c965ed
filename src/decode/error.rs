//! Decode pipeline errors.

use ffmpeg_next as ffmpeg;

/// Error type for decoding operations
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("FFmpeg init failed: {0}")]
    Init(ffmpeg::Error),
    #[error("Source name contains a NUL byte: {0:?}")]
    InvalidSourceName(String),
    #[error("Failed to allocate {0}")]
    Allocation(&'static str),
    #[error("Failed to open input: {0}")]
    OpenInput(ffmpeg::Error),
    #[error("Failed to find stream info: {0}")]
    StreamInfo(ffmpeg::Error),
    #[error("No video stream found")]
    NoVideoStream,
    #[error("No decoder for codec {0}")]
    CodecNotFound(String),
    #[error("Failed to open codec: {0}")]
    CodecOpen(ffmpeg::Error),
    #[error("Video has invalid dimensions: {width} x {height}")]
    InvalidDimensions { width: i32, height: i32 },
    #[error("Invalid dimensions ({width} x {height} cannot fit within {max_dimension})")]
    DimensionsCollapsed { width: u32, height: u32, max_dimension: u32 },
    #[error("Failed to create software scaler")]
    ScalerCreation,
    #[error("Error reading frame: {0}")]
    Read(ffmpeg::Error),
    #[error("End of stream")]
    EndOfStream,
    #[error("Error decoding frame: {0}")]
    Decode(ffmpeg::Error),
    #[error("Error scaling frame: {0}")]
    Scale(ffmpeg::Error),
    #[error("Decoded frame {width} x {height} (pixel format {format}) does not match the scaler input")]
    SourceChanged { width: i32, height: i32, format: i32 },
}
