use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),

    #[error("Failed to load transcoding engine: {0}")]
    EngineLoad(String),

    #[error("Image compression failed: {0}")]
    ImageCompression(String),

    #[error("Video compression failed: {0}")]
    VideoCompression(String),

    #[error("Upload failed: {0}")]
    UploadTransport(String),

    #[error("Invalid quality factor: {0}. Must be between {1} and {2}")]
    InvalidQualityFactor(u8, u8, u8),

    #[error("Invalid image quality: {0}. Must be greater than 0 and at most 1")]
    InvalidImageQuality(f32),

    #[error("Invalid size limit: {0}MB. Must be greater than 0")]
    InvalidSizeLimit(f64),

    #[error("Invalid maximum dimension: {0}. Must be greater than 0")]
    InvalidDimension(u32),

    #[error("Unsupported speed preset: {0}")]
    UnsupportedPreset(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Unsupported upload intent: {0}")]
    UnsupportedIntent(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("No media files found in input path: {0}")]
    NoMediaFilesFound(String),

    #[error("No files selected for upload")]
    EmptyBatch,

    #[error("No upload target selected")]
    NoTarget,

    #[error("Record {0} can no longer be changed: processing has already started")]
    RecordLocked(usize),

    #[error("No upload record at index {0}")]
    RecordNotFound(usize),

    #[error("Walkdir error: {0}")]
    WalkdirError(#[from] walkdir::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
