pub mod batch;
pub mod cli;
pub mod compress;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod formats;
pub mod logger;
pub mod media;
pub mod preview;
pub mod upload;
pub mod utils;
pub mod validation;

pub use batch::{BatchEvent, BatchResult, BatchTarget, FileUploadRecord, Rejection, UploadBatch, UploadStatus};
pub use compress::{
    compress_image, Compress, CompressionResult, ImageCompressionOptions, MediaCompressor, ProgressFn,
    SpeedPreset, VideoCompressionOptions, VideoCompressor,
};
pub use config::PipelineConfig;
pub use engine::{global_loader, TranscodeEngine, TranscoderLoader};
pub use error::{PipelineError, Result};
pub use media::MediaFile;
pub use preview::{NoopPreviews, PreviewHandle, PreviewRegistry, TempPreviewStore};
pub use upload::{BackendRegistry, HttpUploadClient, StorageService, UploadIntent, UploadTarget};
pub use validation::{validate_image, validate_media, validate_video, ValidationResult};
