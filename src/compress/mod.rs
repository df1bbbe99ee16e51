/// Image and video compression

mod image;
mod video;

pub use self::image::{compress_image, fit_within, ImageCompressionOptions};
pub use self::video::{build_transcode_args, SpeedPreset, VideoCompressionOptions, VideoCompressor};

use crate::engine::TranscoderLoader;
use crate::error::{PipelineError, Result};
use crate::formats::MediaKind;
use crate::media::MediaFile;
use crate::utils::calculate_compression_ratio;
use async_trait::async_trait;
use std::sync::Arc;

/// Receives integer progress in `0..=100`.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// A progress sink that discards every tick.
pub fn no_progress() -> ProgressFn {
    Arc::new(|_| {})
}

#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub output: MediaFile,
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
    /// Negative when the output is larger than the input.
    pub reduction_percent: f64,
}

impl CompressionResult {
    pub fn new(output: MediaFile, original_size_bytes: u64) -> Self {
        let compressed_size_bytes = output.size();
        Self {
            output,
            original_size_bytes,
            compressed_size_bytes,
            reduction_percent: calculate_compression_ratio(original_size_bytes, compressed_size_bytes),
        }
    }
}

#[async_trait]
pub trait Compress: Send + Sync {
    async fn compress(&self, file: &MediaFile, on_progress: ProgressFn) -> Result<CompressionResult>;
}

/// Routes each file to the compressor for its media kind.
pub struct MediaCompressor {
    image_options: ImageCompressionOptions,
    video_options: VideoCompressionOptions,
    video: VideoCompressor,
}

impl MediaCompressor {
    pub fn new(loader: Arc<TranscoderLoader>) -> Self {
        Self {
            image_options: ImageCompressionOptions::default(),
            video_options: VideoCompressionOptions::default(),
            video: VideoCompressor::new(loader),
        }
    }

    pub fn with_image_options(mut self, options: ImageCompressionOptions) -> Self {
        self.image_options = options;
        self
    }

    pub fn with_video_options(mut self, options: VideoCompressionOptions) -> Self {
        self.video_options = options;
        self
    }
}

#[async_trait]
impl Compress for MediaCompressor {
    async fn compress(&self, file: &MediaFile, on_progress: ProgressFn) -> Result<CompressionResult> {
        match file.kind() {
            Some(MediaKind::Image) => {
                on_progress(0);
                let result = compress_image(file, &self.image_options).await?;
                on_progress(100);
                Ok(result)
            }
            Some(MediaKind::Video) => {
                self.video
                    .compress(file, &self.video_options, on_progress)
                    .await
            }
            None => Err(PipelineError::UnsupportedMediaType(file.mime_type.clone())),
        }
    }
}
