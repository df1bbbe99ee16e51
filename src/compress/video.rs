use super::{CompressionResult, ProgressFn};
use crate::constants::{
    AUDIO_BITRATE, AUDIO_CODEC, DEFAULT_MAX_VIDEO_DIMENSION, DEFAULT_QUALITY_FACTOR,
    MAX_QUALITY_FACTOR, MIN_QUALITY_FACTOR, VIDEO_CODEC, VIDEO_OUTPUT_EXTENSION, VIDEO_OUTPUT_MIME,
};
use crate::engine::{EngineError, EngineProgress, SharedEngine, TranscodeEngine, TranscoderLoader};
use crate::error::{PipelineError, Result};
use crate::formats::with_extension;
use crate::media::MediaFile;
use crate::utils::format_file_size;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Encoder speed/efficiency trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedPreset {
    Ultrafast,
    Fast,
    Medium,
    Slow,
}

impl SpeedPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedPreset::Ultrafast => "ultrafast",
            SpeedPreset::Fast => "fast",
            SpeedPreset::Medium => "medium",
            SpeedPreset::Slow => "slow",
        }
    }
}

impl fmt::Display for SpeedPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SpeedPreset {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ultrafast" => Ok(SpeedPreset::Ultrafast),
            "fast" => Ok(SpeedPreset::Fast),
            "medium" => Ok(SpeedPreset::Medium),
            "slow" => Ok(SpeedPreset::Slow),
            _ => Err(PipelineError::UnsupportedPreset(s.to_string())),
        }
    }
}

/// Caller overrides for video compression. Unset fields fall back to defaults.
///
/// `quality_factor` is a constant rate factor: lower values give higher
/// fidelity and larger files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoCompressionOptions {
    pub quality_factor: Option<u8>,
    pub max_dimension: Option<u32>,
    pub speed_preset: Option<SpeedPreset>,
}

impl VideoCompressionOptions {
    pub fn new(
        quality_factor: Option<u8>,
        max_dimension: Option<u32>,
        speed_preset: Option<SpeedPreset>,
    ) -> Result<Self> {
        let options = Self {
            quality_factor,
            max_dimension,
            speed_preset,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        let quality_factor = self.effective_quality_factor();
        if !(MIN_QUALITY_FACTOR..=MAX_QUALITY_FACTOR).contains(&quality_factor) {
            return Err(PipelineError::InvalidQualityFactor(
                quality_factor,
                MIN_QUALITY_FACTOR,
                MAX_QUALITY_FACTOR,
            ));
        }
        if self.effective_max_dimension() == 0 {
            return Err(PipelineError::InvalidDimension(0));
        }
        Ok(())
    }

    pub fn effective_quality_factor(&self) -> u8 {
        self.quality_factor.unwrap_or(DEFAULT_QUALITY_FACTOR)
    }

    pub fn effective_max_dimension(&self) -> u32 {
        self.max_dimension.unwrap_or(DEFAULT_MAX_VIDEO_DIMENSION)
    }

    pub fn effective_speed_preset(&self) -> SpeedPreset {
        self.speed_preset.unwrap_or(SpeedPreset::Medium)
    }
}

/// Builds the transcode command: H.264 video at the requested quality factor,
/// both sides bounded by `max_dimension` with aspect ratio kept, AAC audio at 128k.
pub fn build_transcode_args(
    input: &str,
    output: &str,
    options: &VideoCompressionOptions,
) -> Vec<String> {
    let max = options.effective_max_dimension();
    let crf = options.effective_quality_factor().to_string();
    let scale = format!(
        "scale='min({max},iw)':'min({max},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2"
    );
    [
        "-i",
        input,
        "-c:v",
        VIDEO_CODEC,
        "-crf",
        crf.as_str(),
        "-preset",
        options.effective_speed_preset().as_str(),
        "-vf",
        scale.as_str(),
        "-c:a",
        AUDIO_CODEC,
        "-b:a",
        AUDIO_BITRATE,
        output,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Maps the engine's fractional progress to a percentage. Out-of-range values
/// are clamped and non-finite ones dropped.
fn to_percent(ratio: f64) -> Option<u8> {
    if !ratio.is_finite() {
        return None;
    }
    Some((ratio.clamp(0.0, 1.0) * 100.0).round() as u8)
}

fn progress_bridge(on_progress: ProgressFn) -> EngineProgress {
    Arc::new(move |ratio: f64| {
        if let Some(percent) = to_percent(ratio) {
            on_progress(percent);
        }
    })
}

/// Scratch entries written into the shared engine for one call.
struct Scratch {
    namespace: String,
    input: String,
    output: String,
}

impl Scratch {
    fn new(file: &MediaFile) -> Self {
        let namespace = Uuid::new_v4().simple().to_string();
        let extension = file
            .extension()
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| VIDEO_OUTPUT_EXTENSION.to_string());
        Self {
            input: format!("{}/input.{}", namespace, extension),
            output: format!("{}/output.{}", namespace, VIDEO_OUTPUT_EXTENSION),
            namespace,
        }
    }

    async fn cleanup(&self, engine: &dyn TranscodeEngine) {
        for path in [&self.input, &self.output] {
            if let Err(e) = engine.delete_file(path).await {
                warn!("Failed to remove scratch file {}: {}", path, e);
            }
        }
        if let Err(e) = engine.delete_dir(&self.namespace).await {
            warn!("Failed to remove scratch directory {}: {}", self.namespace, e);
        }
    }
}

/// Removes the scratch namespace if the compression future is dropped mid-flight.
struct ScratchGuard {
    engine: SharedEngine,
    namespace: Option<String>,
}

impl ScratchGuard {
    fn disarm(mut self) {
        self.namespace = None;
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        let Some(namespace) = self.namespace.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let engine = Arc::clone(&self.engine);
            handle.spawn(async move {
                if let Err(e) = engine.delete_dir(&namespace).await {
                    warn!("Failed to remove abandoned scratch directory {}: {}", namespace, e);
                }
            });
        }
    }
}

pub struct VideoCompressor {
    loader: Arc<TranscoderLoader>,
}

impl VideoCompressor {
    pub fn new(loader: Arc<TranscoderLoader>) -> Self {
        Self { loader }
    }

    /// Transcodes a video through the shared engine.
    ///
    /// Progress ticks are forwarded as they arrive and are not guaranteed to
    /// be monotonic; a final `100` is sent once the output has been read back.
    /// Scratch files are removed whether or not the transcode succeeds.
    pub async fn compress(
        &self,
        file: &MediaFile,
        options: &VideoCompressionOptions,
        on_progress: ProgressFn,
    ) -> Result<CompressionResult> {
        options.validate()?;
        let engine = self
            .loader
            .get_instance()
            .await
            .map_err(|e| PipelineError::VideoCompression(e.to_string()))?;

        let scratch = Scratch::new(file);
        let guard = ScratchGuard {
            engine: Arc::clone(&engine),
            namespace: Some(scratch.namespace.clone()),
        };
        debug!("Transcoding {} in scratch namespace {}", file.name, scratch.namespace);

        let outcome = transcode(engine.as_ref(), file, options, &scratch, on_progress.clone()).await;
        scratch.cleanup(engine.as_ref()).await;
        guard.disarm();

        let data = outcome.map_err(|e| PipelineError::VideoCompression(e.to_string()))?;
        on_progress(100);

        let output = MediaFile::new(
            with_extension(&file.name, VIDEO_OUTPUT_EXTENSION),
            VIDEO_OUTPUT_MIME,
            data,
        );
        let result = CompressionResult::new(output, file.size());
        info!(
            "Compressed {} from {} to {} ({:.1}%)",
            file.name,
            format_file_size(result.original_size_bytes),
            format_file_size(result.compressed_size_bytes),
            result.reduction_percent
        );
        Ok(result)
    }
}

async fn transcode(
    engine: &dyn TranscodeEngine,
    file: &MediaFile,
    options: &VideoCompressionOptions,
    scratch: &Scratch,
    on_progress: ProgressFn,
) -> std::result::Result<Vec<u8>, EngineError> {
    engine.create_dir(&scratch.namespace).await?;
    engine.write_file(&scratch.input, &file.data).await?;
    let args = build_transcode_args(&scratch.input, &scratch.output, options);
    engine.exec(&args, progress_bridge(on_progress)).await?;
    engine.read_file(&scratch.output).await
}
