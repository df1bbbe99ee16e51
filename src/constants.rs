pub const MEBIBYTE: u64 = 1024 * 1024;

pub const MAX_IMAGE_FILE_SIZE: u64 = 10 * MEBIBYTE;
pub const MAX_VIDEO_FILE_SIZE: u64 = 100 * MEBIBYTE;

pub const IMAGE_TYPE_MESSAGE: &str = "Please select an image file";
pub const IMAGE_SIZE_MESSAGE: &str = "Image must be less than 10MB";
pub const VIDEO_TYPE_MESSAGE: &str = "Please select a video file";
pub const VIDEO_SIZE_MESSAGE: &str = "Video must be less than 100MB";

// Video defaults. Quality factor is a CRF: lower means better quality and larger output.
pub const DEFAULT_QUALITY_FACTOR: u8 = 28;
pub const MIN_QUALITY_FACTOR: u8 = 18;
pub const MAX_QUALITY_FACTOR: u8 = 32;
pub const DEFAULT_MAX_VIDEO_DIMENSION: u32 = 1920;
pub const VIDEO_CODEC: &str = "libx264";
pub const AUDIO_CODEC: &str = "aac";
pub const AUDIO_BITRATE: &str = "128k";
pub const VIDEO_OUTPUT_EXTENSION: &str = "mp4";
pub const VIDEO_OUTPUT_MIME: &str = "video/mp4";

// Image defaults
pub const DEFAULT_MAX_SIZE_MB: f64 = 1.0;
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1920;
pub const DEFAULT_IMAGE_QUALITY: f32 = 0.85;
pub const DEFAULT_USE_BACKGROUND_WORKER: bool = true;
pub const MAX_IMAGE_ITERATIONS: u32 = 10;
pub const IMAGE_SHRINK_STEP: f64 = 0.95;

pub const OXIPNG_PRESET: u8 = 2;
pub const ZOPFLI_ITERATIONS: u8 = 15;
pub const LIBDEFLATER_HIGH_LEVEL: u8 = 12;
pub const LIBDEFLATER_LOW_LEVEL: u8 = 8;

pub const PROGRESS_BAR_TEMPLATE: &str =
    "{spinner:.green} {prefix:.bold} [{bar:30.cyan/blue}] {pos:>3}% {msg}";
pub const PROGRESS_SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";

// Engine
pub const DEFAULT_FFMPEG_PROGRAM: &str = "ffmpeg";
pub const ENGINE_CACHE_DIR_NAME: &str = "clip-squeeze-engine";

// Collaborators
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const UPLOAD_TARGET_PATH: &str = "/uploads/presign";
pub const UPLOAD_COMPLETE_PATH: &str = "/uploads/complete";
pub const TOKEN_ENV_VAR: &str = "CLIP_SQUEEZE_TOKEN";

pub const SUCCESS_PREFIX: &str = "✅";
pub const WARNING_PREFIX: &str = "⚠️";
pub const ERROR_PREFIX: &str = "❌";
pub const INFO_PREFIX: &str = "📋";
