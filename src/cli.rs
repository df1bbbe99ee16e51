use crate::compress::{ImageCompressionOptions, SpeedPreset, VideoCompressionOptions};
use crate::constants::TOKEN_ENV_VAR;
use crate::upload::UploadIntent;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "clip-squeeze",
    about = "Compress and upload athlete highlight videos and images",
    long_about = "clip-squeeze validates media files, shrinks images to a size envelope, \
                  transcodes videos to H.264/AAC MP4 through ffmpeg, and uploads the results \
                  through a presigned storage handshake before registering them with the backend.",
    version,
    after_help = "EXAMPLES:\n  \
    clip-squeeze validate ./season -r\n  \
    clip-squeeze compress dunk.mov dunk.mp4 --crf 23 --preset slow\n  \
    clip-squeeze compress headshot.png small.png --max-size-mb 0.5\n  \
    clip-squeeze upload \"./highlights/*.mp4\" --intent highlight --target athlete-42"
)]
pub struct Args {
    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Show debug output")]
    pub verbose: bool,

    #[arg(short, long, global = true, conflicts_with = "verbose", help = "Only print errors")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Check files against the upload size and type limits",
        long_about = "Runs the validation gate over files, directories or glob patterns. \
                      Images must be under 10MB and videos under 100MB."
    )]
    Validate {
        #[arg(required = true, help = "Files, directories or glob patterns")]
        inputs: Vec<String>,

        #[arg(short = 'r', long, help = "Walk directories recursively")]
        recursive: bool,
    },

    #[command(
        about = "Compress a single image or video",
        long_about = "Compresses one file. Images are resized and re-encoded to fit the size \
                      envelope; videos are transcoded to MP4. The output extension follows the \
                      produced format."
    )]
    Compress {
        #[arg(help = "Input media file")]
        input: PathBuf,

        #[arg(help = "Output file path")]
        output: PathBuf,

        #[command(flatten)]
        options: CompressionArgs,
    },

    #[command(
        about = "Compress and upload a batch of files",
        long_about = "Validates, compresses and uploads every input in order. A failing file \
                      is reported and the rest of the batch continues."
    )]
    Upload {
        #[arg(required = true, help = "Files, directories or glob patterns")]
        inputs: Vec<String>,

        #[arg(short = 'i', long, help = "Upload intent (highlight, profile_picture, team_logo)")]
        intent: UploadIntent,

        #[arg(short = 't', long, help = "Id of the athlete or team the files belong to")]
        target: String,

        #[arg(long, help = "Backend API base URL")]
        api_url: Option<String>,

        #[arg(long, env = TOKEN_ENV_VAR, hide_env_values = true, help = "Bearer token for the backend")]
        token: Option<String>,

        #[arg(short = 'r', long, help = "Walk directories recursively")]
        recursive: bool,

        #[command(flatten)]
        options: CompressionArgs,
    },
}

/// Option flags shared by `compress` and `upload`. Unset flags fall back to
/// the configuration file, then to the built-in defaults.
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct CompressionArgs {
    #[arg(long, help = "Target image size in MB (default: 1.0)")]
    pub max_size_mb: Option<f64>,

    #[arg(
        short = 'w',
        long,
        help = "Longest side in pixels (default: 1920)",
        long_help = "Maximum width or height for both images and videos. \
                     Media already within the bound is never upscaled."
    )]
    pub max_dimension: Option<u32>,

    #[arg(long, help = "Image encoder quality in (0, 1] (default: 0.85)")]
    pub image_quality: Option<f32>,

    #[arg(long, help = "Encode images on the calling task instead of a blocking worker")]
    pub no_worker: bool,

    #[arg(
        long = "crf",
        help = "Video quality factor, 18-32 (default: 28)",
        long_help = "Constant rate factor passed to libx264. Lower is higher quality and larger output."
    )]
    pub quality_factor: Option<u8>,

    #[arg(long, help = "Encoder speed preset (ultrafast, fast, medium, slow)")]
    pub preset: Option<SpeedPreset>,
}

impl CompressionArgs {
    /// Overlays the flags that were given onto `base`.
    pub fn image_options(&self, base: &ImageCompressionOptions) -> ImageCompressionOptions {
        ImageCompressionOptions {
            max_size_mb: self.max_size_mb.or(base.max_size_mb),
            max_dimension: self.max_dimension.or(base.max_dimension),
            quality: self.image_quality.or(base.quality),
            use_background_worker: if self.no_worker {
                Some(false)
            } else {
                base.use_background_worker
            },
        }
    }

    pub fn video_options(&self, base: &VideoCompressionOptions) -> VideoCompressionOptions {
        VideoCompressionOptions {
            quality_factor: self.quality_factor.or(base.quality_factor),
            max_dimension: self.max_dimension.or(base.max_dimension),
            speed_preset: self.preset.or(base.speed_preset),
        }
    }
}
