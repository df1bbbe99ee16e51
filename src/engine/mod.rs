/// Transcoding engine abstraction
///
/// An engine owns a private scratch filesystem (paths are relative to it) and
/// runs ffmpeg-style argument lists against files placed there. Engines are
/// heavyweight to bring up, so they are created once through an
/// `EngineFactory` driven by the `TranscoderLoader`.

mod ffmpeg;
mod loader;

pub use ffmpeg::{EngineSource, FfmpegEngine, FfmpegLoader};
pub use loader::{global_loader, install_engine_config, TranscoderLoader};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Receives the engine's native progress signal, nominally in `0.0..=1.0`.
pub type EngineProgress = Arc<dyn Fn(f64) + Send + Sync>;

pub type SharedEngine = Arc<dyn TranscodeEngine>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scratch path: {0}")]
    InvalidPath(String),

    #[error("transcode exited with {code}: {detail}")]
    Exec { code: String, detail: String },
}

#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    async fn create_dir(&self, path: &str) -> Result<(), EngineError>;

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), EngineError>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, EngineError>;

    async fn delete_file(&self, path: &str) -> Result<(), EngineError>;

    async fn delete_dir(&self, path: &str) -> Result<(), EngineError>;

    /// Runs a transcode command. `on_progress` may be called any number of
    /// times, in any order.
    async fn exec(&self, args: &[String], on_progress: EngineProgress) -> Result<(), EngineError>;
}

/// Performs the expensive, fallible engine bring-up.
#[async_trait]
pub trait EngineFactory: Send + Sync + 'static {
    async fn load(&self) -> crate::error::Result<SharedEngine>;
}
