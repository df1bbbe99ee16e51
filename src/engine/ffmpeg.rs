use super::{EngineError, EngineFactory, EngineProgress, SharedEngine, TranscodeEngine};
use crate::constants::{DEFAULT_FFMPEG_PROGRAM, ENGINE_CACHE_DIR_NAME};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, trace};

const STDERR_TAIL_LINES: usize = 20;

/// Where the ffmpeg binary comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSource {
    /// Program name or path used when no download URL is set.
    pub program: String,
    /// Remote location of a prebuilt binary, fetched once into `cache_dir`.
    pub download_url: Option<String>,
    pub cache_dir: Option<PathBuf>,
}

impl Default for EngineSource {
    fn default() -> Self {
        Self {
            program: DEFAULT_FFMPEG_PROGRAM.to_string(),
            download_url: None,
            cache_dir: None,
        }
    }
}

/// Resolves, fetches and probes the ffmpeg binary.
pub struct FfmpegLoader {
    source: EngineSource,
}

impl FfmpegLoader {
    pub fn new(source: EngineSource) -> Self {
        Self { source }
    }

    fn cache_dir(&self) -> PathBuf {
        self.source
            .cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(ENGINE_CACHE_DIR_NAME))
    }

    async fn fetch_binary(&self, url: &str) -> Result<PathBuf> {
        let cache_dir = self.cache_dir();
        let file_name = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_FFMPEG_PROGRAM);
        let target = cache_dir.join(file_name);
        if target.is_file() {
            debug!("Using cached engine binary at {:?}", target);
            return Ok(target);
        }

        info!("Downloading engine binary from {}", url);
        let bytes = reqwest::get(url)
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| PipelineError::EngineLoad(format!("download failed: {}", e)))?
            .bytes()
            .await
            .map_err(|e| PipelineError::EngineLoad(format!("download interrupted: {}", e)))?;

        let load_err = |e: std::io::Error| {
            PipelineError::EngineLoad(format!("cannot cache engine in {:?}: {}", cache_dir, e))
        };
        tokio::fs::create_dir_all(&cache_dir).await.map_err(load_err)?;
        // Write under a unique name first so a half-written binary is never picked up.
        let partial = cache_dir.join(format!("{}.{}.partial", file_name, uuid::Uuid::new_v4()));
        tokio::fs::write(&partial, &bytes).await.map_err(load_err)?;
        make_executable(&partial).await.map_err(load_err)?;
        tokio::fs::rename(&partial, &target).await.map_err(load_err)?;
        Ok(target)
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

async fn probe_version(program: &Path) -> Result<String> {
    let output = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| PipelineError::EngineLoad(format!("cannot run {:?}: {}", program, e)))?;
    if !output.status.success() {
        return Err(PipelineError::EngineLoad(format!(
            "{:?} -version exited with {}",
            program, output.status
        )));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().to_string())
}

#[async_trait]
impl EngineFactory for FfmpegLoader {
    async fn load(&self) -> Result<SharedEngine> {
        let program = match &self.source.download_url {
            Some(url) => self.fetch_binary(url).await?,
            None => PathBuf::from(&self.source.program),
        };
        let version = probe_version(&program).await?;
        info!("Loaded {}", version);

        let engine = FfmpegEngine::new(program)
            .map_err(|e| PipelineError::EngineLoad(format!("cannot create scratch area: {}", e)))?;
        Ok(Arc::new(engine))
    }
}

/// Runs a native ffmpeg binary against files in a private scratch directory.
pub struct FfmpegEngine {
    program: PathBuf,
    root: TempDir,
}

impl FfmpegEngine {
    pub fn new(program: PathBuf) -> std::io::Result<Self> {
        Ok(Self {
            program,
            root: tempfile::Builder::new().prefix("clip-squeeze-").tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    fn resolve(&self, path: &str) -> std::result::Result<PathBuf, EngineError> {
        let relative = Path::new(path);
        let confined = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !confined {
            return Err(EngineError::InvalidPath(path.to_string()));
        }
        Ok(self.root.path().join(relative))
    }
}

fn io_error(path: &str) -> impl FnOnce(std::io::Error) -> EngineError + '_ {
    move |source| EngineError::Io {
        path: path.to_string(),
        source,
    }
}

fn ignore_missing(result: std::io::Result<()>) -> std::io::Result<()> {
    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    async fn create_dir(&self, path: &str) -> std::result::Result<(), EngineError> {
        let full = self.resolve(path)?;
        tokio::fs::create_dir_all(&full).await.map_err(io_error(path))
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> std::result::Result<(), EngineError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error(path))?;
        }
        tokio::fs::write(&full, data).await.map_err(io_error(path))
    }

    async fn read_file(&self, path: &str) -> std::result::Result<Vec<u8>, EngineError> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full).await.map_err(io_error(path))
    }

    async fn delete_file(&self, path: &str) -> std::result::Result<(), EngineError> {
        let full = self.resolve(path)?;
        ignore_missing(tokio::fs::remove_file(&full).await).map_err(io_error(path))
    }

    async fn delete_dir(&self, path: &str) -> std::result::Result<(), EngineError> {
        let full = self.resolve(path)?;
        ignore_missing(tokio::fs::remove_dir_all(&full).await).map_err(io_error(path))
    }

    async fn exec(&self, args: &[String], on_progress: EngineProgress) -> std::result::Result<(), EngineError> {
        debug!("ffmpeg {}", args.join(" "));
        let mut child = Command::new(&self.program)
            .current_dir(self.root.path())
            .args(["-hide_banner", "-nostats", "-y", "-progress", "pipe:1"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Exec {
                code: "spawn".to_string(),
                detail: e.to_string(),
            })?;

        let duration_us = Arc::new(AtomicU64::new(0));

        let stderr_task = child.stderr.take().map(|stderr| {
            let duration_us = Arc::clone(&duration_us);
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(total) = parse_duration_line(&line) {
                        duration_us.store(total, Ordering::Relaxed);
                    }
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail.into_iter().collect::<Vec<_>>()
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_progress_line(&line) {
                    Some(ProgressLine::OutTime(out_us)) => {
                        let total = duration_us.load(Ordering::Relaxed);
                        if total > 0 {
                            on_progress(out_us as f64 / total as f64);
                        }
                    }
                    Some(ProgressLine::End) => on_progress(1.0),
                    None => {}
                }
            }
        }

        let status = child.wait().await.map_err(|e| EngineError::Exec {
            code: "wait".to_string(),
            detail: e.to_string(),
        })?;
        let tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if status.success() {
            trace!("ffmpeg finished");
            Ok(())
        } else {
            Err(EngineError::Exec {
                code: status
                    .code()
                    .map(|c| format!("status {}", c))
                    .unwrap_or_else(|| "signal".to_string()),
                detail: tail.join("\n"),
            })
        }
    }
}

#[derive(Debug, PartialEq)]
enum ProgressLine {
    OutTime(u64),
    End,
}

fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value.parse().ok().map(ProgressLine::OutTime),
        "progress" if value == "end" => Some(ProgressLine::End),
        _ => None,
    }
}

/// Extracts the input duration in microseconds from a `Duration: HH:MM:SS.cc,` banner line.
fn parse_duration_line(line: &str) -> Option<u64> {
    let rest = line.trim_start().strip_prefix("Duration:")?.trim_start();
    let stamp = rest.split(',').next()?.trim();
    parse_timestamp(stamp)
}

fn parse_timestamp(stamp: &str) -> Option<u64> {
    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let total = (hours * 3600.0 + minutes * 60.0 + seconds) * 1_000_000.0;
    Some(total.round() as u64)
}
