#![allow(dead_code)]

use async_trait::async_trait;
use clip_squeeze::compress::{Compress, CompressionResult, ProgressFn};
use clip_squeeze::engine::{EngineError, EngineFactory, EngineProgress, SharedEngine, TranscodeEngine};
use clip_squeeze::error::{PipelineError, Result};
use clip_squeeze::media::MediaFile;
use clip_squeeze::preview::{PreviewHandle, PreviewRegistry};
use clip_squeeze::upload::{BackendRegistry, RegisteredUpload, StorageService, UploadIntent, UploadTarget};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub const MB: usize = 1024 * 1024;

pub fn image_file(name: &str, size: usize) -> MediaFile {
    let mime = if name.ends_with(".png") { "image/png" } else { "image/jpeg" };
    MediaFile::new(name, mime, vec![0u8; size])
}

pub fn video_file(name: &str, size: usize) -> MediaFile {
    MediaFile::new(name, "video/mp4", vec![0u8; size])
}

/// Halves every file; fails the names it was told to fail.
#[derive(Default)]
pub struct FakeCompressor {
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    cancel_during: Mutex<Option<(String, CancellationToken)>>,
}

impl FakeCompressor {
    pub fn failing(names: &[&str]) -> Self {
        let compressor = Self::default();
        for name in names {
            compressor.fail(name);
        }
        compressor
    }

    pub fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn heal(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
    }

    /// Cancels `token` while `name` is being compressed.
    pub fn cancel_during(&self, name: &str, token: CancellationToken) {
        *self.cancel_during.lock().unwrap() = Some((name.to_string(), token));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Compress for FakeCompressor {
    async fn compress(&self, file: &MediaFile, on_progress: ProgressFn) -> Result<CompressionResult> {
        self.calls.lock().unwrap().push(file.name.clone());
        if let Some((name, token)) = self.cancel_during.lock().unwrap().as_ref() {
            if name == &file.name {
                token.cancel();
            }
        }
        // Out of order on purpose; the batch must never report going backwards.
        for tick in [0, 40, 20, 80] {
            on_progress(tick);
        }
        if self.failing.lock().unwrap().contains(&file.name) {
            return Err(PipelineError::VideoCompression(format!("cannot decode {}", file.name)));
        }
        on_progress(100);
        let output = MediaFile::new(
            file.name.clone(),
            file.mime_type.clone(),
            file.data[..file.data.len() / 2].to_vec(),
        );
        Ok(CompressionResult::new(output, file.size()))
    }
}

#[derive(Default)]
pub struct FakeStorage {
    failing: Mutex<HashSet<String>>,
    pub submitted: Mutex<Vec<(String, u64)>>,
}

impl FakeStorage {
    pub fn failing(names: &[&str]) -> Self {
        let storage = Self::default();
        storage
            .failing
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.to_string()));
        storage
    }

    pub fn submitted_names(&self) -> Vec<String> {
        self.submitted.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl StorageService for FakeStorage {
    async fn request_upload_target(
        &self,
        file_name: &str,
        _content_type: &str,
        intent: UploadIntent,
    ) -> Result<UploadTarget> {
        let storage_key = format!("{}/{}", intent, file_name);
        Ok(UploadTarget {
            upload_endpoint: "https://bucket.example.com".to_string(),
            required_form_fields: BTreeMap::from([("key".to_string(), storage_key.clone())]),
            final_file_url: format!("https://cdn.example.com/{}", storage_key),
            storage_key,
        })
    }

    async fn submit_to_upload_endpoint(&self, _target: &UploadTarget, file: &MediaFile) -> Result<()> {
        if self.failing.lock().unwrap().contains(&file.name) {
            return Err(PipelineError::UploadTransport("storage upload returned 403".to_string()));
        }
        self.submitted.lock().unwrap().push((file.name.clone(), file.size()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub registered: Mutex<Vec<(String, UploadIntent)>>,
    pub reject_all: bool,
}

#[async_trait]
impl BackendRegistry for FakeBackend {
    async fn notify_upload_complete(
        &self,
        storage_key: &str,
        intent: UploadIntent,
    ) -> Result<RegisteredUpload> {
        if self.reject_all {
            return Err(PipelineError::UploadTransport("upload registration returned 500".to_string()));
        }
        self.registered.lock().unwrap().push((storage_key.to_string(), intent));
        Ok(RegisteredUpload {
            final_file_url: format!("https://cdn.example.com/{}", storage_key),
        })
    }
}

#[derive(Default)]
pub struct CountingPreviews {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl CountingPreviews {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn outstanding(&self) -> usize {
        self.acquired() - self.released()
    }
}

impl PreviewRegistry for CountingPreviews {
    fn acquire(&self, _file: &MediaFile) -> Result<PreviewHandle> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(PreviewHandle::new(None))
    }

    fn release(&self, _handle: PreviewHandle) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory engine: "transcodes" by halving the input and reports the given ticks.
#[derive(Default)]
pub struct MemoryEngine {
    files: Mutex<HashMap<String, Vec<u8>>>,
    pub ticks: Vec<f64>,
    pub execs: AtomicUsize,
}

impl MemoryEngine {
    pub fn with_ticks(ticks: Vec<f64>) -> Self {
        Self {
            ticks,
            ..Self::default()
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

#[async_trait]
impl TranscodeEngine for MemoryEngine {
    async fn create_dir(&self, _path: &str) -> std::result::Result<(), EngineError> {
        Ok(())
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> std::result::Result<(), EngineError> {
        self.files.lock().unwrap().insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn read_file(&self, path: &str) -> std::result::Result<Vec<u8>, EngineError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::InvalidPath(path.to_string()))
    }

    async fn delete_file(&self, path: &str) -> std::result::Result<(), EngineError> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    async fn delete_dir(&self, _path: &str) -> std::result::Result<(), EngineError> {
        Ok(())
    }

    async fn exec(&self, args: &[String], on_progress: EngineProgress) -> std::result::Result<(), EngineError> {
        self.execs.fetch_add(1, Ordering::SeqCst);
        for tick in &self.ticks {
            on_progress(*tick);
        }
        let input = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .ok_or_else(|| EngineError::InvalidPath("missing input".to_string()))?;
        let output = args
            .last()
            .ok_or_else(|| EngineError::InvalidPath("missing output".to_string()))?;
        let mut files = self.files.lock().unwrap();
        let data = files
            .get(input)
            .cloned()
            .ok_or_else(|| EngineError::InvalidPath(input.clone()))?;
        files.insert(output.clone(), data[..data.len() / 2].to_vec());
        Ok(())
    }
}

/// Hands out the same engine every time and counts how often it was asked.
pub struct FixedFactory {
    pub engine: Arc<MemoryEngine>,
    pub loads: Arc<AtomicUsize>,
}

impl FixedFactory {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self {
            engine,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl EngineFactory for FixedFactory {
    async fn load(&self) -> Result<SharedEngine> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.engine.clone())
    }
}

/// Fails the first `failures` loads, then hands out the engine.
pub struct FlakyFactory {
    pub engine: Arc<MemoryEngine>,
    pub loads: Arc<AtomicUsize>,
    failures: usize,
}

impl FlakyFactory {
    pub fn new(engine: Arc<MemoryEngine>, failures: usize) -> Self {
        Self {
            engine,
            loads: Arc::new(AtomicUsize::new(0)),
            failures,
        }
    }
}

#[async_trait]
impl EngineFactory for FlakyFactory {
    async fn load(&self) -> Result<SharedEngine> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(PipelineError::EngineLoad("core script fetch failed".to_string()));
        }
        Ok(self.engine.clone())
    }
}
