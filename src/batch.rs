use crate::compress::{Compress, ProgressFn};
use crate::error::{PipelineError, Result};
use crate::media::MediaFile;
use crate::preview::{PreviewHandle, PreviewRegistry};
use crate::upload::{BackendRegistry, StorageService, UploadIntent, UploadTarget};
use crate::validation::validate_media;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Compressing,
    Uploading,
    Success,
    Error,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Compressing => "compressing",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// One file moving through the batch.
#[derive(Debug)]
pub struct FileUploadRecord {
    pub id: Uuid,
    pub source: MediaFile,
    pub compressed: Option<MediaFile>,
    pub preview: Option<PreviewHandle>,
    pub upload_progress_percent: u8,
    pub compression_progress_percent: u8,
    pub status: UploadStatus,
    pub error_message: Option<String>,
    pub original_size_bytes: u64,
    pub compressed_size_bytes: Option<u64>,
    pub file_url: Option<String>,
}

impl FileUploadRecord {
    fn new(source: MediaFile, preview: Option<PreviewHandle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_size_bytes: source.size(),
            source,
            compressed: None,
            preview,
            upload_progress_percent: 0,
            compression_progress_percent: 0,
            status: UploadStatus::Pending,
            error_message: None,
            compressed_size_bytes: None,
            file_url: None,
        }
    }

    fn reset(&mut self) {
        self.compressed = None;
        self.upload_progress_percent = 0;
        self.compression_progress_percent = 0;
        self.status = UploadStatus::Pending;
        self.error_message = None;
        self.compressed_size_bytes = None;
        self.file_url = None;
    }
}

/// A file that failed validation and never entered the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub file_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub succeeded_count: usize,
    pub failed_count: usize,
    /// Records left unprocessed because the run was cancelled.
    pub pending_count: usize,
    pub cancelled: bool,
}

impl BatchResult {
    /// True only when every record in the batch reached `Success`.
    pub fn is_success(&self) -> bool {
        self.failed_count == 0 && self.pending_count == 0
    }

    pub fn total(&self) -> usize {
        self.succeeded_count + self.failed_count + self.pending_count
    }
}

/// Where a batch is being uploaded to: the intent plus the id of the entity
/// (athlete, team) the files belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTarget {
    pub intent: UploadIntent,
    pub target_id: String,
}

impl BatchTarget {
    pub fn new(intent: UploadIntent, target_id: impl Into<String>) -> Self {
        Self {
            intent,
            target_id: target_id.into(),
        }
    }

    fn is_selected(&self) -> bool {
        !self.target_id.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Rejected { file_name: String, message: String },
    StatusChanged { index: usize, id: Uuid, status: UploadStatus },
    CompressionProgress { index: usize, id: Uuid, percent: u8 },
    UploadProgress { index: usize, id: Uuid, percent: u8 },
    Finished(BatchResult),
}

enum RecordOutcome {
    Finished,
    Interrupted,
}

/// Drives selected files through compress, upload and registration.
///
/// Records are processed one at a time in the order they were added. A
/// failing record is marked `Error` and the run moves on to the next one.
pub struct UploadBatch {
    compressor: Arc<dyn Compress>,
    storage: Arc<dyn StorageService>,
    backend: Arc<dyn BackendRegistry>,
    previews: Arc<dyn PreviewRegistry>,
    records: Vec<FileUploadRecord>,
    events: Option<mpsc::UnboundedSender<BatchEvent>>,
}

impl UploadBatch {
    pub fn new(
        compressor: Arc<dyn Compress>,
        storage: Arc<dyn StorageService>,
        backend: Arc<dyn BackendRegistry>,
        previews: Arc<dyn PreviewRegistry>,
    ) -> Self {
        Self {
            compressor,
            storage,
            backend,
            previews,
            records: Vec::new(),
            events: None,
        }
    }

    /// Returns a receiver for status and progress events. A later call
    /// replaces the previous subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<BatchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    pub fn records(&self) -> &[FileUploadRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Validates and queues files. Invalid files are returned and never queued.
    pub fn add_files(&mut self, files: Vec<MediaFile>) -> Vec<Rejection> {
        let mut rejections = Vec::new();
        for file in files {
            if let Some(message) = validate_media(&file).error_message() {
                info!("Rejected {}: {}", file.name, message);
                let rejection = Rejection {
                    file_name: file.name.clone(),
                    message: message.to_string(),
                };
                self.emit(BatchEvent::Rejected {
                    file_name: rejection.file_name.clone(),
                    message: rejection.message.clone(),
                });
                rejections.push(rejection);
                continue;
            }

            let preview = match self.previews.acquire(&file) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!("No preview for {}: {}", file.name, e);
                    None
                }
            };
            let record = FileUploadRecord::new(file, preview);
            debug!("Queued {} as record {}", record.source.name, record.id);
            self.records.push(record);
            self.emit_status(self.records.len() - 1);
        }
        rejections
    }

    /// Removes a record that has not started processing and releases its preview.
    pub fn remove_file(&mut self, index: usize) -> Result<MediaFile> {
        let record = self
            .records
            .get(index)
            .ok_or(PipelineError::RecordNotFound(index))?;
        if record.status != UploadStatus::Pending {
            return Err(PipelineError::RecordLocked(index));
        }
        let mut record = self.records.remove(index);
        if let Some(handle) = record.preview.take() {
            self.previews.release(handle);
        }
        Ok(record.source)
    }

    /// Puts a failed record back in the queue; the next run starts it from
    /// compression. Pending records are left as they are.
    pub fn retry(&mut self, index: usize) -> Result<()> {
        let record = self
            .records
            .get_mut(index)
            .ok_or(PipelineError::RecordNotFound(index))?;
        match record.status {
            UploadStatus::Error => {
                record.reset();
                self.emit_status(index);
                Ok(())
            }
            UploadStatus::Pending => Ok(()),
            _ => Err(PipelineError::RecordLocked(index)),
        }
    }

    /// Re-queues every failed record, returning how many were reset.
    pub fn retry_failed(&mut self) -> usize {
        let failed: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == UploadStatus::Error)
            .map(|(i, _)| i)
            .collect();
        for &index in &failed {
            self.records[index].reset();
            self.emit_status(index);
        }
        failed.len()
    }

    /// Processes every pending record for `target`.
    ///
    /// Only misuse is an error: an empty batch or no selected target.
    /// Per-record failures are recorded on the record and reflected in the
    /// returned counts. Cancellation is honoured before each record and between
    /// compression and upload; a step already running is allowed to finish.
    pub async fn run_batch(
        &mut self,
        target: &BatchTarget,
        cancel: &CancellationToken,
    ) -> Result<BatchResult> {
        if self.records.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }
        if !target.is_selected() {
            return Err(PipelineError::NoTarget);
        }
        let intent = target.intent;

        info!(
            "Starting upload batch of {} files as {} for {}",
            self.records.len(),
            intent,
            target.target_id
        );
        let mut cancelled = false;
        for index in 0..self.records.len() {
            if self.records[index].status != UploadStatus::Pending {
                continue;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if let RecordOutcome::Interrupted = self.process_record(index, intent, cancel).await {
                cancelled = true;
                break;
            }
        }

        let result = self.summary(cancelled);
        if cancelled {
            info!("Upload batch cancelled with {} files left pending", result.pending_count);
        }
        info!(
            "Upload batch finished: {} succeeded, {} failed",
            result.succeeded_count, result.failed_count
        );
        self.emit(BatchEvent::Finished(result));
        Ok(result)
    }

    /// Releases every outstanding preview and forgets all records.
    pub fn close(&mut self) {
        self.release_previews();
        self.records.clear();
    }

    async fn process_record(
        &mut self,
        index: usize,
        intent: UploadIntent,
        cancel: &CancellationToken,
    ) -> RecordOutcome {
        self.set_status(index, UploadStatus::Compressing);

        let high_water = Arc::new(AtomicU8::new(0));
        let compressor = Arc::clone(&self.compressor);
        let on_progress = self.compression_progress_sink(index, Arc::clone(&high_water));
        let compressed = compressor
            .compress(&self.records[index].source, on_progress)
            .await;
        self.records[index].compression_progress_percent = high_water.load(Ordering::Relaxed);

        let compressed = match compressed {
            Ok(result) => result,
            Err(e) => {
                self.fail(index, e);
                return RecordOutcome::Finished;
            }
        };
        {
            let record = &mut self.records[index];
            record.compression_progress_percent = 100;
            record.compressed_size_bytes = Some(compressed.compressed_size_bytes);
            record.compressed = Some(compressed.output);
        }

        if cancel.is_cancelled() {
            self.records[index].reset();
            self.emit_status(index);
            return RecordOutcome::Interrupted;
        }

        self.set_status(index, UploadStatus::Uploading);
        self.emit_upload_progress(index);

        let target = match self.upload_compressed(index, intent).await {
            Ok(target) => target,
            Err(e) => {
                self.fail(index, e);
                return RecordOutcome::Finished;
            }
        };

        let backend = Arc::clone(&self.backend);
        match backend.notify_upload_complete(&target.storage_key, intent).await {
            Ok(registered) => {
                let record = &mut self.records[index];
                record.file_url = Some(registered.final_file_url);
                record.upload_progress_percent = 100;
                if let Some(handle) = record.preview.take() {
                    self.previews.release(handle);
                }
                self.emit_upload_progress(index);
                self.set_status(index, UploadStatus::Success);
                info!("Uploaded {}", self.records[index].source.name);
            }
            Err(e) => self.fail(index, e),
        }
        RecordOutcome::Finished
    }

    async fn upload_compressed(&self, index: usize, intent: UploadIntent) -> Result<UploadTarget> {
        let record = &self.records[index];
        let file = record.compressed.as_ref().unwrap_or(&record.source);
        let target = self
            .storage
            .request_upload_target(&file.name, &file.mime_type, intent)
            .await?;
        self.storage.submit_to_upload_endpoint(&target, file).await?;
        Ok(target)
    }

    fn compression_progress_sink(&self, index: usize, high_water: Arc<AtomicU8>) -> ProgressFn {
        let events = self.events.clone();
        let id = self.records[index].id;
        Arc::new(move |percent: u8| {
            let percent = percent.min(100);
            let previous = high_water.fetch_max(percent, Ordering::Relaxed);
            if percent > previous {
                if let Some(tx) = &events {
                    let _ = tx.send(BatchEvent::CompressionProgress { index, id, percent });
                }
            }
        })
    }

    fn fail(&mut self, index: usize, error: PipelineError) {
        let record = &mut self.records[index];
        warn!("Upload of {} failed: {}", record.source.name, error);
        record.error_message = Some(error.to_string());
        self.set_status(index, UploadStatus::Error);
    }

    fn set_status(&mut self, index: usize, status: UploadStatus) {
        self.records[index].status = status;
        self.emit_status(index);
    }

    fn emit_status(&self, index: usize) {
        let record = &self.records[index];
        self.emit(BatchEvent::StatusChanged {
            index,
            id: record.id,
            status: record.status,
        });
    }

    fn emit_upload_progress(&self, index: usize) {
        let record = &self.records[index];
        self.emit(BatchEvent::UploadProgress {
            index,
            id: record.id,
            percent: record.upload_progress_percent,
        });
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn summary(&self, cancelled: bool) -> BatchResult {
        let count = |status: UploadStatus| self.records.iter().filter(|r| r.status == status).count();
        BatchResult {
            succeeded_count: count(UploadStatus::Success),
            failed_count: count(UploadStatus::Error),
            pending_count: count(UploadStatus::Pending),
            cancelled,
        }
    }

    fn release_previews(&mut self) {
        for record in &mut self.records {
            if let Some(handle) = record.preview.take() {
                self.previews.release(handle);
            }
        }
    }
}

impl Drop for UploadBatch {
    fn drop(&mut self) {
        self.release_previews();
    }
}
