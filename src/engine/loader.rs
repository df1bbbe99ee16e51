use super::{EngineFactory, EngineSource, FfmpegLoader, SharedEngine};
use crate::error::{PipelineError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use once_cell::sync::{Lazy, OnceCell};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

type LoadTask = Shared<BoxFuture<'static, std::result::Result<SharedEngine, String>>>;

/// Lazily brings up a single engine instance and hands it to every caller.
///
/// The slot holds the in-flight (or finished) load task. Callers arriving
/// while a load is running await that same task instead of starting another.
/// A successful task stays cached; a failed one is evicted so the next call
/// starts a fresh load.
pub struct TranscoderLoader {
    factory: Arc<dyn EngineFactory>,
    slot: Mutex<Option<LoadTask>>,
}

impl TranscoderLoader {
    pub fn new(factory: impl EngineFactory) -> Self {
        Self {
            factory: Arc::new(factory),
            slot: Mutex::new(None),
        }
    }

    pub async fn get_instance(&self) -> Result<SharedEngine> {
        let task = {
            let mut slot = self.lock_slot();
            match slot.as_ref() {
                Some(task) => task.clone(),
                None => {
                    let task = self.start_load();
                    *slot = Some(task.clone());
                    task
                }
            }
        };

        match task.clone().await {
            Ok(engine) => Ok(engine),
            Err(message) => {
                let mut slot = self.lock_slot();
                if slot.as_ref().is_some_and(|current| current.ptr_eq(&task)) {
                    *slot = None;
                }
                Err(PipelineError::EngineLoad(message))
            }
        }
    }

    /// True once a load has completed successfully.
    pub fn is_ready(&self) -> bool {
        self.lock_slot()
            .as_ref()
            .and_then(|task| task.peek())
            .is_some_and(|outcome| outcome.is_ok())
    }

    fn start_load(&self) -> LoadTask {
        debug!("Starting transcoding engine load");
        let factory = Arc::clone(&self.factory);
        async move {
            match factory.load().await {
                Ok(engine) => {
                    info!("Transcoding engine ready");
                    Ok(engine)
                }
                Err(e) => {
                    warn!("Transcoding engine failed to load: {}", e);
                    Err(match e {
                        PipelineError::EngineLoad(message) => message,
                        other => other.to_string(),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<LoadTask>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static ENGINE_SOURCE: OnceCell<EngineSource> = OnceCell::new();

static GLOBAL_LOADER: Lazy<Arc<TranscoderLoader>> = Lazy::new(|| {
    let source = ENGINE_SOURCE.get().cloned().unwrap_or_default();
    Arc::new(TranscoderLoader::new(FfmpegLoader::new(source)))
});

/// Sets where the process-wide engine comes from. Only the first call before
/// [`global_loader`] is first used has any effect; returns whether it applied.
pub fn install_engine_config(source: EngineSource) -> bool {
    if Lazy::get(&GLOBAL_LOADER).is_some() {
        return false;
    }
    ENGINE_SOURCE.set(source).is_ok()
}

/// The process-wide loader.
pub fn global_loader() -> Arc<TranscoderLoader> {
    Arc::clone(&GLOBAL_LOADER)
}
