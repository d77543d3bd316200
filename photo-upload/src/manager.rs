//! Orchestrates the images of one upload session.
//!
//! The manager owns the `ImageSet` behind a mutex and runs one task per
//! upload attempt: wait for a concurrency permit, compress, upload through
//! the preset resolver, then hand the result to the optional result sink.
//! Every state change is published while the lock is held: each listener
//! gets its own queue holding every snapshot in order, and a watch channel
//! carries the latest snapshot for callers that poll.
//!
//! Methods that start work (`register_files`, `retry`, `subscribe`) spawn
//! Tokio tasks and must be called from within a Tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;

use crate::compress::{compress_in_background, ImageCompressor, RasterCompressor};
use crate::config::{AutoRetryPolicy, PipelineConfig};
use crate::error::{ConfigError, FailureClass, ImageSetError, ValidationError};
use crate::image_set::{AttemptTicket, ImageSet};
use crate::models::{
    BatchSummary, FinalImage, ImageId, ImageItem, ItemFailure, OwnerContext, RecordStatus,
    SourceFile,
};
use crate::preset::PresetResolver;
use crate::sink::ResultSink;
use crate::transport::{ProgressCallback, UploadTransport};
use crate::validator::FileValidator;

/// Result of handing a batch of files to the manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    pub accepted: Vec<ImageId>,
    pub rejected: Vec<ValidationError>,
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping the subscription stops the listener"]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct SinkBinding {
    sink: Arc<dyn ResultSink>,
    owner: OwnerContext,
}

struct Inner {
    config: PipelineConfig,
    validator: FileValidator,
    compressor: Arc<dyn ImageCompressor>,
    resolver: PresetResolver,
    sink: Option<SinkBinding>,
    permits: Option<Arc<Semaphore>>,
    set: Mutex<ImageSet>,
    updates: watch::Sender<Vec<ImageItem>>,
    /// Only locked while `set` is held
    listeners: Mutex<Vec<mpsc::UnboundedSender<Vec<ImageItem>>>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ImageSet> {
        self.set.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, set: &ImageSet) {
        let snapshot = set.snapshot();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|listener| listener.send(snapshot.clone()).is_ok());
        self.updates.send_replace(snapshot);
    }

    /// Runs a state transition and publishes if it changed anything.
    fn apply(&self, transition: impl FnOnce(&mut ImageSet) -> bool) -> bool {
        let mut set = self.lock();
        let changed = transition(&mut set);
        if changed {
            self.publish(&set);
        }
        changed
    }
}

pub struct ImageSetManagerBuilder {
    config: PipelineConfig,
    transport: Arc<dyn UploadTransport>,
    compressor: Arc<dyn ImageCompressor>,
    sink: Option<SinkBinding>,
}

impl ImageSetManagerBuilder {
    pub fn compressor(mut self, compressor: Arc<dyn ImageCompressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Records every completed upload for `owner` through `sink`.
    pub fn sink(mut self, sink: Arc<dyn ResultSink>, owner: OwnerContext) -> Self {
        self.sink = Some(SinkBinding { sink, owner });
        self
    }

    pub fn build(self) -> Result<ImageSetManager, ConfigError> {
        self.config.validate()?;

        let resolver = PresetResolver::new(
            self.transport,
            self.config.preset_candidates.clone(),
            self.config.attempt_timeout(),
        );
        let (updates, _) = watch::channel(Vec::new());

        Ok(ImageSetManager {
            inner: Arc::new(Inner {
                validator: FileValidator::from_config(&self.config),
                permits: self
                    .config
                    .max_concurrent_uploads
                    .map(|n| Arc::new(Semaphore::new(n))),
                set: Mutex::new(ImageSet::new(self.config.max_files)),
                compressor: self.compressor,
                resolver,
                sink: self.sink,
                updates,
                listeners: Mutex::new(Vec::new()),
                config: self.config,
            }),
        })
    }
}

/// Handle to one upload session. Cheap to clone.
#[derive(Clone)]
pub struct ImageSetManager {
    inner: Arc<Inner>,
}

impl ImageSetManager {
    pub fn builder(
        config: PipelineConfig,
        transport: Arc<dyn UploadTransport>,
    ) -> ImageSetManagerBuilder {
        ImageSetManagerBuilder {
            config,
            transport,
            compressor: Arc::new(RasterCompressor),
            sink: None,
        }
    }

    /// Manager with the default compressor and no result sink.
    pub fn new(
        config: PipelineConfig,
        transport: Arc<dyn UploadTransport>,
    ) -> Result<Self, ConfigError> {
        Self::builder(config, transport).build()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Validates and registers files, then starts compressing and uploading
    /// them in the background.
    ///
    /// Invalid files and files beyond the item limit are reported in the
    /// returned report and never registered. Upload outcomes are observed
    /// through `subscribe`, `watch` or `settled`.
    pub fn register_files(&self, files: Vec<SourceFile>) -> RegistrationReport {
        let mut report = RegistrationReport::default();
        let mut tickets = Vec::new();

        {
            let mut set = self.inner.lock();
            for file in files {
                let registered = self
                    .inner
                    .validator
                    .validate(&file)
                    .and_then(|_| set.insert(file));
                match registered {
                    Ok(ticket) => {
                        report.accepted.push(ticket.id);
                        tickets.push(ticket);
                    }
                    Err(e) => {
                        log::warn!("Rejected photo: {}", e);
                        report.rejected.push(e);
                    }
                }
            }
            if !tickets.is_empty() {
                self.inner.publish(&set);
            }
        }

        log::info!(
            "Registered {} photos, rejected {}",
            report.accepted.len(),
            report.rejected.len()
        );

        for ticket in tickets {
            tokio::spawn(run_attempt(Arc::clone(&self.inner), ticket, true));
        }
        report
    }

    /// Calls `listener` with the full item list now and after every change.
    ///
    /// Every state change is delivered, in order. The listener runs on its
    /// own task and may call back into the manager.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[ImageItem]) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let set = self.inner.lock();
            // Cannot fail, `rx` is still in scope
            let _ = tx.send(set.snapshot());
            self.inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(tx);
        }

        let handle = tokio::spawn(async move {
            while let Some(items) = rx.recv().await {
                listener(&items);
            }
        });
        Subscription { handle }
    }

    /// Latest snapshot only, for callers that poll. Intermediate states may
    /// be skipped.
    pub fn watch(&self) -> watch::Receiver<Vec<ImageItem>> {
        self.inner.updates.subscribe()
    }

    pub fn items(&self) -> Vec<ImageItem> {
        self.inner.lock().snapshot()
    }

    pub fn set_cover(&self, id: ImageId) -> Result<(), ImageSetError> {
        let mut set = self.inner.lock();
        if set.set_cover(id)? {
            log::debug!("Cover photo is now {}", id);
            self.inner.publish(&set);
        }
        Ok(())
    }

    /// Removes an image in any state. Running compression or uploads for it
    /// are cancelled and its buffers released.
    pub fn remove(&self, id: ImageId) -> Result<(), ImageSetError> {
        let mut set = self.inner.lock();
        let removed = set.remove(id)?;
        self.inner.publish(&set);
        log::debug!("Removed {} ({})", removed.file_name, id);
        Ok(())
    }

    pub fn reorder(&self, order: &[ImageId]) -> Result<(), ImageSetError> {
        let mut set = self.inner.lock();
        set.reorder(order)?;
        self.inner.publish(&set);
        Ok(())
    }

    /// Uploads a failed image again with progress reset to zero.
    pub fn retry(&self, id: ImageId) -> Result<(), ImageSetError> {
        let ticket = {
            let mut set = self.inner.lock();
            let ticket = set.begin_retry(id)?;
            self.inner.publish(&set);
            ticket
        };
        log::info!("Retrying {} (attempt {})", id, ticket.attempt);
        tokio::spawn(run_attempt(Arc::clone(&self.inner), ticket, false));
        Ok(())
    }

    /// Completed images in current order, for the hosting form at submit time.
    pub fn final_descriptors(&self) -> Vec<FinalImage> {
        self.inner.lock().final_images()
    }

    /// Waits until no image is compressing, uploading or being recorded.
    pub async fn settled(&self) -> BatchSummary {
        let mut rx = self.inner.updates.subscribe();
        let items = match rx
            .wait_for(|items| !items.iter().any(ImageItem::is_in_flight))
            .await
        {
            Ok(items) => items.clone(),
            Err(_) => self.items(),
        };
        BatchSummary::from_items(items)
    }

    /// Abandons the session: cancels all running work and empties the set.
    pub fn discard(&self) {
        let mut set = self.inner.lock();
        let count = set.clear();
        self.inner.publish(&set);
        log::debug!("Discarded upload session with {} photos", count);
    }
}

/// One upload attempt. `fresh` attempts compress first; retries reuse the
/// payload prepared by the first attempt.
async fn run_attempt(inner: Arc<Inner>, ticket: AttemptTicket, fresh: bool) {
    let AttemptTicket {
        id,
        attempt,
        file,
        cancel,
    } = ticket;

    let permit = match &inner.permits {
        Some(permits) => tokio::select! {
            _ = cancel.cancelled() => return,
            permit = Arc::clone(permits).acquire_owned() => match permit {
                Ok(permit) => Some(permit),
                Err(_) => return,
            },
        },
        None => None,
    };

    let payload = if fresh {
        if !inner.apply(|set| set.begin_compression(id, attempt)) {
            return;
        }
        let prepared = match compress_in_background(
            Arc::clone(&inner.compressor),
            file,
            inner.config.compression.clone(),
            &cancel,
        )
        .await
        {
            Some(prepared) => prepared,
            None => return,
        };
        if !inner.apply(|set| set.begin_upload(id, attempt, prepared.clone())) {
            return;
        }
        prepared
    } else {
        file
    };

    let progress: ProgressCallback = {
        let inner = Arc::clone(&inner);
        Arc::new(move |percent| {
            inner.apply(|set| set.record_progress(id, attempt, percent));
        })
    };

    let policy = &inner.config.auto_retry;
    let mut auto_retries = 0;
    let result = loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("Upload of {} cancelled", id);
                return;
            }
            outcome = inner.resolver.upload_with_fallback(&payload, progress.clone()) => outcome,
        };
        match outcome {
            Err(e) if e.class() == FailureClass::Network && auto_retries < policy.max_retries => {
                auto_retries += 1;
                let delay = backoff_delay(policy, auto_retries);
                log::warn!(
                    "Upload of {} failed (retry {}/{}): {}. Retrying in {:?}",
                    payload.file_name,
                    auto_retries,
                    policy.max_retries,
                    e,
                    delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            other => break other,
        }
    };
    drop(permit);

    let descriptor = match result {
        Ok(descriptor) => descriptor,
        Err(e) => {
            log::warn!("Upload of {} failed: {}", payload.file_name, e);
            inner.apply(|set| set.fail(id, attempt, ItemFailure::from(&e)));
            return;
        }
    };

    let record_pending = inner.sink.is_some();
    if !inner.apply(|set| set.complete(id, attempt, descriptor.clone(), record_pending)) {
        return;
    }

    if let Some(binding) = &inner.sink {
        let recorded = tokio::select! {
            _ = cancel.cancelled() => return,
            recorded = binding.sink.persist(&descriptor, &binding.owner) => recorded,
        };
        let status = match recorded {
            Ok(()) => RecordStatus::Recorded,
            Err(e) => {
                log::warn!(
                    "Photo {} saved remotely but not recorded: {}",
                    descriptor.remote_id,
                    e
                );
                RecordStatus::NotRecorded(e.to_string())
            }
        };
        inner.apply(|set| set.set_record(id, attempt, status));
    }
}

/// Capped exponential backoff with jitter
fn backoff_delay(policy: &AutoRetryPolicy, retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1).min(6);
    let base = policy.base_delay_ms.saturating_mul(1u64 << exponent);
    let capped = base.min(policy.max_delay_ms);
    let jittered = rand::rng().random_range(capped / 2..=capped);
    Duration::from_millis(jittered)
}
