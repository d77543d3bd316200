//! The ordered collection behind one upload session.
//!
//! All mutations are synchronous. The manager wraps the set in a mutex and
//! drives it from the asynchronous per-item tasks. Operations that come from
//! a task carry the attempt number they were started for; if the item has
//! been removed or retried since, the call is ignored and returns `false`.
//!
//! Invariant: when the set is non-empty exactly one item is the cover.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::error::{ImageSetError, ValidationError};
use crate::models::{
    FinalImage, ImageId, ImageItem, ItemFailure, ItemState, RecordStatus, RemoteDescriptor,
    SourceFile,
};

struct Entry {
    item: ImageItem,
    /// File as picked, kept until the upload completes
    original: Option<SourceFile>,
    /// Compressed payload, kept for retries
    prepared: Option<SourceFile>,
    cancel: CancellationToken,
}

/// What a task needs to run an upload attempt
#[derive(Debug, Clone)]
pub(crate) struct AttemptTicket {
    pub id: ImageId,
    pub attempt: u32,
    pub file: SourceFile,
    pub cancel: CancellationToken,
}

pub(crate) struct ImageSet {
    entries: Vec<Entry>,
    max_items: usize,
}

impl ImageSet {
    pub fn new(max_items: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_items,
        }
    }

    /// Appends a file in `Pending` state.
    pub fn insert(&mut self, file: SourceFile) -> Result<AttemptTicket, ValidationError> {
        if self.entries.len() >= self.max_items {
            return Err(ValidationError::CountLimit {
                file_name: file.file_name.clone(),
                max: self.max_items,
            });
        }

        let id = ImageId::new();
        let cancel = CancellationToken::new();
        self.entries.push(Entry {
            item: ImageItem {
                id,
                file_name: file.file_name.clone(),
                media_type: file.media_type.clone(),
                byte_size: file.byte_size(),
                state: ItemState::Pending,
                progress_percent: 0,
                is_cover: false,
                attempt: 1,
                record: RecordStatus::NotRequested,
            },
            original: Some(file.clone()),
            prepared: None,
            cancel: cancel.clone(),
        });
        self.ensure_cover();

        Ok(AttemptTicket {
            id,
            attempt: 1,
            file,
            cancel,
        })
    }

    /// Removes an item in any state, cancelling its running work and
    /// releasing its buffers.
    pub fn remove(&mut self, id: ImageId) -> Result<ImageItem, ImageSetError> {
        let index = self.index_of(id)?;
        let entry = self.entries.remove(index);
        entry.cancel.cancel();
        self.ensure_cover();
        Ok(entry.item)
    }

    /// Makes `id` the cover. Returns whether anything changed.
    pub fn set_cover(&mut self, id: ImageId) -> Result<bool, ImageSetError> {
        let index = self.index_of(id)?;
        if self.entries[index].item.is_cover {
            return Ok(false);
        }
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.item.is_cover = i == index;
        }
        Ok(true)
    }

    /// Replaces the order. `order` must name every item exactly once.
    pub fn reorder(&mut self, order: &[ImageId]) -> Result<(), ImageSetError> {
        let invalid = || ImageSetError::InvalidOrder {
            expected: self.entries.len(),
            actual: order.len(),
        };
        if order.len() != self.entries.len() {
            return Err(invalid());
        }
        let unique: HashSet<ImageId> = order.iter().copied().collect();
        if unique.len() != order.len() {
            return Err(invalid());
        }
        if let Some(missing) = order.iter().find(|id| self.index_of(**id).is_err()) {
            return Err(ImageSetError::UnknownImage(*missing));
        }

        let mut entries = std::mem::take(&mut self.entries);
        for id in order {
            if let Some(pos) = entries.iter().position(|e| e.item.id == *id) {
                self.entries.push(entries.swap_remove(pos));
            }
        }
        Ok(())
    }

    pub fn begin_compression(&mut self, id: ImageId, attempt: u32) -> bool {
        match self.attempt_entry(id, attempt) {
            Some(entry) if entry.item.state == ItemState::Pending => {
                entry.item.state = ItemState::Compressing;
                true
            }
            _ => false,
        }
    }

    pub fn begin_upload(&mut self, id: ImageId, attempt: u32, prepared: SourceFile) -> bool {
        match self.attempt_entry(id, attempt) {
            Some(entry) if entry.item.state == ItemState::Compressing => {
                entry.item.state = ItemState::Uploading;
                entry.item.progress_percent = 0;
                entry.prepared = Some(prepared);
                true
            }
            _ => false,
        }
    }

    /// Records transport progress. Never decreases and stays below 100 until
    /// the upload is confirmed.
    pub fn record_progress(&mut self, id: ImageId, attempt: u32, percent: u8) -> bool {
        match self.attempt_entry(id, attempt) {
            Some(entry) if entry.item.state == ItemState::Uploading => {
                let percent = percent.min(99);
                if percent > entry.item.progress_percent {
                    entry.item.progress_percent = percent;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Marks the upload as done. `record_pending` is set when a persistence
    /// collaborator will be called next.
    pub fn complete(
        &mut self,
        id: ImageId,
        attempt: u32,
        descriptor: RemoteDescriptor,
        record_pending: bool,
    ) -> bool {
        match self.attempt_entry(id, attempt) {
            Some(entry) if entry.item.state == ItemState::Uploading => {
                entry.item.state = ItemState::Complete { descriptor };
                entry.item.progress_percent = 100;
                entry.item.record = if record_pending {
                    RecordStatus::Pending
                } else {
                    RecordStatus::NotRequested
                };
                // Only the remote reference is kept from here on
                entry.original = None;
                entry.prepared = None;
                true
            }
            _ => false,
        }
    }

    pub fn fail(&mut self, id: ImageId, attempt: u32, failure: ItemFailure) -> bool {
        match self.attempt_entry(id, attempt) {
            Some(entry) if entry.item.state == ItemState::Uploading => {
                entry.item.state = ItemState::Failed { failure };
                true
            }
            _ => false,
        }
    }

    pub fn set_record(&mut self, id: ImageId, attempt: u32, record: RecordStatus) -> bool {
        match self.attempt_entry(id, attempt) {
            Some(entry) if matches!(entry.item.state, ItemState::Complete { .. }) => {
                entry.item.record = record;
                true
            }
            _ => false,
        }
    }

    /// Moves a failed item back to `Uploading` under a new attempt number
    /// with progress reset to zero.
    pub fn begin_retry(&mut self, id: ImageId) -> Result<AttemptTicket, ImageSetError> {
        let index = self.index_of(id)?;
        let entry = &mut self.entries[index];

        let failure = match &entry.item.state {
            ItemState::Failed { failure } => failure,
            other => {
                return Err(ImageSetError::NotRetryable {
                    id,
                    reason: format!("item is {}", state_name(other)),
                })
            }
        };
        if !failure.is_retryable() {
            return Err(ImageSetError::NotRetryable {
                id,
                reason: "the media host rejected this file".to_string(),
            });
        }
        let file = match entry.prepared.clone().or_else(|| entry.original.clone()) {
            Some(file) => file,
            None => {
                return Err(ImageSetError::NotRetryable {
                    id,
                    reason: "file data is no longer available".to_string(),
                })
            }
        };

        entry.cancel.cancel();
        entry.cancel = CancellationToken::new();
        entry.item.attempt += 1;
        entry.item.state = ItemState::Uploading;
        entry.item.progress_percent = 0;
        entry.item.record = RecordStatus::NotRequested;

        Ok(AttemptTicket {
            id,
            attempt: entry.item.attempt,
            file,
            cancel: entry.cancel.clone(),
        })
    }

    /// Cancels everything and empties the set.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        for entry in self.entries.drain(..) {
            entry.cancel.cancel();
        }
        count
    }

    pub fn snapshot(&self) -> Vec<ImageItem> {
        self.entries.iter().map(|e| e.item.clone()).collect()
    }

    /// Completed items in current order.
    pub fn final_images(&self) -> Vec<FinalImage> {
        self.entries
            .iter()
            .filter_map(|e| e.item.descriptor().map(|d| (e, d)))
            .enumerate()
            .map(|(position, (entry, descriptor))| FinalImage {
                id: entry.item.id,
                position,
                is_cover: entry.item.is_cover,
                descriptor: descriptor.clone(),
            })
            .collect()
    }

    fn ensure_cover(&mut self) {
        let covers = self.entries.iter().filter(|e| e.item.is_cover).count();
        if covers == 1 || self.entries.is_empty() {
            return;
        }
        let keep = self.entries.iter().position(|e| e.item.is_cover).unwrap_or(0);
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.item.is_cover = i == keep;
        }
    }

    fn index_of(&self, id: ImageId) -> Result<usize, ImageSetError> {
        self.entries
            .iter()
            .position(|e| e.item.id == id)
            .ok_or(ImageSetError::UnknownImage(id))
    }

    fn attempt_entry(&mut self, id: ImageId, attempt: u32) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| e.item.id == id && e.item.attempt == attempt)
    }
}

fn state_name(state: &ItemState) -> &'static str {
    match state {
        ItemState::Pending => "pending",
        ItemState::Compressing => "compressing",
        ItemState::Uploading => "uploading",
        ItemState::Complete { .. } => "complete",
        ItemState::Failed { .. } => "failed",
    }
}
