//! Display-ready view of an image set.
//!
//! Pure functions over snapshots, so any UI can render them without knowing
//! the state machine.

use serde::Serialize;

use crate::models::{ImageId, ImageItem, ItemState, RecordStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemView {
    pub id: ImageId,
    pub position: usize,
    pub file_name: String,
    pub status_label: &'static str,
    pub percent: u8,
    pub is_cover: bool,
    pub can_retry: bool,
    pub can_set_cover: bool,
    /// Failure or warning text to show under the thumbnail
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryView {
    pub items: Vec<ItemView>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_flight: usize,
    /// Mean progress over all items
    pub overall_percent: u8,
    /// Nothing in flight, nothing failed, at least one image
    pub can_submit: bool,
}

pub fn present(items: &[ImageItem]) -> GalleryView {
    let views: Vec<ItemView> = items
        .iter()
        .enumerate()
        .map(|(position, item)| present_item(position, item))
        .collect();

    let completed = items.iter().filter(|i| i.descriptor().is_some()).count();
    let failed = items.iter().filter(|i| i.failure().is_some()).count();
    let in_flight = items.iter().filter(|i| i.is_in_flight()).count();
    let overall_percent = if items.is_empty() {
        0
    } else {
        let sum: u32 = items.iter().map(|i| u32::from(i.progress_percent)).sum();
        (sum / items.len() as u32) as u8
    };

    GalleryView {
        total: items.len(),
        can_submit: !items.is_empty() && failed == 0 && in_flight == 0,
        items: views,
        completed,
        failed,
        in_flight,
        overall_percent,
    }
}

fn present_item(position: usize, item: &ImageItem) -> ItemView {
    let (status_label, can_retry, message) = match &item.state {
        ItemState::Pending => ("Waiting", false, None),
        ItemState::Compressing => ("Optimizing", false, None),
        ItemState::Uploading => ("Uploading", false, None),
        ItemState::Complete { .. } => match &item.record {
            RecordStatus::Pending => ("Saving", false, None),
            RecordStatus::NotRecorded(_) => (
                "Uploaded",
                false,
                Some("Saved remotely but not recorded with the listing".to_string()),
            ),
            RecordStatus::NotRequested | RecordStatus::Recorded => ("Uploaded", false, None),
        },
        ItemState::Failed { failure } => {
            ("Failed", failure.is_retryable(), Some(failure.user_message()))
        }
    };

    ItemView {
        id: item.id,
        position,
        file_name: item.file_name.clone(),
        status_label,
        percent: item.progress_percent,
        is_cover: item.is_cover,
        can_retry,
        can_set_cover: !item.is_cover,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureClass;
    use crate::models::{ItemFailure, RemoteDescriptor};

    fn item(state: ItemState, progress: u8, is_cover: bool) -> ImageItem {
        ImageItem {
            id: ImageId::new(),
            file_name: "kitchen.jpg".into(),
            media_type: "image/jpeg".into(),
            byte_size: 2048,
            state,
            progress_percent: progress,
            is_cover,
            attempt: 1,
            record: RecordStatus::NotRequested,
        }
    }

    fn complete() -> ItemState {
        ItemState::Complete {
            descriptor: RemoteDescriptor {
                url: "https://media.example/k.jpg".into(),
                remote_id: "k".into(),
                width: 10,
                height: 10,
                byte_size: 100,
                format: None,
                created_at: None,
            },
        }
    }

    #[test]
    fn test_empty_gallery_cannot_submit() {
        let view = present(&[]);
        assert_eq!(view.total, 0);
        assert_eq!(view.overall_percent, 0);
        assert!(!view.can_submit);
    }

    #[test]
    fn test_counts_and_overall_progress() {
        let items = vec![
            item(complete(), 100, true),
            item(ItemState::Uploading, 50, false),
        ];
        let view = present(&items);
        assert_eq!(view.completed, 1);
        assert_eq!(view.in_flight, 1);
        assert_eq!(view.overall_percent, 75);
        assert!(!view.can_submit);
        assert_eq!(view.items[1].position, 1);
        assert_eq!(view.items[1].status_label, "Uploading");
    }

    #[test]
    fn test_failed_items_offer_retry_unless_payload() {
        let network = item(
            ItemState::Failed {
                failure: ItemFailure {
                    class: FailureClass::Network,
                    detail: "reset".into(),
                },
            },
            40,
            true,
        );
        let payload = item(
            ItemState::Failed {
                failure: ItemFailure {
                    class: FailureClass::Payload,
                    detail: "Invalid image file".into(),
                },
            },
            10,
            false,
        );
        let view = present(&[network, payload]);
        assert!(view.items[0].can_retry);
        assert!(!view.items[1].can_retry);
        assert!(view.items[1]
            .message
            .as_deref()
            .unwrap()
            .contains("Invalid image file"));
        assert_eq!(view.failed, 2);
        assert!(!view.can_submit);
    }

    #[test]
    fn test_unrecorded_upload_is_flagged() {
        let mut unrecorded = item(complete(), 100, true);
        unrecorded.record = RecordStatus::NotRecorded("database is locked".into());
        let view = present(&[unrecorded]);
        assert_eq!(view.items[0].status_label, "Uploaded");
        assert!(view.items[0].message.is_some());
        assert!(view.can_submit);
        assert!(!view.items[0].can_set_cover);
    }
}
