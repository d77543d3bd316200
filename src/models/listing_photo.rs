use chrono::{DateTime, Utc};
use serde::Serialize;

/// Uploaded photo as recorded for a listing or profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingPhoto {
    pub id: i64,
    pub remote_id: String,
    pub owner_id: String,
    pub record_id: Option<String>,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub format: Option<String>,
    /// Set once the final order was submitted
    pub position: Option<i64>,
    pub is_cover: bool,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub created_at: String,
}
