pub mod listing_photo;
pub mod settings;

pub use listing_photo::ListingPhoto;
pub use settings::{AppSettings, DatabaseSettings, PipelineProfile};
