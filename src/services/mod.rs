pub mod photo_record_service;
pub mod settings_service;
pub mod upload_service;

pub use photo_record_service::SqliteResultSink;
pub use settings_service::load_settings;
