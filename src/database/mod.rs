pub mod schema;

use std::path::Path;

use rusqlite::Connection;

use crate::error::AppError;

/// Opens the database at `path`, creating its directory and schema if needed
pub fn open_database(path: &Path) -> Result<Connection, AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)?;
    schema::init_schema(&conn)?;
    log::debug!("Opened database at {}", path.display());

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("photos.db");

        let conn = open_database(&path).unwrap();
        assert!(path.exists());

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM listing_photos", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
