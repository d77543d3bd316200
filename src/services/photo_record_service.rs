use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use photo_upload::{FinalImage, OwnerContext, PersistenceError, RemoteDescriptor, ResultSink};
use rusqlite::{params, Connection};

use crate::error::AppError;
use crate::models::ListingPhoto;

/// Inserts or refreshes the row of one completed upload
pub fn insert_listing_photo(
    conn: &Connection,
    descriptor: &RemoteDescriptor,
    owner: &OwnerContext,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO listing_photos (remote_id, owner_id, record_id, url, width, height, byte_size, format, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(remote_id) DO UPDATE SET
            owner_id = excluded.owner_id,
            record_id = excluded.record_id,
            url = excluded.url,
            width = excluded.width,
            height = excluded.height,
            byte_size = excluded.byte_size,
            format = excluded.format,
            uploaded_at = excluded.uploaded_at",
        params![
            descriptor.remote_id,
            owner.owner_id,
            owner.record_id,
            descriptor.url,
            descriptor.width,
            descriptor.height,
            descriptor.byte_size as i64,
            descriptor.format,
            descriptor.created_at,
        ],
    )?;

    let id = conn.query_row(
        "SELECT id FROM listing_photos WHERE remote_id = ?1",
        [&descriptor.remote_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Stores order and cover flag of the submitted image list.
///
/// Rows of the same owner and record that are not part of `images` are
/// deleted. Runs in one transaction.
pub fn record_final_set(
    conn: &mut Connection,
    owner: &OwnerContext,
    images: &[FinalImage],
) -> Result<usize, AppError> {
    let tx = conn.transaction()?;

    for image in images {
        insert_listing_photo(&tx, &image.descriptor, owner)?;
        tx.execute(
            "UPDATE listing_photos SET position = ?1, is_cover = ?2 WHERE remote_id = ?3",
            params![
                image.position as i64,
                image.is_cover,
                image.descriptor.remote_id
            ],
        )?;
    }

    let stale: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT remote_id FROM listing_photos WHERE owner_id = ?1 AND record_id IS ?2",
        )?;
        let attached = stmt
            .query_map(params![owner.owner_id, owner.record_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        attached
    }
    .into_iter()
    .filter(|remote_id| !images.iter().any(|i| i.descriptor.remote_id == *remote_id))
    .collect();
    for remote_id in &stale {
        tx.execute("DELETE FROM listing_photos WHERE remote_id = ?1", [remote_id])?;
    }

    tx.commit()?;
    if !stale.is_empty() {
        log::info!(
            "Dropped {} photos no longer attached to {}",
            stale.len(),
            owner.owner_id
        );
    }
    Ok(images.len())
}

/// Lists recorded photos of an owner in submitted order
pub fn list_listing_photos(
    conn: &Connection,
    owner_id: &str,
    record_id: Option<&str>,
) -> Result<Vec<ListingPhoto>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, remote_id, owner_id, record_id, url, width, height, byte_size, format, position, is_cover, uploaded_at, created_at
         FROM listing_photos
         WHERE owner_id = ?1 AND record_id IS ?2
         ORDER BY position IS NULL, position, id",
    )?;

    let photos = stmt
        .query_map(params![owner_id, record_id], |row| {
            Ok(ListingPhoto {
                id: row.get(0)?,
                remote_id: row.get(1)?,
                owner_id: row.get(2)?,
                record_id: row.get(3)?,
                url: row.get(4)?,
                width: row.get(5)?,
                height: row.get(6)?,
                byte_size: row.get::<_, i64>(7)? as u64,
                format: row.get(8)?,
                position: row.get(9)?,
                is_cover: row.get(10)?,
                uploaded_at: row.get(11)?,
                created_at: row.get(12)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(photos)
}

/// `ResultSink` backed by the local SQLite database
pub struct SqliteResultSink {
    conn: Mutex<Connection>,
}

impl SqliteResultSink {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_final_set(
        &self,
        owner: &OwnerContext,
        images: &[FinalImage],
    ) -> Result<usize, AppError> {
        record_final_set(&mut self.lock(), owner, images)
    }

    pub fn list(&self, owner_id: &str, record_id: Option<&str>) -> Result<Vec<ListingPhoto>, AppError> {
        list_listing_photos(&self.lock(), owner_id, record_id)
    }
}

/// Constraint violations mean the database refused the row itself.
fn persistence_error(e: AppError) -> PersistenceError {
    match e {
        AppError::Database(rusqlite::Error::SqliteFailure(err, message))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            PersistenceError::Rejected(message.unwrap_or_else(|| err.to_string()))
        }
        other => PersistenceError::Backend(other.to_string()),
    }
}

#[async_trait]
impl ResultSink for SqliteResultSink {
    async fn persist(
        &self,
        descriptor: &RemoteDescriptor,
        owner: &OwnerContext,
    ) -> Result<(), PersistenceError> {
        let conn = self.lock();
        let id = insert_listing_photo(&conn, descriptor, owner).map_err(persistence_error)?;
        log::debug!("Recorded {} as row {}", descriptor.remote_id, id);
        Ok(())
    }
}
