use serde_json::Value;

use crate::{
    db::Db,
    error::{AppError, AppResult},
    models::GalleryPhoto,
    params,
    storage::{MAX_UPLOAD_BYTES, StorageState, parse_data_url},
};

const PHOTO_COLUMNS: &str = "id, filename, alt, position, storage_key, url, created_at";

/// GalleryService
///
/// Photo metadata lives in `gallery_photos`; the bytes belong to the storage
/// adapter. The row is the source of truth for whether a photo exists.
#[derive(Clone)]
pub struct GalleryService {
    db: Db,
    storage: StorageState,
}

impl GalleryService {
    pub fn new(db: Db, storage: StorageState) -> Self {
        Self { db, storage }
    }

    /// Display order: position ascending, newer photos first on ties.
    pub async fn list(&self) -> AppResult<Vec<GalleryPhoto>> {
        let rows = self
            .db
            .get_all(
                &format!(
                    "SELECT {PHOTO_COLUMNS} FROM gallery_photos ORDER BY position ASC, created_at DESC, id DESC"
                ),
                &[],
            )
            .await?;

        rows.into_iter()
            .map(|row| {
                let photo = GalleryPhoto::try_from(row)?;
                Ok(self.storage.attach_public_url(photo))
            })
            .collect()
    }

    pub async fn get(&self, id: i64) -> AppResult<GalleryPhoto> {
        let row = self
            .db
            .get_one(
                &format!("SELECT {PHOTO_COLUMNS} FROM gallery_photos WHERE id = ?"),
                &params![id],
            )
            .await?
            .ok_or_else(|| AppError::not_found("Photo not found"))?;
        Ok(self.storage.attach_public_url(GalleryPhoto::try_from(row)?))
    }

    /// create
    ///
    /// Decodes the data URL, enforces the size cap before touching any
    /// storage, stores the bytes, then records the row at the end of the
    /// current order.
    pub async fn create(&self, image: &str, alt: Option<&str>) -> AppResult<i64> {
        if image.trim().is_empty() {
            return Err(AppError::validation("Image data is required"));
        }
        let decoded = parse_data_url(image).ok_or_else(|| {
            AppError::validation("Invalid image format. Use PNG, JPEG, or WebP.")
        })?;
        if decoded.bytes.len() > MAX_UPLOAD_BYTES {
            tracing::warn!(bytes = decoded.bytes.len(), "Rejected oversized upload");
            return Err(AppError::PayloadTooLarge);
        }

        let saved = self
            .storage
            .save(decoded.bytes, &decoded.mime, &decoded.extension)
            .await?;

        let alt = normalize_alt(alt);
        let position = chrono::Utc::now().timestamp_millis();

        let inserted = self
            .db
            .run(
                "INSERT INTO gallery_photos (filename, alt, position, storage_key, url) VALUES (?, ?, ?, ?, ?)",
                &params![
                    &saved.filename,
                    alt,
                    position,
                    saved.storage_key.clone(),
                    saved.url.clone()
                ],
            )
            .await;

        let result = match inserted {
            Ok(result) => result,
            Err(e) => {
                // Do not leave orphaned bytes behind a row that was never written.
                if let Err(cleanup) = self
                    .storage
                    .delete(&saved.filename, saved.storage_key.as_deref())
                    .await
                {
                    tracing::error!(error = %cleanup, "Failed to clean up stored image");
                }
                return Err(e.into());
            }
        };

        let id = result
            .generated_id
            .ok_or_else(|| AppError::Internal("insert returned no id".into()))?;
        tracing::info!(photo_id = id, filename = %saved.filename, "Photo uploaded");
        Ok(id)
    }

    /// Replaces the alt text; blank clears it.
    pub async fn update_alt(&self, id: i64, alt: Option<&str>) -> AppResult<()> {
        let result = self
            .db
            .run(
                "UPDATE gallery_photos SET alt = ? WHERE id = ?",
                &params![normalize_alt(alt), id],
            )
            .await?;
        if result.affected == 0 {
            return Err(AppError::not_found("Photo not found"));
        }
        Ok(())
    }

    /// reorder
    ///
    /// Assigns positions 1..N in the given order. Entries that are not
    /// integer ids are skipped without consuming a position; ids with no row
    /// are skipped too. Returns how many rows were moved.
    pub async fn reorder(&self, order: &[Value]) -> AppResult<i64> {
        let mut position = 0_i64;
        for id in order.iter().filter_map(photo_id) {
            let next = position + 1;
            let result = self
                .db
                .run(
                    "UPDATE gallery_photos SET position = ? WHERE id = ?",
                    &params![next, id],
                )
                .await?;
            if result.affected > 0 {
                position = next;
            }
        }
        tracing::info!(updated = position, "Gallery reordered");
        Ok(position)
    }

    /// delete
    ///
    /// Removes the row first; failing to remove the bytes afterwards is
    /// logged and does not fail the request.
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let photo = self.get(id).await?;

        self.db
            .run("DELETE FROM gallery_photos WHERE id = ?", &params![id])
            .await?;

        if let Err(e) = self
            .storage
            .delete(&photo.filename, photo.storage_key.as_deref())
            .await
        {
            tracing::error!(photo_id = id, error = %e, "Failed to delete image bytes");
        }

        tracing::info!(photo_id = id, "Photo deleted");
        Ok(())
    }
}

fn normalize_alt(alt: Option<&str>) -> Option<String> {
    alt.map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}

/// Integers, or strings holding one, count as ids.
fn photo_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
