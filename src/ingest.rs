use std::path::Path;

use axum::body::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    codec,
    error::{Error, Result},
    storage::{Folder, FolderStore},
};

/// Hard ceiling for a single upload, the same for every folder.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Ingestor {
    store: FolderStore,
}

impl Ingestor {
    pub fn new(store: FolderStore) -> Self {
        Self { store }
    }

    /// Stores `payload` in `folder_name` and returns the new image id.
    ///
    /// The folder is validated before the payload is looked at.
    pub async fn ingest(&self, folder_name: &str, payload: Bytes) -> Result<String> {
        let folder = self.store.existing_folder(folder_name).await?;
        self.ingest_into(&folder, payload).await
    }

    /// Stores `payload` in a folder that has already been resolved.
    ///
    /// A file only appears under its id once encoding and writing have both
    /// succeeded. Anything staged on the way is removed on failure.
    pub async fn ingest_into(&self, folder: &Folder, payload: Bytes) -> Result<String> {
        if payload.len() > MAX_UPLOAD_BYTES {
            return Err(Error::PayloadTooLarge {
                limit: MAX_UPLOAD_BYTES,
            });
        }

        let id = Uuid::new_v4().to_string();
        let received = payload.len();
        let encoded = codec::normalize_blocking(payload).await?;
        persist(folder, &id, &encoded).await?;
        info!(
            folder = %folder.name(),
            id = %id,
            received,
            stored = encoded.len(),
            "stored image"
        );
        Ok(id)
    }
}

/// Writes `bytes` to a staging file next to the item, then renames it into
/// place.
async fn persist(folder: &Folder, id: &str, bytes: &[u8]) -> Result<()> {
    let staged = folder.partial_path(id)?;
    let target = folder.item_path(id)?;
    let written = match tokio::fs::write(&staged, bytes).await {
        Ok(()) => tokio::fs::rename(&staged, &target).await,
        Err(err) => Err(err),
    };
    if let Err(err) = written {
        discard(&staged).await;
        return Err(err.into());
    }
    Ok(())
}

async fn discard(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "failed to remove partial upload: {err}");
        }
    }
}
