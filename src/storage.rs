//! On-disk layout: one directory per folder under the media root, one
//! `<id>.webp` file per stored image.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Extension of every stored image. Never exposed in ids.
pub const STORE_EXTENSION: &str = "webp";

/// Extension of an upload still being written. Not listed as an item.
const PARTIAL_EXTENSION: &str = "partial";

#[derive(Debug, Clone)]
pub struct MediaRoot(PathBuf);

impl MediaRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Resolves a caller-supplied folder name. Does not touch the disk.
    pub fn folder(&self, name: &str) -> Result<Folder> {
        check_segment(name)?;
        Ok(Folder {
            name: name.to_string(),
            path: self.0.join(name),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Folder {
    name: String,
    path: PathBuf,
}

impl Folder {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An id that could never have been generated names no item, so it is
    /// [`Error::ItemNotFound`] rather than a refusal.
    pub fn item_path(&self, id: &str) -> Result<PathBuf> {
        if check_segment(id).is_err() {
            return Err(Error::ItemNotFound(format!("{}/{id}", self.name)));
        }
        Ok(self.path.join(id).with_extension(STORE_EXTENSION))
    }

    /// Where an upload is staged before being renamed to [`Self::item_path`].
    pub fn partial_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.item_path(id)?.with_extension(PARTIAL_EXTENSION))
    }

    pub async fn exists(&self) -> Result<bool> {
        is_dir(&self.path).await
    }
}

/// A name must be a single segment: no dot anywhere, no separator, not empty.
fn check_segment(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('.') || name.contains(['/', '\\']) {
        return Err(Error::Forbidden);
    }
    Ok(())
}

async fn is_dir(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

async fn remove_dir_forced(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct FolderStore {
    root: MediaRoot,
}

impl FolderStore {
    pub fn new(root: MediaRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &MediaRoot {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.root.path()).await?;
        Ok(())
    }

    /// Resolves `name` and fails with [`Error::FolderNotFound`] unless the
    /// directory is on disk.
    pub async fn existing_folder(&self, name: &str) -> Result<Folder> {
        let folder = self.root.folder(name)?;
        if !folder.exists().await? {
            return Err(Error::FolderNotFound(name.to_string()));
        }
        Ok(folder)
    }

    /// Reads a stored image; a missing file or folder is [`Error::ItemNotFound`].
    pub async fn read_item(&self, folder_name: &str, id: &str) -> Result<Vec<u8>> {
        let path = self.root.folder(folder_name)?.item_path(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(Error::ItemNotFound(format!("{folder_name}/{id}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn create_folder(&self) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        tokio::fs::create_dir(self.root.path().join(&id)).await?;
        info!(folder = %id, "created folder");
        Ok(id)
    }

    /// Child directories of the root, in enumeration order.
    pub async fn list_folders(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.root.path()).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Ids of the images in a folder, in enumeration order.
    pub async fn list_items(&self, name: &str) -> Result<Vec<String>> {
        let folder = self.existing_folder(name).await?;
        let suffix = format!(".{STORE_EXTENSION}");
        let mut entries = tokio::fs::read_dir(folder.path()).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            match file_name.strip_suffix(&suffix) {
                Some(id) if !id.is_empty() => ids.push(id.to_string()),
                _ => debug!(folder = name, file = %file_name, "skipping foreign entry"),
            }
        }
        Ok(ids)
    }

    pub async fn clear_folder(&self, name: &str) -> Result<()> {
        let folder = self.existing_folder(name).await?;
        remove_dir_forced(folder.path()).await?;
        info!(folder = name, "cleared folder");
        Ok(())
    }

    /// Removes every folder by recreating the root.
    pub async fn clear_all(&self) -> Result<()> {
        remove_dir_forced(self.root.path()).await?;
        tokio::fs::create_dir_all(self.root.path()).await?;
        info!(root = %self.root.path().display(), "cleared media root");
        Ok(())
    }
}
