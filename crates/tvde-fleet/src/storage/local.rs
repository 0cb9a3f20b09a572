use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use super::{
    content_type_for, normalize_folder, normalize_path, CloudStorage, StorageError,
    StorageProvider, StoredObject,
};

/// Filesystem-backed storage rooted at one partner directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl CloudStorage for LocalStorage {
    fn provider(&self) -> StorageProvider {
        StorageProvider::Local
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let relative = normalize_path(path)?;
        let target = self.root.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let size = bytes.len() as u64;
        fs::write(&target, bytes).await?;
        tracing::debug!(path = %relative, size, "stored file locally");

        Ok(StoredObject {
            path: relative,
            size,
            content_type: content_type.to_string(),
            remote_id: None,
        })
    }

    async fn list(&self, folder: &str) -> Result<Vec<StoredObject>, StorageError> {
        let relative = normalize_folder(folder)?;
        let directory = self.root.join(&relative);
        let mut entries = match fs::read_dir(&directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = super::join_path(&relative, &name);
            objects.push(StoredObject {
                content_type: content_type_for(&path).to_string(),
                path,
                size: metadata.len(),
                remote_id: None,
            });
        }
        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }
}
