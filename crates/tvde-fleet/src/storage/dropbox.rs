use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

use super::{
    content_type_for, join_path, normalize_folder, normalize_path, CloudStorage, StorageError,
    StorageProvider, StoredObject,
};

/// Dropbox v2 HTTP API client scoped to an app folder path.
#[derive(Debug, Clone)]
pub struct DropboxStorage {
    http: reqwest::Client,
    api_base: String,
    content_base: String,
    token: String,
    root: String,
}

#[derive(Debug, Deserialize)]
struct FileMetadata {
    #[serde(rename = ".tag", default)]
    tag: Option<String>,
    id: Option<String>,
    name: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<FileMetadata>,
}

impl DropboxStorage {
    pub fn new(
        http: reqwest::Client,
        api_base: &str,
        content_base: &str,
        token: String,
        root: String,
    ) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            content_base: content_base.trim_end_matches('/').to_string(),
            token,
            root,
        }
    }

    /// Dropbox wants absolute paths; the account root is the empty string.
    fn remote_path(&self, relative: &str) -> String {
        let joined = join_path(&self.root, relative);
        if joined.is_empty() {
            String::new()
        } else {
            format!("/{joined}")
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Remote {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CloudStorage for DropboxStorage {
    fn provider(&self) -> StorageProvider {
        StorageProvider::Dropbox
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let relative = normalize_path(path)?;
        let argument = json!({
            "path": self.remote_path(&relative),
            "mode": "overwrite",
            "autorename": false,
            "mute": true,
        });
        let response = self
            .http
            .post(format!("{}/2/files/upload", self.content_base))
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("Dropbox-API-Arg", argument.to_string())
            .body(bytes)
            .send()
            .await?;
        let metadata: FileMetadata = Self::check(response).await?.json().await?;

        Ok(StoredObject {
            path: relative,
            size: metadata.size,
            content_type: content_type.to_string(),
            remote_id: metadata.id,
        })
    }

    async fn list(&self, folder: &str) -> Result<Vec<StoredObject>, StorageError> {
        let relative = normalize_folder(folder)?;
        let response = self
            .http
            .post(format!("{}/2/files/list_folder", self.api_base))
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(&json!({ "path": self.remote_path(&relative) }))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            // path/not_found
            return Ok(Vec::new());
        }
        let listing: ListFolderResponse = Self::check(response).await?.json().await?;

        let mut objects: Vec<StoredObject> = listing
            .entries
            .into_iter()
            .filter(|entry| entry.tag.as_deref().unwrap_or("file") == "file")
            .map(|entry| {
                let path = join_path(&relative, &entry.name);
                StoredObject {
                    content_type: content_type_for(&path).to_string(),
                    path,
                    size: entry.size,
                    remote_id: entry.id,
                }
            })
            .collect();
        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }
}
