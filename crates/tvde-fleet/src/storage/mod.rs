//! Partner file storage: imported exports, RPA downloads and screenshots.
//!
//! Each partner picks a provider in its [`StorageSettings`]; [`StorageRouter`]
//! turns those settings into a ready [`CloudStorage`] handle.

mod drive;
mod dropbox;
mod local;
mod onedrive;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StorageConfig;
use crate::fleet::Partner;

pub use drive::GoogleDriveStorage;
pub use dropbox::DropboxStorage;
pub use local::LocalStorage;
pub use onedrive::OneDriveStorage;

pub const DROPBOX_API_URL: &str = "https://api.dropboxapi.com";
pub const DROPBOX_CONTENT_URL: &str = "https://content.dropboxapi.com";
pub const ONEDRIVE_API_URL: &str = "https://graph.microsoft.com/v1.0";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageProvider {
    #[default]
    Local,
    GoogleDrive,
    Dropbox,
    OneDrive,
}

impl StorageProvider {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Local => "Armazenamento local",
            Self::GoogleDrive => "Google Drive",
            Self::Dropbox => "Dropbox",
            Self::OneDrive => "OneDrive",
        }
    }
}

/// Storage choice saved on the partner record.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default)]
    pub root_folder: String,
    /// OAuth bearer token for remote providers; never echoed back.
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
}

impl fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSettings")
            .field("provider", &self.provider)
            .field("root_folder", &self.root_folder)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredObject {
    pub path: String,
    pub size: u64,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage path '{0}'")]
    InvalidPath(String),
    #[error("{} requires an access token", .0.label())]
    NotConfigured(StorageProvider),
    #[error("storage io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage provider answered {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("google drive failure: {0}")]
    Drive(String),
}

/// Provider-neutral file sink.
#[async_trait]
pub trait CloudStorage: Send + Sync {
    fn provider(&self) -> StorageProvider;

    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Files directly inside `folder`, sorted by path.
    async fn list(&self, folder: &str) -> Result<Vec<StoredObject>, StorageError>;
}

/// Cleans a relative object path: forward slashes only, no empty, `.` or `..` segments.
pub fn normalize_path(raw: &str) -> Result<String, StorageError> {
    let mut segments = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment.trim() {
            "" | "." => continue,
            ".." => return Err(StorageError::InvalidPath(raw.to_string())),
            clean => segments.push(clean),
        }
    }
    if segments.is_empty() {
        return Err(StorageError::InvalidPath(raw.to_string()));
    }
    Ok(segments.join("/"))
}

/// Like [`normalize_path`] but an empty folder means the storage root.
pub(crate) fn normalize_folder(raw: &str) -> Result<String, StorageError> {
    if raw.split(['/', '\\']).all(|segment| segment.trim().is_empty()) {
        return Ok(String::new());
    }
    normalize_path(raw)
}

pub(crate) fn join_path(root: &str, relative: &str) -> String {
    match (root.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (false, true) => root.to_string(),
        (false, false) => format!("{root}/{relative}"),
    }
}

pub fn content_type_for(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => "text/csv",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// Builds the storage handle configured for a partner.
#[derive(Debug, Clone)]
pub struct StorageRouter {
    local_root: PathBuf,
    http: reqwest::Client,
    dropbox_api: String,
    dropbox_content: String,
    onedrive_api: String,
}

impl StorageRouter {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            local_root: config.local_root.clone(),
            http: reqwest::Client::new(),
            dropbox_api: DROPBOX_API_URL.to_string(),
            dropbox_content: DROPBOX_CONTENT_URL.to_string(),
            onedrive_api: ONEDRIVE_API_URL.to_string(),
        }
    }

    /// Points the REST providers at alternative hosts (used against mock servers).
    pub fn with_endpoints(
        mut self,
        dropbox_api: impl Into<String>,
        dropbox_content: impl Into<String>,
        onedrive_api: impl Into<String>,
    ) -> Self {
        self.dropbox_api = dropbox_api.into();
        self.dropbox_content = dropbox_content.into();
        self.onedrive_api = onedrive_api.into();
        self
    }

    pub fn for_partner(&self, partner: &Partner) -> Result<Arc<dyn CloudStorage>, StorageError> {
        let settings = &partner.storage;
        let root = normalize_folder(&settings.root_folder)?;

        let storage: Arc<dyn CloudStorage> = match settings.provider {
            StorageProvider::Local => {
                let mut base = self.local_root.join(&partner.id);
                if !root.is_empty() {
                    base = base.join(&root);
                }
                Arc::new(LocalStorage::new(base))
            }
            StorageProvider::GoogleDrive => {
                Arc::new(GoogleDriveStorage::connect(access_token(settings)?, root)?)
            }
            StorageProvider::Dropbox => Arc::new(DropboxStorage::new(
                self.http.clone(),
                &self.dropbox_api,
                &self.dropbox_content,
                access_token(settings)?,
                root,
            )),
            StorageProvider::OneDrive => Arc::new(OneDriveStorage::new(
                self.http.clone(),
                &self.onedrive_api,
                access_token(settings)?,
                root,
            )),
        };
        Ok(storage)
    }
}

fn access_token(settings: &StorageSettings) -> Result<String, StorageError> {
    settings
        .access_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or(StorageError::NotConfigured(settings.provider))
}
