use std::io::Cursor;

use async_trait::async_trait;
use google_drive3::api::{File, Scope};
use google_drive3::DriveHub;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use super::{normalize_folder, normalize_path, CloudStorage, StorageError, StorageProvider, StoredObject};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

type Connector = HttpsConnector<HttpConnector>;

/// Google Drive storage addressed by folder names below `root`.
pub struct GoogleDriveStorage {
    hub: DriveHub<Connector>,
    root: String,
}

impl std::fmt::Debug for GoogleDriveStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleDriveStorage")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GoogleDriveStorage {
    /// Builds a hub authenticated with a ready OAuth access token.
    pub fn connect(access_token: String, root: String) -> Result<Self, StorageError> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|err| StorageError::Drive(err.to_string()))?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self {
            hub: DriveHub::new(client, access_token),
            root,
        })
    }

    fn map_error<E: std::fmt::Display>(err: E) -> StorageError {
        StorageError::Drive(err.to_string())
    }

    async fn find_folder(&self, parent: &str, name: &str) -> Result<Option<String>, StorageError> {
        let query = format!(
            "name = '{}' and '{parent}' in parents and mimeType = '{FOLDER_MIME}' and trashed = false",
            escape_query(name)
        );
        let (_, list) = self
            .hub
            .files()
            .list()
            .q(&query)
            .param("fields", "files(id,name)")
            .page_size(1)
            .include_items_from_all_drives(true)
            .supports_all_drives(true)
            .add_scope(Scope::Full)
            .doit()
            .await
            .map_err(Self::map_error)?;
        Ok(list
            .files
            .unwrap_or_default()
            .into_iter()
            .find_map(|file| file.id))
    }

    async fn create_folder(&self, parent: &str, name: &str) -> Result<String, StorageError> {
        let metadata = File {
            name: Some(name.to_string()),
            mime_type: Some(FOLDER_MIME.to_string()),
            parents: Some(vec![parent.to_string()]),
            ..File::default()
        };
        let (_, folder) = self
            .hub
            .files()
            .create(metadata)
            .param("fields", "id")
            .supports_all_drives(true)
            .add_scope(Scope::Full)
            .upload(Cursor::new(Vec::new()), mime::APPLICATION_OCTET_STREAM)
            .await
            .map_err(Self::map_error)?;
        folder
            .id
            .ok_or_else(|| StorageError::Drive(format!("folder '{name}' created without id")))
    }

    /// Walks `segments` from the Drive root, optionally creating missing folders.
    async fn resolve(&self, segments: &[&str], create: bool) -> Result<Option<String>, StorageError> {
        let mut parent = "root".to_string();
        for segment in segments {
            parent = match self.find_folder(&parent, segment).await? {
                Some(id) => id,
                None if create => self.create_folder(&parent, segment).await?,
                None => return Ok(None),
            };
        }
        Ok(Some(parent))
    }

    fn segments<'a>(&'a self, relative: &'a str) -> Vec<&'a str> {
        self.root
            .split('/')
            .chain(relative.split('/'))
            .filter(|segment| !segment.is_empty())
            .collect()
    }
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[async_trait]
impl CloudStorage for GoogleDriveStorage {
    fn provider(&self) -> StorageProvider {
        StorageProvider::GoogleDrive
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let relative = normalize_path(path)?;
        let (folder, file_name) = match relative.rsplit_once('/') {
            Some((folder, name)) => (folder, name),
            None => ("", relative.as_str()),
        };
        let segments = self.segments(folder);
        let parent = self
            .resolve(&segments, true)
            .await?
            .unwrap_or_else(|| "root".to_string());

        let metadata = File {
            name: Some(file_name.to_string()),
            parents: Some(vec![parent]),
            ..File::default()
        };
        let media_type = content_type
            .parse::<mime::Mime>()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM);
        let size = bytes.len() as u64;
        let (_, file) = self
            .hub
            .files()
            .create(metadata)
            .param("fields", "id")
            .supports_all_drives(true)
            .add_scope(Scope::File)
            .upload(Cursor::new(bytes), media_type)
            .await
            .map_err(Self::map_error)?;

        Ok(StoredObject {
            path: relative,
            size,
            content_type: content_type.to_string(),
            remote_id: file.id,
        })
    }

    async fn list(&self, folder: &str) -> Result<Vec<StoredObject>, StorageError> {
        let relative = normalize_folder(folder)?;
        let segments = self.segments(&relative);
        let Some(folder_id) = self.resolve(&segments, false).await? else {
            return Ok(Vec::new());
        };

        let (_, list) = self
            .hub
            .files()
            .list()
            .q(&format!("'{folder_id}' in parents and trashed = false"))
            .param("fields", "files(id,name,mimeType,size)")
            .page_size(100)
            .include_items_from_all_drives(true)
            .supports_all_drives(true)
            .add_scope(Scope::Readonly)
            .doit()
            .await
            .map_err(Self::map_error)?;

        let mut objects: Vec<StoredObject> = list
            .files
            .unwrap_or_default()
            .into_iter()
            .filter(|file| file.mime_type.as_deref() != Some(FOLDER_MIME))
            .map(|file| {
                let name = file.name.unwrap_or_else(|| "sem_nome".to_string());
                StoredObject {
                    path: super::join_path(&relative, &name),
                    size: file.size.unwrap_or_default().max(0) as u64,
                    content_type: file
                        .mime_type
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                    remote_id: file.id,
                }
            })
            .collect();
        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }
}
