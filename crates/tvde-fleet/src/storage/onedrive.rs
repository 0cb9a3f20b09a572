use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;

use super::{
    join_path, normalize_folder, normalize_path, CloudStorage, StorageError, StorageProvider,
    StoredObject,
};

/// Microsoft Graph drive client writing below `root` of the signed-in user's drive.
#[derive(Debug, Clone)]
pub struct OneDriveStorage {
    http: reqwest::Client,
    api_base: String,
    token: String,
    root: String,
}

#[derive(Debug, Deserialize)]
struct DriveItem {
    id: Option<String>,
    name: String,
    #[serde(default)]
    size: u64,
    file: Option<FileFacet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileFacet {
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChildrenResponse {
    value: Vec<DriveItem>,
}

impl OneDriveStorage {
    pub fn new(http: reqwest::Client, api_base: &str, token: String, root: String) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            root,
        }
    }

    fn item_url(&self, relative: &str, suffix: &str) -> String {
        let joined = join_path(&self.root, relative);
        if joined.is_empty() {
            return format!("{}/me/drive/root{}", self.api_base, suffix.trim_start_matches(':'));
        }
        let encoded = joined
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/me/drive/root:/{encoded}:{suffix}", self.api_base)
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
impl CloudStorage for OneDriveStorage {
    fn provider(&self) -> StorageProvider {
        StorageProvider::OneDrive
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let relative = normalize_path(path)?;
        let response = self
            .http
            .put(self.item_url(&relative, "/content"))
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let item: DriveItem = Self::check(response).await?.json().await?;

        Ok(StoredObject {
            path: relative,
            size: item.size,
            content_type: content_type.to_string(),
            remote_id: item.id,
        })
    }

    async fn list(&self, folder: &str) -> Result<Vec<StoredObject>, StorageError> {
        let relative = normalize_folder(folder)?;
        let response = self
            .http
            .get(self.item_url(&relative, "/children"))
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let children: ChildrenResponse = Self::check(response).await?.json().await?;

        let mut objects: Vec<StoredObject> = children
            .value
            .into_iter()
            .filter_map(|item| {
                let file = item.file?;
                Some(StoredObject {
                    path: join_path(&relative, &item.name),
                    size: item.size,
                    content_type: file
                        .mime_type
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                    remote_id: item.id,
                })
            })
            .collect();
        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }
}
