//! W3C WebDriver backend (chromedriver or a Selenium grid).
//!
//! Every session gets its own temporary download directory, handed to Chrome
//! through `goog:chromeOptions` prefs; downloads are detected by polling it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Method;
use serde_json::{json, Value};
use tempfile::TempDir;

use super::browser::{BrowserError, BrowserLauncher, BrowserSession, DownloadedFile};
use super::steps::Key;
use crate::config::RpaConfig;

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const NO_SUCH_ELEMENT: &str = "no such element";
const PARTIAL_SUFFIXES: [&str; 3] = [".crdownload", ".part", ".tmp"];

const TABLE_SCRIPT: &str = "const table = document.querySelector(arguments[0]);\
    if (!table) { return null; }\
    return Array.from(table.querySelectorAll('tr')).map(row =>\
      Array.from(row.querySelectorAll('th,td')).map(cell => cell.innerText.trim()));";

#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    http: reqwest::Client,
    base_url: String,
    headless: bool,
    poll_interval: Duration,
}

impl WebDriverLauncher {
    pub fn new(config: &RpaConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.webdriver_url.trim_end_matches('/').to_string(),
            headless: config.headless,
            poll_interval: Duration::from_millis(250),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn capabilities(&self, download_dir: &Path) -> Value {
        let mut args = vec![
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--window-size=1366,900",
        ];
        if self.headless {
            args.push("--headless=new");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "prefs": {
                            "download.default_directory": download_dir.to_string_lossy(),
                            "download.prompt_for_download": false,
                            "safebrowsing.enabled": true
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let downloads = tempfile::Builder::new().prefix("tvde-rpa-").tempdir()?;
        let value = send(
            self.http
                .post(format!("{}/session", self.base_url))
                .json(&self.capabilities(downloads.path())),
        )
        .await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("session response without sessionId".into()))?
            .to_string();
        tracing::debug!(session_id, "webdriver session opened");

        Ok(Box::new(WebDriverSession {
            http: self.http.clone(),
            session_url: format!("{}/session/{session_id}", self.base_url),
            downloads,
            poll_interval: self.poll_interval,
            closed: false,
        }))
    }
}

pub struct WebDriverSession {
    http: reqwest::Client,
    session_url: String,
    downloads: TempDir,
    poll_interval: Duration,
    closed: bool,
}

impl WebDriverSession {
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let mut request = self
            .http
            .request(method, format!("{}{path}", self.session_url))
            .timeout(Duration::from_secs(120));
        if let Some(body) = body {
            request = request.json(&body);
        }
        send(request).await
    }

    async fn find(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        let body = json!({ "using": "css selector", "value": selector });
        match self.command(Method::POST, "/element", Some(body)).await {
            Ok(value) => value
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| Some(id.to_string()))
                .ok_or_else(|| BrowserError::Protocol("element reference missing".into())),
            Err(BrowserError::WebDriver { error, .. }) if error == NO_SUCH_ELEMENT => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn element(&self, selector: &str, timeout: Duration) -> Result<String, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(id) = self.find(selector).await? {
                return Ok(id);
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: format!("element '{selector}'"),
                    after_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn click_element(&self, id: &str) -> Result<(), BrowserError> {
        self.command(Method::POST, &format!("/element/{id}/click"), Some(json!({})))
            .await
            .map(drop)
    }

    async fn type_into(&self, id: &str, text: &str) -> Result<(), BrowserError> {
        self.command(
            Method::POST,
            &format!("/element/{id}/value"),
            Some(json!({ "text": text })),
        )
        .await
        .map(drop)
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(drop)
    }

    async fn click(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let id = self.element(selector, timeout).await?;
        self.click_element(&id).await
    }

    async fn fill(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let id = self.element(selector, timeout).await?;
        self.command(Method::POST, &format!("/element/{id}/clear"), Some(json!({})))
            .await?;
        self.type_into(&id, value).await
    }

    async fn select(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        self.element(selector, timeout).await?;
        let option = format!("{selector} option[value=\"{}\"]", value.replace('"', "\\\""));
        let id = self
            .find(&option)
            .await?
            .ok_or(BrowserError::ElementNotFound(option))?;
        self.click_element(&id).await
    }

    async fn press_key(
        &mut self,
        selector: &str,
        key: Key,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let id = self.element(selector, timeout).await?;
        self.type_into(&id, key.code()).await
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.element(selector, timeout).await.map(drop)
    }

    async fn exists(&mut self, selector: &str) -> Result<bool, BrowserError> {
        let body = json!({ "using": "css selector", "value": selector });
        let value = self.command(Method::POST, "/elements", Some(body)).await?;
        Ok(value.as_array().is_some_and(|found| !found.is_empty()))
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Protocol("url is not a string".into()))
    }

    async fn text(&mut self, selector: &str, timeout: Duration) -> Result<String, BrowserError> {
        let id = self.element(selector, timeout).await?;
        let value = self
            .command(Method::GET, &format!("/element/{id}/text"), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().trim().to_string())
    }

    async fn table(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Vec<Vec<String>>, BrowserError> {
        self.element(selector, timeout).await?;
        let value = self
            .command(
                Method::POST,
                "/execute/sync",
                Some(json!({ "script": TABLE_SCRIPT, "args": [selector] })),
            )
            .await?;
        if value.is_null() {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        serde_json::from_value(value).map_err(|err| BrowserError::Protocol(err.to_string()))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrowserError::Protocol("screenshot is not a string".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|err| BrowserError::Protocol(format!("screenshot is not base64: {err}")))
    }

    async fn download(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<DownloadedFile, BrowserError> {
        let before: HashSet<PathBuf> = list_files(self.downloads.path())
            .await?
            .into_iter()
            .collect();
        self.click(selector, timeout).await?;
        let path =
            wait_for_new_file(self.downloads.path(), &before, timeout, self.poll_interval).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| BrowserError::Download("downloaded file has no name".into()))?;
        let bytes = tokio::fs::read(&path).await?;
        if bytes.is_empty() {
            return Err(BrowserError::Download(format!("{file_name} is empty")));
        }
        Ok(DownloadedFile { file_name, bytes })
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.command(Method::DELETE, "", None).await.map(drop)
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<Value, BrowserError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    let mut parsed: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body)
            .map_err(|err| BrowserError::Protocol(format!("invalid json ({err}): {body}")))?
    };
    let value = parsed.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }
    Err(BrowserError::WebDriver {
        status: status.as_u16(),
        error: value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
        message: value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, BrowserError> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// First file in `dir` that was not there `before` and kept its size across two polls.
async fn wait_for_new_file(
    dir: &Path,
    before: &HashSet<PathBuf>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<PathBuf, BrowserError> {
    let deadline = Instant::now() + timeout;
    let mut candidate: Option<(PathBuf, u64)> = None;
    loop {
        if let Some(path) = list_files(dir)
            .await?
            .into_iter()
            .find(|path| !before.contains(path) && !is_partial(path))
        {
            let size = tokio::fs::metadata(&path).await?.len();
            match &candidate {
                Some((seen, seen_size)) if *seen == path && *seen_size == size => return Ok(path),
                _ => candidate = Some((path, size)),
            }
        }
        if Instant::now() >= deadline {
            return Err(BrowserError::Timeout {
                what: "download".to_string(),
                after_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}

fn is_partial(path: &Path) -> bool {
    let name = path.to_string_lossy();
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_downloads_are_ignored() {
        assert!(is_partial(Path::new("/tmp/x/report.csv.crdownload")));
        assert!(is_partial(Path::new("/tmp/x/report.part")));
        assert!(!is_partial(Path::new("/tmp/x/report.csv")));
    }

    #[tokio::test]
    async fn empty_downloads_settle_instead_of_timing_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(dir.path().join("old.csv"), b"a;b")
            .await
            .expect("old file");
        let before: HashSet<PathBuf> = list_files(dir.path())
            .await
            .expect("listed")
            .into_iter()
            .collect();
        tokio::fs::write(dir.path().join("vazio.csv"), b"")
            .await
            .expect("empty file");
        tokio::fs::write(dir.path().join("outro.csv.crdownload"), b"")
            .await
            .expect("partial file");

        let path = wait_for_new_file(
            dir.path(),
            &before,
            Duration::from_secs(2),
            Duration::from_millis(5),
        )
        .await
        .expect("settled");
        assert_eq!(path, dir.path().join("vazio.csv"));
    }

    #[test]
    fn capabilities_point_chrome_at_the_session_download_dir() {
        let launcher = WebDriverLauncher::new(&RpaConfig::default());
        let caps = launcher.capabilities(Path::new("/tmp/downloads"));
        let options = &caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"];
        assert_eq!(options["prefs"]["download.default_directory"], "/tmp/downloads");
        assert!(options["args"]
            .as_array()
            .expect("args")
            .iter()
            .any(|arg| arg == "--headless=new"));
    }
}
