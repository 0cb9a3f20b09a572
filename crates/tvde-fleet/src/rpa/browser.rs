use std::time::Duration;

use async_trait::async_trait;

use super::steps::Key;

/// File collected by a download step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl DownloadedFile {
    /// Lossy UTF-8 view used when the file is handed to a CSV parser.
    pub fn text(&self) -> String {
        let bytes = self.bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&self.bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("webdriver request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webdriver error '{error}' ({status}): {message}")]
    WebDriver {
        status: u16,
        error: String,
        message: String,
    },
    #[error("element '{0}' not found")]
    ElementNotFound(String),
    #[error("timed out after {after_ms} ms waiting for {what}")]
    Timeout { what: String, after_ms: u64 },
    #[error("download failed: {0}")]
    Download(String),
    #[error("browser io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected webdriver response: {0}")]
    Protocol(String),
}

/// One live browser, driven step by step.
#[async_trait]
pub trait BrowserSession: Send {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError>;

    async fn click(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Clears the element and types `value`.
    async fn fill(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    /// Picks the `<option>` whose value attribute equals `value`.
    async fn select(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    async fn press_key(
        &mut self,
        selector: &str,
        key: Key,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn exists(&mut self, selector: &str) -> Result<bool, BrowserError>;

    async fn current_url(&mut self) -> Result<String, BrowserError>;

    async fn text(&mut self, selector: &str, timeout: Duration) -> Result<String, BrowserError>;

    /// Cell texts of every row of the table matched by `selector`.
    async fn table(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Vec<Vec<String>>, BrowserError>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError>;

    /// Clicks `selector` and waits for the resulting file.
    async fn download(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<DownloadedFile, BrowserError>;

    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// Opens a fresh session per execution.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}
