use std::time::Duration;

use async_trait::async_trait;

use crate::errors::AdapterError;

/// One live browser context backing the UI steps of a single run.
///
/// Every method performs at most one browser-visible action. Blocking
/// methods take an explicit budget and fail with `Timeout` when it is
/// exceeded; probes (`text_present`, `current_url`) return immediately and
/// are polled by the caller.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate the page. Callers must have vetted the URL already.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), AdapterError>;

    /// Click the first element matching the CSS selector.
    async fn click_css(&self, selector: &str, timeout: Duration) -> Result<(), AdapterError>;

    /// Click the element whose visible text equals the needle, falling back
    /// to the first leaf element containing it.
    async fn click_text(&self, text: &str, timeout: Duration) -> Result<(), AdapterError>;

    /// Replace the value of the element matching the selector.
    async fn fill_css(
        &self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), AdapterError>;

    /// Single probe: is the text visible on the page right now?
    async fn text_present(&self, text: &str) -> Result<bool, AdapterError>;

    async fn current_url(&self) -> Result<String, AdapterError>;

    async fn title(&self) -> Result<String, AdapterError>;

    /// Full-page PNG capture.
    async fn screenshot_full_page(&self) -> Result<Vec<u8>, AdapterError>;

    /// Best-effort: let an in-flight navigation finish. Never fails.
    async fn settle(&self, timeout: Duration);

    /// Tear down the underlying browser. Idempotent.
    async fn close(&self);
}
