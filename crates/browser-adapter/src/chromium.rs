//! Chromium-backed [`BrowserSession`] over the DevTools protocol.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{AdapterError, AdapterErrorKind};
use crate::port::BrowserSession;

/// Browser launch configuration.
#[derive(Clone, Debug)]
pub struct ChromiumConfig {
    pub headless: bool,
    /// Explicit chrome/chromium binary; empty means chromiumoxide's lookup.
    pub executable: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub window: (u32, u32),
    pub launch_timeout: Duration,
    pub request_timeout: Duration,
    pub sandbox: bool,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            user_data_dir: None,
            window: (1280, 720),
            launch_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(30),
            sandbox: true,
        }
    }
}

impl ChromiumConfig {
    fn browser_config(&self) -> Result<BrowserConfig, AdapterError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.request_timeout)
            .launch_timeout(self.launch_timeout)
            .window_size(self.window.0, self.window.1);

        if !self.headless {
            builder = builder.with_head();
        }
        if !self.sandbox {
            builder = builder.no_sandbox();
        }

        let mut args = vec![
            "--disable-background-networking",
            "--disable-breakpad",
            "--disable-default-apps",
            "--disable-dev-shm-usage",
            "--disable-extensions",
            "--disable-hang-monitor",
            "--disable-popup-blocking",
            "--disable-prompt-on-repost",
            "--disable-sync",
            "--no-first-run",
            "--no-default-browser-check",
            "--password-store=basic",
            "--remote-allow-origins=*",
        ];
        if self.headless {
            args.push("--headless=new");
            args.push("--hide-scrollbars");
            args.push("--mute-audio");
        }
        builder = builder.args(args);

        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable.clone());
        }
        if let Some(dir) = &self.user_data_dir {
            builder = builder.user_data_dir(dir.clone());
        }

        builder.build().map_err(|err| {
            AdapterError::new(AdapterErrorKind::Launch).with_hint(format!("browser config: {err}"))
        })
    }
}

/// Launch a fresh browser and open one page on the starting URL.
pub async fn launch_session(
    cfg: &ChromiumConfig,
    starting_url: &str,
) -> Result<ChromiumSession, AdapterError> {
    let config = cfg.browser_config()?;
    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|err| AdapterError::new(AdapterErrorKind::Launch).with_hint(err.to_string()))?;

    // The handler stream must be driven for the whole browser lifetime.
    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    let page = browser.new_page("about:blank").await.map_err(|err| {
        AdapterError::new(AdapterErrorKind::Launch).with_hint(format!("new page: {err}"))
    })?;

    let session = ChromiumSession {
        browser: Mutex::new(Some(browser)),
        page,
        handler_task,
    };
    session
        .navigate(starting_url, cfg.request_timeout)
        .await?;
    info!(url = %starting_url, "chromium session established");
    Ok(session)
}

pub struct ChromiumSession {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumSession {
    async fn bounded<T, F>(
        &self,
        what: &str,
        timeout: Duration,
        fut: F,
    ) -> Result<T, AdapterError>
    where
        F: std::future::Future<Output = Result<T, AdapterError>>,
    {
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::new(AdapterErrorKind::Timeout)
                .with_hint(format!("{what} exceeded {}ms", timeout.as_millis()))),
        }
    }

    async fn eval_bool(&self, expr: String) -> Result<bool, AdapterError> {
        let result = self
            .page
            .evaluate(expr)
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::Io).with_hint(err.to_string()))?;
        result
            .into_value::<bool>()
            .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), AdapterError> {
        let url = url.to_string();
        self.bounded("navigate", timeout, async {
            self.page.goto(url.as_str()).await.map_err(|err| {
                AdapterError::new(AdapterErrorKind::Io).with_hint(format!("goto: {err}"))
            })?;
            Ok(())
        })
        .await
    }

    async fn click_css(&self, selector: &str, timeout: Duration) -> Result<(), AdapterError> {
        self.bounded("click_css", timeout, async {
            let element = self.page.find_element(selector).await.map_err(|err| {
                AdapterError::new(AdapterErrorKind::SelectorNotFound)
                    .with_hint(format!("selector '{selector}': {err}"))
            })?;
            element.click().await.map_err(|err| {
                AdapterError::new(AdapterErrorKind::Io).with_hint(format!("click: {err}"))
            })?;
            Ok(())
        })
        .await
    }

    async fn click_text(&self, text: &str, timeout: Duration) -> Result<(), AdapterError> {
        let needle = serde_json::to_string(text)
            .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))?;
        // Exact innerText match first, then the first leaf containing the
        // needle, mirroring how operators point at links by their label.
        let expr = format!(
            r#"(function() {{
                const needle = {needle};
                if (!document.body) return false;
                const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_ELEMENT);
                let fallback = null;
                for (let el = walker.currentNode; el; el = walker.nextNode()) {{
                    const text = (el.innerText || '').trim();
                    if (text === needle) {{ el.click(); return true; }}
                    if (!fallback && el.children.length === 0 && text.includes(needle)) {{
                        fallback = el;
                    }}
                }}
                if (fallback) {{ fallback.click(); return true; }}
                return false;
            }})()"#
        );
        let clicked = self
            .bounded("click_text", timeout, self.eval_bool(expr))
            .await?;
        if clicked {
            Ok(())
        } else {
            Err(AdapterError::new(AdapterErrorKind::SelectorNotFound)
                .with_hint(format!("no element with text '{text}'")))
        }
    }

    async fn fill_css(
        &self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), AdapterError> {
        self.bounded("fill_css", timeout, async {
            let element = self.page.find_element(selector).await.map_err(|err| {
                AdapterError::new(AdapterErrorKind::SelectorNotFound)
                    .with_hint(format!("selector '{selector}': {err}"))
            })?;
            element.click().await.map_err(|err| {
                AdapterError::new(AdapterErrorKind::Io).with_hint(format!("focus: {err}"))
            })?;
            // Clear any existing value, then type for realistic input events.
            element
                .call_js_fn("function() { this.value = ''; }", false)
                .await
                .map_err(|err| {
                    AdapterError::new(AdapterErrorKind::Io).with_hint(format!("clear: {err}"))
                })?;
            element.type_str(value).await.map_err(|err| {
                AdapterError::new(AdapterErrorKind::Io).with_hint(format!("type: {err}"))
            })?;
            Ok(())
        })
        .await
    }

    async fn text_present(&self, text: &str) -> Result<bool, AdapterError> {
        let needle = serde_json::to_string(text)
            .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))?;
        self.eval_bool(format!(
            "document.body ? document.body.innerText.includes({needle}) : false"
        ))
        .await
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        self.page
            .url()
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::Io).with_hint(err.to_string()))?
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("page reported no url")
            })
    }

    async fn title(&self) -> Result<String, AdapterError> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(|err| AdapterError::new(AdapterErrorKind::Io).with_hint(err.to_string()))?
            .unwrap_or_default())
    }

    async fn screenshot_full_page(&self) -> Result<Vec<u8>, AdapterError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::CaptureFailed).with_hint(err.to_string())
            })
    }

    async fn settle(&self, timeout: Duration) {
        if tokio::time::timeout(timeout, self.page.wait_for_navigation())
            .await
            .is_err()
        {
            debug!("settle window elapsed without navigation quiescence");
        }
    }

    async fn close(&self) {
        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            if let Err(err) = browser.close().await {
                warn!(?err, "browser close failed");
            }
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // An explicit executable path skips chromiumoxide's binary auto-detection,
    // so these build checks pass on hosts without a Chrome install.
    fn pinned() -> ChromiumConfig {
        ChromiumConfig {
            executable: Some(PathBuf::from("/opt/chromium/chrome")),
            ..ChromiumConfig::default()
        }
    }

    #[test]
    fn default_config_is_headless_and_bounded() {
        let cfg = ChromiumConfig::default();
        assert!(cfg.headless);
        assert!(cfg.launch_timeout <= Duration::from_secs(20));
        assert!(pinned().browser_config().is_ok());
    }

    #[test]
    fn headful_config_builds() {
        let cfg = ChromiumConfig {
            headless: false,
            ..pinned()
        };
        assert!(cfg.browser_config().is_ok());
    }
}
