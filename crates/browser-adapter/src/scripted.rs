//! Scripted in-memory [`BrowserSession`] used by tests and dry runs.
//!
//! The session models a page as a URL, a body text, and a set of matchable
//! selectors; click transitions can be scripted to mutate that state, and
//! text probes can be made to succeed only after a number of polls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::{AdapterError, AdapterErrorKind};
use crate::port::BrowserSession;

#[derive(Clone, Debug, Default)]
struct PageDelta {
    url: Option<String>,
    body: Option<String>,
}

#[derive(Debug)]
struct PageState {
    url: String,
    body: String,
    title: String,
    selectors: Vec<String>,
    click_transitions: HashMap<String, PageDelta>,
    text_countdowns: HashMap<String, usize>,
}

/// A deterministic page stand-in. All mutators return `&Self` so scripts
/// chain fluently.
pub struct ScriptedSession {
    state: Mutex<PageState>,
    closes: AtomicUsize,
    screenshot_bytes: Vec<u8>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new("about:blank")
    }
}

impl ScriptedSession {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(PageState {
                url: url.into(),
                body: String::new(),
                title: String::new(),
                selectors: Vec::new(),
                click_transitions: HashMap::new(),
                text_countdowns: HashMap::new(),
            }),
            closes: AtomicUsize::new(0),
            // Smallest payload that still looks like a PNG on disk.
            screenshot_bytes: vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a],
        }
    }

    pub fn with_body(self, body: impl Into<String>) -> Self {
        self.state.lock().body = body.into();
        self
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.state.lock().title = title.into();
        self
    }

    pub fn with_selector(self, selector: impl Into<String>) -> Self {
        self.state.lock().selectors.push(selector.into());
        self
    }

    /// When `selector` is clicked, move the page to the given URL/body.
    pub fn on_click(
        self,
        selector: impl Into<String>,
        url: Option<&str>,
        body: Option<&str>,
    ) -> Self {
        self.state.lock().click_transitions.insert(
            selector.into(),
            PageDelta {
                url: url.map(str::to_string),
                body: body.map(str::to_string),
            },
        );
        self
    }

    /// Make `text` visible only after it has been probed `polls` times.
    pub fn text_after_polls(self, text: impl Into<String>, polls: usize) -> Self {
        self.state.lock().text_countdowns.insert(text.into(), polls);
        self
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn apply_click(&self, target: &str) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if !state.selectors.iter().any(|s| s == target) {
            return Err(AdapterError::new(AdapterErrorKind::SelectorNotFound)
                .with_hint(format!("scripted page has no '{target}'")));
        }
        if let Some(delta) = state.click_transitions.get(target).cloned() {
            if let Some(url) = delta.url {
                state.url = url;
            }
            if let Some(body) = delta.body {
                state.body = body;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), AdapterError> {
        self.state.lock().url = url.to_string();
        Ok(())
    }

    async fn click_css(&self, selector: &str, _timeout: Duration) -> Result<(), AdapterError> {
        self.apply_click(selector)
    }

    async fn click_text(&self, text: &str, _timeout: Duration) -> Result<(), AdapterError> {
        self.apply_click(text)
    }

    async fn fill_css(
        &self,
        selector: &str,
        _value: &str,
        _timeout: Duration,
    ) -> Result<(), AdapterError> {
        let state = self.state.lock();
        if state.selectors.iter().any(|s| s == selector) {
            Ok(())
        } else {
            Err(AdapterError::new(AdapterErrorKind::SelectorNotFound)
                .with_hint(format!("scripted page has no '{selector}'")))
        }
    }

    async fn text_present(&self, text: &str) -> Result<bool, AdapterError> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.text_countdowns.get_mut(text) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(false);
            }
            return Ok(true);
        }
        Ok(state.body.contains(text))
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        Ok(self.state.lock().url.clone())
    }

    async fn title(&self) -> Result<String, AdapterError> {
        Ok(self.state.lock().title.clone())
    }

    async fn screenshot_full_page(&self) -> Result<Vec<u8>, AdapterError> {
        Ok(self.screenshot_bytes.clone())
    }

    async fn settle(&self, _timeout: Duration) {}

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
