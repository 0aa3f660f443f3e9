//! Browser session port and its Chromium implementation.
//!
//! The [`BrowserSession`] trait is the seam between the step interpreter and
//! the real browser: production uses [`ChromiumSession`] over the DevTools
//! protocol, tests use scripted fakes.

pub mod chromium;
pub mod errors;
pub mod port;
pub mod scripted;

pub use chromium::{launch_session, ChromiumConfig, ChromiumSession};
pub use errors::{AdapterError, AdapterErrorKind};
pub use port::BrowserSession;
pub use scripted::ScriptedSession;
