//! Where the console is looking
//!
//! The session only ever asks for two things: an in-app route change, and a
//! full page load for when the in-app router itself cannot be trusted.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Navigation side effects requested by the session subsystem
pub trait Navigator: Send + Sync {
    /// In-app route change
    fn push(&self, path: &str);

    /// Full page load, bypassing the in-app router
    fn redirect(&self, url: &str);
}

/// A navigation that was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    Push(String),
    Redirect(String),
}

impl NavigationEvent {
    /// Path or URL the event points at
    pub fn target(&self) -> &str {
        match self {
            Self::Push(target) | Self::Redirect(target) => target,
        }
    }
}

/// Records navigations instead of performing them
///
/// Used by the terminal console, where "the page" is the last recorded entry.
#[derive(Debug, Default)]
pub struct MemoryNavigator {
    history: Mutex<Vec<NavigationEvent>>,
}

impl MemoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<NavigationEvent>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every navigation so far, oldest first
    pub fn history(&self) -> Vec<NavigationEvent> {
        self.lock().clone()
    }

    /// Most recent navigation
    pub fn last(&self) -> Option<NavigationEvent> {
        self.lock().last().cloned()
    }

    /// Path of the page currently shown
    pub fn current(&self) -> Option<String> {
        self.last().map(|event| event.target().to_string())
    }
}

impl Navigator for MemoryNavigator {
    fn push(&self, path: &str) {
        debug!(path, "Navigating");
        self.lock().push(NavigationEvent::Push(path.to_string()));
    }

    fn redirect(&self, url: &str) {
        debug!(url, "Full page redirect");
        self.lock().push(NavigationEvent::Redirect(url.to_string()));
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserNavigator;

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::Navigator;
    use tracing::warn;
    use wasm_bindgen::JsValue;

    /// Drives `window.history` and `window.location`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct BrowserNavigator;

    impl Navigator for BrowserNavigator {
        fn push(&self, path: &str) {
            let pushed = web_sys::window()
                .and_then(|window| window.history().ok())
                .map(|history| history.push_state_with_url(&JsValue::NULL, "", Some(path)));
            if !matches!(pushed, Some(Ok(()))) {
                warn!("Failed to push {path} onto the browser history");
            }
        }

        fn redirect(&self, url: &str) {
            let redirected = web_sys::window().map(|window| window.location().set_href(url));
            if !matches!(redirected, Some(Ok(()))) {
                warn!("Failed to redirect to {url}");
            }
        }
    }
}
