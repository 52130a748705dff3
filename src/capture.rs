//! Text Capture - read the live selection out of a browsing context.
//!
//! Capture never fails from the caller's point of view: restricted pages,
//! missing targets and probe errors all collapse to an empty string so the
//! popup always has something defined to render.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Script evaluated inside the page to read the selection as plain text.
pub const SELECTION_PROBE_JS: &str = "window.getSelection().toString()";

// pages where the host refuses script injection
const RESTRICTED_PREFIXES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "chrome-search://",
    "chrome-untrusted://",
    "devtools://",
    "edge://",
    "about:",
    "view-source:",
    "https://chrome.google.com/webstore",
    "https://chromewebstore.google.com",
];

/// Screen rectangle of a browser window, in logical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
}

/// A single tab the user triggered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowsingContext {
    pub id: String,
    pub url: Option<String>,
    pub window: Option<WindowBounds>,
}

impl BrowsingContext {
    pub fn new(id: impl Into<String>, url: Option<String>) -> Self {
        Self {
            id: id.into(),
            url,
            window: None,
        }
    }

    pub fn with_window(mut self, bounds: WindowBounds) -> Self {
        self.window = Some(bounds);
        self
    }
}

/// Something that can run the selection probe inside a context.
#[async_trait]
pub trait SelectionProbe: Send + Sync {
    async fn read_selection(&self, context: &BrowsingContext) -> anyhow::Result<String>;
}

#[async_trait]
impl<T: SelectionProbe + ?Sized> SelectionProbe for std::sync::Arc<T> {
    async fn read_selection(&self, context: &BrowsingContext) -> anyhow::Result<String> {
        (**self).read_selection(context).await
    }
}

pub fn is_restricted_url(url: &str) -> bool {
    let url = url.trim_start();
    RESTRICTED_PREFIXES
        .iter()
        .any(|prefix| url.get(..prefix.len()).is_some_and(|head| head.eq_ignore_ascii_case(prefix)))
}

/// First `max` characters, for log lines.
pub fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub async fn capture_selection<P>(probe: &P, context: &BrowsingContext) -> String
where
    P: SelectionProbe + ?Sized,
{
    if let Some(url) = context.url.as_deref() {
        if is_restricted_url(url) {
            warn!(url, "cannot inject script into restricted url");
            return String::new();
        }
    }

    if context.id.is_empty() {
        error!("browsing context has no id, cannot read selection");
        return String::new();
    }

    match probe.read_selection(context).await {
        Ok(text) if !text.is_empty() => {
            info!(
                context = %context.id,
                "captured selected text (first 100 chars): {}",
                preview(&text, 100)
            );
            text
        }
        Ok(_) => {
            info!(context = %context.id, "no text selected on the page");
            String::new()
        }
        Err(e) => {
            error!(context = %context.id, "selection probe failed: {e:#}");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe {
        result: Result<String, String>,
        calls: AtomicUsize,
    }

    impl FixedProbe {
        fn ok(text: &str) -> Self {
            Self { result: Ok(text.to_string()), calls: AtomicUsize::new(0) }
        }

        fn failing(msg: &str) -> Self {
            Self { result: Err(msg.to_string()), calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl SelectionProbe for FixedProbe {
        async fn read_selection(&self, _context: &BrowsingContext) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn tab(url: &str) -> BrowsingContext {
        BrowsingContext::new("T1", Some(url.to_string()))
    }

    #[test]
    fn test_restricted_urls() {
        assert!(is_restricted_url("chrome://settings"));
        assert!(is_restricted_url("chrome-extension://abcdef/popup.html"));
        assert!(is_restricted_url("https://chrome.google.com/webstore/detail/x"));
        assert!(is_restricted_url("CHROME://version"));
        assert!(is_restricted_url("about:blank"));
        assert!(!is_restricted_url("https://leetcode.com/problems/two-sum"));
        assert!(!is_restricted_url("https://chrome.google.com/search"));
        assert!(!is_restricted_url(""));
    }

    #[tokio::test]
    async fn test_restricted_context_never_probes() {
        let probe = FixedProbe::ok("secret");
        for url in ["chrome://newtab", "chrome-extension://id/page.html", "https://chrome.google.com/webstore"] {
            assert_eq!(capture_selection(&probe, &tab(url)).await, "");
        }
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probe_error_maps_to_empty() {
        let probe = FixedProbe::failing("tab crashed");
        assert_eq!(capture_selection(&probe, &tab("https://example.com")).await, "");
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_captures_selection() {
        let probe = FixedProbe::ok("for i in range(n): pass");
        let text = capture_selection(&probe, &tab("https://example.com")).await;
        assert_eq!(text, "for i in range(n): pass");
    }

    #[tokio::test]
    async fn test_missing_id_or_url() {
        let probe = FixedProbe::ok("x = 1");
        let no_id = BrowsingContext::new("", Some("https://example.com".into()));
        assert_eq!(capture_selection(&probe, &no_id).await, "");

        // unknown url is still probed
        let no_url = BrowsingContext::new("T2", None);
        assert_eq!(capture_selection(&probe, &no_url).await, "x = 1");
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("héllo wörld", 4), "héll");
        assert_eq!(preview("ab", 100), "ab");
    }
}
