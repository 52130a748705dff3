//! Panel views shown in the popup, and the fixed texts that fill them.

use pulldown_cmark::{html, Event, Options, Parser};
use serde::{Deserialize, Serialize};

pub const API_KEY_NOT_SET: &str = "Gemini API Key is not set. Please set it in the settings window.";
pub const ANALYZING: &str = "Analyzing...";
pub const USING_CLIPBOARD: &str = "<p>Using code from clipboard for this analysis...</p>";
pub const UNEXPECTED_STRUCTURE: &str = "Could not parse response from Gemini API. Unexpected structure.";

pub const INSTRUCTIONS: &str = "<p>Select the code on any webpage, then copy it (Ctrl+C for Windows/Linux or Cmd+C for Mac).</p>\
<p>Next, press Ctrl+Shift+L or click the tray icon and choose the appropriate analysis option for your usage.</p>\
<br>\
<p class=\"supported-sites-info\">Works perfectly on platforms like LeetCode, GFG (GeeksforGeeks), CodeChef, Codeforces, etc.</p>";

pub const NO_CODE_FOUND: &str = "No code found from page selection or clipboard for analysis.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tone {
    Info,
    Error,
    Loading,
}

/// Exactly one of the two popup panels is visible at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "panel", rename_all = "camelCase")]
pub enum PanelView {
    Message { html: String, tone: Tone },
    Complexity { time: String, space: String },
}

impl PanelView {
    pub fn info(html: impl Into<String>) -> Self {
        Self::Message { html: html.into(), tone: Tone::Info }
    }

    pub fn error(html: impl Into<String>) -> Self {
        Self::Message { html: html.into(), tone: Tone::Error }
    }

    pub fn loading() -> Self {
        Self::Message { html: ANALYZING.to_string(), tone: Tone::Loading }
    }

    pub fn instructions() -> Self {
        Self::info(INSTRUCTIONS)
    }

    pub fn no_code() -> Self {
        Self::info(format!(
            "{INSTRUCTIONS}<p style=\"color: red; font-weight: bold; margin-top: 10px;\">{NO_CODE_FOUND}</p>"
        ))
    }

    pub fn api_key_missing() -> Self {
        Self::error(API_KEY_NOT_SET)
    }

    pub fn clipboard_failed(err: &str) -> Self {
        Self::error(format!(
            "<p>Failed to read from clipboard. Using page selection if available. Error: {}</p>",
            escape_html(err)
        ))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Message { tone: Tone::Error, .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiKeyBanner {
    Missing,
    Ready,
}

impl ApiKeyBanner {
    pub fn from_key(key: Option<&str>) -> Self {
        match key {
            Some(k) if !k.trim().is_empty() => Self::Ready,
            _ => Self::Missing,
        }
    }

    pub fn actions_enabled(self) -> bool {
        self == Self::Ready
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::Missing => "API Key not set. Please set it in settings.",
            Self::Ready => "API Key loaded. Ready to analyze.",
        }
    }
}

/// Split a complexity-only answer into its time and space fields.
pub fn parse_complexity(raw: &str) -> (String, String) {
    let lines: Vec<&str> = raw.trim().split('\n').collect();
    let field = |i: usize| {
        lines
            .get(i)
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .unwrap_or("N/A")
            .to_string()
    };

    let time = field(0);
    let mut space = field(1);
    if let Some(extra) = lines.get(2) {
        space.push_str(&format!(" ({})", extra.trim()));
    }
    (time, space)
}

/// Markdown to HTML. Raw HTML in the source is emitted as text.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
