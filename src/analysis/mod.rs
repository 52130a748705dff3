//! Analysis Client - turns a selection (or the clipboard) into a Gemini
//! request and the response into a popup panel.

pub mod gemini;
pub mod prompt;
pub mod render;
pub mod session;

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::capture::preview;
use crate::clipboard::ClipboardSource;
use crate::credentials::CredentialStore;

pub use gemini::{GeminiClient, GeminiError, GenerateContentRequest, GenerateContentResponse};
pub use prompt::{build_prompt, AnalysisKind, AnalysisRequest};
pub use render::{parse_complexity, ApiKeyBanner, PanelView, Tone};
pub use session::PopupSession;

/// Selections shorter than this fall back to the clipboard.
pub const MIN_SELECTION_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CodeOrigin {
    Selection,
    Clipboard,
    SelectionAfterEmptyClipboard,
    SelectionAfterClipboardError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCode {
    pub code: String,
    pub origin: CodeOrigin,
    /// Interim panel shown while the request is in flight.
    pub notice: Option<PanelView>,
}

#[derive(Clone)]
pub struct AnalysisClient {
    gemini: GeminiClient,
    clipboard: Arc<dyn ClipboardSource>,
    credentials: Arc<dyn CredentialStore>,
}

impl AnalysisClient {
    pub fn new(
        gemini: GeminiClient,
        clipboard: Arc<dyn ClipboardSource>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            gemini,
            clipboard,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    pub async fn banner(&self) -> ApiKeyBanner {
        ApiKeyBanner::from_key(self.credentials.load().await.as_deref())
    }

    pub async fn resolve_code(&self, page_selection: &str) -> ResolvedCode {
        let selection = page_selection.trim();
        let char_len = selection.chars().count();

        let resolved = if char_len >= MIN_SELECTION_LEN {
            info!("using code selected from page ({char_len} chars)");
            ResolvedCode {
                code: selection.to_string(),
                origin: CodeOrigin::Selection,
                notice: None,
            }
        } else {
            info!("page selection is short or empty ({char_len} chars), reading clipboard");
            match self.clipboard.read_text().await {
                Ok(text) if !text.trim().is_empty() => {
                    info!("read from clipboard (first 100 chars): {}", preview(&text, 100));
                    ResolvedCode {
                        code: text.trim().to_string(),
                        origin: CodeOrigin::Clipboard,
                        notice: Some(PanelView::info(render::USING_CLIPBOARD)),
                    }
                }
                Ok(_) => {
                    info!("clipboard is empty, using page selection if any");
                    ResolvedCode {
                        code: selection.to_string(),
                        origin: CodeOrigin::SelectionAfterEmptyClipboard,
                        notice: None,
                    }
                }
                Err(e) => {
                    error!("failed to read clipboard contents: {e}");
                    ResolvedCode {
                        code: selection.to_string(),
                        origin: CodeOrigin::SelectionAfterClipboardError,
                        notice: Some(PanelView::clipboard_failed(&e.to_string())),
                    }
                }
            }
        };

        info!(
            origin = ?resolved.origin,
            len = resolved.code.len(),
            "code for analysis: {}",
            preview(&resolved.code, 500)
        );
        resolved
    }

    /// Full click handler: resolve code, check preconditions, call Gemini.
    pub async fn analyze(&self, page_selection: &str, kind: AnalysisKind) -> PanelView {
        let resolved = self.resolve_code(page_selection).await;
        self.analyze_resolved(resolved, kind).await
    }

    pub async fn analyze_resolved(&self, resolved: ResolvedCode, kind: AnalysisKind) -> PanelView {
        let Some(api_key) = self.credentials.load().await else {
            return PanelView::api_key_missing();
        };

        if resolved.code.trim().is_empty() {
            return PanelView::no_code();
        }

        let request = AnalysisRequest {
            code: resolved.code,
            kind,
        };
        self.run(&api_key, &request).await
    }

    async fn run(&self, api_key: &str, request: &AnalysisRequest) -> PanelView {
        let body = GenerateContentRequest::from_prompt(request.prompt());

        let response = match self.gemini.generate_content(api_key, &body).await {
            Ok(response) => response,
            Err(GeminiError::Network(e)) => {
                error!("gemini request failed: {e}");
                return PanelView::error(format!(
                    "Failed to connect to Gemini API: {}",
                    render::escape_html(&e)
                ));
            }
            Err(GeminiError::Api { status, message }) => {
                error!(status, "gemini api error: {message}");
                return PanelView::error(format!(
                    "Error from Gemini API: {}",
                    render::escape_html(&message)
                ));
            }
            Err(GeminiError::Parse(e)) => {
                error!("gemini response did not parse: {e}");
                return PanelView::error(render::UNEXPECTED_STRUCTURE);
            }
        };

        present(request.kind, &response)
    }
}

/// Map a successful response body onto a panel.
pub fn present(kind: AnalysisKind, response: &GenerateContentResponse) -> PanelView {
    if let Some(text) = response.first_text() {
        let text = text.trim();
        return match kind {
            AnalysisKind::ComplexityOnly => {
                let (time, space) = parse_complexity(text);
                PanelView::Complexity { time, space }
            }
            AnalysisKind::ExplainComplexity | AnalysisKind::Feedback => {
                PanelView::info(render::markdown_to_html(text))
            }
        };
    }

    if let Some(block) = response.block_reason() {
        return PanelView::error(format!(
            "Blocked by API: {}. {}",
            render::escape_html(block.reason().unwrap_or("Unknown")),
            render::escape_html(block.message().unwrap_or(""))
        ));
    }

    PanelView::error(render::UNEXPECTED_STRUCTURE)
}
