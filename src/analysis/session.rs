//! Popup-side state: the cached page selection and the key banner.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{AnalysisClient, AnalysisKind, ApiKeyBanner, PanelView};
use crate::capture::preview;
use crate::relay::{self, RelayEndpoint, RelayInbox, RelayMessage, RelayReply};

pub const POPUP_UPDATED_STATUS: &str = "Popup updated page-selected text";

#[derive(Debug)]
pub struct PopupSession {
    page_selection: String,
    banner: ApiKeyBanner,
}

impl Default for PopupSession {
    fn default() -> Self {
        Self {
            page_selection: String::new(),
            banner: ApiKeyBanner::Missing,
        }
    }
}

impl PopupSession {
    pub fn page_selection(&self) -> &str {
        &self.page_selection
    }

    pub fn banner(&self) -> ApiKeyBanner {
        self.banner
    }

    pub fn set_banner(&mut self, banner: ApiKeyBanner) {
        self.banner = banner;
    }

    pub fn respond(&mut self, message: RelayMessage) -> RelayReply {
        match message {
            RelayMessage::UpdateSelectedText { text } => {
                info!(
                    "received updated selected text (first 100 chars): {}",
                    preview(&text, 100)
                );
                self.page_selection = text;
                RelayReply::Status {
                    status: POPUP_UPDATED_STATUS.to_string(),
                }
            }
            RelayMessage::GetSelectedText => RelayReply::Text {
                text: self.page_selection.clone(),
            },
        }
    }
}

pub type SharedSession = Arc<Mutex<PopupSession>>;

/// What the popup page needs on load and whenever the key changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupInit {
    pub banner: ApiKeyBanner,
    pub banner_text: &'static str,
    pub actions_enabled: bool,
    pub instructions: PanelView,
}

impl From<ApiKeyBanner> for PopupInit {
    fn from(banner: ApiKeyBanner) -> Self {
        Self {
            banner,
            banner_text: banner.text(),
            actions_enabled: banner.actions_enabled(),
            instructions: PanelView::instructions(),
        }
    }
}

/// Popup load: read the banner state and pull the captured text. The
/// session lock is only taken to store results, never across the relay.
pub async fn initialize(
    session: &SharedSession,
    background: Option<&RelayEndpoint>,
    analysis: &AnalysisClient,
) -> ApiKeyBanner {
    let banner = analysis.banner().await;
    let text = relay::request_selected_text(background).await;
    info!("initial selected text (first 100 chars): {}", preview(&text, 100));

    let mut guard = session.lock().await;
    guard.banner = banner;
    guard.page_selection = text;
    banner
}

/// Button click. Snapshot the selection, then analyze without the lock so
/// updates keep flowing while the request is in flight. `on_notice` gets
/// the interim panels in display order: the code source notice, if any,
/// then the loading panel once there is code to send.
pub async fn analyze<F>(
    session: &SharedSession,
    analysis: &AnalysisClient,
    kind: AnalysisKind,
    mut on_notice: F,
) -> PanelView
where
    F: FnMut(&PanelView) + Send,
{
    let selection = session.lock().await.page_selection.clone();
    let resolved = analysis.resolve_code(&selection).await;
    if let Some(notice) = &resolved.notice {
        on_notice(notice);
    }
    if !resolved.code.is_empty() {
        on_notice(&PanelView::loading());
    }
    analysis.analyze_resolved(resolved, kind).await
}

/// Answer relay messages addressed to the popup until every endpoint is gone.
pub async fn serve(session: SharedSession, mut inbox: RelayInbox) {
    while let Some(envelope) = inbox.recv().await {
        let reply = session.lock().await.respond(envelope.message.clone());
        envelope.respond(reply);
    }
    debug!("popup relay inbox closed");
}
