//! Background controller: owns the captured text, the popup manager and the
//! link to whichever popup is listening.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::capture::{capture_selection, preview, BrowsingContext, SelectionProbe};
use crate::popup::{PopupManager, ReopenPolicy, TriggerOutcome, WindowHandle, WindowHost};
use crate::relay::{RelayEndpoint, RelayInbox, RelayMessage, RelayReply};

pub struct BackgroundController<P, W> {
    probe: P,
    popup: PopupManager<W>,
    captured_text: String,
    popup_link: Option<RelayEndpoint>,
}

impl<P: SelectionProbe, W: WindowHost> BackgroundController<P, W> {
    pub fn new(probe: P, host: W, policy: ReopenPolicy) -> Self {
        Self {
            probe,
            popup: PopupManager::new(host, policy),
            captured_text: String::new(),
            popup_link: None,
        }
    }

    pub fn captured_text(&self) -> &str {
        &self.captured_text
    }

    pub fn popup(&self) -> &PopupManager<W> {
        &self.popup
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Icon / shortcut activation. `context` is the tab the user was on, if
    /// one could be determined.
    pub async fn on_trigger(&mut self, context: Option<&BrowsingContext>) -> TriggerOutcome {
        self.captured_text.clear();

        match context {
            Some(ctx) => {
                info!(context = %ctx.id, url = ctx.url.as_deref().unwrap_or(""), "trigger");
                self.captured_text = capture_selection(&self.probe, ctx).await;
            }
            None => info!("trigger without a browsing context"),
        }

        let anchor = context.and_then(|c| c.window.as_ref());
        let outcome = self.popup.on_trigger(anchor).await;

        match &outcome {
            TriggerOutcome::Focused(_) => self.push_selection().await,
            TriggerOutcome::Closed => self.popup_link = None,
            TriggerOutcome::Opened(_) | TriggerOutcome::Failed => {}
        }

        outcome
    }

    pub fn on_window_removed(&mut self, handle: &WindowHandle) -> bool {
        let tracked = self.popup.on_window_removed(handle);
        if tracked {
            self.popup_link = None;
        }
        tracked
    }

    /// Register the listener of the currently open popup.
    pub fn attach_popup(&mut self, link: RelayEndpoint) {
        self.popup_link = Some(link);
    }

    pub fn has_popup_listener(&self) -> bool {
        self.popup_link.as_ref().is_some_and(|l| !l.is_closed())
    }

    /// Answer a message sent by the popup.
    pub fn respond(&mut self, message: RelayMessage) -> RelayReply {
        match message {
            RelayMessage::GetSelectedText => {
                info!(
                    "popup requested selected text, sending: {}",
                    preview(&self.captured_text, 100)
                );
                RelayReply::Text {
                    text: self.captured_text.clone(),
                }
            }
            RelayMessage::UpdateSelectedText { text } => {
                self.captured_text = text;
                RelayReply::Status {
                    status: "Background updated selected text".to_string(),
                }
            }
        }
    }

    async fn push_selection(&mut self) {
        let Some(link) = self.popup_link.as_ref() else {
            info!("popup not listening yet, selection update skipped");
            return;
        };

        let message = RelayMessage::UpdateSelectedText {
            text: self.captured_text.clone(),
        };
        match link.request(message).await {
            Ok(reply) => debug!(?reply, "popup acknowledged selection update"),
            Err(e) => {
                info!("popup not listening or closed when updating text: {e}");
                self.popup_link = None;
            }
        }
    }
}

/// Answer popup requests for as long as any popup endpoint is alive.
pub async fn serve<P, W>(controller: Arc<Mutex<BackgroundController<P, W>>>, mut inbox: RelayInbox)
where
    P: SelectionProbe,
    W: WindowHost,
{
    while let Some(envelope) = inbox.recv().await {
        let reply = controller.lock().await.respond(envelope.message.clone());
        envelope.respond(reply);
    }
    debug!("background relay inbox closed");
}
