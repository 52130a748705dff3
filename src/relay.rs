//! Selection Relay - request/response messages between the background
//! controller and the popup.
//!
//! Each side owns an inbox; the other side holds a cloneable endpoint and
//! gets its answer through a one-shot channel, so a responder is free to
//! reply after the request call has returned.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("no listener registered")]
    NoListener,
    #[error("listener dropped the request without replying")]
    NoReply,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RelayMessage {
    GetSelectedText,
    UpdateSelectedText { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayReply {
    Text { text: String },
    Status { status: String },
}

/// A received message plus the slot its reply goes into.
#[derive(Debug)]
pub struct Envelope {
    pub message: RelayMessage,
    reply: oneshot::Sender<RelayReply>,
}

impl Envelope {
    pub fn respond(self, reply: RelayReply) {
        // requester may have given up already
        if self.reply.send(reply).is_err() {
            debug!("relay requester went away before the reply");
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayEndpoint {
    tx: mpsc::UnboundedSender<Envelope>,
}

#[derive(Debug)]
pub struct RelayInbox {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

pub fn channel() -> (RelayEndpoint, RelayInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RelayEndpoint { tx }, RelayInbox { rx })
}

impl RelayEndpoint {
    pub async fn request(&self, message: RelayMessage) -> Result<RelayReply, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { message, reply })
            .map_err(|_| RelayError::NoListener)?;
        rx.await.map_err(|_| RelayError::NoReply)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl RelayInbox {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Popup-side fetch of the captured text. Every failure reads as "".
pub async fn request_selected_text(endpoint: Option<&RelayEndpoint>) -> String {
    let Some(endpoint) = endpoint else {
        error!("no background listener to request selected text from");
        return String::new();
    };

    match endpoint.request(RelayMessage::GetSelectedText).await {
        Ok(RelayReply::Text { text }) => text,
        Ok(other) => {
            error!(?other, "invalid reply when requesting selected text");
            String::new()
        }
        Err(e) => {
            error!("error requesting selected text: {e}");
            String::new()
        }
    }
}
