//! Popup Window Manager.
//!
//! Tracks at most one popup window. A trigger either opens it, or (when one
//! is already open) focuses or closes it depending on [`ReopenPolicy`].
//! Every host call is awaited before the next decision is made, and a handle
//! the host no longer knows about is dropped and replaced.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::capture::WindowBounds;

pub const POPUP_WIDTH: i64 = 400;
pub const POPUP_HEIGHT: i64 = 650;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("window {0} not found")]
    NotFound(String),
    #[error("window operation failed: {0}")]
    Failed(String),
}

/// Opaque identifier of a popup window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub String);

impl WindowHandle {
    /// Fresh label for a new popup window.
    pub fn generate() -> Self {
        Self(format!("popup-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Size and optional position of the popup. `None` position means the
/// host should center the window on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupGeometry {
    pub width: i64,
    pub height: i64,
    pub left: Option<i64>,
    pub top: Option<i64>,
}

impl PopupGeometry {
    pub fn centered_over(anchor: Option<&WindowBounds>) -> Self {
        let (left, top) = match anchor {
            Some(b) => (
                Some((b.left + half_round(b.width - POPUP_WIDTH)).max(0)),
                Some((b.top + half_round(b.height - POPUP_HEIGHT)).max(0)),
            ),
            None => (None, None),
        };
        Self {
            width: POPUP_WIDTH,
            height: POPUP_HEIGHT,
            left,
            top,
        }
    }
}

// round(d / 2) with halves rounded up
fn half_round(d: i64) -> i64 {
    (d + 1).div_euclid(2)
}

/// What a trigger does when a popup is already open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReopenPolicy {
    /// Focus the existing popup and push the new selection into it.
    #[default]
    FocusExisting,
    /// Close the existing popup; the next trigger opens a new one.
    ToggleClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupState {
    Closed,
    Open(WindowHandle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Opened(WindowHandle),
    Focused(WindowHandle),
    Closed,
    Failed,
}

/// Window operations the host platform provides.
#[async_trait]
pub trait WindowHost: Send + Sync {
    async fn create(&self, handle: &WindowHandle, geometry: PopupGeometry) -> Result<(), HostError>;
    async fn lookup(&self, handle: &WindowHandle) -> Result<(), HostError>;
    async fn focus(&self, handle: &WindowHandle) -> Result<(), HostError>;
    async fn close(&self, handle: &WindowHandle) -> Result<(), HostError>;
}

#[async_trait]
impl<T: WindowHost + ?Sized> WindowHost for std::sync::Arc<T> {
    async fn create(&self, handle: &WindowHandle, geometry: PopupGeometry) -> Result<(), HostError> {
        (**self).create(handle, geometry).await
    }

    async fn lookup(&self, handle: &WindowHandle) -> Result<(), HostError> {
        (**self).lookup(handle).await
    }

    async fn focus(&self, handle: &WindowHandle) -> Result<(), HostError> {
        (**self).focus(handle).await
    }

    async fn close(&self, handle: &WindowHandle) -> Result<(), HostError> {
        (**self).close(handle).await
    }
}

pub struct PopupManager<W> {
    host: W,
    state: PopupState,
    policy: ReopenPolicy,
}

impl<W: WindowHost> PopupManager<W> {
    pub fn new(host: W, policy: ReopenPolicy) -> Self {
        Self {
            host,
            state: PopupState::Closed,
            policy,
        }
    }

    pub fn state(&self) -> &PopupState {
        &self.state
    }

    pub fn handle(&self) -> Option<&WindowHandle> {
        match &self.state {
            PopupState::Open(handle) => Some(handle),
            PopupState::Closed => None,
        }
    }

    pub fn policy(&self) -> ReopenPolicy {
        self.policy
    }

    pub fn host(&self) -> &W {
        &self.host
    }

    pub async fn on_trigger(&mut self, anchor: Option<&WindowBounds>) -> TriggerOutcome {
        let geometry = PopupGeometry::centered_over(anchor);

        let PopupState::Open(handle) = self.state.clone() else {
            return self.open(geometry).await;
        };

        if let Err(e) = self.host.lookup(&handle).await {
            // closed behind our back
            warn!(%handle, "tracked popup is gone ({e}), creating a new one");
            self.state = PopupState::Closed;
            return self.open(geometry).await;
        }

        match self.policy {
            ReopenPolicy::FocusExisting => match self.host.focus(&handle).await {
                Ok(()) => TriggerOutcome::Focused(handle),
                Err(e) => {
                    error!(%handle, "failed to focus popup: {e}");
                    // an unfocusable window would otherwise linger untracked
                    if let Err(e) = self.host.close(&handle).await {
                        warn!(%handle, "failed to close unfocusable popup: {e}");
                    }
                    self.state = PopupState::Closed;
                    TriggerOutcome::Failed
                }
            },
            ReopenPolicy::ToggleClose => {
                if let Err(e) = self.host.close(&handle).await {
                    error!(%handle, "failed to close popup: {e}");
                }
                self.state = PopupState::Closed;
                TriggerOutcome::Closed
            }
        }
    }

    /// Host notification that some window closed. Returns true when it was
    /// the tracked popup.
    pub fn on_window_removed(&mut self, closed: &WindowHandle) -> bool {
        match &self.state {
            PopupState::Open(handle) if handle == closed => {
                info!(%handle, "popup window was closed");
                self.state = PopupState::Closed;
                true
            }
            _ => false,
        }
    }

    async fn open(&mut self, geometry: PopupGeometry) -> TriggerOutcome {
        let handle = WindowHandle::generate();
        match self.host.create(&handle, geometry).await {
            Ok(()) => {
                info!(%handle, ?geometry, "popup window created");
                self.state = PopupState::Open(handle.clone());
                TriggerOutcome::Opened(handle)
            }
            Err(e) => {
                error!("failed to create popup window: {e}");
                TriggerOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory window host that records every call.
    #[derive(Default)]
    pub struct FakeHost {
        pub open: Mutex<HashSet<WindowHandle>>,
        pub log: Mutex<Vec<String>>,
        pub created: Mutex<Vec<PopupGeometry>>,
        pub fail_create: Mutex<bool>,
        pub fail_focus: Mutex<bool>,
    }

    impl FakeHost {
        pub fn calls(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        pub fn user_closes(&self, handle: &WindowHandle) {
            self.open.lock().unwrap().remove(handle);
        }

        pub fn open_count(&self) -> usize {
            self.open.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl WindowHost for FakeHost {
        async fn create(&self, handle: &WindowHandle, geometry: PopupGeometry) -> Result<(), HostError> {
            self.log.lock().unwrap().push("create".into());
            if *self.fail_create.lock().unwrap() {
                return Err(HostError::Failed("no display".into()));
            }
            self.created.lock().unwrap().push(geometry);
            self.open.lock().unwrap().insert(handle.clone());
            Ok(())
        }

        async fn lookup(&self, handle: &WindowHandle) -> Result<(), HostError> {
            self.log.lock().unwrap().push("lookup".into());
            if self.open.lock().unwrap().contains(handle) {
                Ok(())
            } else {
                Err(HostError::NotFound(handle.to_string()))
            }
        }

        async fn focus(&self, handle: &WindowHandle) -> Result<(), HostError> {
            self.log.lock().unwrap().push("focus".into());
            if *self.fail_focus.lock().unwrap() {
                return Err(HostError::Failed("window manager refused focus".into()));
            }
            self.lookup_quiet(handle)
        }

        async fn close(&self, handle: &WindowHandle) -> Result<(), HostError> {
            self.log.lock().unwrap().push("close".into());
            self.open
                .lock()
                .unwrap()
                .remove(handle)
                .then_some(())
                .ok_or_else(|| HostError::NotFound(handle.to_string()))
        }
    }

    impl FakeHost {
        fn lookup_quiet(&self, handle: &WindowHandle) -> Result<(), HostError> {
            if self.open.lock().unwrap().contains(handle) {
                Ok(())
            } else {
                Err(HostError::NotFound(handle.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeHost;
    use super::*;
    use std::sync::Arc;

    fn bounds(left: i64, top: i64, width: i64, height: i64) -> WindowBounds {
        WindowBounds { left, top, width, height }
    }

    #[test]
    fn test_geometry_centered() {
        let g = PopupGeometry::centered_over(Some(&bounds(100, 50, 1200, 900)));
        assert_eq!(g.width, 400);
        assert_eq!(g.height, 650);
        assert_eq!(g.left, Some(100 + 400));
        assert_eq!(g.top, Some(50 + 125));
    }

    #[test]
    fn test_geometry_clamped_and_rounded() {
        // window narrower than the popup pushes it off screen; clamp to zero
        let g = PopupGeometry::centered_over(Some(&bounds(0, 0, 300, 500)));
        assert_eq!(g.left, Some(0));
        assert_eq!(g.top, Some(0));

        // odd difference rounds half up
        let g = PopupGeometry::centered_over(Some(&bounds(10, 10, 401, 649)));
        assert_eq!(g.left, Some(11));
        assert_eq!(g.top, Some(10));
    }

    #[test]
    fn test_geometry_without_anchor() {
        let g = PopupGeometry::centered_over(None);
        assert_eq!(g.left, None);
        assert_eq!(g.top, None);
    }

    #[tokio::test]
    async fn test_first_trigger_opens() {
        let host = Arc::new(FakeHost::default());
        let mut popup = PopupManager::new(host.clone(), ReopenPolicy::FocusExisting);
        let outcome = popup.on_trigger(Some(&bounds(0, 0, 1000, 1000))).await;
        let TriggerOutcome::Opened(handle) = outcome else {
            panic!("expected open, got {outcome:?}");
        };
        assert_eq!(popup.handle(), Some(&handle));
        assert_eq!(host.calls(), vec!["create"]);
    }

    #[tokio::test]
    async fn test_second_trigger_focuses() {
        let host = Arc::new(FakeHost::default());
        let mut popup = PopupManager::new(host.clone(), ReopenPolicy::FocusExisting);
        popup.on_trigger(None).await;
        let first = popup.handle().cloned().unwrap();

        let outcome = popup.on_trigger(None).await;
        assert_eq!(outcome, TriggerOutcome::Focused(first.clone()));
        assert_eq!(popup.handle(), Some(&first));
        assert_eq!(host.calls(), vec!["create", "lookup", "focus"]);
        assert_eq!(host.open_count(), 1);
    }

    #[tokio::test]
    async fn test_focus_failure_closes_window() {
        let host = Arc::new(FakeHost::default());
        let mut popup = PopupManager::new(host.clone(), ReopenPolicy::FocusExisting);
        popup.on_trigger(None).await;
        *host.fail_focus.lock().unwrap() = true;

        assert_eq!(popup.on_trigger(None).await, TriggerOutcome::Failed);
        assert_eq!(popup.state(), &PopupState::Closed);
        assert_eq!(host.calls(), vec!["create", "lookup", "focus", "close"]);
        assert_eq!(host.open_count(), 0);

        // the next trigger leaves exactly one popup on screen
        assert!(matches!(popup.on_trigger(None).await, TriggerOutcome::Opened(_)));
        assert_eq!(host.open_count(), 1);
    }

    #[tokio::test]
    async fn test_toggle_policy_closes_without_reopen() {
        let host = Arc::new(FakeHost::default());
        let mut popup = PopupManager::new(host.clone(), ReopenPolicy::ToggleClose);
        popup.on_trigger(None).await;

        assert_eq!(popup.on_trigger(None).await, TriggerOutcome::Closed);
        assert_eq!(popup.state(), &PopupState::Closed);
        assert_eq!(host.open_count(), 0);

        // next click opens again
        assert!(matches!(popup.on_trigger(None).await, TriggerOutcome::Opened(_)));
        assert_eq!(host.open_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_handle_self_heals() {
        let host = Arc::new(FakeHost::default());
        let mut popup = PopupManager::new(host.clone(), ReopenPolicy::FocusExisting);
        popup.on_trigger(None).await;
        let stale = popup.handle().cloned().unwrap();

        // closed by the user, notification not delivered yet
        host.user_closes(&stale);

        let outcome = popup.on_trigger(None).await;
        let TriggerOutcome::Opened(fresh) = outcome else {
            panic!("expected a fresh window, got {outcome:?}");
        };
        assert_ne!(fresh, stale);
        assert_eq!(popup.handle(), Some(&fresh));
        assert_eq!(host.open_count(), 1);
    }

    #[tokio::test]
    async fn test_window_removed_notification() {
        let host = Arc::new(FakeHost::default());
        let mut popup = PopupManager::new(host.clone(), ReopenPolicy::FocusExisting);
        popup.on_trigger(None).await;
        let handle = popup.handle().cloned().unwrap();

        // unrelated window
        assert!(!popup.on_window_removed(&WindowHandle("settings".into())));
        assert_eq!(popup.handle(), Some(&handle));

        assert!(popup.on_window_removed(&handle));
        assert_eq!(popup.handle(), None);
        assert!(!popup.on_window_removed(&handle));
    }

    #[tokio::test]
    async fn test_create_failure_stays_closed() {
        let host = Arc::new(FakeHost::default());
        *host.fail_create.lock().unwrap() = true;
        let mut popup = PopupManager::new(host.clone(), ReopenPolicy::FocusExisting);
        assert_eq!(popup.on_trigger(None).await, TriggerOutcome::Failed);
        assert_eq!(popup.state(), &PopupState::Closed);
    }

    #[tokio::test]
    async fn test_at_most_one_live_handle() {
        let host = Arc::new(FakeHost::default());
        for policy in [ReopenPolicy::FocusExisting, ReopenPolicy::ToggleClose] {
            let mut popup = PopupManager::new(host.clone(), policy);
            for _ in 0..7 {
                popup.on_trigger(None).await;
                assert!(host.open_count() <= 1);
                assert_eq!(popup.handle().is_some(), host.open_count() == 1);
            }
            if let Some(h) = popup.handle().cloned() {
                host.user_closes(&h);
                popup.on_window_removed(&h);
            }
        }
    }

    #[test]
    fn test_handles_are_unique() {
        let a = WindowHandle::generate();
        let b = WindowHandle::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("popup-"));
    }
}
