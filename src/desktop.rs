//! Tauri shell: tray icon and global shortcut as triggers, popup and
//! settings webviews, and the commands they invoke.

use std::sync::Arc;

use tauri::{
    menu::{Menu, MenuItem},
    tray::{MouseButton, MouseButtonState, TrayIconBuilder, TrayIconEvent},
    AppHandle, Emitter, Manager, State, WebviewUrl, WebviewWindow, WebviewWindowBuilder, WindowEvent,
};
use tauri_plugin_global_shortcut::{Code, Modifiers, Shortcut, ShortcutState};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::analysis::session::{self, PopupInit, PopupSession, SharedSession};
use crate::analysis::{AnalysisClient, AnalysisKind, GeminiClient, PanelView};
use crate::browser::{self, ChromeProbe};
use crate::clipboard::SystemClipboard;
use crate::config::AppConfig;
use crate::controller::{self, BackgroundController};
use crate::credentials::{self, ApiKeyStatus, KeyringStore};
use crate::popup::{HostError, PopupGeometry, WindowHandle, WindowHost};
use crate::relay::{self, RelayEndpoint};

const SETTINGS_LABEL: &str = "settings";
const APP_TITLE: &str = "Complexity Lens";

/// Popup windows backed by Tauri webviews.
pub struct TauriWindowHost {
    app: AppHandle,
}

impl TauriWindowHost {
    fn window(&self, handle: &WindowHandle) -> Result<WebviewWindow, HostError> {
        self.app
            .get_webview_window(handle.as_str())
            .ok_or_else(|| HostError::NotFound(handle.to_string()))
    }
}

#[async_trait::async_trait]
impl WindowHost for TauriWindowHost {
    async fn create(&self, handle: &WindowHandle, geometry: PopupGeometry) -> Result<(), HostError> {
        let mut builder = WebviewWindowBuilder::new(&self.app, handle.as_str(), WebviewUrl::App("popup.html".into()))
            .title(APP_TITLE)
            .inner_size(geometry.width as f64, geometry.height as f64)
            .resizable(false)
            .focused(true);
        builder = match (geometry.left, geometry.top) {
            (Some(left), Some(top)) => builder.position(left as f64, top as f64),
            _ => builder.center(),
        };
        builder.build().map_err(|e| HostError::Failed(e.to_string()))?;
        Ok(())
    }

    async fn lookup(&self, handle: &WindowHandle) -> Result<(), HostError> {
        self.window(handle).map(|_| ())
    }

    async fn focus(&self, handle: &WindowHandle) -> Result<(), HostError> {
        let window = self.window(handle)?;
        let _ = window.unminimize();
        window.set_focus().map_err(|e| HostError::Failed(e.to_string()))
    }

    async fn close(&self, handle: &WindowHandle) -> Result<(), HostError> {
        self.window(handle)?
            .close()
            .map_err(|e| HostError::Failed(e.to_string()))
    }
}

type Controller = BackgroundController<ChromeProbe, TauriWindowHost>;

pub struct DesktopState {
    controller: Arc<Mutex<Controller>>,
    // popup -> background
    background: RelayEndpoint,
    popup: Mutex<Option<SharedSession>>,
    analysis: AnalysisClient,
}

impl DesktopState {
    fn new(app: AppHandle, config: &AppConfig) -> Result<Self, crate::analysis::GeminiError> {
        let gemini = GeminiClient::new(config.gemini_base_url.clone(), config.gemini_model.clone())?;
        let analysis = AnalysisClient::new(gemini, Arc::new(SystemClipboard), Arc::new(KeyringStore));

        let controller = Arc::new(Mutex::new(BackgroundController::new(
            ChromeProbe::new(config.chrome_debug_url.clone()),
            TauriWindowHost { app },
            config.reopen_policy,
        )));

        let (background, inbox) = relay::channel();
        tauri::async_runtime::spawn(controller::serve(controller.clone(), inbox));

        Ok(Self {
            controller,
            background,
            popup: Mutex::new(None),
            analysis,
        })
    }

    async fn current_session(&self) -> Option<SharedSession> {
        self.popup.lock().await.clone()
    }
}

fn on_trigger(app: &AppHandle) {
    let controller = app.state::<DesktopState>().controller.clone();
    tauri::async_runtime::spawn(async move {
        // held for the whole trigger so rapid presses are serialized
        let mut ctl = controller.lock().await;
        let context = ctl.probe().active_context().await;
        let outcome = ctl.on_trigger(context.as_ref()).await;
        info!(?outcome, "trigger handled");
    });
}

fn on_window_destroyed(app: &AppHandle, label: String) {
    let controller = app.state::<DesktopState>().controller.clone();
    tauri::async_runtime::spawn(async move {
        if controller.lock().await.on_window_removed(&WindowHandle(label.clone())) {
            info!(window = %label, "popup closed");
        }
    });
}

fn open_settings_window(app: &AppHandle) -> tauri::Result<()> {
    if let Some(window) = app.get_webview_window(SETTINGS_LABEL) {
        let _ = window.unminimize();
        return window.set_focus();
    }
    WebviewWindowBuilder::new(app, SETTINGS_LABEL, WebviewUrl::App("settings.html".into()))
        .title(format!("{APP_TITLE} Settings"))
        .inner_size(460.0, 280.0)
        .resizable(false)
        .center()
        .build()?;
    Ok(())
}

#[tauri::command]
async fn popup_ready(state: State<'_, DesktopState>) -> Result<PopupInit, String> {
    let session = SharedSession::new(Mutex::new(PopupSession::default()));
    let (endpoint, inbox) = relay::channel();
    tauri::async_runtime::spawn(session::serve(session.clone(), inbox));

    *state.popup.lock().await = Some(session.clone());
    state.controller.lock().await.attach_popup(endpoint);

    let banner = session::initialize(&session, Some(&state.background), &state.analysis).await;
    Ok(banner.into())
}

#[tauri::command]
async fn analyze(
    kind: AnalysisKind,
    window: WebviewWindow,
    state: State<'_, DesktopState>,
) -> Result<PanelView, String> {
    let session = state
        .current_session()
        .await
        .ok_or_else(|| "popup not ready".to_string())?;

    let label = window.label().to_string();
    let view = session::analyze(&session, &state.analysis, kind, |notice| {
        if let Err(e) = window.emit_to(label.as_str(), "analysis:notice", notice) {
            warn!("failed to deliver notice: {e}");
        }
    })
    .await;
    Ok(view)
}

#[tauri::command]
fn open_settings(app: AppHandle) -> Result<(), String> {
    open_settings_window(&app).map_err(|e| e.to_string())
}

#[tauri::command]
fn close_popup(window: WebviewWindow) -> Result<(), String> {
    window.close().map_err(|e| e.to_string())
}

#[tauri::command]
async fn get_api_key_status(state: State<'_, DesktopState>) -> Result<ApiKeyStatus, String> {
    Ok(credentials::api_key_status(state.analysis.credentials().as_ref()).await)
}

// save API key to secure OS credential storage
#[tauri::command]
async fn save_api_key(key: String, app: AppHandle, state: State<'_, DesktopState>) -> Result<(), String> {
    credentials::save_api_key(state.analysis.credentials().as_ref(), &key)
        .await
        .map_err(|e| e.to_string())?;

    let banner = state.analysis.banner().await;
    if let Some(session) = state.current_session().await {
        session.lock().await.set_banner(banner);
    }
    let _ = app.emit("api-key:changed", PopupInit::from(banner));
    Ok(())
}

pub fn run(config: AppConfig) -> anyhow::Result<()> {
    tauri::Builder::default()
        .plugin(
            tauri_plugin_global_shortcut::Builder::new()
                .with_shortcut(Shortcut::new(Some(Modifiers::CONTROL | Modifiers::SHIFT), Code::KeyL))?
                .with_handler(|app, shortcut, event| {
                    if event.state == ShortcutState::Pressed
                        && shortcut.matches(Modifiers::CONTROL | Modifiers::SHIFT, Code::KeyL)
                    {
                        on_trigger(app);
                    }
                })
                .build(),
        )
        .setup(move |app| {
            let state = DesktopState::new(app.handle().clone(), &config)?;
            app.manage(state);

            #[cfg(target_os = "macos")]
            app.set_activation_policy(tauri::ActivationPolicy::Accessory);

            // tray menu with launch chrome, settings + quit options
            let launch = MenuItem::with_id(app, "launch-chrome", "Launch Chrome", true, None::<&str>)?;
            let settings = MenuItem::with_id(app, "settings", "Settings", true, None::<&str>)?;
            let quit = MenuItem::with_id(app, "quit", "Quit", true, None::<&str>)?;
            let tray_menu = Menu::with_items(app, &[&launch, &settings, &quit])?;

            let mut tray = TrayIconBuilder::new()
                .tooltip(APP_TITLE)
                .menu(&tray_menu)
                .show_menu_on_left_click(false)
                .on_menu_event(|app, event| match event.id.as_ref() {
                    "launch-chrome" => {
                        tauri::async_runtime::spawn(async {
                            if let Err(e) = browser::launch_debug_chrome().await {
                                error!("failed to launch Chrome: {e:#}");
                            }
                        });
                    }
                    "settings" => {
                        if let Err(e) = open_settings_window(app) {
                            error!("failed to open settings: {e}");
                        }
                    }
                    "quit" => app.exit(0),
                    _ => {}
                })
                .on_tray_icon_event(|tray, event| {
                    if let TrayIconEvent::Click {
                        button: MouseButton::Left,
                        button_state: MouseButtonState::Up,
                        ..
                    } = event
                    {
                        on_trigger(tray.app_handle());
                    }
                });
            if let Some(icon) = app.default_window_icon() {
                tray = tray.icon(icon.clone());
            }
            tray.build(app)?;

            info!("ready: press Ctrl+Shift+L or click the tray icon");
            Ok(())
        })
        .on_window_event(|window, event| {
            if let WindowEvent::Destroyed = event {
                if window.label() != SETTINGS_LABEL {
                    on_window_destroyed(window.app_handle(), window.label().to_string());
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            popup_ready,
            analyze,
            open_settings,
            close_popup,
            get_api_key_status,
            save_api_key,
        ])
        .build(tauri::generate_context!())?
        .run(|_app, event| {
            // tray app: closing the last window must not exit
            if let tauri::RunEvent::ExitRequested { api, code: None, .. } = event {
                api.prevent_exit();
            }
        });

    Ok(())
}
