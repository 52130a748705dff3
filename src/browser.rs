use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::{Bounds, GetWindowForTargetParams};
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::handler::Handler;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::capture::{BrowsingContext, SelectionProbe, WindowBounds, SELECTION_PROBE_JS};

// paths to check for DevToolsActivePort (for connecting to existing chrome)
#[cfg(target_os = "macos")]
const CHROME_PROFILES: &[&str] = &[
    "Library/Application Support/Google/Chrome",
    "Library/Application Support/Google/Chrome Canary",
    "Library/Application Support/Arc/User Data",
    "Library/Application Support/Chromium",
];

#[cfg(target_os = "windows")]
const CHROME_PROFILES: &[&str] = &[
    "AppData/Local/Google/Chrome/User Data",
    "AppData/Local/Google/Chrome SxS/User Data",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const CHROME_PROFILES: &[&str] = &[".config/google-chrome", ".config/chromium"];

// executables tried by the explicit launch action
#[cfg(target_os = "macos")]
const CHROME_EXECUTABLES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(target_os = "windows")]
const CHROME_EXECUTABLES: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const CHROME_EXECUTABLES: &[&str] = &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"];

const DEFAULT_DEBUG_URL: &str = "http://127.0.0.1:9222";
const EVAL_TIMEOUT: Duration = Duration::from_secs(5);
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

pub const CHROME_WITHOUT_DEBUGGING: &str = "Chrome is running without remote debugging; restart it with \
     --remote-debugging-port=9222 or use \"Launch Chrome\" from the tray menu";
pub const NO_DEBUGGABLE_CHROME: &str =
    "no Chrome with remote debugging found; use \"Launch Chrome\" from the tray menu";

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    /// The DevTools connection itself is unusable.
    #[error("browser connection lost: {0}")]
    ConnectionLost(String),
    /// One tab misbehaved; the connection is fine.
    #[error("{0}")]
    Page(String),
}

/// Whether a client should survive `error`. Only a dead handler or a lost
/// connection forces a reconnect; tab-level failures keep it.
pub fn keep_connection(handler_alive: bool, error: &BrowserError) -> bool {
    handler_alive && !matches!(error, BrowserError::ConnectionLost(_))
}

/// One entry of the DevTools target listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TabTarget {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: String,
}

/// `/json/list` is ordered by last activity, so the first page target is
/// the tab the user was looking at.
pub fn pick_active(targets: &[TabTarget]) -> Option<&TabTarget> {
    targets.iter().find(|t| t.kind == "page")
}

/// `http://host:port` for a DevTools endpoint given as ws or http url.
pub fn http_base(endpoint: &str) -> Option<String> {
    let rest = ["ws://", "wss://", "http://", "https://"]
        .iter()
        .find_map(|scheme| endpoint.strip_prefix(scheme))?;
    let host = rest.split('/').next().filter(|h| !h.is_empty())?;
    Some(format!("http://{host}"))
}

/// Error text when no endpoint could be found.
pub fn unreachable_reason(chrome_running: bool) -> &'static str {
    if chrome_running {
        CHROME_WITHOUT_DEBUGGING
    } else {
        NO_DEBUGGABLE_CHROME
    }
}

/// A DevTools connection to a Chrome the user already runs. The app never
/// owns the browser process, so dropping the client leaves Chrome alone.
pub struct BrowserClient {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
    http: reqwest::Client,
    http_base: Option<String>,
    pages: Vec<Page>,
}

impl BrowserClient {
    /// Attach to an existing DevTools endpoint. Never launches a browser.
    pub async fn connect_existing(debug_url: Option<&str>) -> Result<Self> {
        let existing = match debug_url {
            Some(url) => Some(url.to_string()),
            None => try_find_existing_chrome().await,
        };
        let Some(ws_url) = existing else {
            let running = tokio::task::spawn_blocking(is_chrome_running)
                .await
                .unwrap_or(false);
            return Err(anyhow!(unreachable_reason(running)));
        };

        info!("connecting to existing Chrome at {ws_url}");
        let (mut browser, handler) = Browser::connect(&ws_url)
            .await
            .map_err(|e| anyhow!("failed to connect to {ws_url}: {e}"))?;
        let handler_task = tokio::spawn(handler_loop(handler));

        // fetch existing targets so we can see tabs that were already open
        let _ = browser.fetch_targets().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let pages = browser.pages().await.unwrap_or_default();
        info!("found {} existing pages", pages.len());

        let http = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
        Ok(Self {
            browser,
            handler_task,
            http,
            http_base: http_base(&ws_url),
            pages,
        })
    }

    pub fn is_alive(&self) -> bool {
        !self.handler_task.is_finished()
    }

    async fn refresh_pages(&mut self) -> Result<(), BrowserError> {
        self.pages = self
            .browser
            .pages()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?;
        Ok(())
    }

    fn find_page(&self, target_id: &str) -> Option<&Page> {
        self.pages
            .iter()
            .find(|p| p.target_id().inner().as_str() == target_id)
    }

    // activity-ordered listing over http, CDP target order as fallback
    async fn list_targets(&mut self) -> Result<Vec<TabTarget>, BrowserError> {
        if let Some(base) = &self.http_base {
            let listing = async {
                self.http
                    .get(format!("{base}/json/list"))
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<Vec<TabTarget>>()
                    .await
            };
            match listing.await {
                Ok(targets) => return Ok(targets),
                Err(e) => debug!("target listing unavailable: {}", e.without_url()),
            }
        }

        let infos = self
            .browser
            .fetch_targets()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?;
        Ok(infos
            .into_iter()
            .map(|t| TabTarget {
                id: t.target_id.inner().clone(),
                kind: t.r#type,
                url: t.url,
            })
            .collect())
    }

    /// The tab the user most likely triggered from. No script runs here.
    pub async fn active_context(&mut self) -> Result<BrowsingContext, BrowserError> {
        let targets = self.list_targets().await?;
        let target = pick_active(&targets)
            .cloned()
            .ok_or_else(|| BrowserError::Page("no open pages".into()))?;

        let params = GetWindowForTargetParams::builder()
            .target_id(TargetId::from(target.id.clone()))
            .build();
        let window = match tokio::time::timeout(LOOKUP_TIMEOUT, self.browser.execute(params)).await {
            Ok(Ok(resp)) => bounds_from_cdp(&resp.result.bounds),
            Ok(Err(e)) => {
                debug!("window bounds unavailable: {e}");
                None
            }
            Err(_) => {
                debug!("window bounds lookup timed out");
                None
            }
        };

        Ok(BrowsingContext {
            id: target.id,
            url: Some(target.url).filter(|u| !u.is_empty()),
            window,
        })
    }

    pub async fn read_selection(&mut self, target_id: &str) -> Result<String, BrowserError> {
        if self.find_page(target_id).is_none() {
            self.refresh_pages().await?;
        }
        let page = self
            .find_page(target_id)
            .ok_or_else(|| BrowserError::Page(format!("tab {target_id} is gone")))?;

        match tokio::time::timeout(EVAL_TIMEOUT, page.evaluate(SELECTION_PROBE_JS.to_string())).await {
            Ok(Ok(result)) => Ok(result.into_value::<String>().unwrap_or_default()),
            Ok(Err(e)) => Err(BrowserError::Page(format!("JS evaluation failed: {e}"))),
            Err(_) => Err(BrowserError::Page("JS evaluation timed out".into())),
        }
    }
}

pub fn bounds_from_cdp(bounds: &Bounds) -> Option<WindowBounds> {
    Some(WindowBounds {
        left: bounds.left.unwrap_or(0),
        top: bounds.top.unwrap_or(0),
        width: bounds.width?,
        height: bounds.height?,
    })
}

// handler event loop
async fn handler_loop(mut handler: Handler) {
    while let Some(event) = handler.next().await {
        if event.is_err() {
            break;
        }
    }
}

fn profile_base_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default()
}

fn chrome_debug_profile_dir() -> PathBuf {
    crate::config::app_data_dir().join("chrome-profile")
}

// check if chrome is already running
fn is_chrome_running() -> bool {
    #[cfg(target_os = "windows")]
    {
        return std::process::Command::new("tasklist")
            .args(["/FI", "IMAGENAME eq chrome.exe"])
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).contains("chrome.exe"))
            .unwrap_or(false);
    }

    #[cfg(target_os = "macos")]
    let name = "Google Chrome";
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let name = "chrome";

    #[cfg(not(target_os = "windows"))]
    {
        std::process::Command::new("pgrep")
            .args(["-x", name])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

/// `DevToolsActivePort` holds the port on line one and the browser path on
/// line two.
pub fn parse_devtools_active_port(content: &str) -> Option<String> {
    let mut lines = content.lines();
    let port = lines.next()?.trim();
    let path = lines.next()?.trim();
    if port.is_empty() || port.parse::<u16>().is_err() || path.is_empty() {
        return None;
    }
    Some(format!("ws://127.0.0.1:{port}{path}"))
}

// try to find existing chrome with debugging enabled
async fn try_find_existing_chrome() -> Option<String> {
    let home = profile_base_dir();
    let port_files = CHROME_PROFILES
        .iter()
        .map(|profile| home.join(profile))
        .chain(std::iter::once(chrome_debug_profile_dir()))
        .map(|dir| dir.join("DevToolsActivePort"));

    for port_file in port_files {
        if let Ok(content) = tokio::fs::read_to_string(&port_file).await {
            if let Some(ws_url) = parse_devtools_active_port(&content) {
                return Some(ws_url);
            }
        }
    }

    // fallback: try localhost:9222
    let client = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build().ok()?;
    if client
        .get(format!("{DEFAULT_DEBUG_URL}/json/version"))
        .send()
        .await
        .is_ok()
    {
        return Some(DEFAULT_DEBUG_URL.to_string());
    }

    None
}

/// Arguments for a debuggable Chrome on the app's own profile. Chrome
/// refuses remote debugging on its default user data dir.
pub fn launch_args(user_data_dir: &std::path::Path) -> Vec<String> {
    vec![
        format!("--user-data-dir={}", user_data_dir.display()),
        "--remote-debugging-port=0".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--password-store=basic".to_string(),
    ]
}

/// Tray action: start a detached Chrome with remote debugging. The process
/// is not tied to the app, so it outlives both the connection and the app.
pub async fn launch_debug_chrome() -> Result<()> {
    if let Some(endpoint) = try_find_existing_chrome().await {
        info!("debuggable Chrome already available at {endpoint}");
        return Ok(());
    }

    let user_data_dir = chrome_debug_profile_dir();
    info!("using debug profile: {}", user_data_dir.display());
    let args = launch_args(&user_data_dir);

    for exe in CHROME_EXECUTABLES {
        match std::process::Command::new(exe)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                info!(pid = child.id(), "launched {exe}");
                return Ok(());
            }
            Err(e) => debug!("could not start {exe}: {e}"),
        }
    }
    Err(anyhow!("could not find a Chrome executable to launch"))
}

// thread-safe wrapper
pub type SharedBrowserClient = Arc<Mutex<Option<BrowserClient>>>;

pub fn create_shared_browser_client() -> SharedBrowserClient {
    Arc::new(Mutex::new(None))
}

/// Lazily connected Chrome used as the selection probe. The connection is
/// kept across tab-level failures and rebuilt only once it is lost.
#[derive(Clone)]
pub struct ChromeProbe {
    client: SharedBrowserClient,
    debug_url: Option<String>,
}

impl ChromeProbe {
    pub fn new(debug_url: Option<String>) -> Self {
        Self {
            client: create_shared_browser_client(),
            debug_url,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    async fn connected(&self) -> Result<tokio::sync::MutexGuard<'_, Option<BrowserClient>>> {
        let mut guard = self.client.lock().await;
        if guard.as_ref().is_some_and(|c| !c.is_alive()) {
            info!("browser connection lost, reconnecting");
            *guard = None;
        }
        if guard.is_none() {
            *guard = Some(BrowserClient::connect_existing(self.debug_url.as_deref()).await?);
        }
        Ok(guard)
    }

    pub async fn active_context(&self) -> Option<BrowsingContext> {
        let mut guard = match self.connected().await {
            Ok(g) => g,
            Err(e) => {
                warn!("browser unavailable: {e:#}");
                return None;
            }
        };
        let result = guard.as_mut()?.active_context().await;
        match result {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                warn!("could not determine active tab: {e}");
                settle(&mut guard, &e);
                None
            }
        }
    }
}

fn settle(slot: &mut Option<BrowserClient>, error: &BrowserError) {
    let alive = slot.as_ref().is_some_and(BrowserClient::is_alive);
    if !keep_connection(alive, error) {
        info!("dropping browser connection");
        *slot = None;
    }
}

#[async_trait]
impl SelectionProbe for ChromeProbe {
    async fn read_selection(&self, context: &BrowsingContext) -> Result<String> {
        let mut guard = self.connected().await?;
        let client = guard.as_mut().ok_or_else(|| anyhow!("browser not connected"))?;
        let result = client.read_selection(&context.id).await;
        if let Err(e) = &result {
            settle(&mut guard, e);
        }
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, kind: &str, url: &str) -> TabTarget {
        TabTarget {
            id: id.into(),
            kind: kind.into(),
            url: url.into(),
        }
    }

    #[test]
    fn test_pick_active() {
        assert_eq!(pick_active(&[]), None);
        let listing = [
            target("sw", "service_worker", "https://a.test/sw.js"),
            target("t1", "page", "https://a.test/"),
            target("t2", "page", "https://b.test/"),
        ];
        assert_eq!(pick_active(&listing).map(|t| t.id.as_str()), Some("t1"));
        assert_eq!(pick_active(&listing[..1]), None);
    }

    #[test]
    fn test_target_listing_shape() {
        let listing: Vec<TabTarget> = serde_json::from_str(
            r#"[{"id":"A1","type":"page","title":"x","url":"chrome://newtab/","webSocketDebuggerUrl":"ws://h/1"},
                {"id":"B2","type":"iframe"}]"#,
        )
        .unwrap();
        assert_eq!(listing[0], target("A1", "page", "chrome://newtab/"));
        assert_eq!(listing[1], target("B2", "iframe", ""));
    }

    #[test]
    fn test_http_base() {
        assert_eq!(
            http_base("ws://127.0.0.1:9222/devtools/browser/abc").as_deref(),
            Some("http://127.0.0.1:9222")
        );
        assert_eq!(http_base("http://127.0.0.1:9222").as_deref(), Some("http://127.0.0.1:9222"));
        assert_eq!(http_base("127.0.0.1:9222"), None);
        assert_eq!(http_base("ws:///devtools"), None);
    }

    #[test]
    fn test_tab_failures_keep_connection() {
        assert!(keep_connection(true, &BrowserError::Page("JS evaluation timed out".into())));
        assert!(keep_connection(true, &BrowserError::Page("tab t1 is gone".into())));
        assert!(!keep_connection(true, &BrowserError::ConnectionLost("ws closed".into())));
        assert!(!keep_connection(false, &BrowserError::Page("JS evaluation timed out".into())));
    }

    #[test]
    fn test_unreachable_reason_is_readable() {
        assert!(unreachable_reason(true).contains("--remote-debugging-port"));
        assert_eq!(unreachable_reason(false), NO_DEBUGGABLE_CHROME);
    }

    #[test]
    fn test_launch_args_enable_debugging_on_own_profile() {
        let args = launch_args(std::path::Path::new("/tmp/lens-profile"));
        assert!(args.contains(&"--user-data-dir=/tmp/lens-profile".to_string()));
        assert!(args.contains(&"--remote-debugging-port=0".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_no_context() {
        let chrome = ChromeProbe::new(Some("ws://127.0.0.1:1/devtools/browser/none".into()));
        assert_eq!(chrome.active_context().await, None);
        assert!(!chrome.is_connected().await);

        let ctx = BrowsingContext::new("t1", Some("https://a.test/".into()));
        assert!(chrome.read_selection(&ctx).await.is_err());
        assert!(!chrome.is_connected().await);
    }

    #[test]
    fn test_devtools_active_port() {
        assert_eq!(
            parse_devtools_active_port("9222\n/devtools/browser/abc-123\n"),
            Some("ws://127.0.0.1:9222/devtools/browser/abc-123".to_string())
        );
        assert_eq!(parse_devtools_active_port("9222\n"), None);
        assert_eq!(parse_devtools_active_port("not-a-port\n/devtools/browser/x"), None);
        assert_eq!(parse_devtools_active_port(""), None);
    }

    #[test]
    fn test_bounds_from_cdp() {
        let bounds = Bounds {
            left: Some(10),
            width: Some(1280),
            height: Some(800),
            ..Default::default()
        };
        assert_eq!(
            bounds_from_cdp(&bounds),
            Some(WindowBounds { left: 10, top: 0, width: 1280, height: 800 })
        );

        let partial = Bounds { width: None, ..bounds };
        assert_eq!(bounds_from_cdp(&partial), None);
    }
}
