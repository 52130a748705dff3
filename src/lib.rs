pub mod analysis;
pub mod browser;
pub mod capture;
pub mod clipboard;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod logging;
pub mod popup;
pub mod relay;

#[cfg(feature = "desktop")]
pub mod desktop;
