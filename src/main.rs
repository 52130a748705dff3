#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use complexity_lens_lib::{config, desktop, logging};

fn main() -> anyhow::Result<()> {
    config::load_dotenv();

    if let Err(e) = logging::init_tracing(&config::log_dir()) {
        eprintln!("[complexity-lens] file logging unavailable: {e}");
    }

    let config = config::AppConfig::from_env()?;
    tracing::info!(
        model = %config.gemini_model,
        policy = ?config.reopen_policy,
        "starting"
    );

    desktop::run(config)
}
