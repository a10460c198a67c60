mod app;
mod config;
mod errors;
mod form_core;
mod logging;
mod model;
mod services;
mod stores;
mod theme;
mod ui;
mod widgets;

use anyhow::Result;

fn main() -> Result<()> {
    let loaded = config::load_config()?;
    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = match logging::init(&loaded.config.log, loaded.base_dir.as_deref()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("formdesk: file logging disabled: {e:#}");
            None
        }
    };
    tracing::info!(
        demo = loaded.config.is_demo(),
        forms = loaded.config.forms.len(),
        "starting"
    );
    ui::run(loaded.config)
}
