use crate::config::LogConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "formdesk.log";

/// Directive from `FORMDESK_LOG`, then the config file, then `info`.
pub fn filter_directive(env: Option<String>, cfg: &LogConfig) -> String {
    env.filter(|s| !s.trim().is_empty())
        .or_else(|| cfg.level.clone())
        .unwrap_or_else(|| "info".to_string())
}

pub fn log_dir(cfg: &LogConfig, base_dir: Option<&Path>) -> PathBuf {
    match (&cfg.dir, base_dir) {
        (Some(d), _) if d.is_absolute() => d.clone(),
        (Some(d), Some(base)) => base.join(d),
        (Some(d), None) => d.clone(),
        (None, Some(base)) => base.to_path_buf(),
        (None, None) => std::env::temp_dir(),
    }
}

/// File-only subscriber: the terminal belongs to the TUI.
/// Keep the returned guard alive until shutdown so buffered lines get flushed.
pub fn init(cfg: &LogConfig, base_dir: Option<&Path>) -> Result<WorkerGuard> {
    let dir = log_dir(cfg, base_dir);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating log dir {dir:?}"))?;
    let appender = tracing_appender::rolling::never(&dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let directive = filter_directive(std::env::var("FORMDESK_LOG").ok(), cfg);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter '{directive}'"))?;

    let file_layer = fmt::Layer::default()
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    tracing::info!(dir = %dir.display(), filter = %directive, "logging started");
    Ok(guard)
}
