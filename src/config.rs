use crate::model::Audience;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "formdesk.yaml";
pub const CONFIG_SUBDIR: &str = ".formdesk";

/// One form offered on the home screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormEntry {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub audience: Audience,
    // Share-link constraints applied when this entry is filled as a guest
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_limit: Option<u32>,
}

impl FormEntry {
    pub fn new(id: impl Into<String>, audience: Audience) -> Self {
        Self {
            id: id.into(),
            title: None,
            audience,
            expires_at: None,
            time_limit: None,
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    // No url: run against the in-memory demo backend
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub link_ttl_hours: Option<u32>,
    #[serde(default)]
    pub forms: Vec<FormEntry>,
    #[serde(default)]
    pub guest: GuestConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_timeout_secs() -> u64 {
    15
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            timeout_secs: default_timeout_secs(),
            link_ttl_hours: None,
            forms: Vec::new(),
            guest: GuestConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn is_demo(&self) -> bool {
        self.api_url.is_none()
    }

    pub fn form(&self, id: &str) -> Option<&FormEntry> {
        self.forms.iter().find(|f| f.id == id)
    }

    /// Forms of the in-memory backend, used when no list is configured.
    pub fn demo_forms() -> Vec<FormEntry> {
        let mut contact = FormEntry::new("contact", Audience::Guest);
        contact.title = Some("Contact (guest)".into());
        let mut feedback = FormEntry::new("feedback", Audience::Member);
        feedback.title = Some("Product feedback".into());
        vec![contact, feedback]
    }
}

/// A loaded config and the directory it came from, if any.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub base_dir: Option<PathBuf>,
}

/// Find `formdesk.yaml`: explicit dir, CWD, `.formdesk/` in CWD and ancestors, then home.
pub fn discover_config_path(
    env_dir: Option<&Path>,
    cwd: &Path,
    home: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(dir) = env_dir {
        return Some(dir.join(CONFIG_FILE));
    }
    let candidates = [
        cwd.join(CONFIG_FILE),
        cwd.join(CONFIG_SUBDIR).join(CONFIG_FILE),
    ];
    if let Some(p) = candidates.iter().find(|p| p.exists()) {
        return Some(p.clone());
    }
    let mut cur = cwd;
    while let Some(parent) = cur.parent() {
        let p = parent.join(CONFIG_SUBDIR).join(CONFIG_FILE);
        if p.exists() {
            return Some(p);
        }
        cur = parent;
    }
    home.map(|h| h.join(CONFIG_SUBDIR).join(CONFIG_FILE))
        .filter(|p| p.exists())
}

pub fn load_config_file(path: &Path) -> Result<AppConfig> {
    let s = fs::read_to_string(path).with_context(|| format!("reading config: {path:?}"))?;
    let cfg: AppConfig = serde_yaml::from_str(&s).map_err(|e| {
        if let Some(loc) = e.location() {
            anyhow!("{}:{}:{}: {}", path.display(), loc.line(), loc.column(), e)
        } else {
            anyhow!("{}: {}", path.display(), e)
        }
    })?;
    Ok(cfg)
}

fn truthy(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
}

/// Environment wins over the file. `get` is `std::env::var` outside of tests.
pub fn apply_env_overrides(cfg: &mut AppConfig, get: impl Fn(&str) -> Option<String>) {
    if let Some(url) = get("FORMDESK_API_URL").filter(|s| !s.is_empty()) {
        cfg.api_url = Some(url);
    }
    if let Some(tok) = get("FORMDESK_API_TOKEN").filter(|s| !s.is_empty()) {
        cfg.api_token = Some(tok);
    }
    if let Some(name) = get("FORMDESK_GUEST_NAME") {
        cfg.guest.name = Some(name);
    }
    if let Some(email) = get("FORMDESK_GUEST_EMAIL") {
        cfg.guest.email = Some(email);
    }
    if get("FORMDESK_DEMO").is_some_and(|v| truthy(&v)) {
        cfg.api_url = None;
    }
}

pub fn validate_app_config(cfg: &AppConfig) -> Result<()> {
    if let Some(url) = &cfg.api_url {
        let parsed = url::Url::parse(url).with_context(|| format!("api_url is not a url: {url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!("api_url must be http(s): {url}"));
        }
    }
    let mut seen = HashSet::new();
    for f in &cfg.forms {
        if f.id.trim().is_empty() {
            return Err(anyhow!("form entry with an empty id"));
        }
        if !seen.insert(f.id.as_str()) {
            return Err(anyhow!("duplicate form entry '{}'", f.id));
        }
    }
    Ok(())
}

/// Discover, parse, override from the environment and validate.
pub fn load_config() -> Result<LoadedConfig> {
    let env_dir = std::env::var("FORMDESK_CONFIG_DIR").ok().map(PathBuf::from);
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let home = std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .map(PathBuf::from);
    let path = discover_config_path(env_dir.as_deref(), &cwd, home.as_deref());
    let mut loaded = match path {
        Some(p) => LoadedConfig {
            config: load_config_file(&p)?,
            base_dir: p.parent().map(Path::to_path_buf),
        },
        None => LoadedConfig::default(),
    };
    apply_env_overrides(&mut loaded.config, |k| std::env::var(k).ok());
    if loaded.config.forms.is_empty() && loaded.config.is_demo() {
        loaded.config.forms = AppConfig::demo_forms();
    }
    validate_app_config(&loaded.config)?;
    Ok(loaded)
}
