use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

pub const DEV_SESSION_SECRET: &str = "dev-session-secret";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub session_secret: String,
    pub session_ttl_seconds: i64,
    pub workstudio_base_url: Option<String>,
    pub workstudio_username: String,
    pub workstudio_password: String,
    pub workstudio_timeout_seconds: u64,
    /// Per-user WorkStudio logins keyed by dashboard user id. File-only.
    pub workstudio_users: BTreeMap<i64, WorkStudioLogin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkStudioLogin {
    pub username: String,
    pub password: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/dashboard.db".into(),
            session_secret: DEV_SESSION_SECRET.into(),
            session_ttl_seconds: 8 * 3600,
            workstudio_base_url: None,
            workstudio_username: "service".into(),
            workstudio_password: String::new(),
            workstudio_timeout_seconds: 30,
            workstudio_users: BTreeMap::new(),
        }
    }
}

/// Keys accepted in `server.toml`. Everything is optional.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    database_url: Option<String>,
    session_secret: Option<String>,
    session_ttl_seconds: Option<i64>,
    workstudio_base_url: Option<String>,
    workstudio_username: Option<String>,
    workstudio_password: Option<String>,
    workstudio_timeout_seconds: Option<u64>,
    #[serde(default)]
    workstudio_users: HashMap<String, WorkStudioLogin>,
}

pub fn load_settings() -> Settings {
    let path = std::env::var("APP__CONFIG_FILE").unwrap_or_else(|_| "server.toml".into());
    let raw = fs::read_to_string(&path).ok();
    load_settings_from(raw.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the config file, then the environment. `APP__*` variables
/// win over their legacy names.
pub fn load_settings_from(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        match toml::from_str::<FileSettings>(raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(error) => tracing::warn!(%error, "ignoring unreadable server.toml"),
        }
    }

    let env_var = |names: &[&str]| names.iter().rev().find_map(|name| env(name));

    if let Some(v) = env_var(&["SERVER_BIND", "APP__BIND_ADDR"]) {
        settings.server_bind = v;
    }
    if let Some(v) = env_var(&["DATABASE_URL", "APP__DATABASE_URL"]) {
        settings.database_url = v;
    }
    if let Some(v) = env_var(&["APP__SESSION_SECRET"]) {
        settings.session_secret = v;
    }
    if let Some(v) = env_var(&["APP__SESSION_TTL_SECONDS"]).and_then(|v| v.parse().ok()) {
        settings.session_ttl_seconds = v;
    }
    if let Some(v) = env_var(&["WORKSTUDIO_BASE_URL", "APP__WORKSTUDIO_BASE_URL"]) {
        settings.workstudio_base_url = Some(v).filter(|url| !url.trim().is_empty());
    }
    if let Some(v) = env_var(&["WORKSTUDIO_USERNAME", "APP__WORKSTUDIO_USERNAME"]) {
        settings.workstudio_username = v;
    }
    if let Some(v) = env_var(&["WORKSTUDIO_PASSWORD", "APP__WORKSTUDIO_PASSWORD"]) {
        settings.workstudio_password = v;
    }
    if let Some(v) = env_var(&["APP__WORKSTUDIO_TIMEOUT_SECONDS"]).and_then(|v| v.parse().ok()) {
        settings.workstudio_timeout_seconds = v;
    }

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.bind_addr {
        settings.server_bind = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.session_secret {
        settings.session_secret = v;
    }
    if let Some(v) = file_cfg.session_ttl_seconds {
        settings.session_ttl_seconds = v;
    }
    if let Some(v) = file_cfg.workstudio_base_url {
        settings.workstudio_base_url = Some(v).filter(|url| !url.trim().is_empty());
    }
    if let Some(v) = file_cfg.workstudio_username {
        settings.workstudio_username = v;
    }
    if let Some(v) = file_cfg.workstudio_password {
        settings.workstudio_password = v;
    }
    if let Some(v) = file_cfg.workstudio_timeout_seconds {
        settings.workstudio_timeout_seconds = v;
    }
    for (key, login) in file_cfg.workstudio_users {
        match key.trim().parse::<i64>() {
            Ok(user_id) => {
                settings.workstudio_users.insert(user_id, login);
            }
            Err(_) => {
                tracing::warn!(%key, "ignoring workstudio_users entry with a non-numeric id")
            }
        }
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(parent) = sqlite_path(database_url)
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
    else {
        return Ok(());
    };

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
