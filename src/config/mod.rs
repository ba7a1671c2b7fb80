use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// WebSocket endpoint, e.g. `ws://example.com/ws` (plain `ws://` only)
    pub url: String,
    /// Identity sent as `user_id` on every message
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Unset or 0 means wait for the server's answer indefinitely
    #[serde(default)]
    pub response_timeout_secs: Option<u64>,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_interval() -> u64 {
    10
}

fn default_shutdown_grace() -> u64 {
    5
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            response_timeout_secs: None,
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl WatcherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeBackend {
    /// Query the operating system
    #[default]
    System,
    /// Always report the configured `working`/`meeting` values
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub backend: ProbeBackend,
    /// Login session to query for the lock hint (defaults to $XDG_SESSION_ID)
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_meeting_processes")]
    pub meeting_processes: Vec<String>,
    #[serde(default)]
    pub working: bool,
    #[serde(default)]
    pub meeting: bool,
}

fn default_meeting_processes() -> Vec<String> {
    ["zoom", "teams", "skype"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            backend: ProbeBackend::default(),
            session_id: None,
            meeting_processes: default_meeting_processes(),
            working: false,
            meeting: false,
        }
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let dir = directories::ProjectDirs::from("", "", "presenced")
        .context("Could not determine config directory")?
        .config_dir()
        .to_path_buf();
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}. Run `presenced --init` to create one.",
            path.display()
        );
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    parse(&content).with_context(|| format!("Failed to parse config from {}", path.display()))
}

/// Parse and validate a TOML config document
pub fn parse(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;

    let url = config.server.url.trim();
    if url.is_empty() {
        anyhow::bail!("server.url must not be empty");
    }
    if !url.to_ascii_lowercase().starts_with("ws://") {
        anyhow::bail!("server.url must be a ws:// URL, got {url:?}");
    }
    if config.server.user_id.trim().is_empty() {
        anyhow::bail!("server.user_id must not be empty");
    }

    Ok(config)
}

/// Write `config` to `path` with owner-only permissions
pub fn save(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

pub async fn init_wizard() -> Result<()> {
    use std::io::{self, Write};

    println!("presenced Configuration Wizard");
    println!("==============================\n");

    let config_path = default_config_path()?;
    if config_path.exists() {
        print!("Config already exists at {}. Overwrite? [y/N] ", config_path.display());
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    print!("Server WebSocket URL (e.g. ws://example.com/ws): ");
    io::stdout().flush()?;
    let mut url = String::new();
    io::stdin().read_line(&mut url)?;

    print!("User id: ");
    io::stdout().flush()?;
    let mut user_id = String::new();
    io::stdin().read_line(&mut user_id)?;

    let config = Config {
        server: ServerConfig {
            url: url.trim().to_string(),
            user_id: user_id.trim().to_string(),
        },
        watcher: WatcherConfig::default(),
        probe: ProbeConfig::default(),
    };

    save(&config, &config_path)?;

    println!("\nConfig saved to {}", config_path.display());
    println!("Run `presenced` to start the agent.");

    Ok(())
}
