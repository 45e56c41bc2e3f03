use crate::auth::hasher::{DEFAULT_COST, MAX_COST, MIN_COST};
use crate::auth::session::DEFAULT_SESSION_TTL_SECS;
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory under the home dir holding config and the credential snapshot.
pub const APP_DIR_NAME: &str = ".profile-gate";

/// File name of the credential snapshot.
pub const STORE_FILE_NAME: &str = "profiles_secret_config.json";

/// Port the browser extension expects.
pub const DEFAULT_PORT: u16 = 27843;

/// Top-level configuration (`~/.profile-gate/config.toml`).
///
/// Every field has a default, so a missing file or a partial one is fine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Where this config was read from. Not serialized.
    #[serde(skip)]
    pub config_path: PathBuf,
    pub gateway: GatewayConfig,
    pub store: StoreConfig,
    pub session: SessionConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// How many consecutive ports to try when `port` is taken.
    pub port_search_attempts: u16,
    /// Allow binding to a non-loopback address. The API has no transport
    /// security, so this should stay off.
    pub allow_public_bind: bool,
    /// CORS origins. A trailing `*` matches any suffix
    /// (`chrome-extension://*`).
    pub allowed_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            port_search_attempts: 10,
            allow_public_bind: false,
            allowed_origins: vec![
                "chrome-extension://*".into(),
                "http://127.0.0.1:8765".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Credential snapshot location. Defaults to
    /// `~/.profile-gate/profiles_secret_config.json`.
    pub path: Option<PathBuf>,
    /// bcrypt work factor for new hashes (4–31).
    pub bcrypt_cost: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            bcrypt_cost: DEFAULT_COST,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    /// Interval of the expired-token sweep. 0 keeps expiry purely lazy.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            sweep_interval_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Browser binary. Auto-detected when unset.
    pub executable: Option<PathBuf>,
    /// Open a guest window when no password matches.
    pub launch_on_guest: bool,
    /// Chrome user data dir scanned by `/profiles`. Defaults to
    /// `~/.config/google-chrome`.
    pub user_data_dir: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            launch_on_guest: true,
            user_data_dir: None,
        }
    }
}

/// `~/.profile-gate`, or the current directory when there is no home dir.
pub fn app_dir() -> PathBuf {
    UserDirs::new()
        .map(|u| u.home_dir().join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Config {
    /// Load `path` (or the default location). A missing file yields defaults.
    /// Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| app_dir().join("config.toml"));

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config {}", config_path.display()))?;
            toml::from_str::<Config>(&contents)
                .with_context(|| format!("Failed to parse config {}", config_path.display()))?
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "No config file found, using defaults"
            );
            Config::default()
        };
        config.config_path = config_path;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `PROFILE_GATE_PORT` and `PROFILE_GATE_STORE` take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PROFILE_GATE_PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.gateway.port = p,
                Err(_) => tracing::warn!("Ignoring invalid PROFILE_GATE_PORT={port}"),
            }
        }
        if let Ok(store) = std::env::var("PROFILE_GATE_STORE") {
            let store = store.trim();
            if !store.is_empty() {
                self.store.path = Some(PathBuf::from(store));
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_COST..=MAX_COST).contains(&self.store.bcrypt_cost) {
            anyhow::bail!(
                "[store] bcrypt_cost must be between {MIN_COST} and {MAX_COST}, got {}",
                self.store.bcrypt_cost
            );
        }
        if self.session.ttl_secs == 0 {
            anyhow::bail!("[session] ttl_secs must be greater than 0");
        }
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("[gateway] host cannot be empty");
        }
        Ok(())
    }

    /// Resolved credential snapshot path.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| app_dir().join(STORE_FILE_NAME))
    }

    /// Resolved Chrome user data dir, if one can be determined.
    pub fn chrome_user_data_dir(&self) -> Option<PathBuf> {
        self.browser
            .user_data_dir
            .clone()
            .or_else(crate::browser::profiles::default_user_data_dir)
    }
}
