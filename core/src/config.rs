use crate::errors::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Default blob key holding the flash messages
pub const DEFAULT_FLASH_KEY: &str = "_flashMessages";

/// Default blob key holding the session data
pub const DEFAULT_DATA_KEY: &str = "_sessionData";

/// `SameSite` attribute of the session cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

/// Attributes of the session cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieOptions {
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

/// Configuration used when a session is started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Cookie and session name
    pub name: String,
    /// Lifetime of the session in seconds
    pub lifetime: u64,
    /// Reissue the cookie expiry on every request
    pub auto_refresh: bool,
    pub flash_key: String,
    pub data_key: String,
    pub cookie: CookieOptions,
    /// Store-specific tuning knobs, passed through to the session store
    pub ini_settings: Map<String, Value>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            name: "sid".to_string(),
            lifetime: 3600,
            auto_refresh: true,
            flash_key: DEFAULT_FLASH_KEY.to_string(),
            data_key: DEFAULT_DATA_KEY.to_string(),
            cookie: CookieOptions::default(),
            ini_settings: Map::new(),
        }
    }
}

/// Partial options as they appear in a configuration file or on the command line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOverrides {
    pub name: Option<String>,
    pub lifetime: Option<u64>,
    pub auto_refresh: Option<bool>,
    pub flash_key: Option<String>,
    pub data_key: Option<String>,
    pub cookie: CookieOverrides,
    pub ini_settings: Option<Map<String, Value>>,
}

/// Partial cookie attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieOverrides {
    pub path: Option<String>,
    pub domain: Option<String>,
    pub secure: Option<bool>,
    pub http_only: Option<bool>,
    pub same_site: Option<SameSite>,
}

impl SessionOptions {
    /// Loads options from a TOML file if it exists, otherwise returns the defaults
    pub fn load_from_file(path: &Path) -> SessionResult<Self> {
        if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                SessionError::Config(format!("Failed to read config file: {}", e))
            })?;

            let overrides: SessionOverrides = toml::from_str(&content).map_err(|e| {
                SessionError::Config(format!("Failed to parse config file: {}", e))
            })?;

            Ok(Self::default().merge(&overrides))
        } else {
            Ok(Self::default())
        }
    }

    /// Saves options to a TOML file
    pub fn save_to_file(&self, path: &Path) -> SessionResult<()> {
        let content = toml::to_string(self).map_err(|e| {
            SessionError::Config(format!("Failed to serialize config: {}", e))
        })?;

        // Ensure the directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SessionError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        fs::write(path, content).map_err(|e| {
            SessionError::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Merges overrides into these options, preferring values from the overrides if present.
    /// Cookie attributes merge field by field, ini settings key by key.
    pub fn merge(&self, other: &SessionOverrides) -> Self {
        let mut ini_settings = self.ini_settings.clone();
        if let Some(extra) = &other.ini_settings {
            crate::blob::deep_merge(&mut ini_settings, extra.clone());
        }

        Self {
            name: other.name.clone().unwrap_or_else(|| self.name.clone()),
            lifetime: other.lifetime.unwrap_or(self.lifetime),
            auto_refresh: other.auto_refresh.unwrap_or(self.auto_refresh),
            cookie: CookieOptions {
                path: other
                    .cookie
                    .path
                    .clone()
                    .unwrap_or_else(|| self.cookie.path.clone()),
                domain: other.cookie.domain.clone().or_else(|| self.cookie.domain.clone()),
                secure: other.cookie.secure.unwrap_or(self.cookie.secure),
                http_only: other.cookie.http_only.unwrap_or(self.cookie.http_only),
                same_site: other.cookie.same_site.unwrap_or(self.cookie.same_site),
            },
            ini_settings,
            flash_key: other
                .flash_key
                .clone()
                .unwrap_or_else(|| self.flash_key.clone()),
            data_key: other
                .data_key
                .clone()
                .unwrap_or_else(|| self.data_key.clone()),
        }
    }
}

/// Helper function to get default config directory
pub fn get_default_config_dir(app_name: &str) -> SessionResult<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| {
        SessionError::Config("Could not determine home directory".to_string())
    })?;

    Ok(home_dir.join(".config").join(app_name))
}

/// Helper function to get default config file path
pub fn get_default_config_file(app_name: &str) -> SessionResult<PathBuf> {
    let config_dir = get_default_config_dir(app_name)?;
    Ok(config_dir.join("config.toml"))
}
