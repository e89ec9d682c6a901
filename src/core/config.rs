use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::courses::Course;

const APP_DIR: &str = "ufora-cli";
const CONFIG_FILE: &str = "config.json";
const SESSION_FILE: &str = "session.json";

/// Second-factor method configured for the account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoFactorMethod {
    #[default]
    App,
    Sms,
}

impl FromStr for TwoFactorMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "app" => Ok(TwoFactorMethod::App),
            "sms" => Ok(TwoFactorMethod::Sms),
            other => Err(anyhow!("Unknown 2FA method '{}', expected 'app' or 'sms'", other)),
        }
    }
}

impl fmt::Display for TwoFactorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwoFactorMethod::App => write!(f, "app"),
            TwoFactorMethod::Sms => write!(f, "sms"),
        }
    }
}

/// Keys exposed through `get`/`set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    DefaultEmail,
    BaseDirectory,
    TwoFactorMethod,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 3] = [
        ConfigKey::DefaultEmail,
        ConfigKey::BaseDirectory,
        ConfigKey::TwoFactorMethod,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::DefaultEmail => "email",
            ConfigKey::BaseDirectory => "dir",
            ConfigKey::TwoFactorMethod => "twofa",
        }
    }
}

impl FromStr for ConfigKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.name() == s)
            .ok_or_else(|| anyhow!("Unknown configuration key '{}'", s))
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub base_directory: Option<String>,
    #[serde(default, rename = "2fa_method")]
    pub twofa_method: TwoFactorMethod,
    /// Courses shown by the last `courses` run, addressed by 1-based position
    #[serde(default)]
    pub courses: Vec<Course>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let data = fs::read(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if data.is_empty() {
            return Ok(Config::default());
        }

        // A config written by an older version should not lock the user out
        Ok(serde_json::from_slice(&data).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable config {:?}: {}", path, e);
            Config::default()
        }))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;

        fs::write(path, data)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join(APP_DIR))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Location of the persisted session blob
    pub fn session_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(SESSION_FILE))
    }

    pub fn get(&self, key: ConfigKey) -> Option<String> {
        match key {
            ConfigKey::DefaultEmail => self.email.clone(),
            ConfigKey::BaseDirectory => self.base_directory.clone(),
            ConfigKey::TwoFactorMethod => Some(self.twofa_method.to_string()),
        }
    }

    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            ConfigKey::DefaultEmail => {
                if !value.contains('@') {
                    return Err(anyhow!("'{}' does not look like an email address", value));
                }
                self.email = Some(value.to_string());
            }
            ConfigKey::BaseDirectory => {
                if value.is_empty() {
                    return Err(anyhow!("Base directory cannot be empty"));
                }
                self.base_directory = Some(value.to_string());
            }
            ConfigKey::TwoFactorMethod => {
                self.twofa_method = value.parse()?;
            }
        }
        Ok(())
    }

    /// Configured base directory, falling back to `~/uni`
    pub fn base_directory(&self) -> PathBuf {
        match &self.base_directory {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("uni"),
        }
    }

    /// Course by the 1-based id printed by `courses`
    pub fn course_by_index(&self, index: usize) -> Option<&Course> {
        index.checked_sub(1).and_then(|i| self.courses.get(i))
    }
}
