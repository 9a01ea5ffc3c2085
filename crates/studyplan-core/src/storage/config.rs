//! TOML-based application configuration.
//!
//! Stores the OAuth client credentials for the remote calendar provider and
//! the user's IANA timezone. Configuration lives at
//! `~/.config/studyplan/config.toml`; the Google credentials can also be
//! supplied via `STUDYPLAN_GOOGLE_CLIENT_ID` / `STUDYPLAN_GOOGLE_CLIENT_SECRET`.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, CoreError};
use crate::integrations::oauth::OAuthConfig;

use super::data_dir;

/// Google OAuth client credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GoogleOAuthSettings {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/studyplan/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub google: GoogleOAuthSettings,
    /// IANA timezone name used to localize timed events.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google: GoogleOAuthSettings::default(),
            timezone: default_timezone(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, CoreError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load() -> Result<Self, CoreError> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let config = toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Ok(config)
    }

    /// Persist configuration to disk.
    pub fn save(&self) -> Result<(), CoreError> {
        let path = Self::path()?;
        let text =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, text).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// The user's timezone, falling back to UTC on an unknown name.
    pub fn timezone(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }

    /// OAuth config for the Google token endpoint, honoring env overrides.
    pub fn google_oauth(&self) -> OAuthConfig {
        let client_id = std::env::var("STUDYPLAN_GOOGLE_CLIENT_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.google.client_id.clone());
        let client_secret = std::env::var("STUDYPLAN_GOOGLE_CLIENT_SECRET")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.google.client_secret.clone());

        OAuthConfig::google(client_id, client_secret)
    }
}
