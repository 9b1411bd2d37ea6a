use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::provider::{ConfigValue, ProviderDescriptor};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[cfg(feature = "network")]
const CONFIG_FILE: &str = "integrations.toml";

/// One `[integration.<key>]` table from integrations.toml.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntegrationConfig {
    pub display_name: Option<String>,
    pub website: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub timeout_secs: Option<u64>,
    /// Provider-specific settings, read by the integration itself.
    #[serde(default)]
    pub extra: BTreeMap<String, ConfigValue>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IntegrationsFile {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub integration: BTreeMap<String, IntegrationConfig>,
}

impl IntegrationsFile {
    /// Build a descriptor for `key`, checking the required fields.
    pub fn descriptor(&self, key: &str) -> Result<ProviderDescriptor, ConfigError> {
        let cfg = self
            .integration
            .get(key)
            .ok_or_else(|| ConfigError::NotConfigured(key.to_string()))?;

        let display_name = required(key, "display_name", cfg.display_name.as_deref())?;
        let website = required(key, "website", cfg.website.as_deref())?;
        if !(website.starts_with("https://") || website.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                key: key.to_string(),
                field: "website".into(),
                reason: format!("not an http(s) URL: {website}"),
            });
        }

        let secs = cfg.timeout_secs.unwrap_or(self.defaults.timeout_secs);
        if secs == 0 {
            return Err(ConfigError::Invalid {
                key: key.to_string(),
                field: "timeout_secs".into(),
                reason: "must be positive".into(),
            });
        }

        Ok(ProviderDescriptor {
            key: key.to_string(),
            display_name: display_name.to_string(),
            website: website.to_string(),
            enabled: cfg.enabled,
            timeout: Duration::from_secs(secs),
            config: cfg.extra.clone(),
        })
    }
}

fn required<'a>(key: &str, field: &str, value: Option<&'a str>) -> Result<&'a str, ConfigError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingField {
            key: key.to_string(),
            field: field.to_string(),
        }),
    }
}

/// Parse integrations from a TOML string.
pub fn parse_integrations(toml_str: &str) -> Result<IntegrationsFile, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Load integrations from a file.
pub fn load_integrations(path: &std::path::Path) -> crate::error::Result<IntegrationsFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| crate::error::PriceError::Io(format!("{}: {e}", path.display())))?;
    Ok(parse_integrations(&content)?)
}

/// Load the bundled integrations.toml from the data/ directory.
pub fn load_bundled_integrations() -> Result<IntegrationsFile, ConfigError> {
    let toml_str = include_str!("../../../data/integrations.toml");
    parse_integrations(toml_str)
}

/// Directory holding the user's integrations.toml, if the platform has one.
#[cfg(feature = "network")]
pub fn config_dir() -> Option<std::path::PathBuf> {
    Some(dirs::config_dir()?.join("pricenick"))
}

/// Path of the user's integrations.toml (may not exist).
#[cfg(feature = "network")]
pub fn user_config_path() -> Option<std::path::PathBuf> {
    Some(config_dir()?.join(CONFIG_FILE))
}

/// Load integrations: user file if present and valid, otherwise bundled.
#[cfg(feature = "network")]
pub fn load_integrations_user() -> Result<IntegrationsFile, ConfigError> {
    if let Some(path) = user_config_path() {
        if let Ok(content) = std::fs::read_to_string(&path) {
            match parse_integrations(&content) {
                Ok(parsed) => return Ok(parsed),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable user config");
                }
            }
        }
    }
    load_bundled_integrations()
}
