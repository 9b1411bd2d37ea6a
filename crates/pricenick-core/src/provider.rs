use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Opaque per-integration setting from the `extra` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
}

/// Identity and configuration of one provider integration.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProviderDescriptor {
    pub key: String,
    pub display_name: String,
    pub website: String,
    pub enabled: bool,
    #[serde(skip)]
    pub timeout: Duration,
    pub config: BTreeMap<String, ConfigValue>,
}

impl ProviderDescriptor {
    pub fn new(key: &str, display_name: &str, website: &str) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            website: website.to_string(),
            enabled: true,
            timeout: crate::config::DEFAULT_TIMEOUT,
            config: BTreeMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_setting(mut self, name: &str, value: ConfigValue) -> Self {
        self.config.insert(name.to_string(), value);
        self
    }

    /// String setting; a non-string value is a configuration error.
    pub fn str_setting(&self, name: &str) -> Result<Option<&str>, ConfigError> {
        match self.config.get(name) {
            None => Ok(None),
            Some(ConfigValue::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.invalid(name, format!("expected a string, got {other:?}"))),
        }
    }

    /// List-of-strings setting. Missing means empty.
    pub fn list_setting(&self, name: &str) -> Result<Vec<String>, ConfigError> {
        match self.config.get(name) {
            None => Ok(Vec::new()),
            Some(ConfigValue::List(items)) => Ok(items.clone()),
            Some(other) => Err(self.invalid(name, format!("expected a list, got {other:?}"))),
        }
    }

    fn invalid(&self, field: &str, reason: String) -> ConfigError {
        ConfigError::Invalid {
            key: self.key.clone(),
            field: field.to_string(),
            reason,
        }
    }
}

/// Price for one model at one provider, per unit of tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenPrice {
    pub input: f64,
    pub output: f64,
    pub unit: String,
}

impl TokenPrice {
    pub fn new(input: f64, output: f64, unit: &str) -> Self {
        Self {
            input,
            output,
            unit: unit.to_string(),
        }
    }
}

/// One provider's terms for one model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderOffer {
    #[serde(rename = "name")]
    pub provider: String,
    pub display_name: String,
    #[serde(rename = "api_website")]
    pub website: String,
    pub tokens: TokenPrice,
}

impl ProviderOffer {
    pub fn from_descriptor(descriptor: &ProviderDescriptor, tokens: TokenPrice) -> Self {
        Self {
            provider: descriptor.key.clone(),
            display_name: descriptor.display_name.clone(),
            website: descriptor.website.clone(),
            tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// Not yet initialized this process.
    Uninitialized,
    Available,
    /// `initialize()` failed; excluded from fetches until reloaded.
    Unavailable(String),
    /// Last fetch failed; still fetched next cycle.
    Failed(String),
    Disabled,
}

impl HealthStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available | Self::Failed(_))
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "○ pending"),
            Self::Available => write!(f, "● available"),
            Self::Unavailable(_) => write!(f, "✗ unavailable"),
            Self::Failed(_) => write!(f, "◐ failed"),
            Self::Disabled => write!(f, "- disabled"),
        }
    }
}

/// Health line for the diagnostic path.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub key: String,
    pub display_name: String,
    #[serde(flatten)]
    pub status: HealthStatus,
}
