use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("every provider failed this cycle ({failed} failed), no catalog available")]
    AggregateEmpty { failed: usize },

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, PriceError>;

/// Malformed or missing integration configuration. The integration is
/// excluded, the rest of discovery continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("bad integrations.toml: {0}")]
    Parse(String),

    #[error("{key}: missing required field `{field}`")]
    MissingField { key: String, field: String },

    #[error("{key}: invalid `{field}`: {reason}")]
    Invalid {
        key: String,
        field: String,
        reason: String,
    },

    #[error("{0}: no configuration entry")]
    NotConfigured(String),
}

/// Why one provider produced no records this cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("unreachable: {0}")]
    Connectivity(String),

    #[error("HTTP {code}")]
    Status { code: u16 },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("integration panicked: {0}")]
    Panicked(String),
}

#[cfg(feature = "network")]
impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not expose the configured limit
            Self::Connectivity(format!("request timed out: {e}"))
        } else if let Some(status) = e.status() {
            Self::Status {
                code: status.as_u16(),
            }
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Connectivity(e.to_string())
        }
    }
}

/// A single record that failed validation and was dropped from the cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{provider}: dropping record `{name}`: {reason}")]
pub struct MalformedRecord {
    pub provider: String,
    pub name: String,
    pub reason: String,
}
