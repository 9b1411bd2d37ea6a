//! The contract every provider integration implements, and the table of
//! built-in integrations that discovery walks.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ConfigError, FetchError};
use crate::model::CanonicalModelRecord;
use crate::provider::ProviderDescriptor;

/// A leaf pricing source.
///
/// Implementations own their scraping and parsing. They return typed errors
/// and never panic across this boundary on bad upstream data.
#[async_trait]
pub trait Integration: Send + Sync {
    /// Connectivity and config sanity check. Runs once per process, or on reload.
    async fn initialize(&self) -> bool;

    /// Fetch the current catalog as canonical records.
    async fn fetch_models(&self) -> Result<Vec<CanonicalModelRecord>, FetchError>;
}

pub type BuildFn = fn(&ProviderDescriptor) -> Result<Arc<dyn Integration>, ConfigError>;

/// Registration table entry: a key and a constructor taking the descriptor
/// built from that key's configuration.
#[derive(Clone, Copy)]
pub struct IntegrationDef {
    pub key: &'static str,
    pub build: BuildFn,
}

impl std::fmt::Debug for IntegrationDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationDef").field("key", &self.key).finish()
    }
}

/// Built-in integrations, in discovery order.
pub fn builtin() -> Vec<IntegrationDef> {
    #[allow(unused_mut)]
    let mut defs = vec![
        IntegrationDef {
            key: "deepseek",
            build: crate::integrations::static_table::build_deepseek,
        },
        IntegrationDef {
            key: "anthropic",
            build: crate::integrations::static_table::build_anthropic,
        },
    ];
    #[cfg(feature = "network")]
    defs.push(IntegrationDef {
        key: "dmx",
        build: crate::integrations::dmx::build,
    });
    defs
}
