#[cfg(feature = "network")]
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod integration;
pub mod integrations;
pub mod model;
pub mod pricing;
pub mod provider;
pub mod reconcile;
pub mod registry;

pub use cache::{CacheState, CatalogCache};
pub use error::{ConfigError, FetchError, PriceError};
pub use fetch::{fetch_all, FetchReport};
pub use integration::{Integration, IntegrationDef};
pub use model::{CanonicalModelRecord, Catalog, MergedModel};
pub use provider::{HealthStatus, ProviderDescriptor, ProviderHealth, ProviderOffer, TokenPrice};
pub use reconcile::reconcile;
pub use registry::{ActiveIntegration, IntegrationRegistry};
