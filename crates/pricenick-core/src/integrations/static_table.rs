//! Integrations backed by a built-in price table, narrowed to the models
//! listed in `extra.supported_models`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{ConfigError, FetchError};
use crate::integration::Integration;
use crate::model::CanonicalModelRecord;
use crate::provider::{ProviderDescriptor, ProviderOffer, TokenPrice};

/// A row of a built-in price table. Prices per million tokens.
#[derive(Debug, Clone, Copy)]
pub struct TableRow {
    pub name: &'static str,
    pub data_amount: Option<f64>,
    pub window: u64,
    pub input: f64,
    pub output: f64,
}

pub const DEEPSEEK: &[TableRow] = &[
    TableRow { name: "DeepSeek-V3.1", data_amount: Some(671.0), window: 160_000, input: 4.0, output: 12.0 },
    TableRow { name: "DeepSeek-V2.5", data_amount: Some(500.0), window: 128_000, input: 3.0, output: 10.0 },
];

pub const ANTHROPIC: &[TableRow] = &[
    TableRow { name: "Claude-4-Sonnet",   data_amount: None, window: 200_000, input: 3.0, output: 15.0 },
    TableRow { name: "Claude-3.5-Sonnet", data_amount: None, window: 200_000, input: 3.0, output: 15.0 },
];

/// Typed view of the `extra` settings this integration reads.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSettings {
    pub brand: String,
    pub currency: String,
    pub supported_models: Vec<String>,
}

impl TableSettings {
    pub fn from_descriptor(d: &ProviderDescriptor, default_currency: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            brand: d.str_setting("brand")?.unwrap_or(&d.display_name).to_string(),
            currency: d.str_setting("currency")?.unwrap_or(default_currency).to_string(),
            supported_models: d.list_setting("supported_models")?,
        })
    }
}

pub struct StaticTable {
    descriptor: ProviderDescriptor,
    settings: TableSettings,
    rows: &'static [TableRow],
}

impl StaticTable {
    pub fn new(descriptor: ProviderDescriptor, settings: TableSettings, rows: &'static [TableRow]) -> Self {
        Self {
            descriptor,
            settings,
            rows,
        }
    }

    fn record(&self, row: &TableRow) -> CanonicalModelRecord {
        CanonicalModelRecord {
            brand: self.settings.brand.clone(),
            name: row.name.to_string(),
            data_amount: row.data_amount,
            window: row.window,
            offer: ProviderOffer::from_descriptor(
                &self.descriptor,
                TokenPrice::new(row.input, row.output, &self.settings.currency),
            ),
        }
    }
}

#[async_trait]
impl Integration for StaticTable {
    async fn initialize(&self) -> bool {
        if self.settings.supported_models.is_empty() {
            warn!(provider = %self.descriptor.key, "supported_models is empty");
            return false;
        }
        for name in &self.settings.supported_models {
            if !self.rows.iter().any(|r| r.name == name) {
                warn!(provider = %self.descriptor.key, model = %name, "no price row for supported model");
            }
        }
        true
    }

    async fn fetch_models(&self) -> Result<Vec<CanonicalModelRecord>, FetchError> {
        Ok(self
            .rows
            .iter()
            .filter(|r| self.settings.supported_models.iter().any(|s| s == r.name))
            .map(|r| self.record(r))
            .collect())
    }
}

pub fn build_deepseek(d: &ProviderDescriptor) -> Result<Arc<dyn Integration>, ConfigError> {
    let settings = TableSettings::from_descriptor(d, "CNY")?;
    Ok(Arc::new(StaticTable::new(d.clone(), settings, DEEPSEEK)))
}

pub fn build_anthropic(d: &ProviderDescriptor) -> Result<Arc<dyn Integration>, ConfigError> {
    let settings = TableSettings::from_descriptor(d, "USD")?;
    Ok(Arc::new(StaticTable::new(d.clone(), settings, ANTHROPIC)))
}
