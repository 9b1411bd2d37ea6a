//! DMXAPI: a reseller whose pricing endpoint lists model ratios keyed by the
//! upstream model id. The payload has no brand or context window, so both are
//! inferred from the model name here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::PricingClient;
use crate::error::{ConfigError, FetchError};
use crate::integration::Integration;
use crate::model::CanonicalModelRecord;
use crate::provider::{ProviderDescriptor, ProviderOffer, TokenPrice};

pub const DEFAULT_ENDPOINT: &str = "https://www.dmxapi.cn/api/pricing";

/// Substrings of model ids that are not text models.
const SKIP: &[&str] = &["image", "audio", "video", "dall-e", "mj_", "kling_", "flux"];

/// Keyword to brand, checked in order.
const BRANDS: &[(&str, &str)] = &[
    ("gpt", "OpenAI"),
    ("claude", "Anthropic"),
    ("gemini", "Google"),
    ("deepseek", "DeepSeek"),
    ("qwen", "Qwen"),
    ("glm", "GLM"),
    ("doubao", "Doubao"),
    ("ernie", "ERNIE"),
    ("hunyuan", "Hunyuan"),
    ("moonshot", "Moonshot"),
    ("kimi", "Moonshot"),
    ("abab", "MiniMax"),
    ("baichuan", "Baichuan"),
    ("spark", "iFLYTEK"),
];

/// Default windows by model family when the name carries no "NNk" hint.
const WINDOWS: &[(&str, u64)] = &[
    ("gpt-4", 128_000),
    ("gpt-3.5", 16_000),
    ("claude", 200_000),
    ("gemini", 128_000),
    ("deepseek", 128_000),
];

const FALLBACK_WINDOW: u64 = 4_096;

pub struct Dmx {
    descriptor: ProviderDescriptor,
    endpoint: String,
    client: PricingClient,
}

impl Dmx {
    pub fn new(descriptor: ProviderDescriptor, endpoint: String) -> Self {
        let client = PricingClient::new(descriptor.timeout);
        Self {
            descriptor,
            endpoint,
            client,
        }
    }
}

#[async_trait]
impl Integration for Dmx {
    async fn initialize(&self) -> bool {
        self.client.probe(&self.endpoint).await
    }

    async fn fetch_models(&self) -> Result<Vec<CanonicalModelRecord>, FetchError> {
        let data = self.client.get_json(&self.endpoint).await?;
        parse_pricing(&data, &self.descriptor)
    }
}

pub fn build(d: &ProviderDescriptor) -> Result<Arc<dyn Integration>, ConfigError> {
    let endpoint = d.str_setting("endpoint")?.unwrap_or(DEFAULT_ENDPOINT);
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(ConfigError::Invalid {
            key: d.key.clone(),
            field: "endpoint".into(),
            reason: format!("not an http(s) URL: {endpoint}"),
        });
    }
    Ok(Arc::new(Dmx::new(d.clone(), endpoint.to_string())))
}

/// Parse the `data.model_completion_ratio` table into canonical records.
/// Entries with an unrecognized price shape are skipped.
pub fn parse_pricing(
    data: &Value,
    descriptor: &ProviderDescriptor,
) -> Result<Vec<CanonicalModelRecord>, FetchError> {
    let table = data
        .get("data")
        .and_then(|d| d.get("model_completion_ratio"))
        .and_then(|t| t.as_object())
        .ok_or_else(|| FetchError::Malformed("missing data.model_completion_ratio".into()))?;

    let mut records = Vec::with_capacity(table.len());
    for (model, pricing) in table {
        let lower = model.to_lowercase();
        if SKIP.iter().any(|s| lower.contains(s)) {
            continue;
        }

        let (input, output) = match pricing {
            Value::Number(n) => match n.as_f64() {
                Some(v) => (scale_ratio(v), scale_ratio(v)),
                None => continue,
            },
            Value::Object(obj) => {
                let ratio = |k: &str| obj.get(k).and_then(|v| v.as_f64());
                match (ratio("PromptRatio"), ratio("CompletionRatio")) {
                    (Some(prompt), Some(completion)) => {
                        (prompt / MICROS, completion / MICROS)
                    }
                    _ => {
                        warn!(provider = %descriptor.key, model = %model, value = %pricing, "missing prompt or completion ratio");
                        continue;
                    }
                }
            }
            other => {
                warn!(provider = %descriptor.key, model = %model, value = %other, "unknown price shape");
                continue;
            }
        };

        records.push(CanonicalModelRecord {
            brand: brand_from_name(model).to_string(),
            name: model.clone(),
            data_amount: CanonicalModelRecord::size_hint(model),
            window: window_from_name(model),
            offer: ProviderOffer::from_descriptor(descriptor, TokenPrice::new(input, output, "USD")),
        });
    }

    debug!(provider = %descriptor.key, models = records.len(), "parsed pricing table");
    Ok(records)
}

/// Object prices are always quoted in millionths.
const MICROS: f64 = 1_000_000.0;

/// Bare-number prices are in millionths only when large.
fn scale_ratio(v: f64) -> f64 {
    if v >= 1000.0 {
        v / MICROS
    } else {
        v
    }
}

pub fn brand_from_name(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    // OpenAI's reasoning models are "o1", "o3-mini", "o4-mini"...
    if ["o1", "o3", "o4"].iter().any(|p| lower.starts_with(p)) {
        return "OpenAI";
    }
    BRANDS
        .iter()
        .find(|(k, _)| lower.contains(k))
        .map(|(_, b)| *b)
        .unwrap_or("Unknown")
}

pub fn window_from_name(name: &str) -> u64 {
    if let Some(window) = k_suffix(name).and_then(|k| k.checked_mul(1_000)) {
        return window;
    }
    let lower = name.to_lowercase();
    WINDOWS
        .iter()
        .find(|(family, _)| lower.contains(family))
        .map(|(_, w)| *w)
        .unwrap_or(FALLBACK_WINDOW)
}

/// First "<digits>k" run in the name, e.g. 32 for "gpt-4-32k".
fn k_suffix(name: &str) -> Option<u64> {
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if matches!(bytes.get(i), Some(b'k' | b'K')) {
                if let Ok(v) = name[start..i].parse() {
                    return Some(v);
                }
            }
        } else {
            i += 1;
        }
    }
    None
}
