use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MalformedRecord;
use crate::pricing;
use crate::provider::ProviderOffer;

/// One model as one provider reports it, already normalized by the integration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalModelRecord {
    pub brand: String,
    pub name: String,
    /// Billions of parameters, when the provider says.
    pub data_amount: Option<f64>,
    pub window: u64,
    pub offer: ProviderOffer,
}

impl CanonicalModelRecord {
    /// Reject records that would poison grouping or price comparison.
    pub fn validate(&self) -> Result<(), MalformedRecord> {
        let reason = if self.name.trim().is_empty() {
            Some("empty model name".to_string())
        } else if self.brand.trim().is_empty() {
            Some("empty brand".to_string())
        } else if self.data_amount.is_some_and(|d| !d.is_finite() || d < 0.0) {
            Some("data amount is not a non-negative number".to_string())
        } else {
            pricing::price_defect(&self.offer.tokens)
        };
        match reason {
            None => Ok(()),
            Some(reason) => Err(MalformedRecord {
                provider: self.offer.provider.clone(),
                name: self.name.clone(),
                reason,
            }),
        }
    }

    /// Extract a likely size in billions from a model name, e.g. "70B", "1.5B".
    /// Uses boundary matching so "7B" does not match inside "17B".
    pub fn size_hint(name: &str) -> Option<f64> {
        let upper = name.to_uppercase();
        let bytes = upper.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i].is_ascii_digit() && (i == 0 || !is_size_char(bytes[i - 1])) {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let unit = bytes.get(i).copied();
                let after_ok = bytes
                    .get(i + 1)
                    .map_or(true, |c| !c.is_ascii_alphanumeric());
                if after_ok {
                    let scale = match unit {
                        Some(b'B') => Some(1.0),
                        Some(b'T') => Some(1000.0),
                        _ => None,
                    };
                    if let (Some(scale), Ok(v)) = (scale, upper[start..i].parse::<f64>()) {
                        return Some(v * scale);
                    }
                }
            } else {
                i += 1;
            }
        }
        None
    }
}

fn is_size_char(c: u8) -> bool {
    c.is_ascii_digit() || c == b'.'
}

/// A model after cross-provider reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergedModel {
    pub brand: String,
    pub name: String,
    pub data_amount: Option<f64>,
    pub window: u64,
    /// Discovery order, not price order.
    pub providers: Vec<ProviderOffer>,
    pub recommended_provider: String,
}

impl MergedModel {
    pub fn recommended(&self) -> Option<&ProviderOffer> {
        pricing::recommend(&self.providers).map(|i| &self.providers[i])
    }

    /// Offers in recommendation order; the first one is the recommended offer.
    pub fn ranked_offers(&self) -> Vec<&ProviderOffer> {
        pricing::ranked(&self.providers)
    }

    pub fn offered_by(&self, provider: &str) -> bool {
        self.providers.iter().any(|o| o.provider == provider)
    }

    /// Format a window size as "128K", "1M", "4096".
    pub fn fmt_window(n: u64) -> String {
        if n >= 1_000_000 && n % 1_000_000 == 0 {
            format!("{}M", n / 1_000_000)
        } else if n >= 1_000 && n % 1_000 == 0 {
            format!("{}K", n / 1_000)
        } else if n >= 1_024 && n % 1_024 == 0 {
            format!("{}K", n / 1_024)
        } else {
            n.to_string()
        }
    }

    /// Format a size in billions as "671B", "70.6B", "1.5B".
    pub fn fmt_data_amount(b: f64) -> String {
        if b >= 100.0 || b.fract() == 0.0 {
            format!("{b:.0}B")
        } else {
            format!("{b:.1}B")
        }
    }
}

/// One published, immutable reconciliation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub models: Vec<MergedModel>,
    pub fetched_at: DateTime<Utc>,
    pub cycle: u64,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Sorted, de-duplicated brand names.
    pub fn brands(&self) -> Vec<&str> {
        let mut brands: Vec<&str> = self.models.iter().map(|m| m.brand.as_str()).collect();
        brands.sort_unstable();
        brands.dedup();
        brands
    }

    pub fn by_brand(&self, brand: &str) -> Vec<&MergedModel> {
        let brand = brand.trim();
        self.models
            .iter()
            .filter(|m| m.brand.trim().eq_ignore_ascii_case(brand))
            .collect()
    }

    pub fn by_provider(&self, provider: &str) -> Vec<&MergedModel> {
        self.models.iter().filter(|m| m.offered_by(provider)).collect()
    }

    /// Models whose name matches case-insensitively, across brands.
    pub fn find(&self, name: &str) -> Vec<&MergedModel> {
        let name = name.trim().to_lowercase();
        self.models
            .iter()
            .filter(|m| m.name.trim().to_lowercase() == name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TokenPrice;

    fn record(name: &str, input: f64) -> CanonicalModelRecord {
        CanonicalModelRecord {
            brand: "DeepSeek".into(),
            name: name.into(),
            data_amount: None,
            window: 64_000,
            offer: ProviderOffer {
                provider: "p".into(),
                display_name: "P".into(),
                website: "https://p.example".into(),
                tokens: TokenPrice::new(input, 1.0, "USD"),
            },
        }
    }

    #[test]
    fn size_hint_basic() {
        assert_eq!(CanonicalModelRecord::size_hint("Llama-3.1-70B-Instruct"), Some(70.0));
        assert_eq!(CanonicalModelRecord::size_hint("Qwen2.5-1.5B"), Some(1.5));
        assert_eq!(CanonicalModelRecord::size_hint("kimi-k2-1T"), Some(1000.0));
    }

    #[test]
    fn size_hint_no_false_substring() {
        assert_eq!(CanonicalModelRecord::size_hint("Llama-4-Scout-17B-16E"), Some(17.0));
        assert_eq!(CanonicalModelRecord::size_hint("qwen3-235b-a22b"), Some(235.0));
        assert_eq!(CanonicalModelRecord::size_hint("gpt-4o"), None);
        assert_eq!(CanonicalModelRecord::size_hint("claude-3-5-sonnet"), None);
        assert_eq!(CanonicalModelRecord::size_hint("model-128k"), None);
    }

    #[test]
    fn validate_rejects_bad_records() {
        assert!(record("deepseek-chat", 0.27).validate().is_ok());
        assert!(record("  ", 0.27).validate().is_err());

        let err = record("deepseek-chat", -1.0).validate().unwrap_err();
        assert_eq!(err.provider, "p");
        assert!(err.reason.contains("negative"));

        let mut r = record("deepseek-chat", 0.27);
        r.offer.tokens.output = f64::NAN;
        assert!(r.validate().is_err());

        let mut r = record("deepseek-chat", 0.27);
        r.data_amount = Some(-3.0);
        assert!(r.validate().is_err());
    }

    #[test]
    fn window_formatting() {
        assert_eq!(MergedModel::fmt_window(128_000), "128K");
        assert_eq!(MergedModel::fmt_window(1_000_000), "1M");
        assert_eq!(MergedModel::fmt_window(131_072), "128K");
        assert_eq!(MergedModel::fmt_window(4_096), "4K");
        assert_eq!(MergedModel::fmt_window(500), "500");
    }

    #[test]
    fn data_amount_formatting() {
        assert_eq!(MergedModel::fmt_data_amount(671.0), "671B");
        assert_eq!(MergedModel::fmt_data_amount(7.0), "7B");
        assert_eq!(MergedModel::fmt_data_amount(1.5), "1.5B");
    }
}
