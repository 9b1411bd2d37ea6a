//! Fetch orchestrator: fan out to every active integration, bound each by its
//! own timeout, and collect per-provider results in provider order.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::FetchError;
use crate::integration::Integration;
use crate::model::CanonicalModelRecord;
use crate::registry::ActiveIntegration;

pub type FetchResult = Result<Vec<CanonicalModelRecord>, FetchError>;

/// Per-provider outcomes of one fetch, in the order providers were given.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    results: Vec<(String, FetchResult)>,
}

impl FetchReport {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FetchResult)> {
        self.results.iter().map(|(k, r)| (k.as_str(), r))
    }

    pub fn get(&self, key: &str) -> Option<&FetchResult> {
        self.results.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// No provider returned data, including the case of no providers at all.
    pub fn is_total_failure(&self) -> bool {
        self.succeeded() == 0
    }

    pub fn into_results(self) -> Vec<(String, FetchResult)> {
        self.results
    }
}

impl FromIterator<(String, FetchResult)> for FetchReport {
    fn from_iter<I: IntoIterator<Item = (String, FetchResult)>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

/// Fetch from every provider concurrently. Never fails as a whole.
pub async fn fetch_all(providers: &[ActiveIntegration]) -> FetchReport {
    // Spawn first so every fetch is in flight before the join point.
    let handles: Vec<_> = providers
        .iter()
        .map(|p| {
            let integration = Arc::clone(&p.integration);
            let timeout = p.descriptor.timeout;
            tokio::spawn(fetch_one(integration, timeout))
        })
        .collect();

    let mut results = Vec::with_capacity(providers.len());
    for (p, handle) in providers.iter().zip(handles) {
        let key = p.descriptor.key.clone();
        let result = match handle.await {
            Ok(r) => r,
            Err(e) => Err(FetchError::Panicked(e.to_string())),
        };
        match &result {
            Ok(records) => {
                tracing::debug!(provider = %key, records = records.len(), "fetched");
            }
            Err(e) => warn!(provider = %key, error = %e, "fetch failed"),
        }
        results.push((key, result));
    }

    FetchReport { results }
}

async fn fetch_one(integration: Arc<dyn Integration>, timeout: Duration) -> FetchResult {
    match tokio::time::timeout(timeout, integration.fetch_models()).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}
