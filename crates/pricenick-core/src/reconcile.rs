//! Reconciliation: fold every provider's canonical records into one catalog of
//! merged models, one per (brand, name) identity, each with a recommended offer.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{info, warn};

use crate::fetch::FetchReport;
use crate::model::{CanonicalModelRecord, Catalog, MergedModel};
use crate::pricing;

/// Grouping key. Lower-cased and trimmed, nothing more: differently named
/// models stay apart.
pub type IdentityKey = (String, String);

pub fn identity_key(brand: &str, name: &str) -> IdentityKey {
    (brand.trim().to_lowercase(), name.trim().to_lowercase())
}

/// Seed a merged model from the first record of its identity.
fn seed(record: CanonicalModelRecord) -> MergedModel {
    MergedModel {
        brand: record.brand,
        name: record.name,
        data_amount: record.data_amount,
        window: record.window,
        recommended_provider: record.offer.provider.clone(),
        providers: vec![record.offer],
    }
}

/// Merge policy for a repeated identity: append the offer, keep the first
/// non-null data amount, keep the largest window.
pub fn merge_record(model: &mut MergedModel, record: CanonicalModelRecord) {
    if model.data_amount.is_none() {
        model.data_amount = record.data_amount;
    }
    model.window = model.window.max(record.window);
    model.providers.push(record.offer);
}

/// Fold records in the order given, dropping malformed ones.
pub fn merge_records<I>(records: I) -> Vec<MergedModel>
where
    I: IntoIterator<Item = CanonicalModelRecord>,
{
    let mut models: Vec<MergedModel> = Vec::new();
    let mut index: HashMap<IdentityKey, usize> = HashMap::new();

    for record in records {
        if let Err(e) = record.validate() {
            warn!(error = %e, "malformed record");
            continue;
        }
        let key = identity_key(&record.brand, &record.name);
        match index.get(&key) {
            Some(&i) => merge_record(&mut models[i], record),
            None => {
                index.insert(key, models.len());
                models.push(seed(record));
            }
        }
    }

    for model in &mut models {
        if let Some(i) = pricing::recommend(&model.providers) {
            model.recommended_provider = model.providers[i].provider.clone();
        }
    }
    models
}

/// Build a catalog from one fetch report. Failed providers contribute nothing.
pub fn reconcile(report: FetchReport, cycle: u64) -> Catalog {
    let records = report
        .into_results()
        .into_iter()
        .filter_map(|(_, result)| result.ok())
        .flatten();
    let models = merge_records(records);

    let catalog = Catalog {
        models,
        fetched_at: Utc::now(),
        cycle,
    };
    info!(cycle, models = catalog.len(), "catalog reconciled");
    catalog
}
