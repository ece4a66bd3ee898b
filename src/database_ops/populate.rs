//! End-to-end population of both backends from the on-disk datasets.

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use super::db::Db;
use super::document_store::{DocumentStore, InsertSummary};
use super::loader::load_documents;
use super::relational_store::RelationalStore;
use crate::config::AppConfig;
use crate::normalization::{CategoryLookup, ProductNormalizer, RelationalRecordSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateSummary {
    pub loaded: usize,
    pub inserted: usize,
    pub failed_records: usize,
    pub failed_batches: usize,
}

impl PopulateSummary {
    fn new(loaded: usize, normalize_failures: usize, writes: InsertSummary) -> Self {
        Self {
            loaded,
            inserted: writes.inserted,
            failed_records: normalize_failures + writes.failed,
            failed_batches: writes.failed_batches,
        }
    }
}

/// Normalize every raw record with `f`, logging and counting failures.
fn normalize_all<T, E: std::fmt::Display>(
    raw: Vec<Value>,
    mut f: impl FnMut(Value) -> Result<T, E>,
) -> (Vec<T>, usize) {
    let mut out = Vec::with_capacity(raw.len());
    let mut failed = 0usize;
    for (i, doc) in raw.into_iter().enumerate() {
        match f(doc) {
            Ok(v) => out.push(v),
            Err(err) => {
                failed += 1;
                warn!(index = i, error = %err, "skipping product record");
            }
        }
    }
    (out, failed)
}

/// Fill backend A: category documents as-is, products as normalized documents.
pub async fn populate_document_store(cfg: &AppConfig, limit: Option<usize>) -> Result<PopulateSummary> {
    let db = Db::connect(&cfg.document_db_url, cfg.max_connections).await?;
    let result = fill_documents(&db, cfg, limit).await;
    db.close().await;
    result
}

async fn fill_documents(db: &Db, cfg: &AppConfig, limit: Option<usize>) -> Result<PopulateSummary> {
    let store = DocumentStore::new(db);
    store
        .clear_collections(&[&cfg.product_collection, &cfg.category_collection])
        .await?;

    let categories = load_documents(&cfg.categories_path, None);
    let category_writes = store
        .insert_batch(&cfg.category_collection, &categories, cfg.batch_size)
        .await?;
    info!(inserted = category_writes.inserted, "categories stored");
    let lookup = CategoryLookup::from_documents(&categories);

    let raw = load_documents(&cfg.products_path, limit);
    let loaded = raw.len();
    let normalizer = ProductNormalizer::new(&lookup, cfg.unit_price_basis, Utc::now());
    let (documents, normalize_failures) = normalize_all(raw, |doc| {
        normalizer
            .to_document(doc)
            .map_err(anyhow::Error::from)
            .and_then(|d| serde_json::to_value(d).map_err(anyhow::Error::from))
    });

    let writes = store
        .insert_batch(&cfg.product_collection, &documents, cfg.batch_size)
        .await?;
    let summary = PopulateSummary::new(loaded, normalize_failures, writes);
    info!(?summary, "document store populated");
    Ok(summary)
}

/// Fill backend B: category rows, then products with their offer, nutrients
/// and category links.
pub async fn populate_relational_store(cfg: &AppConfig, limit: Option<usize>) -> Result<PopulateSummary> {
    let db = Db::connect(&cfg.relational_db_url, cfg.max_connections).await?;
    let result = fill_relational(&db, cfg, limit).await;
    db.close().await;
    result
}

async fn fill_relational(db: &Db, cfg: &AppConfig, limit: Option<usize>) -> Result<PopulateSummary> {
    let store = RelationalStore::new(db);
    store.reset().await?;

    let categories = load_documents(&cfg.categories_path, None);
    let category_writes = store.insert_categories(&categories, cfg.batch_size).await?;
    info!(inserted = category_writes.inserted, failed = category_writes.failed, "categories stored");
    let lookup = CategoryLookup::from_documents(&categories);

    let raw = load_documents(&cfg.products_path, limit);
    let loaded = raw.len();
    let normalizer = ProductNormalizer::new(&lookup, cfg.unit_price_basis, Utc::now());
    let (sets, normalize_failures): (Vec<RelationalRecordSet>, usize) =
        normalize_all(raw, |doc| normalizer.to_relational(doc));

    let writes = store.insert_products(&sets, cfg.batch_size).await?;
    let summary = PopulateSummary::new(loaded, normalize_failures, writes);
    info!(?summary, "relational store populated");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_failures_are_counted_not_fatal() {
        let lookup = CategoryLookup::default();
        let normalizer = ProductNormalizer::new(&lookup, Default::default(), Utc::now());
        let raw = vec![
            json!({"migrosId": "1", "name": "A"}),
            json!({"name": "no id"}),
            json!({"migrosId": 3}),
        ];
        let (docs, failed) = normalize_all(raw, |d| normalizer.to_document(d));
        assert_eq!(failed, 1);
        let ids: Vec<&str> = docs.iter().map(|d| d.migros_id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
    }

    #[test]
    fn summary_folds_both_failure_kinds() {
        let writes = InsertSummary { inserted: 8, failed: 2, failed_batches: 1 };
        let s = PopulateSummary::new(11, 1, writes);
        assert_eq!(s, PopulateSummary { loaded: 11, inserted: 8, failed_records: 3, failed_batches: 1 });
    }
}
