//! Document-model write surface: named collections of JSONB bodies.

use anyhow::{bail, Result};
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};
use tracing::{error, info, instrument};

use super::db::Db;
use crate::config::is_plain_identifier;

/// Outcome of a batched write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: usize,
    pub failed: usize,
    pub failed_batches: usize,
}

impl InsertSummary {
    /// A committed batch: `inserted` rows written, `skipped` rows rejected up front.
    pub fn batch_committed(&mut self, inserted: usize, skipped: usize) {
        self.inserted += inserted;
        self.failed += skipped;
    }

    /// A failed batch counts every row it carried as failed.
    pub fn batch_failed(&mut self, attempted: usize) {
        self.failed += attempted;
        self.failed_batches += 1;
    }
}

fn checked(collection: &str) -> Result<&str> {
    if !is_plain_identifier(collection) {
        bail!("invalid collection name {collection:?}");
    }
    Ok(collection)
}

pub struct DocumentStore<'a> {
    db: &'a Db,
}

impl<'a> DocumentStore<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// Create the collection table and its GIN index if missing.
    #[instrument(skip(self))]
    pub async fn ensure_collection(&self, collection: &str) -> Result<()> {
        let name = checked(collection)?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {name} (id BIGSERIAL PRIMARY KEY, body JSONB NOT NULL);
             CREATE INDEX IF NOT EXISTS {name}_body_gin ON {name} USING GIN (body jsonb_path_ops);"
        );
        sqlx::raw_sql(&ddl).execute(&self.db.pool).await?;
        Ok(())
    }

    /// Remove every document from each collection.
    #[instrument(skip(self))]
    pub async fn clear_collections(&self, collections: &[&str]) -> Result<()> {
        for collection in collections {
            let name = checked(collection)?;
            self.ensure_collection(name).await?;
            let res = sqlx::query(&format!("DELETE FROM {name}"))
                .execute(&self.db.pool)
                .await?;
            info!(collection = name, deleted = res.rows_affected(), "cleared collection");
        }
        Ok(())
    }

    /// Insert documents `batch_size` at a time. A failed batch is logged and
    /// counted; later batches still run.
    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn insert_batch(
        &self,
        collection: &str,
        documents: &[Value],
        batch_size: usize,
    ) -> Result<InsertSummary> {
        let name = checked(collection)?;
        let mut summary = InsertSummary::default();
        for (i, batch) in documents.chunks(batch_size.max(1)).enumerate() {
            let batch_no = i + 1;
            let mut qb: QueryBuilder<'_, Postgres> =
                QueryBuilder::new(format!("INSERT INTO {name} (body) "));
            qb.push_values(batch, |mut b, doc| {
                b.push_bind(doc);
            });
            match qb.build().execute(&self.db.pool).await {
                Ok(res) => {
                    summary.batch_committed(res.rows_affected() as usize, 0);
                    info!(batch = batch_no, documents = batch.len(), collection = name, "inserted batch");
                }
                Err(err) => {
                    summary.batch_failed(batch.len());
                    error!(batch = batch_no, collection = name, error = %err, "batch insert failed");
                }
            }
        }
        info!(collection = name, inserted = summary.inserted, failed = summary.failed, "collection insert complete");
        Ok(summary)
    }
}
