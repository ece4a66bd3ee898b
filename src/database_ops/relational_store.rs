//! Relational-model write surface: product / offer / nutrients / category /
//! product_category, one transaction per batch.

use anyhow::Result;
use serde_json::Value;
use sqlx::{PgConnection, Row};
use tracing::{error, info, instrument, warn};

use super::db::Db;
use super::document_store::InsertSummary;
use crate::normalization::raw::id_string;
use crate::normalization::{
    CategoryRecord, NormalizedNutrition, NormalizedOffer, ProductCategoryLink, RelationalRecordSet,
};

/// One `category` row taken from the category dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRow {
    pub id: String,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub path: Option<String>,
}

/// `None` when the document has no usable id.
pub fn category_row(doc: &Value) -> Option<CategoryRow> {
    let text = |key: &str| doc.get(key).and_then(Value::as_str).map(str::to_string);
    Some(CategoryRow {
        id: doc.get("id").and_then(id_string)?,
        name: text("name"),
        slug: text("slug"),
        path: text("path"),
    })
}

/// Category rows a record set needs, and its links to them.
///
/// Every link points at one of `rows`, so a breadcrumb category missing from
/// the dataset is written best-effort instead of breaking the foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryWrites<'a> {
    pub rows: Vec<&'a CategoryRecord>,
    pub links: Vec<ProductCategoryLink>,
}

pub fn category_writes(set: &RelationalRecordSet) -> CategoryWrites<'_> {
    CategoryWrites {
        rows: set.categories.iter().collect(),
        links: set.category_links(),
    }
}

pub struct RelationalStore<'a> {
    db: &'a Db,
}

impl<'a> RelationalStore<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// Empty every relational table and restart surrogate key sequences.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<()> {
        sqlx::raw_sql(
            "TRUNCATE TABLE product_category, product, offer, nutrients, category RESTART IDENTITY CASCADE",
        )
        .execute(&self.db.pool)
        .await?;
        info!("relational tables truncated");
        Ok(())
    }

    /// Insert category dataset documents as `(id, name, slug, path)` rows.
    /// Documents without an id are counted as failed; existing ids are left alone.
    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn insert_categories(&self, documents: &[Value], batch_size: usize) -> Result<InsertSummary> {
        let mut summary = InsertSummary::default();
        for (i, batch) in documents.chunks(batch_size.max(1)).enumerate() {
            let batch_no = i + 1;
            let rows: Vec<CategoryRow> = batch.iter().filter_map(category_row).collect();
            let skipped = batch.len() - rows.len();
            if skipped > 0 {
                warn!(batch = batch_no, skipped, "category documents without id");
            }
            match self.write_category_batch(&rows).await {
                Ok(()) => {
                    summary.batch_committed(rows.len(), skipped);
                    info!(batch = batch_no, categories = rows.len(), "category batch committed");
                }
                Err(err) => {
                    summary.batch_failed(batch.len());
                    error!(batch = batch_no, error = %format!("{err:#}"), "category batch failed, rolled back");
                }
            }
        }
        Ok(summary)
    }

    async fn write_category_batch(&self, rows: &[CategoryRow]) -> Result<()> {
        let mut tx = self.db.pool.begin().await?;
        for row in rows {
            let res = sqlx::query(
                "INSERT INTO category (id, name, slug, path) VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(&row.id)
            .bind(row.name.as_deref())
            .bind(row.slug.as_deref())
            .bind(row.path.as_deref())
            .execute(&mut *tx)
            .await;
            if let Err(err) = res {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "rollback failed");
                }
                return Err(err.into());
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Insert normalized record sets. Each batch commits as a whole or is
    /// rolled back and counted as fully failed; later batches still run.
    #[instrument(skip(self, sets), fields(records = sets.len()))]
    pub async fn insert_products(&self, sets: &[RelationalRecordSet], batch_size: usize) -> Result<InsertSummary> {
        let mut summary = InsertSummary::default();
        for (i, batch) in sets.chunks(batch_size.max(1)).enumerate() {
            let batch_no = i + 1;
            info!(batch = batch_no, products = batch.len(), "processing batch");
            match self.write_product_batch(batch_no, batch).await {
                Ok(()) => {
                    summary.batch_committed(batch.len(), 0);
                    info!(batch = batch_no, products = batch.len(), "batch committed");
                }
                Err(err) => {
                    summary.batch_failed(batch.len());
                    error!(batch = batch_no, error = %format!("{err:#}"), "batch failed, rolled back");
                }
            }
        }
        info!(inserted = summary.inserted, failed = summary.failed, "product insert complete");
        Ok(summary)
    }

    async fn write_product_batch(&self, batch_no: usize, batch: &[RelationalRecordSet]) -> Result<()> {
        let mut tx = self.db.pool.begin().await?;
        for set in batch {
            if let Err(err) = insert_record_set(&mut *tx, set).await {
                error!(batch = batch_no, migros_id = %set.product.migros_id, error = %err, "product insert failed");
                if let Err(rb) = tx.rollback().await {
                    warn!(batch = batch_no, error = %rb, "rollback failed");
                }
                return Err(err);
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn insert_nutrition(conn: &mut PgConnection, n: &NormalizedNutrition) -> Result<i64> {
    let row = sqlx::query(
        "INSERT INTO nutrients (unit, quantity, kj, kcal, fat, saturates, carbohydrate, sugars, fibre, protein, salt)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING id",
    )
    .bind(&n.unit)
    .bind(n.quantity)
    .bind(n.kj)
    .bind(n.kcal)
    .bind(n.fat)
    .bind(n.saturates)
    .bind(n.carbohydrate)
    .bind(n.sugars)
    .bind(n.fibre)
    .bind(n.protein)
    .bind(n.salt)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.try_get("id")?)
}

async fn insert_offer(conn: &mut PgConnection, o: &NormalizedOffer) -> Result<i64> {
    let row = sqlx::query(
        "INSERT INTO offer (price, quantity, unit_price, promotion_price, promotion_unit_price)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(o.price)
    .bind(o.quantity.as_deref())
    .bind(o.unit_price)
    .bind(o.promotion_price)
    .bind(o.promotion_unit_price)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.try_get("id")?)
}

/// Write one record set. A repeated `(migros_id, scraped_at)` replaces the
/// earlier scrape: every column, its nutrients/offer rows and its links.
async fn insert_record_set(conn: &mut PgConnection, set: &RelationalRecordSet) -> Result<()> {
    let p = &set.product;
    let previous = sqlx::query(
        "SELECT nutrient_id, offer_id FROM product WHERE migros_id = $1 AND scraped_at = $2 FOR UPDATE",
    )
    .bind(&p.migros_id)
    .bind(p.scraped_at)
    .fetch_optional(&mut *conn)
    .await?;

    let nutrient_id = match &set.nutrition {
        Some(n) => Some(insert_nutrition(conn, n).await?),
        None => None,
    };
    let offer_id = match &set.offer {
        Some(o) => Some(insert_offer(conn, o).await?),
        None => None,
    };

    sqlx::query(
        "INSERT INTO product (migros_id, scraped_at, scraped_at_estimated, name, brand, title, description,
                              origin, ingredients, gtins, nutrient_id, offer_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (migros_id, scraped_at) DO UPDATE
            SET scraped_at_estimated = EXCLUDED.scraped_at_estimated,
                name = EXCLUDED.name,
                brand = EXCLUDED.brand,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                origin = EXCLUDED.origin,
                ingredients = EXCLUDED.ingredients,
                gtins = EXCLUDED.gtins,
                nutrient_id = EXCLUDED.nutrient_id,
                offer_id = EXCLUDED.offer_id",
    )
    .bind(&p.migros_id)
    .bind(p.scraped_at)
    .bind(p.scraped_at_estimated)
    .bind(p.name.as_deref())
    .bind(p.brand.as_deref())
    .bind(p.title.as_deref())
    .bind(p.description.as_deref())
    .bind(p.origin.as_deref())
    .bind(p.ingredients.as_deref())
    .bind(p.gtins.as_deref())
    .bind(nutrient_id)
    .bind(offer_id)
    .execute(&mut *conn)
    .await?;

    if let Some(prev) = previous {
        sqlx::query("DELETE FROM product_category WHERE product_id = $1 AND scraped_at = $2")
            .bind(&p.migros_id)
            .bind(p.scraped_at)
            .execute(&mut *conn)
            .await?;
        if let Some(id) = prev.try_get::<Option<i64>, _>("nutrient_id")? {
            sqlx::query("DELETE FROM nutrients WHERE id = $1").bind(id).execute(&mut *conn).await?;
        }
        if let Some(id) = prev.try_get::<Option<i64>, _>("offer_id")? {
            sqlx::query("DELETE FROM offer WHERE id = $1").bind(id).execute(&mut *conn).await?;
        }
    }

    let writes = category_writes(set);
    for category in &writes.rows {
        sqlx::query(
            "INSERT INTO category (id, name, slug) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&category.id)
        .bind(category.name.as_deref())
        .bind(category.slug.as_deref())
        .execute(&mut *conn)
        .await?;
    }
    for link in &writes.links {
        sqlx::query(
            "INSERT INTO product_category (product_id, scraped_at, category_id) VALUES ($1, $2, $3)
             ON CONFLICT (product_id, scraped_at, category_id) DO NOTHING",
        )
        .bind(&link.product_id)
        .bind(link.scraped_at)
        .bind(&link.category_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::{CategoryLookup, ProductNormalizer, UnitPriceBasis};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::path::Path;

    fn dataset() -> Vec<Value> {
        vec![json!({"id": "10", "name": "Snacks", "slug": "snacks", "path": "food/snacks"})]
    }

    fn product(id: &str, crumb_id: &str, slug: &str) -> Value {
        json!({
            "migrosId": id,
            "name": format!("product {id}"),
            "dateAdded": "2024-09-26T12:21:23",
            "productInformation": {"nutrientsInformation": {"nutrientsTable": {
                "headers": ["100 g"],
                "rows": [{"label": "Protein", "values": ["12 g"]}]
            }}},
            "offer": {"price": {"value": 3.5}, "quantity": "200g"},
            "breadcrumb": [{"id": crumb_id, "name": "Crumb", "slugs": [slug]}]
        })
    }

    fn normalized(lookup: &CategoryLookup) -> Vec<RelationalRecordSet> {
        let captured = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let normalizer = ProductNormalizer::new(lookup, UnitPriceBasis::default(), captured);
        vec![
            normalizer.to_relational(product("1", "10", "snacks")).unwrap(),
            normalizer.to_relational(product("2", "999", "not-in-dataset")).unwrap(),
        ]
    }

    #[test]
    fn dataset_documents_become_rows() {
        let row = category_row(&dataset()[0]).expect("row");
        assert_eq!(row.id, "10");
        assert_eq!(row.path.as_deref(), Some("food/snacks"));
        assert_eq!(category_row(&json!({"id": 42})).map(|r| r.id), Some("42".to_string()));
        assert_eq!(category_row(&json!({"name": "no id"})), None);
    }

    #[test]
    fn unknown_breadcrumb_category_gets_its_own_row() {
        let lookup = CategoryLookup::from_documents(&dataset());
        let sets = normalized(&lookup);

        let known = category_writes(&sets[0]);
        assert_eq!(known.rows[0].name.as_deref(), Some("Snacks"));

        let best_effort = category_writes(&sets[1]);
        assert_eq!(best_effort.rows.len(), 1);
        assert_eq!(best_effort.rows[0].id, "999");
        assert_eq!(best_effort.rows[0].slug.as_deref(), Some("not-in-dataset"));
        assert_eq!(best_effort.links.len(), 1);
        for writes in [&known, &best_effort] {
            assert!(writes
                .links
                .iter()
                .all(|l| writes.rows.iter().any(|r| r.id == l.category_id)));
        }
    }

    #[tokio::test]
    #[ignore = "needs a scratch PostgreSQL in TEST_DATABASE_URL"]
    async fn best_effort_categories_and_reloads_keep_batches_whole() {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            return;
        };
        let db = Db::connect(&url, 1).await.unwrap();
        db.run_migrations(&Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
            .await
            .unwrap();
        let store = RelationalStore::new(&db);
        store.reset().await.unwrap();

        let categories = store.insert_categories(&dataset(), 10).await.unwrap();
        assert_eq!(categories, InsertSummary { inserted: 1, failed: 0, failed_batches: 0 });

        let lookup = CategoryLookup::from_documents(&dataset());
        let sets = normalized(&lookup);
        let first = store.insert_products(&sets, 10).await.unwrap();
        assert_eq!(first, InsertSummary { inserted: 2, failed: 0, failed_batches: 0 });

        let again = store.insert_products(&sets, 10).await.unwrap();
        assert_eq!(again.failed_batches, 0);

        let count = |sql: &'static str| {
            let pool = db.pool.clone();
            async move { sqlx::query(sql).fetch_one(&pool).await.unwrap().get::<i64, _>(0) }
        };
        assert_eq!(count("SELECT COUNT(*) FROM product").await, 2);
        assert_eq!(count("SELECT COUNT(*) FROM nutrients").await, 2);
        assert_eq!(count("SELECT COUNT(*) FROM offer").await, 2);
        assert_eq!(count("SELECT COUNT(*) FROM product_category").await, 2);
        assert_eq!(count("SELECT COUNT(*) FROM category").await, 2);
        db.close().await;
    }
}
