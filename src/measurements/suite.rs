//! The fixed comparison tests and the runner that sequences them.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use sqlx::Row;
use tracing::{error, info, instrument};

use super::harness::{run_comparison, MeasurementResult};
use crate::config::AppConfig;
use crate::database_ops::Db;

const SNACKS_PATTERN: &str = "%Snacks%";
const DAIRY_PATTERN: &str = "%dairy%";
const MIN_PROTEIN: f64 = 10.0;
const MAX_PRICE: f64 = 5.0;

/// A pair of logically equivalent reads, one per backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonTest {
    SimpleCount,
    SingleProductRetrieval,
    CategoryFilter,
    Aggregation,
    ComplexSearch,
}

impl ComparisonTest {
    pub const ALL: [ComparisonTest; 5] = [
        ComparisonTest::SimpleCount,
        ComparisonTest::SingleProductRetrieval,
        ComparisonTest::CategoryFilter,
        ComparisonTest::Aggregation,
        ComparisonTest::ComplexSearch,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ComparisonTest::SimpleCount => "SimpleCountTest",
            ComparisonTest::SingleProductRetrieval => "SingleProductRetrievalTest",
            ComparisonTest::CategoryFilter => "CategoryFilterTest",
            ComparisonTest::Aggregation => "AggregationTest",
            ComparisonTest::ComplexSearch => "ComplexSearchTest",
        }
    }

    /// Statement against the JSONB product collection `collection`.
    fn document_sql(self, collection: &str) -> String {
        let has_category = "EXISTS (SELECT 1 FROM jsonb_array_elements(COALESCE(d.body->'categories', '[]'::jsonb)) cat
                                    WHERE cat->>'name' ILIKE $1)";
        match self {
            ComparisonTest::SimpleCount => format!("SELECT COUNT(*) AS n FROM {collection}"),
            ComparisonTest::SingleProductRetrieval => {
                format!("SELECT body FROM {collection} LIMIT 1")
            }
            ComparisonTest::CategoryFilter => {
                format!("SELECT COUNT(*) AS n FROM {collection} d WHERE {has_category}")
            }
            ComparisonTest::Aggregation => format!(
                "SELECT d.body->>'brand' AS brand,
                        COUNT(*) AS product_count,
                        AVG((d.body->'offer'->>'price')::float8) AS avg_price
                 FROM {collection} d
                 WHERE d.body->>'brand' IS NOT NULL
                 GROUP BY 1
                 ORDER BY product_count DESC
                 LIMIT 10"
            ),
            ComparisonTest::ComplexSearch => format!(
                "SELECT COUNT(*) AS n FROM {collection} d
                 WHERE (d.body->'nutrition'->>'protein')::float8 >= $2
                   AND (d.body->'offer'->>'price')::float8 <= $3
                   AND {has_category}"
            ),
        }
    }

    fn relational_sql(self) -> &'static str {
        match self {
            ComparisonTest::SimpleCount => "SELECT COUNT(*) AS n FROM product",
            ComparisonTest::SingleProductRetrieval => {
                "SELECT p.migros_id, p.name, p.brand, p.scraped_at,
                        n.kcal, n.kj, n.fat, n.protein,
                        o.price, o.quantity, o.unit_price
                 FROM product p
                 LEFT JOIN nutrients n ON p.nutrient_id = n.id
                 LEFT JOIN offer o ON p.offer_id = o.id
                 LIMIT 1"
            }
            ComparisonTest::CategoryFilter => {
                "SELECT COUNT(*) AS n FROM product p
                 WHERE EXISTS (SELECT 1 FROM product_category pc
                               JOIN category c ON pc.category_id = c.id
                               WHERE pc.product_id = p.migros_id AND pc.scraped_at = p.scraped_at
                                 AND c.name ILIKE $1)"
            }
            ComparisonTest::Aggregation => {
                "SELECT p.brand, COUNT(*) AS product_count, AVG(o.price) AS avg_price
                 FROM product p
                 LEFT JOIN offer o ON p.offer_id = o.id
                 WHERE p.brand IS NOT NULL
                 GROUP BY p.brand
                 ORDER BY product_count DESC
                 LIMIT 10"
            }
            ComparisonTest::ComplexSearch => {
                "SELECT COUNT(*) AS n FROM product p
                 JOIN nutrients n ON p.nutrient_id = n.id
                 JOIN offer o ON p.offer_id = o.id
                 WHERE n.protein >= $2
                   AND o.price <= $3
                   AND EXISTS (SELECT 1 FROM product_category pc
                               JOIN category c ON pc.category_id = c.id
                               WHERE pc.product_id = p.migros_id AND pc.scraped_at = p.scraped_at
                                 AND c.name ILIKE $1)"
            }
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            ComparisonTest::ComplexSearch => DAIRY_PATTERN,
            _ => SNACKS_PATTERN,
        }
    }

    /// Backend A: JSONB documents.
    pub async fn run_document(self, db: &Db, collection: &str) -> Result<Value> {
        let sql = self.document_sql(collection);
        match self {
            ComparisonTest::SimpleCount => count(db, &sql, self).await,
            ComparisonTest::SingleProductRetrieval => {
                let row = sqlx::query(&sql).fetch_optional(&db.pool).await?;
                Ok(match row {
                    Some(row) => row.try_get::<Value, _>("body")?,
                    None => Value::Null,
                })
            }
            ComparisonTest::CategoryFilter | ComparisonTest::ComplexSearch => count(db, &sql, self).await,
            ComparisonTest::Aggregation => {
                let rows = sqlx::query(&sql).fetch_all(&db.pool).await?;
                Ok(json!(rows.len()))
            }
        }
    }

    /// Backend B: normalized tables.
    pub async fn run_relational(self, db: &Db) -> Result<Value> {
        let sql = self.relational_sql();
        match self {
            ComparisonTest::SingleProductRetrieval => {
                let Some(row) = sqlx::query(sql).fetch_optional(&db.pool).await? else {
                    return Ok(Value::Null);
                };
                Ok(json!({
                    "migros_id": row.try_get::<String, _>("migros_id")?,
                    "name": row.try_get::<Option<String>, _>("name")?,
                    "brand": row.try_get::<Option<String>, _>("brand")?,
                    "scraped_at": row.try_get::<chrono::DateTime<chrono::Utc>, _>("scraped_at")?,
                    "kcal": row.try_get::<Option<f64>, _>("kcal")?,
                    "kj": row.try_get::<Option<f64>, _>("kj")?,
                    "fat": row.try_get::<Option<f64>, _>("fat")?,
                    "protein": row.try_get::<Option<f64>, _>("protein")?,
                    "price": row.try_get::<Option<f64>, _>("price")?,
                    "quantity": row.try_get::<Option<String>, _>("quantity")?,
                    "unit_price": row.try_get::<Option<f64>, _>("unit_price")?,
                }))
            }
            ComparisonTest::Aggregation => {
                let rows = sqlx::query(sql).fetch_all(&db.pool).await?;
                Ok(json!(rows.len()))
            }
            _ => count(db, sql, self).await,
        }
    }
}

/// Run a `COUNT(*) AS n` statement, binding the category pattern and search
/// thresholds where the test uses them.
async fn count(db: &Db, sql: &str, test: ComparisonTest) -> Result<Value> {
    let mut query = sqlx::query(sql);
    match test {
        ComparisonTest::CategoryFilter => query = query.bind(test.pattern()),
        ComparisonTest::ComplexSearch => {
            query = query.bind(test.pattern()).bind(MIN_PROTEIN).bind(MAX_PRICE);
        }
        _ => {}
    }
    let row = query.fetch_one(&db.pool).await?;
    Ok(json!(row.try_get::<i64, _>("n")?))
}

/// Sequences every comparison test; each test opens and closes its own
/// connections.
pub struct MeasurementRunner<'a> {
    cfg: &'a AppConfig,
}

impl<'a> MeasurementRunner<'a> {
    pub fn new(cfg: &'a AppConfig) -> Self {
        Self { cfg }
    }

    /// Open and close one connection per backend; failure here is fatal.
    #[instrument(skip(self))]
    pub async fn preflight(&self) -> Result<()> {
        Db::connect(&self.cfg.document_db_url, 1)
            .await
            .context("document backend unreachable")?
            .close()
            .await;
        Db::connect(&self.cfg.relational_db_url, 1)
            .await
            .context("relational backend unreachable")?
            .close()
            .await;
        Ok(())
    }

    /// Run the full suite. Tests that cannot connect are logged and left out.
    pub async fn run_all(&self) -> Result<Vec<MeasurementResult>> {
        self.preflight().await?;
        info!(tests = ComparisonTest::ALL.len(), iterations = self.cfg.iterations, "starting measurement suite");

        let mut results = Vec::with_capacity(ComparisonTest::ALL.len());
        for test in ComparisonTest::ALL {
            match self.run_one(test).await {
                Ok(r) => {
                    info!(
                        test = test.name(),
                        winner = %r.winner(),
                        backend_a_secs = r.backend_a_time,
                        backend_b_secs = r.backend_b_time,
                        "test complete"
                    );
                    results.push(r);
                }
                Err(err) => error!(test = test.name(), error = %format!("{err:#}"), "test failed"),
            }
        }
        Ok(results)
    }

    async fn run_one(&self, test: ComparisonTest) -> Result<MeasurementResult> {
        let document_db = Db::connect(&self.cfg.document_db_url, 1).await?;
        let relational_db = match Db::connect(&self.cfg.relational_db_url, 1).await {
            Ok(db) => db,
            Err(err) => {
                document_db.close().await;
                return Err(err);
            }
        };
        let collection = self.cfg.product_collection.as_str();
        let result = run_comparison(
            test.name(),
            self.cfg.iterations,
            || test.run_document(&document_db, collection),
            || test.run_relational(&relational_db),
        )
        .await;
        document_db.close().await;
        relational_db.close().await;
        Ok(result)
    }
}
