use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::normalization::UnitPriceBasis;
use crate::util::env::{self as env_util, env_opt, env_parse};

/// Immutable runtime configuration, built once and passed by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Backend A: JSONB document collections.
    pub document_db_url: String,
    /// Backend B: normalized relational tables.
    pub relational_db_url: String,
    pub max_connections: u32,
    pub products_path: PathBuf,
    pub categories_path: PathBuf,
    pub product_collection: String,
    pub category_collection: String,
    pub batch_size: usize,
    pub iterations: usize,
    pub unit_price_basis: UnitPriceBasis,
    pub report_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        env_util::init_env();
        let fallback_url = env_util::db_url().ok();
        let document_db_url = env_opt("DOCUMENT_DB_URL").or_else(|| fallback_url.clone());
        let relational_db_url = env_opt("RELATIONAL_DB_URL").or(fallback_url);
        let (Some(document_db_url), Some(relational_db_url)) = (document_db_url, relational_db_url)
        else {
            bail!("database URL not configured; set DATABASE_URL or DOCUMENT_DB_URL/RELATIONAL_DB_URL");
        };

        let unit_price_basis = match env_opt("UNIT_PRICE_BASIS") {
            Some(raw) => match UnitPriceBasis::parse(&raw) {
                Some(basis) => basis,
                None => bail!("UNIT_PRICE_BASIS must be per_hundred or per_quantity, got {raw:?}"),
            },
            None => UnitPriceBasis::default(),
        };

        let cfg = Self {
            document_db_url,
            relational_db_url,
            max_connections: env_parse("DB_MAX_CONNS", 2u32),
            products_path: env_opt("PRODUCTS_PATH")
                .unwrap_or_else(|| "data/product/".into())
                .into(),
            categories_path: env_opt("CATEGORIES_PATH")
                .unwrap_or_else(|| "data/categorie/".into())
                .into(),
            product_collection: env_opt("DOC_PRODUCT_COLLECTION")
                .unwrap_or_else(|| "doc_products".into()),
            category_collection: env_opt("DOC_CATEGORY_COLLECTION")
                .unwrap_or_else(|| "doc_categories".into()),
            batch_size: env_parse("BATCH_SIZE", 1000usize),
            iterations: env_parse("MEASURE_ITERATIONS", 3usize),
            unit_price_basis,
            report_dir: env_opt("REPORT_DIR").unwrap_or_else(|| ".".into()).into(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would make the pipelines misbehave silently.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("BATCH_SIZE must be at least 1");
        }
        if self.max_connections == 0 {
            bail!("DB_MAX_CONNS must be at least 1");
        }
        for name in [&self.product_collection, &self.category_collection] {
            if !is_plain_identifier(name) {
                bail!("collection name {name:?} must be a plain SQL identifier");
            }
        }
        Ok(())
    }

    /// Log a redacted snapshot.
    pub fn log_snapshot(&self, title: &str) {
        let products = self.products_path.display().to_string();
        let categories = self.categories_path.display().to_string();
        let batch = self.batch_size.to_string();
        let iterations = self.iterations.to_string();
        let basis = format!("{:?}", self.unit_price_basis);
        env_util::preflight_check(
            title,
            &[
                ("DOCUMENT_DB_URL", &self.document_db_url),
                ("RELATIONAL_DB_URL", &self.relational_db_url),
                ("PRODUCTS_PATH", &products),
                ("CATEGORIES_PATH", &categories),
                ("BATCH_SIZE", &batch),
                ("MEASURE_ITERATIONS", &iterations),
                ("UNIT_PRICE_BASIS", &basis),
            ],
        );
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, safe to splice into SQL as a table name.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
