use std::path::PathBuf;

use anyhow::Result;
use catalog_compare::database_ops::{populate_document_store, populate_relational_store, Db, DocumentStore};
use catalog_compare::measurements::{generate_report, save_report, MeasurementRunner};
use catalog_compare::normalization::UnitPriceBasis;
use catalog_compare::util::env;
use catalog_compare::{telemetry, AppConfig};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "catalog", version, about = "Catalog normalization and backend comparison CLI")]
struct Cli {
    /// Override DB_MAX_CONNS
    #[arg(long, global = true)]
    max_connections: Option<u32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Apply relational migrations and create the document collections
    Migrate {
        /// Directory of NNNN_description.sql files
        #[arg(long, default_value = "migrations")]
        dir: PathBuf,
    },
    /// Clear and repopulate the document backend
    LoadDocuments {
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Truncate and repopulate the relational backend
    LoadRelational {
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Run the comparison suite and write a JSON report
    Measure {
        /// Iterations per backend per test (default: MEASURE_ITERATIONS)
        #[arg(long)]
        iterations: Option<usize>,
        /// Explicit report file; otherwise a timestamped file under --report-dir
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct LoadArgs {
    /// Only process the first N product files
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    products_path: Option<PathBuf>,
    #[arg(long)]
    categories_path: Option<PathBuf>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// per_hundred or per_quantity
    #[arg(long, value_parser = parse_basis)]
    unit_price_basis: Option<UnitPriceBasis>,
}

fn parse_basis(raw: &str) -> Result<UnitPriceBasis, String> {
    UnitPriceBasis::parse(raw).ok_or_else(|| format!("expected per_hundred or per_quantity, got {raw:?}"))
}

impl LoadArgs {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(p) = &self.products_path {
            cfg.products_path = p.clone();
        }
        if let Some(p) = &self.categories_path {
            cfg.categories_path = p.clone();
        }
        if let Some(n) = self.batch_size {
            cfg.batch_size = n;
        }
        if let Some(b) = self.unit_price_basis {
            cfg.unit_price_basis = b;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    telemetry::init_tracing("info,sqlx=warn")?;

    let cli = Cli::parse();
    let mut cfg = AppConfig::from_env()?;
    if let Some(n) = cli.max_connections {
        cfg.max_connections = n;
    }
    match &cli.command {
        Commands::LoadDocuments { load } | Commands::LoadRelational { load } => load.apply(&mut cfg),
        Commands::Measure { iterations, report_dir, .. } => {
            if let Some(n) = iterations {
                cfg.iterations = *n;
            }
            if let Some(dir) = report_dir {
                cfg.report_dir = dir.clone();
            }
        }
        Commands::Migrate { .. } => {}
    }
    cfg.validate()?;
    cfg.log_snapshot("catalog");

    match cli.command {
        Commands::Migrate { dir } => {
            let relational = Db::connect(&cfg.relational_db_url, cfg.max_connections).await?;
            let applied = relational.run_migrations(&dir).await;
            relational.close().await;
            info!(applied = applied?, "relational schema ready");

            let document = Db::connect(&cfg.document_db_url, cfg.max_connections).await?;
            let store = DocumentStore::new(&document);
            let mut ensured = Ok(());
            for collection in [&cfg.product_collection, &cfg.category_collection] {
                ensured = store.ensure_collection(collection).await;
                if ensured.is_err() {
                    break;
                }
            }
            document.close().await;
            ensured?;
            info!("document collections ready");
        }
        Commands::LoadDocuments { load } => {
            let summary = populate_document_store(&cfg, load.limit).await?;
            println!(
                "documents: loaded={} inserted={} failed_records={} failed_batches={}",
                summary.loaded, summary.inserted, summary.failed_records, summary.failed_batches
            );
        }
        Commands::LoadRelational { load } => {
            let summary = populate_relational_store(&cfg, load.limit).await?;
            println!(
                "relational: loaded={} inserted={} failed_records={} failed_batches={}",
                summary.loaded, summary.inserted, summary.failed_records, summary.failed_batches
            );
        }
        Commands::Measure { output, .. } => {
            let results = MeasurementRunner::new(&cfg).run_all().await?;
            let report = generate_report(&results, Utc::now());
            let path = save_report(&report, output.as_deref(), &cfg.report_dir)?;

            println!("{}", "=".repeat(60));
            println!("MEASUREMENT RESULTS SUMMARY");
            println!("{}", "=".repeat(60));
            println!("Backend A ({}) wins: {}", report.backends.a, report.summary.backend_a_wins);
            println!("Backend B ({}) wins: {}", report.backends.b, report.summary.backend_b_wins);
            println!("Full report saved to: {}", path.display());
        }
    }
    Ok(())
}
