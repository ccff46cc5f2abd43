use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use curate::GoldView;
use metadata::PipelineConfig;
use std::path::{Path, PathBuf};
use storage::{Consistency, Store};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pipeline", version, about = "Bronze/Silver/Gold sales pipeline")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Args, Debug)]
struct Overrides {
    /// TOML file with pipeline settings. Missing keys take their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// `memory://` or a directory holding the table files.
    #[arg(long, global = true)]
    endpoint: Option<String>,
    #[arg(long, global = true)]
    namespace: Option<String>,
    #[arg(long, global = true)]
    batch_size: Option<usize>,
    /// one, quorum or all
    #[arg(long, global = true)]
    consistency: Option<Consistency>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// CSV -> bronze_sales (+ bronze_sales_rejects)
    Ingest {
        #[arg(long)]
        source: PathBuf,
    },
    /// bronze_sales -> silver_sales
    Cleanse,
    /// silver_sales -> Gold views
    Curate {
        /// region-country, monthly, top-items or all
        #[arg(long, default_value = "all")]
        view: String,
    },
    /// Ingest, cleanse and curate in one go.
    Run {
        #[arg(long)]
        source: PathBuf,
    },
    /// Print the rows of a table.
    Show {
        #[arg(long)]
        table: String,
        #[arg(long)]
        limit: Option<usize>,
    },
}

impl Overrides {
    fn resolve(self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(endpoint) = self.endpoint {
            cfg.endpoint = endpoint;
        }
        if let Some(namespace) = self.namespace {
            cfg.namespace = namespace;
        }
        if let Some(batch_size) = self.batch_size {
            cfg.batch_size = batch_size;
        }
        if let Some(consistency) = self.consistency {
            cfg.consistency = consistency;
        }
        cfg.validate().context("invalid pipeline settings")?;
        Ok(cfg)
    }
}

fn parse_views(s: &str) -> Result<Vec<GoldView>> {
    if s == "all" {
        return Ok(GoldView::ALL.to_vec());
    }
    Ok(vec![s.parse()?])
}

async fn run_ingest(cfg: &PipelineConfig, store: &dyn Store, source: &Path) -> Result<()> {
    let st = ingest::ingest_sales(cfg, store, source).await?;
    println!(
        "INGEST OK rows_in={} rows_out={} rejects={} bytes_in={}",
        st.rows_in, st.rows_out, st.rejects, st.bytes_in
    );
    Ok(())
}

async fn run_cleanse(cfg: &PipelineConfig, store: &dyn Store) -> Result<()> {
    let st = cleanse::cleanse_sales(cfg, store).await?;
    println!(
        "CLEANSE OK rows_in={} rows_out={} units_clamped={}",
        st.rows_in, st.rows_out, st.units_clamped
    );
    Ok(())
}

async fn run_curate(cfg: &PipelineConfig, store: &dyn Store, views: &[GoldView]) -> Result<()> {
    for st in curate::curate_views(cfg, store, views).await? {
        println!(
            "CURATE OK view={} table={} records={} groups={} rows_written={} rows_removed={}",
            st.view, st.table, st.records, st.groups, st.rows_written, st.rows_removed
        );
    }
    Ok(())
}

fn show(store: &dyn Store, table: &str, limit: Option<usize>) -> Result<()> {
    let rows = store
        .scan_all(table)
        .with_context(|| format!("scan {table}"))?;
    let mut n = 0usize;
    for row in rows.take(limit.unwrap_or(usize::MAX)) {
        let row = row.with_context(|| format!("scan {table}"))?;
        println!("{row}");
        n += 1;
    }
    println!("SHOW OK table={table} rows={n}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let start = std::time::Instant::now();
    let cfg = cli.overrides.resolve()?;
    let store = metadata::open_store(&cfg)?;
    let store = store.as_ref();
    tracing::debug!(
        endpoint = %cfg.endpoint,
        namespace = %cfg.namespace,
        batch_size = cfg.batch_size,
        consistency = %cfg.consistency,
        "store ready"
    );

    match cli.cmd {
        Commands::Ingest { source } => run_ingest(&cfg, store, &source).await?,
        Commands::Cleanse => run_cleanse(&cfg, store).await?,
        Commands::Curate { view } => run_curate(&cfg, store, &parse_views(&view)?).await?,
        Commands::Run { source } => {
            run_ingest(&cfg, store, &source).await?;
            run_cleanse(&cfg, store).await?;
            run_curate(&cfg, store, &GoldView::ALL).await?;
        }
        Commands::Show { table, limit } => show(store, &table, limit)?,
    }
    let duration_pretty = humantime::format_duration(start.elapsed());
    println!("DONE in {}", duration_pretty);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "pipeline",
            "curate",
            "--endpoint",
            "memory://",
            "--batch-size",
            "7",
            "--consistency",
            "one",
            "--view",
            "monthly",
        ]);
        let cfg = cli.overrides.resolve().unwrap();
        assert_eq!(cfg.endpoint, "memory://");
        assert_eq!(cfg.batch_size, 7);
        assert_eq!(cfg.consistency, Consistency::One);
        assert_eq!(cfg.namespace, metadata::DEFAULT_NAMESPACE);
        match cli.cmd {
            Commands::Curate { view } => assert_eq!(parse_views(&view).unwrap(), vec![GoldView::Monthly]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let cli = Cli::parse_from(["pipeline", "cleanse", "--batch-size", "0"]);
        assert!(cli.overrides.resolve().is_err());
    }

    #[test]
    fn view_all_expands() {
        assert_eq!(parse_views("all").unwrap().len(), 3);
        assert!(parse_views("daily").is_err());
    }

    #[tokio::test]
    async fn run_on_memory_store() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("sales.csv");
        std::fs::write(
            &csv,
            "Region,Country,Item Type,Sales Channel,Order Priority,Order Date,Order ID,Ship Date,Units Sold,Unit Price,Unit Cost,Total Revenue,Total Cost,Total Profit\n\
             europe,united kingdom,cereal,online,h,1/5/2014,1,1/9/2014,1,20,10,20,10,10\n",
        )
        .unwrap();
        let cfg = PipelineConfig {
            endpoint: "memory://".into(),
            ..PipelineConfig::default()
        };
        let store = metadata::open_store(&cfg).unwrap();
        run_ingest(&cfg, store.as_ref(), &csv).await.unwrap();
        run_cleanse(&cfg, store.as_ref()).await.unwrap();
        run_curate(&cfg, store.as_ref(), &GoldView::ALL).await.unwrap();
        show(store.as_ref(), metadata::GOLD_TOP_ITEMS, Some(5)).unwrap();
    }

    #[tokio::test]
    async fn run_twice_on_directory_store() {
        use rust_decimal::Decimal;
        use std::collections::HashMap;
        use std::str::FromStr;

        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("sales.csv");
        std::fs::write(
            &csv,
            "Region,Country,Item Type,Sales Channel,Order Priority,Order Date,Order ID,Ship Date,Units Sold,Unit Price,Unit Cost,Total Revenue,Total Cost,Total Profit\n\
             europe,united kingdom,cereal,online,h,1/5/2014,1,1/9/2014,-2,0.123456789012,10,20,10,10\n\
             europe,united kingdom,cereal,online,h,1/20/2014,2,1/25/2014,1,20,15,20,15,5\n\
             europe,france,meat,offline,l,2/1/2014,3,2/3/2014,1,20,13,20,13,7\n",
        )
        .unwrap();
        let cfg = PipelineConfig {
            endpoint: dir.path().join("data").display().to_string(),
            batch_size: 2,
            ..PipelineConfig::default()
        };

        for _ in 0..2 {
            let store = metadata::open_store(&cfg).unwrap();
            run_ingest(&cfg, store.as_ref(), &csv).await.unwrap();
            run_cleanse(&cfg, store.as_ref()).await.unwrap();
            run_curate(&cfg, store.as_ref(), &GoldView::ALL).await.unwrap();
        }

        let store = metadata::open_store(&cfg).unwrap();
        let silver: Vec<metadata::SalesRecord> = store
            .scan_all(metadata::SILVER_SALES)
            .unwrap()
            .map(|r| metadata::SalesRecord::from_row(&r.unwrap()).unwrap())
            .collect();
        assert_eq!(silver.len(), 3);
        let first = silver.iter().find(|r| r.order_id == 1).unwrap();
        assert_eq!(first.unit_price, Decimal::from_str("0.123456789012").unwrap());
        assert_eq!(first.unit_price.to_string(), "0.123456789012");
        assert_eq!(first.units_sold, 0);
        assert_eq!(first.country.as_deref(), Some("United Kingdom"));
        assert_eq!(first.order_priority.as_deref(), Some("H"));
        assert_eq!(first.order_date, Some(time::macros::datetime!(2014-01-05 0:00)));

        let by_country: HashMap<String, Decimal> = store
            .scan_all(metadata::GOLD_REGION_COUNTRY)
            .unwrap()
            .map(|r| {
                let r = r.unwrap();
                (
                    r.text("country").unwrap().unwrap(),
                    r.decimal("total_profit").unwrap().unwrap(),
                )
            })
            .collect();
        assert_eq!(by_country.len(), 2);
        assert_eq!(by_country["United Kingdom"], Decimal::new(15, 0));
        assert_eq!(by_country["France"], Decimal::new(7, 0));

        let top: Vec<String> = store
            .scan_all(metadata::GOLD_TOP_ITEMS)
            .unwrap()
            .map(|r| r.unwrap().text("item_type").unwrap().unwrap())
            .collect();
        assert_eq!(top.len(), 2);
        assert_eq!(
            store.scan_all(metadata::GOLD_MONTHLY).unwrap().count(),
            2
        );
    }
}
