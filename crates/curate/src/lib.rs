//! Gold stage. Each view is a full scan of `silver_sales`, an in-memory
//! grouping, then a batched upsert of one row per group. Nothing is written
//! for a view until its scan has finished.

use anyhow::{anyhow, Context, Result};
use metadata::{silver_sales, PipelineConfig, SalesRecord};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use storage::{BatchWriter, Store, TableDescriptor, Value, WriteTemplate};

mod aggregate;
mod rank;
mod views;

pub use aggregate::{
    group_by, try_group_by, Accumulator, AggregateBucket, AggregateOverflow, Grouped, ProfitSum,
};
pub use rank::{rank_top_k, top_items, try_top_items, TopKEntry, TOP_K};
pub use views::{monthly, region_country, region_country_key, year_month_key, RegionCountry, YearMonth};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoldView {
    RegionCountry,
    Monthly,
    TopItems,
}

impl GoldView {
    pub const ALL: [GoldView; 3] = [GoldView::RegionCountry, GoldView::Monthly, GoldView::TopItems];

    pub fn table(self) -> TableDescriptor {
        match self {
            GoldView::RegionCountry => metadata::gold_region_country(),
            GoldView::Monthly => metadata::gold_monthly(),
            GoldView::TopItems => metadata::gold_top_items(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GoldView::RegionCountry => "region-country",
            GoldView::Monthly => "monthly",
            GoldView::TopItems => "top-items",
        }
    }
}

impl fmt::Display for GoldView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GoldView {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        GoldView::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| anyhow!("unknown gold view '{s}' (expected region-country, monthly or top-items)"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewStats {
    pub view: GoldView,
    pub table: String,
    pub records: u64,
    pub skipped: u64,
    pub groups: u64,
    pub rows_written: u64,
    pub rows_removed: u64,
}

/// Lazily decode `silver_sales`. A row that does not decode is an error, as
/// is a failed scan.
fn scan_silver(store: &dyn Store) -> Result<impl Iterator<Item = Result<SalesRecord>> + '_> {
    let silver = silver_sales();
    let rows = store
        .scan_all(&silver.name)
        .with_context(|| format!("gold: scan {}", silver.name))?;
    Ok(rows.map(|row| {
        let row = row.context("gold: scan silver_sales")?;
        SalesRecord::from_row(&row).context("gold: malformed record in silver_sales")
    }))
}

/// Build the given views one after the other.
pub async fn curate_views(
    cfg: &PipelineConfig,
    store: &dyn Store,
    views: &[GoldView],
) -> Result<Vec<ViewStats>> {
    let mut out = Vec::with_capacity(views.len());
    for &view in views {
        out.push(curate_view(cfg, store, view).await?);
    }
    Ok(out)
}

pub async fn curate_view(cfg: &PipelineConfig, store: &dyn Store, view: GoldView) -> Result<ViewStats> {
    let table = view.table();
    store
        .ensure_schema(&table)
        .with_context(|| format!("gold: ensure schema {}", table.name))?;
    let writer = BatchWriter::new(
        store,
        &WriteTemplate::for_table(&table),
        cfg.batch_size,
        cfg.consistency,
    )
    .with_context(|| format!("gold: prepare {}", table.name))?;

    let records = scan_silver(store)?;
    let mut stats = ViewStats {
        view,
        table: table.name.clone(),
        records: 0,
        skipped: 0,
        groups: 0,
        rows_written: 0,
        rows_removed: 0,
    };

    let written = match view {
        GoldView::RegionCountry => {
            let g: Grouped<RegionCountry, AggregateBucket> =
                try_group_by(records, region_country_key)
                    .with_context(|| format!("gold: aggregate {}", table.name))?;
            stats.records = g.records;
            stats.groups = g.groups.len() as u64;
            writer.write_all(
                g.groups
                    .into_iter()
                    .map(|(key, bucket)| views::region_country_row(key, bucket)),
            )
        }
        GoldView::Monthly => {
            let g: Grouped<YearMonth, AggregateBucket> = try_group_by(records, year_month_key)
                .with_context(|| format!("gold: aggregate {}", table.name))?;
            stats.records = g.records;
            stats.skipped = g.skipped;
            stats.groups = g.groups.len() as u64;
            if g.skipped > 0 {
                tracing::warn!(
                    skipped = g.skipped,
                    table = %table.name,
                    "records without an order date left out"
                );
            }
            writer.write_all(
                g.groups
                    .into_iter()
                    .map(|(key, bucket)| views::monthly_row(key, bucket)),
            )
        }
        GoldView::TopItems => {
            let (top, g) = try_top_items(records, cfg.top_k)
                .with_context(|| format!("gold: aggregate {}", table.name))?;
            stats.records = g.records;
            stats.skipped = g.skipped;
            stats.groups = top.len() as u64;
            let keep: HashSet<String> = top.iter().map(|e| e.label.clone()).collect();
            let written = writer.write_all(
                top.into_iter()
                    .map(|e| views::top_item_row(e.label, e.measure)),
            );
            if written.is_ok() {
                stats.rows_removed = remove_stale_items(cfg, store, &table, &keep)?;
            }
            written
        }
    }
    .with_context(|| format!("gold: write {}", table.name))?;

    stats.rows_written = written.rows_written;
    tracing::info!(
        view = %view,
        table = %table.name,
        records = stats.records,
        groups = stats.groups,
        rows_written = stats.rows_written,
        "gold view complete"
    );
    Ok(stats)
}

/// The ranking table is keyed by label alone, so labels that dropped out of
/// the top K since a previous run have to be deleted explicitly.
fn remove_stale_items(
    cfg: &PipelineConfig,
    store: &dyn Store,
    table: &TableDescriptor,
    keep: &HashSet<String>,
) -> Result<u64> {
    let mut stale = Vec::new();
    for row in store
        .scan_all(&table.name)
        .with_context(|| format!("gold: scan {}", table.name))?
    {
        let row = row.with_context(|| format!("gold: scan {}", table.name))?;
        let label = row.text("item_type")?;
        if !label.as_ref().is_some_and(|l| keep.contains(l)) {
            stale.push(vec![Value::from(label)]);
        }
    }
    let n = stale.len() as u64;
    if n > 0 {
        store
            .delete_keys(&table.name, stale, cfg.consistency)
            .with_context(|| format!("gold: delete stale rows from {}", table.name))?;
        tracing::info!(table = %table.name, removed = n, "dropped items no longer in the ranking");
    }
    Ok(n)
}
