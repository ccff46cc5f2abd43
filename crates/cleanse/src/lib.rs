use anyhow::{Context, Result};
use metadata::{bronze_sales, silver_sales, PipelineConfig, SalesRecord};
use storage::{BatchWriter, Store, WriteTemplate};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanseStats {
    pub rows_in: u64,
    pub rows_out: u64,
    pub units_clamped: u64,
}

/// Upper-case the first letter of every word and lower-case the rest. A word
/// starts after any non-alphabetic character, so `o'neil` becomes `O'Neil`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

/// Trim, then apply `case`. Null and blank both come out as null.
fn clean_text(v: Option<String>, case: impl Fn(&str) -> String) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(case)
}

/// The silver rules, one record at a time. Identifier, dates and decimals
/// pass through untouched.
pub fn clean_record(rec: SalesRecord) -> SalesRecord {
    SalesRecord {
        region: clean_text(rec.region, title_case),
        country: clean_text(rec.country, title_case),
        item_type: clean_text(rec.item_type, title_case),
        sales_channel: clean_text(rec.sales_channel, title_case),
        order_priority: clean_text(rec.order_priority, str::to_uppercase),
        units_sold: rec.units_sold.max(0),
        ..rec
    }
}

/// Lazily clean a sequence of decoded records. Errors pass through unchanged
/// so the caller can stop at the first one.
pub fn cleanse<I, E>(records: I) -> impl Iterator<Item = Result<SalesRecord, E>>
where
    I: IntoIterator<Item = Result<SalesRecord, E>>,
{
    records.into_iter().map(|r| r.map(clean_record))
}

/// `bronze_sales` -> `silver_sales`. Same keys, same row count. A bronze row
/// that does not decode as a sales record stops the stage.
pub async fn cleanse_sales(cfg: &PipelineConfig, store: &dyn Store) -> Result<CleanseStats> {
    let bronze = bronze_sales();
    let silver = silver_sales();
    store
        .ensure_schema(&silver)
        .with_context(|| format!("silver: ensure schema {}", silver.name))?;

    let mut out = BatchWriter::new(
        store,
        &WriteTemplate::for_table(&silver),
        cfg.batch_size,
        cfg.consistency,
    )
    .with_context(|| format!("silver: prepare {}", silver.name))?;

    let mut stats = CleanseStats::default();
    let rows = store
        .scan_all(&bronze.name)
        .with_context(|| format!("silver: scan {}", bronze.name))?;
    let decoded = rows.map(|row| -> Result<SalesRecord> {
        let row = row.with_context(|| format!("silver: scan {}", bronze.name))?;
        let rec = SalesRecord::from_row(&row)
            .with_context(|| format!("silver: malformed record in {}", bronze.name))?;
        stats.rows_in += 1;
        if rec.units_sold < 0 {
            stats.units_clamped += 1;
        }
        Ok(rec)
    });
    for rec in cleanse(decoded) {
        out.push(rec?.to_values())
            .with_context(|| format!("silver: write {}", silver.name))?;
    }
    let written = out
        .finish()
        .with_context(|| format!("silver: write {}", silver.name))?;
    stats.rows_out = written.rows_written;

    if stats.units_clamped > 0 {
        tracing::warn!(count = stats.units_clamped, "clamped negative units sold to zero");
    }
    tracing::info!(
        rows_in = stats.rows_in,
        rows_out = stats.rows_out,
        batches = written.batches,
        "silver stage complete"
    );
    Ok(stats)
}
