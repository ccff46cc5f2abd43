use anyhow::{anyhow, Context, Result};
use csv_async::{AsyncReaderBuilder, AsyncWriter, StringRecord};
use futures::StreamExt;
use metadata::{bronze_rejects, bronze_sales, PipelineConfig};
use std::path::Path;
use storage::{BatchWriter, Store, Value, WriteTemplate};
use tokio::io::BufReader;

mod parse;

pub use parse::{
    parse_date, parse_decimal, parse_record, Reject, SourceColumns, SALES_DATE_INVALID,
    SALES_DECIMAL_INVALID, SALES_ID_INVALID, SALES_INT_INVALID, SALES_SCHEMA_MISSING,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub rows_in: u64,
    pub rows_out: u64,
    pub rejects: u64,
    pub bytes_in: u64,
}

/// Re-encode a source record as one CSV line, quoting fields as needed.
async fn raw_line(rec: &StringRecord) -> Result<String> {
    let mut w = AsyncWriter::from_writer(Vec::new());
    w.write_record(rec).await.context("re-encode rejected row")?;
    let bytes = w.into_inner().await.context("re-encode rejected row")?;
    let line = String::from_utf8(bytes).context("re-encode rejected row")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// CSV -> `bronze_sales`. Rows that cannot be coerced go to
/// `bronze_sales_rejects` with an error code instead of being stored with
/// nulls.
pub async fn ingest_sales(
    cfg: &PipelineConfig,
    store: &dyn Store,
    source_path: &Path,
) -> Result<IngestStats> {
    if !source_path.exists() {
        return Err(anyhow!("source file not found: {}", source_path.display()));
    }

    let bronze = bronze_sales();
    let rejects_table = bronze_rejects();
    store
        .ensure_schema(&bronze)
        .with_context(|| format!("bronze: ensure schema {}", bronze.name))?;
    store
        .ensure_schema(&rejects_table)
        .with_context(|| format!("bronze: ensure schema {}", rejects_table.name))?;

    let f = tokio::fs::File::open(source_path)
        .await
        .with_context(|| format!("open {}", source_path.display()))?;
    let bytes_in = f.metadata().await?.len();
    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(true)
        .delimiter(b',')
        .flexible(true)
        .create_reader(BufReader::new(f));

    let headers: StringRecord = rdr.headers().await?.clone();
    if headers.is_empty() {
        return Err(anyhow!("empty CSV header in {}", source_path.display()));
    }
    let cols = SourceColumns::from_headers(&headers)
        .with_context(|| format!("bronze: header of {}", source_path.display()))?;

    let mut out = BatchWriter::new(
        store,
        &WriteTemplate::for_table(&bronze),
        cfg.batch_size,
        cfg.consistency,
    )?;
    let mut rejected = BatchWriter::new(
        store,
        &WriteTemplate::for_table(&rejects_table),
        cfg.batch_size,
        cfg.consistency,
    )?;

    let source_file = source_path.display().to_string();
    let mut rows_in: u64 = 0;
    let mut rejects: u64 = 0;
    let mut records = rdr.records();

    while let Some(rec_res) = records.next().await {
        let rec = rec_res.with_context(|| format!("read {}", source_path.display()))?;
        rows_in += 1;

        match parse_record(&rec, &cols) {
            Ok(sale) => out
                .push(sale.to_values())
                .with_context(|| format!("bronze: write {}", bronze.name))?,
            Err(reject) => {
                tracing::warn!(
                    row = rows_in,
                    code = reject.code,
                    detail = %reject.detail,
                    "rejected source row"
                );
                rejects += 1;
                rejected
                    .push(vec![
                        Value::Text(source_file.clone()),
                        Value::BigInt(rows_in as i64),
                        Value::Text(reject.code.to_string()),
                        Value::Text(reject.detail),
                        Value::Text(raw_line(&rec).await?),
                    ])
                    .with_context(|| format!("bronze: write {}", rejects_table.name))?;
            }
        }
    }

    let written = out
        .finish()
        .with_context(|| format!("bronze: write {}", bronze.name))?;
    rejected
        .finish()
        .with_context(|| format!("bronze: write {}", rejects_table.name))?;

    tracing::info!(
        rows_in,
        rows_out = written.rows_written,
        rejects,
        batches = written.batches,
        "bronze stage complete"
    );

    Ok(IngestStats {
        rows_in,
        rows_out: written.rows_written,
        rejects,
        bytes_in,
    })
}
