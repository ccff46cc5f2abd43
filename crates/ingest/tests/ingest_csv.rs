use metadata::{PipelineConfig, SalesRecord, BRONZE_REJECTS, BRONZE_SALES};
use std::io::Write;
use storage::{MemoryStore, Store};

const HEADER: &str = "Region,Country,Item Type,Sales Channel,Order Priority,Order Date,Order ID,Ship Date,UnitsSold,UnitPrice,UnitCost,TotalRevenue,TotalCost,TotalProfit";

fn cfg() -> PipelineConfig {
    PipelineConfig {
        endpoint: "memory://".into(),
        batch_size: 2,
        ..PipelineConfig::default()
    }
}

fn store() -> MemoryStore {
    let s = MemoryStore::new("medallion_architecture");
    s.ensure_namespace(1).unwrap();
    s
}

fn write_csv(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "{HEADER}").unwrap();
    for l in lines {
        writeln!(f, "{l}").unwrap();
    }
    f.flush().unwrap();
    f
}

#[tokio::test]
async fn good_rows_land_in_bronze_and_bad_rows_in_rejects() {
    let csv = write_csv(&[
        "Sub-Saharan Africa,Chad,Office Supplies,Online,L,1/27/2011,292494523,2/12/2011,4484,651.21,524.96,2920025.64,2353920.64,566105.00",
        "Europe, latvia ,Beverages,Online,C,12/28/2015,361825549,1/23/2016,1075,47.45,31.79,51008.75,34174.25,16834.50",
        "Europe,Norway,Cereal,Offline,h,not-a-date,1,2/2/2012,10,1,1,10,10,0",
        "Asia,Japan,Snacks,Online,M,3/3/2013,2,3/4/2013,ten,1,1,10,10,0",
        "Asia,Nepal,Fruits,Online,M,3/3/2013,3,,-5,9.33,6.92,-46.65,-34.60,-12.05",
    ]);
    let s = store();
    let stats = ingest::ingest_sales(&cfg(), &s, csv.path()).await.unwrap();
    assert_eq!(stats.rows_in, 5);
    assert_eq!(stats.rows_out, 3);
    assert_eq!(stats.rejects, 2);
    assert!(stats.bytes_in > 0);

    let bronze: Vec<SalesRecord> = s
        .scan_all(BRONZE_SALES)
        .unwrap()
        .map(|r| SalesRecord::from_row(&r.unwrap()).unwrap())
        .collect();
    assert_eq!(bronze.len(), 3);
    let latvia = bronze.iter().find(|r| r.order_id == 361825549).unwrap();
    // Bronze trims but does not re-case.
    assert_eq!(latvia.country.as_deref(), Some("latvia"));
    let nepal = bronze.iter().find(|r| r.order_id == 3).unwrap();
    assert_eq!(nepal.units_sold, -5);
    assert_eq!(nepal.ship_date, None);

    let codes: Vec<String> = s
        .scan_all(BRONZE_REJECTS)
        .unwrap()
        .map(|r| r.unwrap().text("error_code").unwrap().unwrap())
        .collect();
    assert_eq!(codes.len(), 2);
    assert!(codes.contains(&ingest::SALES_DATE_INVALID.to_string()));
    assert!(codes.contains(&ingest::SALES_INT_INVALID.to_string()));
}

#[tokio::test]
async fn re_ingesting_the_same_file_does_not_duplicate_rows() {
    let csv = write_csv(&[
        "Europe,France,Cereal,Online,H,1/1/2012,10,1/5/2012,1,2.00,1.00,2.00,1.00,1.00",
        "Europe,Spain,Cereal,Online,H,1/1/2012,11,1/5/2012,1,2.00,1.00,2.00,1.00,1.00",
        "Europe,Italy,Cereal,Online,H,1/1/2012,12,1/5/2012,1,2.00,1.00,2.00,1.00,1.00",
    ]);
    let s = store();
    ingest::ingest_sales(&cfg(), &s, csv.path()).await.unwrap();
    ingest::ingest_sales(&cfg(), &s, csv.path()).await.unwrap();
    assert_eq!(s.row_count(BRONZE_SALES), Some(3));
}

#[tokio::test]
async fn missing_column_aborts_before_any_write() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "Region,Country").unwrap();
    writeln!(f, "Europe,France").unwrap();
    let s = store();
    let err = ingest::ingest_sales(&cfg(), &s, f.path()).await.unwrap_err();
    assert!(format!("{err:#}").contains("missing column"));
    assert_eq!(s.row_count(BRONZE_SALES), Some(0));
}

#[tokio::test]
async fn missing_source_is_an_error() {
    let s = store();
    let res = ingest::ingest_sales(&cfg(), &s, std::path::Path::new("/nonexistent/sales.csv")).await;
    assert!(res.is_err());
}

#[tokio::test]
async fn rejected_rows_keep_their_quoted_fields() {
    let line = r#"Asia,"Tokyo, Japan",Snacks,Online,M,3/3/2013,5,3/4/2013,ten,1,1,10,10,0"#;
    let csv = write_csv(&[line]);
    let s = store();
    let stats = ingest::ingest_sales(&cfg(), &s, csv.path()).await.unwrap();
    assert_eq!(stats.rejects, 1);

    let rejects: Vec<_> = s
        .scan_all(BRONZE_REJECTS)
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert_eq!(rejects.len(), 1);
    assert_eq!(rejects[0].text("raw_line").unwrap().as_deref(), Some(line));
    assert_eq!(rejects[0].bigint("row_number").unwrap(), Some(1));
}
