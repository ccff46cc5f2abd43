use storage::{ColumnType, TableDescriptor};

pub const BRONZE_SALES: &str = "bronze_sales";
pub const BRONZE_REJECTS: &str = "bronze_sales_rejects";
pub const SILVER_SALES: &str = "silver_sales";
pub const GOLD_REGION_COUNTRY: &str = "gold_total_sales_region_country";
pub const GOLD_MONTHLY: &str = "gold_monthly_sales";
pub const GOLD_TOP_ITEMS: &str = "gold_top_items";

/// Column order shared by the bronze and silver tables and by
/// [`crate::SalesRecord::to_values`].
pub const SALES_COLUMNS: [&str; 14] = [
    "order_id",
    "region",
    "country",
    "item_type",
    "sales_channel",
    "order_priority",
    "order_date",
    "ship_date",
    "units_sold",
    "unit_price",
    "unit_cost",
    "total_revenue",
    "total_cost",
    "total_profit",
];

fn sales_table(name: &str) -> TableDescriptor {
    use ColumnType::*;
    TableDescriptor::new(name)
        .column("order_id", BigInt)
        .column("region", Text)
        .column("country", Text)
        .column("item_type", Text)
        .column("sales_channel", Text)
        .column("order_priority", Text)
        .column("order_date", Timestamp)
        .column("ship_date", Timestamp)
        .column("units_sold", Int)
        .column("unit_price", Decimal)
        .column("unit_cost", Decimal)
        .column("total_revenue", Decimal)
        .column("total_cost", Decimal)
        .column("total_profit", Decimal)
        .partition_key(&["order_id"])
}

pub fn bronze_sales() -> TableDescriptor {
    sales_table(BRONZE_SALES)
}

pub fn silver_sales() -> TableDescriptor {
    sales_table(SILVER_SALES)
}

/// Rows the bronze stage could not coerce, keyed by where they came from.
pub fn bronze_rejects() -> TableDescriptor {
    use ColumnType::*;
    TableDescriptor::new(BRONZE_REJECTS)
        .column("source_file", Text)
        .column("row_number", BigInt)
        .column("error_code", Text)
        .column("error_detail", Text)
        .column("raw_line", Text)
        .partition_key(&["source_file"])
        .clustering_key(&["row_number"])
}

pub fn gold_region_country() -> TableDescriptor {
    use ColumnType::*;
    TableDescriptor::new(GOLD_REGION_COUNTRY)
        .column("region", Text)
        .column("country", Text)
        .column("total_revenue", Decimal)
        .column("total_cost", Decimal)
        .column("total_profit", Decimal)
        .partition_key(&["region"])
        .clustering_key(&["country"])
}

pub fn gold_monthly() -> TableDescriptor {
    use ColumnType::*;
    TableDescriptor::new(GOLD_MONTHLY)
        .column("year", Int)
        .column("month", Int)
        .column("total_revenue", Decimal)
        .column("total_cost", Decimal)
        .column("total_profit", Decimal)
        .partition_key(&["year", "month"])
}

pub fn gold_top_items() -> TableDescriptor {
    use ColumnType::*;
    TableDescriptor::new(GOLD_TOP_ITEMS)
        .column("item_type", Text)
        .column("total_profit", Decimal)
        .partition_key(&["item_type"])
}

/// Every table the pipeline writes, in stage order.
pub fn all_tables() -> Vec<TableDescriptor> {
    vec![
        bronze_sales(),
        bronze_rejects(),
        silver_sales(),
        gold_region_country(),
        gold_monthly(),
        gold_top_items(),
    ]
}
