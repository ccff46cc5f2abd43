use anyhow::{anyhow, Result};
use csv_async::StringRecord;
use metadata::SalesRecord;
use rust_decimal::Decimal;
use std::str::FromStr;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

pub const SALES_SCHEMA_MISSING: &str = "SALES_SCHEMA_MISSING";
pub const SALES_ID_INVALID: &str = "SALES_ID_INVALID";
pub const SALES_DATE_INVALID: &str = "SALES_DATE_INVALID";
pub const SALES_INT_INVALID: &str = "SALES_INT_INVALID";
pub const SALES_DECIMAL_INVALID: &str = "SALES_DECIMAL_INVALID";

/// Why a source row could not be coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reject {
    pub code: &'static str,
    pub detail: String,
}

impl Reject {
    fn new(code: &'static str, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

/// Positions of the source columns in the CSV header.
#[derive(Debug, Clone)]
pub struct SourceColumns {
    order_id: usize,
    region: usize,
    country: usize,
    item_type: usize,
    sales_channel: usize,
    order_priority: usize,
    order_date: usize,
    ship_date: usize,
    units_sold: usize,
    unit_price: usize,
    unit_cost: usize,
    total_revenue: usize,
    total_cost: usize,
    total_profit: usize,
}

/// `"Units Sold"`, `"UnitsSold"` and `"units_sold"` all name the same column.
fn header_key(h: &str) -> String {
    h.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

impl SourceColumns {
    pub fn from_headers(headers: &StringRecord) -> Result<Self> {
        let keys: Vec<String> = headers.iter().map(header_key).collect();
        let g = |name: &str| -> Result<usize> {
            let want = header_key(name);
            keys.iter()
                .position(|k| *k == want)
                .ok_or_else(|| anyhow!("missing column '{name}' in source header"))
        };
        Ok(Self {
            order_id: g("Order ID")?,
            region: g("Region")?,
            country: g("Country")?,
            item_type: g("Item Type")?,
            sales_channel: g("Sales Channel")?,
            order_priority: g("Order Priority")?,
            order_date: g("Order Date")?,
            ship_date: g("Ship Date")?,
            units_sold: g("Units Sold")?,
            unit_price: g("Unit Price")?,
            unit_cost: g("Unit Cost")?,
            total_revenue: g("Total Revenue")?,
            total_cost: g("Total Cost")?,
            total_profit: g("Total Profit")?,
        })
    }
}

fn cell(rec: &StringRecord, idx: usize) -> Option<&str> {
    rec.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

fn required<'r>(rec: &'r StringRecord, idx: usize, name: &str) -> Result<&'r str, Reject> {
    cell(rec, idx).ok_or_else(|| Reject::new(SALES_SCHEMA_MISSING, format!("missing {name}")))
}

fn text(rec: &StringRecord, idx: usize) -> Option<String> {
    cell(rec, idx).map(str::to_string)
}

/// External date format `M/D/YYYY`, leading zeros optional.
pub fn parse_date(s: &str) -> Option<PrimitiveDateTime> {
    let fmt = format_description!("[month padding:none]/[day padding:none]/[year]");
    Date::parse(s.trim(), fmt).ok().map(Date::midnight)
}

fn date(rec: &StringRecord, idx: usize, name: &str) -> Result<Option<PrimitiveDateTime>, Reject> {
    match cell(rec, idx) {
        None => Ok(None),
        Some(s) => parse_date(s)
            .map(Some)
            .ok_or_else(|| Reject::new(SALES_DATE_INVALID, format!("{name}: '{s}' is not M/D/YYYY"))),
    }
}

pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let t = s.trim();
    Decimal::from_str(t)
        .or_else(|_| Decimal::from_scientific(t))
        .ok()
}

fn decimal(rec: &StringRecord, idx: usize, name: &str) -> Result<Decimal, Reject> {
    let s = required(rec, idx, name)?;
    parse_decimal(s)
        .ok_or_else(|| Reject::new(SALES_DECIMAL_INVALID, format!("{name}: '{s}' is not a decimal")))
}

/// Coerce one CSV row into a canonical record. Text is trimmed and empty
/// cells become nulls; no other cleaning happens here.
pub fn parse_record(rec: &StringRecord, cols: &SourceColumns) -> Result<SalesRecord, Reject> {
    let id_s = required(rec, cols.order_id, "order id")?;
    let order_id = id_s
        .parse::<i64>()
        .map_err(|_| Reject::new(SALES_ID_INVALID, format!("order id: '{id_s}'")))?;
    let units_s = required(rec, cols.units_sold, "units sold")?;
    let units_sold = units_s
        .parse::<i32>()
        .map_err(|_| Reject::new(SALES_INT_INVALID, format!("units sold: '{units_s}'")))?;

    Ok(SalesRecord {
        order_id,
        region: text(rec, cols.region),
        country: text(rec, cols.country),
        item_type: text(rec, cols.item_type),
        sales_channel: text(rec, cols.sales_channel),
        order_priority: text(rec, cols.order_priority),
        order_date: date(rec, cols.order_date, "order date")?,
        ship_date: date(rec, cols.ship_date, "ship date")?,
        units_sold,
        unit_price: decimal(rec, cols.unit_price, "unit price")?,
        unit_cost: decimal(rec, cols.unit_cost, "unit cost")?,
        total_revenue: decimal(rec, cols.total_revenue, "total revenue")?,
        total_cost: decimal(rec, cols.total_cost, "total cost")?,
        total_profit: decimal(rec, cols.total_profit, "total profit")?,
    })
}
