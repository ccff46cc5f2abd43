use rust_decimal::Decimal;
use storage::{Row, Value};
use time::PrimitiveDateTime;

/// One sales order, as stored in the bronze and silver tables.
///
/// `order_id` alone identifies the row: writing the same id twice replaces
/// the first version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesRecord {
    pub order_id: i64,
    pub region: Option<String>,
    pub country: Option<String>,
    pub item_type: Option<String>,
    pub sales_channel: Option<String>,
    pub order_priority: Option<String>,
    pub order_date: Option<PrimitiveDateTime>,
    pub ship_date: Option<PrimitiveDateTime>,
    pub units_sold: i32,
    pub unit_price: Decimal,
    pub unit_cost: Decimal,
    pub total_revenue: Decimal,
    pub total_cost: Decimal,
    pub total_profit: Decimal,
}

impl SalesRecord {
    /// Decode a stored row. Any column of the wrong type, or a null in a
    /// required column, is an error; nothing is coerced here.
    pub fn from_row(row: &Row) -> storage::Result<Self> {
        Ok(Self {
            order_id: row.required("order_id", Row::bigint)?,
            region: row.text("region")?,
            country: row.text("country")?,
            item_type: row.text("item_type")?,
            sales_channel: row.text("sales_channel")?,
            order_priority: row.text("order_priority")?,
            order_date: row.timestamp("order_date")?,
            ship_date: row.timestamp("ship_date")?,
            units_sold: row.required("units_sold", Row::int)?,
            unit_price: row.required("unit_price", Row::decimal)?,
            unit_cost: row.required("unit_cost", Row::decimal)?,
            total_revenue: row.required("total_revenue", Row::decimal)?,
            total_cost: row.required("total_cost", Row::decimal)?,
            total_profit: row.required("total_profit", Row::decimal)?,
        })
    }

    /// Values in [`crate::SALES_COLUMNS`] order.
    pub fn to_values(&self) -> Vec<Value> {
        vec![
            Value::BigInt(self.order_id),
            self.region.clone().into(),
            self.country.clone().into(),
            self.item_type.clone().into(),
            self.sales_channel.clone().into(),
            self.order_priority.clone().into(),
            self.order_date.into(),
            self.ship_date.into(),
            Value::Int(self.units_sold),
            self.unit_price.into(),
            self.unit_cost.into(),
            self.total_revenue.into(),
            self.total_cost.into(),
            self.total_profit.into(),
        ]
    }
}
