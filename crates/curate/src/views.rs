use metadata::SalesRecord;
use rust_decimal::Decimal;
use storage::Value;

use crate::aggregate::{group_by, AggregateBucket, AggregateOverflow, Grouped};

/// `(region, country)`. Nulls are ordinary key values here, so every record
/// lands in exactly one bucket.
pub type RegionCountry = (Option<String>, Option<String>);

pub fn region_country_key(rec: &SalesRecord) -> Option<RegionCountry> {
    Some((rec.region.clone(), rec.country.clone()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u8,
}

/// Calendar year and month of the order date, read as-is (no timezone).
/// Records without an order date have no key.
pub fn year_month_key(rec: &SalesRecord) -> Option<YearMonth> {
    rec.order_date.map(|d| YearMonth {
        year: d.year(),
        month: u8::from(d.month()),
    })
}

pub fn region_country<I>(records: I) -> Result<Grouped<RegionCountry, AggregateBucket>, AggregateOverflow>
where
    I: IntoIterator<Item = SalesRecord>,
{
    group_by(records, region_country_key)
}

pub fn monthly<I>(records: I) -> Result<Grouped<YearMonth, AggregateBucket>, AggregateOverflow>
where
    I: IntoIterator<Item = SalesRecord>,
{
    group_by(records, year_month_key)
}

fn measures(b: &AggregateBucket) -> [Value; 3] {
    [
        Value::Decimal(b.total_revenue),
        Value::Decimal(b.total_cost),
        Value::Decimal(b.total_profit),
    ]
}

pub(crate) fn region_country_row((region, country): RegionCountry, b: AggregateBucket) -> Vec<Value> {
    let mut row = vec![Value::from(region), Value::from(country)];
    row.extend(measures(&b));
    row
}

pub(crate) fn monthly_row(key: YearMonth, b: AggregateBucket) -> Vec<Value> {
    let mut row = vec![Value::Int(key.year), Value::Int(i32::from(key.month))];
    row.extend(measures(&b));
    row
}

pub(crate) fn top_item_row(label: String, measure: Decimal) -> Vec<Value> {
    vec![Value::Text(label), Value::Decimal(measure)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn rec(region: Option<&str>, date: Option<time::PrimitiveDateTime>, profit: i64) -> SalesRecord {
        SalesRecord {
            order_id: profit,
            region: region.map(str::to_string),
            country: Some("X".into()),
            item_type: None,
            sales_channel: None,
            order_priority: None,
            order_date: date,
            ship_date: None,
            units_sold: 1,
            unit_price: Decimal::ONE,
            unit_cost: Decimal::ONE,
            total_revenue: Decimal::new(profit, 0),
            total_cost: Decimal::ZERO,
            total_profit: Decimal::new(profit, 0),
        }
    }

    #[test]
    fn monthly_groups_by_calendar_month_and_skips_undated() {
        let g = monthly(vec![
            rec(None, Some(datetime!(2014-10-01 0:00)), 1),
            rec(None, Some(datetime!(2014-10-31 23:59)), 2),
            rec(None, Some(datetime!(2015-10-01 0:00)), 4),
            rec(None, None, 8),
        ])
        .unwrap();
        assert_eq!(g.skipped, 1);
        assert_eq!(g.groups.len(), 2);
        let oct14 = YearMonth { year: 2014, month: 10 };
        assert_eq!(g.groups[&oct14].total_profit, Decimal::new(3, 0));
    }

    #[test]
    fn null_region_is_its_own_bucket() {
        let g = region_country(vec![rec(None, None, 1), rec(Some("Asia"), None, 2), rec(None, None, 3)])
            .unwrap();
        assert_eq!(g.skipped, 0);
        assert_eq!(g.groups[&(None, Some("X".to_string()))].total_profit, Decimal::new(4, 0));
    }

    #[test]
    fn rows_follow_gold_column_order() {
        let row = monthly_row(
            YearMonth { year: 2012, month: 3 },
            AggregateBucket {
                total_revenue: Decimal::new(3, 0),
                total_cost: Decimal::new(2, 0),
                total_profit: Decimal::ONE,
            },
        );
        assert_eq!(row[0], Value::Int(2012));
        assert_eq!(row[1], Value::Int(3));
        assert_eq!(row[4], Value::Decimal(Decimal::ONE));
    }
}
