use curate::{monthly, region_country, top_items, AggregateBucket};
use metadata::SalesRecord;
use proptest::prelude::*;
use rust_decimal::Decimal;
use time::{Date, Month, PrimitiveDateTime, Time};

fn record() -> impl Strategy<Value = SalesRecord> {
    (
        prop::option::of(prop::sample::select(vec!["Asia", "Europe", "Oceania"])),
        prop::option::of(prop::sample::select(vec!["Chad", "Peru", "Fiji", "Laos"])),
        prop::option::of(prop::sample::select(vec![
            "Baby Food", "Beverages", "Cereal", "Clothes", "Cosmetics", "Fruits",
            "Household", "Meat", "Office Supplies", "Personal Care", "Snacks", "Vegetables",
        ])),
        prop::option::of((2010i32..2018, 1u8..=12, 1u8..=28)),
        -1_000_000i64..1_000_000,
        0i64..1_000_000,
    )
        .prop_map(|(region, country, item, date, profit_cents, cost_cents)| {
            let order_date = date.map(|(y, m, d)| {
                let month = Month::try_from(m).unwrap();
                PrimitiveDateTime::new(Date::from_calendar_date(y, month, d).unwrap(), Time::MIDNIGHT)
            });
            let cost = Decimal::new(cost_cents, 2);
            let profit = Decimal::new(profit_cents, 2);
            SalesRecord {
                order_id: 0,
                region: region.map(str::to_string),
                country: country.map(str::to_string),
                item_type: item.map(str::to_string),
                sales_channel: None,
                order_priority: None,
                order_date,
                ship_date: None,
                units_sold: 1,
                unit_price: cost + profit,
                unit_cost: cost,
                total_revenue: cost + profit,
                total_cost: cost,
                total_profit: profit,
            }
        })
}

fn total(buckets: impl Iterator<Item = AggregateBucket>) -> AggregateBucket {
    buckets.fold(AggregateBucket::default(), |mut acc, b| {
        acc.total_revenue += b.total_revenue;
        acc.total_cost += b.total_cost;
        acc.total_profit += b.total_profit;
        acc
    })
}

proptest! {
    #[test]
    fn region_country_buckets_account_for_every_record(records in prop::collection::vec(record(), 0..200)) {
        let expected_profit: Decimal = records.iter().map(|r| r.total_profit).sum();
        let expected_revenue: Decimal = records.iter().map(|r| r.total_revenue).sum();
        let g = region_country(records.clone()).unwrap();
        prop_assert_eq!(g.records as usize, records.len());
        prop_assert_eq!(g.skipped, 0);
        let sum = total(g.groups.into_values());
        prop_assert_eq!(sum.total_profit, expected_profit);
        prop_assert_eq!(sum.total_revenue, expected_revenue);
    }

    #[test]
    fn monthly_buckets_cover_dated_records(records in prop::collection::vec(record(), 0..200)) {
        let dated: Vec<&SalesRecord> = records.iter().filter(|r| r.order_date.is_some()).collect();
        let expected: Decimal = dated.iter().map(|r| r.total_profit).sum();
        let g = monthly(records.clone()).unwrap();
        prop_assert_eq!(g.skipped as usize, records.len() - dated.len());
        prop_assert_eq!(total(g.groups.into_values()).total_profit, expected);
    }

    #[test]
    fn top_items_is_bounded_sorted_and_unique(records in prop::collection::vec(record(), 0..200), k in 0usize..15) {
        let distinct: std::collections::HashSet<&str> =
            records.iter().filter_map(|r| r.item_type.as_deref()).collect();
        let top = top_items(records.clone(), k).unwrap();
        prop_assert_eq!(top.len(), k.min(distinct.len()));
        for w in top.windows(2) {
            prop_assert!(
                w[0].measure > w[1].measure
                    || (w[0].measure == w[1].measure && w[0].label < w[1].label)
            );
        }
        // Nothing left out beats the last kept entry.
        if let Some(last) = top.last() {
            let kept: Vec<&str> = top.iter().map(|e| e.label.as_str()).collect();
            for label in distinct.iter().filter(|l| !kept.contains(*l)) {
                let sum: Decimal = records
                    .iter()
                    .filter(|r| r.item_type.as_deref() == Some(*label))
                    .map(|r| r.total_profit)
                    .sum();
                prop_assert!(sum < last.measure || (sum == last.measure && *label > last.label.as_str()));
            }
        }
    }
}
