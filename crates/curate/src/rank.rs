use metadata::SalesRecord;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::aggregate::{try_group_by, AggregateOverflow, Grouped, ProfitSum};

pub const TOP_K: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopKEntry {
    pub label: String,
    pub measure: Decimal,
}

/// Descending by measure; equal measures in ascending byte order of the
/// label, so identical input always ranks identically.
fn ranking(a: &TopKEntry, b: &TopKEntry) -> Ordering {
    b.measure
        .cmp(&a.measure)
        .then_with(|| a.label.cmp(&b.label))
}

/// Order groups by their summed measure and keep the first `k`.
pub fn rank_top_k(groups: HashMap<String, ProfitSum>, k: usize) -> Vec<TopKEntry> {
    let mut entries: Vec<TopKEntry> = groups
        .into_iter()
        .map(|(label, sum)| TopKEntry {
            label,
            measure: sum.0,
        })
        .collect();
    if entries.len() > k && k > 0 {
        entries.select_nth_unstable_by(k - 1, ranking);
        entries.truncate(k);
    }
    entries.sort_by(ranking);
    entries.truncate(k);
    entries
}

/// Sum profit per item type, leaving out records without one, and rank.
pub fn try_top_items<I, E>(records: I, k: usize) -> Result<(Vec<TopKEntry>, Grouped<String, ProfitSum>), E>
where
    I: IntoIterator<Item = Result<SalesRecord, E>>,
    E: From<AggregateOverflow>,
{
    let mut grouped: Grouped<String, ProfitSum> =
        try_group_by(records, |r: &SalesRecord| r.item_type.clone())?;
    let groups = std::mem::take(&mut grouped.groups);
    Ok((rank_top_k(groups, k), grouped))
}

pub fn top_items<I>(records: I, k: usize) -> Result<Vec<TopKEntry>, AggregateOverflow>
where
    I: IntoIterator<Item = SalesRecord>,
{
    try_top_items(records.into_iter().map(Ok), k).map(|(entries, _)| entries)
}
