use metadata::SalesRecord;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;

/// A group's running sum left the range of `Decimal`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{measure} overflowed while summing group {group}")]
pub struct AggregateOverflow {
    pub measure: &'static str,
    pub group: String,
}

/// Per-group state folded over the records of one group. Only ever added to.
pub trait Accumulator: Default {
    /// Fold in one record. On overflow, returns the name of the measure.
    fn add(&mut self, rec: &SalesRecord) -> Result<(), &'static str>;
}

fn sum_into(total: &mut Decimal, v: Decimal, measure: &'static str) -> Result<(), &'static str> {
    *total = total.checked_add(v).ok_or(measure)?;
    Ok(())
}

/// Revenue, cost and profit summed over a group.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AggregateBucket {
    pub total_revenue: Decimal,
    pub total_cost: Decimal,
    pub total_profit: Decimal,
}

impl Accumulator for AggregateBucket {
    fn add(&mut self, rec: &SalesRecord) -> Result<(), &'static str> {
        sum_into(&mut self.total_revenue, rec.total_revenue, "total_revenue")?;
        sum_into(&mut self.total_cost, rec.total_cost, "total_cost")?;
        sum_into(&mut self.total_profit, rec.total_profit, "total_profit")
    }
}

/// Profit only, for rankings.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProfitSum(pub Decimal);

impl Accumulator for ProfitSum {
    fn add(&mut self, rec: &SalesRecord) -> Result<(), &'static str> {
        sum_into(&mut self.0, rec.total_profit, "total_profit")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouped<K: Eq + Hash, A> {
    pub groups: HashMap<K, A>,
    /// Records read, grouped or not.
    pub records: u64,
    /// Records whose key extractor returned `None`.
    pub skipped: u64,
}

impl<K: Eq + Hash, A> Default for Grouped<K, A> {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
            records: 0,
            skipped: 0,
        }
    }
}

/// Single pass over `records`: every record whose key is `Some` is folded
/// into the accumulator for that key, created on first sight. Keys compare
/// by value. Stops at the first error, read or overflow, discarding whatever
/// was accumulated.
pub fn try_group_by<I, E, K, A, F>(records: I, mut extract_key: F) -> Result<Grouped<K, A>, E>
where
    I: IntoIterator<Item = Result<SalesRecord, E>>,
    E: From<AggregateOverflow>,
    K: Eq + Hash + Debug,
    A: Accumulator,
    F: FnMut(&SalesRecord) -> Option<K>,
{
    let overflow = |key: &K, measure| AggregateOverflow {
        measure,
        group: format!("{key:?}"),
    };
    let mut out: Grouped<K, A> = Grouped::default();
    for rec in records {
        let rec = rec?;
        out.records += 1;
        let Some(key) = extract_key(&rec) else {
            out.skipped += 1;
            continue;
        };
        if let Some(acc) = out.groups.get_mut(&key) {
            acc.add(&rec).map_err(|m| overflow(&key, m))?;
        } else {
            let mut acc = A::default();
            acc.add(&rec).map_err(|m| overflow(&key, m))?;
            out.groups.insert(key, acc);
        }
    }
    Ok(out)
}

pub fn group_by<I, K, A, F>(records: I, extract_key: F) -> Result<Grouped<K, A>, AggregateOverflow>
where
    I: IntoIterator<Item = SalesRecord>,
    K: Eq + Hash + Debug,
    A: Accumulator,
    F: FnMut(&SalesRecord) -> Option<K>,
{
    try_group_by(records.into_iter().map(Ok), extract_key)
}
