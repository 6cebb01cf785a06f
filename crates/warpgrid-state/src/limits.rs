//! Limits recorded on a host during a filter pass.
//!
//! Capacity and NUMA filters record the oversubscribed capacity they
//! checked against so the claim stage can enforce the same numbers. A key
//! is written at most once per pass: the first writer wins and later
//! writes are refused.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::numa::NumaLimitTopology;

/// Resource a limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Vcpu,
    MemoryMb,
    DiskGb,
    NumaTopology,
}

/// A recorded limit value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Limit {
    Amount(f64),
    Numa(NumaLimitTopology),
}

/// Limits keyed by resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Limits {
    entries: BTreeMap<LimitKind, Limit>,
}

impl Limits {
    /// Record a scalar limit. Returns `false` if `kind` was already recorded
    /// in this pass, in which case the existing value is kept.
    pub fn record_amount(&mut self, kind: LimitKind, amount: f64) -> bool {
        debug_assert_ne!(kind, LimitKind::NumaTopology);
        self.record(kind, Limit::Amount(amount))
    }

    /// Record the NUMA limit topology. Same first-writer rule as
    /// [`Limits::record_amount`].
    pub fn record_numa(&mut self, topology: NumaLimitTopology) -> bool {
        self.record(LimitKind::NumaTopology, Limit::Numa(topology))
    }

    fn record(&mut self, kind: LimitKind, limit: Limit) -> bool {
        if self.entries.contains_key(&kind) {
            return false;
        }
        self.entries.insert(kind, limit);
        true
    }

    pub fn get(&self, kind: LimitKind) -> Option<&Limit> {
        self.entries.get(&kind)
    }

    /// Scalar value for `kind`, if one was recorded.
    pub fn amount(&self, kind: LimitKind) -> Option<f64> {
        match self.entries.get(&kind) {
            Some(Limit::Amount(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn numa_topology(&self) -> Option<&NumaLimitTopology> {
        match self.entries.get(&LimitKind::NumaTopology) {
            Some(Limit::Numa(t)) => Some(t),
            _ => None,
        }
    }

    pub fn contains(&self, kind: LimitKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LimitKind, &Limit)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numa::NumaCellLimit;

    #[test]
    fn first_write_wins() {
        let mut limits = Limits::default();
        assert!(limits.record_amount(LimitKind::Vcpu, 8.0));
        assert!(!limits.record_amount(LimitKind::Vcpu, 12.0));
        assert_eq!(limits.amount(LimitKind::Vcpu), Some(8.0));
    }

    #[test]
    fn clear_allows_rewrite() {
        let mut limits = Limits::default();
        limits.record_amount(LimitKind::DiskGb, 1.0);
        limits.clear();
        assert!(limits.is_empty());
        assert!(limits.record_amount(LimitKind::DiskGb, 2.0));
        assert_eq!(limits.amount(LimitKind::DiskGb), Some(2.0));
    }

    #[test]
    fn numa_and_amount_are_distinct() {
        let mut limits = Limits::default();
        limits.record_amount(LimitKind::MemoryMb, 1024.0);
        limits.record_numa(NumaLimitTopology {
            cells: vec![NumaCellLimit {
                id: 0,
                cpu_limit: 4.0,
                memory_limit: 768,
            }],
        });

        assert_eq!(limits.amount(LimitKind::NumaTopology), None);
        assert_eq!(limits.numa_topology().map(|t| t.cells.len()), Some(1));
        assert!(limits.contains(LimitKind::MemoryMb));
    }

    #[test]
    fn serializes_as_keyed_map() {
        let mut limits = Limits::default();
        limits.record_amount(LimitKind::Vcpu, 8.0);
        let json = serde_json::to_value(&limits).unwrap();
        assert_eq!(json["vcpu"], 8.0);
    }
}
