//! Read-only query interface over hosts, aggregates and instances.
//!
//! Filters depend on this trait rather than on a concrete store so the
//! scheduler can back it with whatever inventory it already keeps.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::StateResult;
use crate::types::{Aggregate, ComputeNode, HostName, InstanceRecord};

pub trait HostDirectory: Send + Sync {
    /// Every aggregate that lists `host` as a member.
    fn aggregates_for_host(&self, host: &str) -> StateResult<Vec<Aggregate>>;

    /// Member hosts of the aggregate `name`, or `None` if it does not exist.
    fn aggregate_hosts(&self, name: &str) -> StateResult<Option<Vec<HostName>>>;

    /// All compute nodes known to the cluster.
    fn compute_nodes(&self) -> StateResult<Vec<ComputeNode>>;

    /// Instances currently placed on `host`.
    fn instances_on_host(&self, host: &str) -> StateResult<Vec<InstanceRecord>>;

    /// Raw values of `key`, one per aggregate of `host` that defines it.
    fn metadata_values(&self, host: &str, key: &str) -> StateResult<Vec<String>> {
        Ok(self
            .aggregates_for_host(host)?
            .into_iter()
            .filter_map(|mut agg| agg.metadata.remove(key))
            .collect())
    }

    /// Metadata of all aggregates of `host`, merged into key → set of values.
    ///
    /// With `key` set, only that key is collected.
    fn metadata_for_host(
        &self,
        host: &str,
        key: Option<&str>,
    ) -> StateResult<BTreeMap<String, BTreeSet<String>>> {
        let mut merged: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for aggregate in self.aggregates_for_host(host)? {
            for (k, v) in aggregate.metadata {
                if key.is_some_and(|wanted| wanted != k) {
                    continue;
                }
                merged.entry(k).or_default().insert(v);
            }
        }
        Ok(merged)
    }
}
