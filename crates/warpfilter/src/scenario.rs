//! Scenario files: a host snapshot plus the inventory and request to filter
//! it against.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warpgrid_filter::{AttestationRecord, PlacementRequest};
use warpgrid_state::{
    Aggregate, ComputeNode, HostState, InstanceRecord, Limits, StateResult, StateStore,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub hosts: Vec<HostState>,
    pub aggregates: Vec<Aggregate>,
    /// Defaults to one node per entry in `hosts`.
    pub compute_nodes: Vec<ComputeNode>,
    pub instances: Vec<InstanceRecord>,
    /// Canned responses for the attestation service.
    pub attestation: Vec<AttestationRecord>,
    pub request: PlacementRequest,
    /// Pins the clock used for heartbeat and attestation freshness.
    pub now: Option<DateTime<Utc>>,
}

impl Scenario {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    /// Load aggregates, compute nodes and instances into `store`.
    pub fn seed(&self, store: &StateStore) -> StateResult<()> {
        for aggregate in &self.aggregates {
            store.put_aggregate(aggregate)?;
        }

        if self.compute_nodes.is_empty() {
            for host in &self.hosts {
                let node = ComputeNode::new(&host.host, &host.nodename);
                store.put_compute_node(&node)?;
            }
        } else {
            for node in &self.compute_nodes {
                store.put_compute_node(node)?;
            }
        }

        for instance in &self.instances {
            store.put_instance(instance)?;
        }
        Ok(())
    }
}

/// One eligible host as printed by `warpfilter check`.
#[derive(Debug, Serialize)]
pub struct EligibleHost<'a> {
    pub host: &'a str,
    pub node: &'a str,
    pub limits: &'a Limits,
}

impl<'a> From<&'a HostState> for EligibleHost<'a> {
    fn from(state: &'a HostState) -> Self {
        Self {
            host: &state.host,
            node: &state.nodename,
            limits: &state.limits,
        }
    }
}
