//! Domain types for the host inventory.
//!
//! [`HostState`] is the per-host snapshot refreshed by the state sync loop
//! every scheduling cycle. [`Aggregate`], [`ComputeNode`] and
//! [`InstanceRecord`] are long-lived and persisted in the
//! [`StateStore`](crate::StateStore).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::limits::Limits;
use crate::numa::HostNumaTopology;
use crate::pci::PciDeviceStats;

/// Name of a compute host (the service host).
pub type HostName = String;

/// Name of a hypervisor node on a host.
pub type NodeName = String;

// ── Aggregates ─────────────────────────────────────────────────────

/// A named, possibly overlapping group of hosts sharing metadata.
///
/// Metadata values are free-form strings; consumers parse them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Aggregate {
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<HostName>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Aggregate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a member host (builder style).
    pub fn with_host(mut self, host: impl Into<HostName>) -> Self {
        let host = host.into();
        if !self.hosts.contains(&host) {
            self.hosts.push(host);
        }
        self
    }

    /// Set a metadata key (builder style).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn contains_host(&self, host: &str) -> bool {
        self.hosts.iter().any(|h| h == host)
    }

    /// Table key: the aggregate name.
    pub fn table_key(&self) -> String {
        self.name.clone()
    }
}

// ── Compute nodes ──────────────────────────────────────────────────

/// A hypervisor node registered under a service host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ComputeNode {
    pub host: HostName,
    pub hypervisor_hostname: NodeName,
}

impl ComputeNode {
    pub fn new(host: impl Into<HostName>, node: impl Into<NodeName>) -> Self {
        Self {
            host: host.into(),
            hypervisor_hostname: node.into(),
        }
    }

    /// Table key: `{host}:{hypervisor_hostname}`.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.host, self.hypervisor_hostname)
    }
}

// ── Instances ──────────────────────────────────────────────────────

/// An instance already running on a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: String,
    pub host: HostName,
    pub instance_type_id: u64,
}

impl InstanceRecord {
    /// Table key: `{host}:{id}`.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.host, self.id)
    }
}

// ── Host snapshot ──────────────────────────────────────────────────

/// Compute service descriptor attached to a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ServiceInfo {
    pub disabled: bool,
    pub disabled_reason: Option<String>,
    pub availability_zone: Option<String>,
    /// Last heartbeat reported by the service.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Per-host snapshot evaluated by the filters.
///
/// Capacity counters are owned by the state sync loop. During a filter
/// pass the only field filters write is [`HostState::limits`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct HostState {
    pub host: HostName,
    pub nodename: NodeName,

    /// Physical vCPUs. `None` (or zero) means the host has not reported.
    pub vcpus_total: Option<u32>,
    pub vcpus_used: u32,

    /// Free RAM; negative once the host is oversubscribed.
    pub free_ram_mb: i64,
    pub total_usable_ram_mb: Option<u64>,

    /// Free disk; negative once the host is oversubscribed.
    pub free_disk_mb: i64,
    pub total_usable_disk_gb: Option<u64>,

    pub num_io_ops: u32,
    pub num_instances: u32,

    pub numa_topology: Option<HostNumaTopology>,
    pub pci_stats: Option<PciDeviceStats>,
    pub metrics: HashMap<String, f64>,
    pub service: ServiceInfo,

    /// Effective oversubscribed capacities computed during the current pass.
    pub limits: Limits,
}

impl HostState {
    pub fn new(host: impl Into<HostName>, nodename: impl Into<NodeName>) -> Self {
        Self {
            host: host.into(),
            nodename: nodename.into(),
            ..Default::default()
        }
    }

    /// Start a new evaluation pass: limits from a previous pass are dropped.
    pub fn begin_pass(&mut self) {
        self.limits.clear();
    }
}
