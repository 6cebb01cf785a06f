//! NUMA topology types.
//!
//! Hosts report their cells with current usage; instances request cells;
//! the NUMA filter turns a successful fit into a [`NumaLimitTopology`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A NUMA cell requested by an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceNumaCell {
    pub id: u32,
    pub cpuset: BTreeSet<u32>,
    pub memory_mb: u64,
}

impl InstanceNumaCell {
    pub fn new(id: u32, cpus: impl IntoIterator<Item = u32>, memory_mb: u64) -> Self {
        Self {
            id,
            cpuset: cpus.into_iter().collect(),
            memory_mb,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InstanceNumaTopology {
    pub cells: Vec<InstanceNumaCell>,
}

/// A NUMA cell on a host, with usage already claimed by running instances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostNumaCell {
    pub id: u32,
    pub cpuset: BTreeSet<u32>,
    pub memory_mb: u64,
    #[serde(default)]
    pub cpu_usage: u32,
    #[serde(default)]
    pub memory_usage_mb: u64,
}

impl HostNumaCell {
    pub fn new(id: u32, cpus: impl IntoIterator<Item = u32>, memory_mb: u64) -> Self {
        Self {
            id,
            cpuset: cpus.into_iter().collect(),
            memory_mb,
            cpu_usage: 0,
            memory_usage_mb: 0,
        }
    }

    pub fn cpu_count(&self) -> u32 {
        self.cpuset.len() as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HostNumaTopology {
    pub cells: Vec<HostNumaCell>,
}

/// Oversubscribed capacity of one host cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NumaCellLimit {
    pub id: u32,
    pub cpu_limit: f64,
    pub memory_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NumaLimitTopology {
    pub cells: Vec<NumaCellLimit>,
}

impl NumaLimitTopology {
    pub fn cell(&self, id: u32) -> Option<&NumaCellLimit> {
        self.cells.iter().find(|c| c.id == id)
    }
}
