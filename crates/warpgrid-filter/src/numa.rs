//! Fitting an instance NUMA topology onto a host topology.
//!
//! Each instance cell, in request order, takes the lowest-id host cell not
//! already taken that still has room under the oversubscription ratios.
//! There is no backtracking: an earlier cell never moves to make room for a
//! later one.

use std::collections::BTreeSet;

use warpgrid_state::{
    HostNumaCell, HostNumaTopology, InstanceNumaCell, InstanceNumaTopology, NumaCellLimit,
    NumaLimitTopology,
};

/// Oversubscribed capacity of every host cell.
pub fn limit_topology(
    host: &HostNumaTopology,
    cpu_ratio: f64,
    ram_ratio: f64,
) -> NumaLimitTopology {
    NumaLimitTopology {
        cells: host
            .cells
            .iter()
            .map(|cell| NumaCellLimit {
                id: cell.id,
                cpu_limit: f64::from(cell.cpu_count()) * cpu_ratio,
                memory_limit: memory_limit(cell, ram_ratio),
            })
            .collect(),
    }
}

/// Host cell id assigned to each instance cell, in instance order, or
/// `None` if the instance does not fit.
pub fn fit_instance(
    host: &HostNumaTopology,
    instance: &InstanceNumaTopology,
    cpu_ratio: f64,
    ram_ratio: f64,
) -> Option<Vec<u32>> {
    if instance.cells.len() > host.cells.len() {
        return None;
    }

    let mut host_cells: Vec<&HostNumaCell> = host.cells.iter().collect();
    host_cells.sort_by_key(|c| c.id);

    let mut taken: BTreeSet<u32> = BTreeSet::new();
    let mut assignment = Vec::with_capacity(instance.cells.len());

    for wanted in &instance.cells {
        let cell = host_cells
            .iter()
            .filter(|c| !taken.contains(&c.id))
            .find(|c| cell_fits(c, wanted, cpu_ratio, ram_ratio))?;
        taken.insert(cell.id);
        assignment.push(cell.id);
    }
    Some(assignment)
}

fn cell_fits(
    host: &HostNumaCell,
    wanted: &InstanceNumaCell,
    cpu_ratio: f64,
    ram_ratio: f64,
) -> bool {
    let cpus = f64::from(host.cpu_usage) + wanted.cpuset.len() as f64;
    let cpu_limit = f64::from(host.cpu_count()) * cpu_ratio;
    let memory = host.memory_usage_mb.saturating_add(wanted.memory_mb);
    cpus <= cpu_limit && memory <= memory_limit(host, ram_ratio)
}

fn memory_limit(cell: &HostNumaCell, ram_ratio: f64) -> u64 {
    (cell.memory_mb as f64 * ram_ratio).floor() as u64
}
