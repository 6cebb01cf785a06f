use tracing::debug;
use warpgrid_state::HostState;

use super::HostFilter;
use crate::config::FilterConfig;
use crate::error::FilterResult;
use crate::numa::{fit_instance, limit_topology};
use crate::request::PlacementRequest;

/// Requires the instance's NUMA cells to fit on distinct host cells.
///
/// On success the per-cell limits of the whole host topology are recorded.
#[derive(Debug, Clone, Copy)]
pub struct NumaTopologyFilter {
    cpu_ratio: f64,
    ram_ratio: f64,
}

impl NumaTopologyFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            cpu_ratio: config.cpu_allocation_ratio,
            ram_ratio: config.ram_allocation_ratio,
        }
    }
}

impl HostFilter for NumaTopologyFilter {
    fn name(&self) -> &'static str {
        "NUMATopologyFilter"
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        let Some(wanted) = &request.numa_topology else {
            return Ok(true);
        };
        let Some(topology) = &host.numa_topology else {
            debug!(host = %host.host, node = %host.nodename, "host reports no NUMA topology");
            return Ok(false);
        };

        match fit_instance(topology, wanted, self.cpu_ratio, self.ram_ratio) {
            Some(cells) => {
                let limits = limit_topology(topology, self.cpu_ratio, self.ram_ratio);
                debug!(host = %host.host, node = %host.nodename, ?cells, "NUMA fit");
                host.limits.record_numa(limits);
                Ok(true)
            }
            None => {
                debug!(
                    host = %host.host,
                    node = %host.nodename,
                    "instance NUMA topology does not fit"
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::host_state;
    use warpgrid_state::{HostNumaCell, HostNumaTopology, InstanceNumaCell, InstanceNumaTopology};

    fn numa_host() -> HostState {
        let mut host = host_state("host1", "node1");
        host.numa_topology = Some(HostNumaTopology {
            cells: vec![
                HostNumaCell::new(0, [1, 2], 512),
                HostNumaCell::new(1, [3, 4], 512),
            ],
        });
        host
    }

    fn numa_request(cells: usize) -> PlacementRequest {
        let mut request = PlacementRequest::default();
        request.numa_topology = Some(InstanceNumaTopology {
            cells: (0..cells as u32)
                .map(|i| InstanceNumaCell::new(i, [i + 1], 512))
                .collect(),
        });
        request
    }

    fn filter(cpu_ratio: f64, ram_ratio: f64) -> NumaTopologyFilter {
        NumaTopologyFilter::new(&FilterConfig {
            cpu_allocation_ratio: cpu_ratio,
            ram_allocation_ratio: ram_ratio,
            ..FilterConfig::default()
        })
    }

    fn fits(filter: &NumaTopologyFilter, host: &mut HostState, cells: usize) -> bool {
        let request = numa_request(cells);
        filter.host_passes(host, &request).unwrap()
    }

    #[test]
    fn passes_without_instance_topology() {
        let mut host = numa_host();
        let request = PlacementRequest::default();
        assert!(filter(16.0, 1.5).host_passes(&mut host, &request).unwrap());
        assert!(host.limits.is_empty());
    }

    #[test]
    fn fails_without_host_topology() {
        let mut host = host_state("host1", "node1");
        assert!(!fits(&filter(16.0, 1.5), &mut host, 2));
    }

    #[test]
    fn fits_and_records_limits() {
        let mut host = numa_host();
        assert!(fits(&filter(21.0, 1.3), &mut host, 2));

        let limits = host.limits.numa_topology().unwrap();
        assert_eq!(limits.cells.len(), 2);
        assert_eq!(limits.cell(0).unwrap().cpu_limit, 42.0);
        assert_eq!(limits.cell(1).unwrap().memory_limit, 665);
    }

    #[test]
    fn too_many_cells_fails_without_limits() {
        let mut host = numa_host();
        assert!(!fits(&filter(16.0, 1.5), &mut host, 3));
        assert!(host.limits.numa_topology().is_none());
    }

    #[test]
    fn memory_over_ratio_fails() {
        let mut host = numa_host();
        let topology = host.numa_topology.as_mut().unwrap();
        for cell in &mut topology.cells {
            cell.memory_usage_mb = 256;
        }
        assert!(!fits(&filter(16.0, 1.0), &mut host, 1));
        assert!(fits(&filter(16.0, 1.5), &mut host, 1));
    }
}
