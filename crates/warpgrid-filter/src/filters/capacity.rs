//! Oversubscribed capacity filters: CPU, RAM, disk, I/O and instance count.
//!
//! Each comes in a global variant, reading the ratio or maximum from
//! [`FilterConfig`], and an aggregate variant where aggregate metadata under
//! the same key can lower it per host.

use std::sync::Arc;

use tracing::debug;
use warpgrid_state::{HostDirectory, HostState, LimitKind};

use super::HostFilter;
use crate::config::FilterConfig;
use crate::error::FilterResult;
use crate::ratio::MetadataResolver;
use crate::request::PlacementRequest;

/// vCPU oversubscription.
#[derive(Debug, Clone)]
pub struct CoreFilter {
    name: &'static str,
    ratio: MetadataResolver<f64>,
}

impl CoreFilter {
    pub fn global(config: &FilterConfig) -> Self {
        Self {
            name: "CoreFilter",
            ratio: MetadataResolver::global("cpu_allocation_ratio", config.cpu_allocation_ratio),
        }
    }

    pub fn aggregate(config: &FilterConfig, directory: Arc<dyn HostDirectory>) -> Self {
        Self {
            name: "AggregateCoreFilter",
            ratio: MetadataResolver::aggregate(
                "cpu_allocation_ratio",
                config.cpu_allocation_ratio,
                directory,
            ),
        }
    }
}

impl HostFilter for CoreFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        let total = match host.vcpus_total {
            Some(total) if total > 0 => f64::from(total),
            // Host has not reported CPU inventory yet.
            _ => return Ok(true),
        };

        let ratio = self.ratio.resolve(&host.host)?;
        let limit = total * ratio;
        host.limits.record_amount(LimitKind::Vcpu, limit);

        let free = limit - f64::from(host.vcpus_used);
        let requested = f64::from(request.instance_type.vcpus);
        if free < requested {
            debug!(
                host = %host.host,
                node = %host.nodename,
                filter = self.name,
                requested,
                free,
                "insufficient vCPUs"
            );
            return Ok(false);
        }
        Ok(true)
    }
}

/// RAM oversubscription.
#[derive(Debug, Clone)]
pub struct RamFilter {
    name: &'static str,
    ratio: MetadataResolver<f64>,
}

impl RamFilter {
    pub fn global(config: &FilterConfig) -> Self {
        Self {
            name: "RamFilter",
            ratio: MetadataResolver::global("ram_allocation_ratio", config.ram_allocation_ratio),
        }
    }

    pub fn aggregate(config: &FilterConfig, directory: Arc<dyn HostDirectory>) -> Self {
        Self {
            name: "AggregateRamFilter",
            ratio: MetadataResolver::aggregate(
                "ram_allocation_ratio",
                config.ram_allocation_ratio,
                directory,
            ),
        }
    }
}

impl HostFilter for RamFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        let total = match host.total_usable_ram_mb {
            Some(total) if total > 0 => total as f64,
            _ => return Ok(true),
        };

        let ratio = self.ratio.resolve(&host.host)?;
        let limit = total * ratio;
        host.limits.record_amount(LimitKind::MemoryMb, limit);

        let used = total - host.free_ram_mb as f64;
        let usable = limit - used;
        let requested = request.instance_type.memory_mb as f64;
        if usable < requested {
            debug!(
                host = %host.host,
                node = %host.nodename,
                filter = self.name,
                requested,
                usable,
                "insufficient RAM"
            );
            return Ok(false);
        }
        Ok(true)
    }
}

/// Disk oversubscription. Root, ephemeral and swap all count.
#[derive(Debug, Clone)]
pub struct DiskFilter {
    name: &'static str,
    ratio: MetadataResolver<f64>,
}

impl DiskFilter {
    pub fn global(config: &FilterConfig) -> Self {
        Self {
            name: "DiskFilter",
            ratio: MetadataResolver::global("disk_allocation_ratio", config.disk_allocation_ratio),
        }
    }

    pub fn aggregate(config: &FilterConfig, directory: Arc<dyn HostDirectory>) -> Self {
        Self {
            name: "AggregateDiskFilter",
            ratio: MetadataResolver::aggregate(
                "disk_allocation_ratio",
                config.disk_allocation_ratio,
                directory,
            ),
        }
    }
}

impl HostFilter for DiskFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        let total_mb = match host.total_usable_disk_gb {
            Some(gb) if gb > 0 => gb as f64 * 1024.0,
            _ => return Ok(true),
        };

        let flavor = &request.instance_type;
        let disk_gb = (flavor.root_gb + flavor.ephemeral_gb) as f64;
        let requested = 1024.0 * disk_gb + flavor.swap_mb as f64;

        let ratio = self.ratio.resolve(&host.host)?;
        let limit = total_mb * ratio;
        host.limits.record_amount(LimitKind::DiskGb, limit / 1024.0);

        // Negative free space is possible on an oversubscribed host.
        let used = total_mb - host.free_disk_mb as f64;
        let usable = limit - used;
        if usable < requested {
            debug!(
                host = %host.host,
                node = %host.nodename,
                filter = self.name,
                requested,
                usable,
                "insufficient disk"
            );
            return Ok(false);
        }
        Ok(true)
    }
}

/// Caps concurrent I/O-heavy operations (builds, resizes, snapshots).
#[derive(Debug, Clone)]
pub struct IoOpsFilter {
    name: &'static str,
    max: MetadataResolver<u32>,
}

impl IoOpsFilter {
    pub fn global(config: &FilterConfig) -> Self {
        Self {
            name: "IoOpsFilter",
            max: MetadataResolver::global("max_io_ops_per_host", config.max_io_ops_per_host),
        }
    }

    pub fn aggregate(config: &FilterConfig, directory: Arc<dyn HostDirectory>) -> Self {
        Self {
            name: "AggregateIoOpsFilter",
            max: MetadataResolver::aggregate(
                "max_io_ops_per_host",
                config.max_io_ops_per_host,
                directory,
            ),
        }
    }
}

impl HostFilter for IoOpsFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn host_passes(&self, host: &mut HostState, _request: &PlacementRequest) -> FilterResult<bool> {
        let max = self.max.resolve(&host.host)?;
        let passes = host.num_io_ops < max;
        if !passes {
            debug!(
                host = %host.host,
                node = %host.nodename,
                filter = self.name,
                num_io_ops = host.num_io_ops,
                max,
                "too many concurrent I/O operations"
            );
        }
        Ok(passes)
    }
}

#[derive(Debug, Clone)]
pub struct NumInstancesFilter {
    name: &'static str,
    max: MetadataResolver<u32>,
}

impl NumInstancesFilter {
    pub fn global(config: &FilterConfig) -> Self {
        Self {
            name: "NumInstancesFilter",
            max: MetadataResolver::global("max_instances_per_host", config.max_instances_per_host),
        }
    }

    pub fn aggregate(config: &FilterConfig, directory: Arc<dyn HostDirectory>) -> Self {
        Self {
            name: "AggregateNumInstancesFilter",
            max: MetadataResolver::aggregate(
                "max_instances_per_host",
                config.max_instances_per_host,
                directory,
            ),
        }
    }
}

impl HostFilter for NumInstancesFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn host_passes(&self, host: &mut HostState, _request: &PlacementRequest) -> FilterResult<bool> {
        let max = self.max.resolve(&host.host)?;
        let passes = host.num_instances < max;
        if !passes {
            debug!(
                host = %host.host,
                node = %host.nodename,
                filter = self.name,
                num_instances = host.num_instances,
                max,
                "too many instances"
            );
        }
        Ok(passes)
    }
}
