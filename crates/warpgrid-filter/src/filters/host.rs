//! Single-purpose host filters: service state, retries, zones, metrics and
//! PCI passthrough.

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::debug;
use warpgrid_state::HostState;

use super::HostFilter;
use crate::clock::Clock;
use crate::config::FilterConfig;
use crate::error::{FilterError, FilterResult};
use crate::request::PlacementRequest;

/// Passes every host.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllHostsFilter;

impl HostFilter for AllHostsFilter {
    fn name(&self) -> &'static str {
        "AllHostsFilter"
    }

    fn host_passes(
        &self,
        _host: &mut HostState,
        _request: &PlacementRequest,
    ) -> FilterResult<bool> {
        Ok(true)
    }
}

/// Rejects hosts whose compute service is disabled or has stopped
/// heartbeating.
pub struct ComputeFilter {
    down_time: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl ComputeFilter {
    pub fn new(config: &FilterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            down_time: config.service_down_time(),
            clock,
        }
    }

    fn service_is_up(&self, host: &HostState) -> bool {
        match host.service.updated_at {
            Some(last) => self.clock.now() - last <= self.down_time,
            None => false,
        }
    }
}

impl HostFilter for ComputeFilter {
    fn name(&self) -> &'static str {
        "ComputeFilter"
    }

    fn host_passes(&self, host: &mut HostState, _request: &PlacementRequest) -> FilterResult<bool> {
        if host.service.disabled {
            debug!(
                host = %host.host,
                reason = host.service.disabled_reason.as_deref().unwrap_or(""),
                "compute service disabled"
            );
            return Ok(false);
        }
        if !self.service_is_up(host) {
            debug!(
                host = %host.host,
                last_heartbeat = ?host.service.updated_at,
                "compute service down"
            );
            return Ok(false);
        }
        Ok(true)
    }
}

/// Skips `(host, node)` pairs an earlier attempt of this request already
/// tried.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryFilter;

impl HostFilter for RetryFilter {
    fn name(&self) -> &'static str {
        "RetryFilter"
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        let Some(retry) = &request.retry else {
            return Ok(true);
        };
        let tried = retry.tried(&host.host, &host.nodename);
        if tried {
            debug!(
                host = %host.host,
                node = %host.nodename,
                attempts = retry.num_attempts,
                "host already tried"
            );
        }
        Ok(!tried)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AvailabilityZoneFilter;

impl HostFilter for AvailabilityZoneFilter {
    fn name(&self) -> &'static str {
        "AvailabilityZoneFilter"
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        let Some(wanted) = &request.availability_zone else {
            return Ok(true);
        };
        let passes = host.service.availability_zone.as_ref() == Some(wanted);
        if !passes {
            debug!(
                host = %host.host,
                zone = ?host.service.availability_zone,
                wanted = %wanted,
                "availability zone mismatch"
            );
        }
        Ok(passes)
    }
}

/// Requires every weighed metric to be reported by the host.
#[derive(Debug, Clone)]
pub struct MetricsFilter {
    names: Vec<String>,
}

impl MetricsFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            names: config.metric_names(),
        }
    }
}

impl HostFilter for MetricsFilter {
    fn name(&self) -> &'static str {
        "MetricsFilter"
    }

    fn host_passes(&self, host: &mut HostState, _request: &PlacementRequest) -> FilterResult<bool> {
        match self.names.iter().find(|n| !host.metrics.contains_key(*n)) {
            Some(missing) => {
                debug!(host = %host.host, metric = %missing, "metric not reported");
                Ok(false)
            }
            None => Ok(true),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PciPassthroughFilter;

impl HostFilter for PciPassthroughFilter {
    fn name(&self) -> &'static str {
        "PciPassthroughFilter"
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        if request.pci_requests.is_empty() {
            return Ok(true);
        }
        let Some(stats) = &host.pci_stats else {
            return Err(FilterError::MissingPciInventory {
                host: host.host.clone(),
            });
        };
        let passes = stats.supports_requests(&request.pci_requests);
        if !passes {
            debug!(
                host = %host.host,
                free = stats.free_devices(),
                requests = request.pci_requests.len(),
                "PCI requests cannot be satisfied"
            );
        }
        Ok(passes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::request::RetryState;
    use crate::test_support::{epoch, host_state};
    use std::collections::BTreeMap;
    use warpgrid_state::{PciDevicePool, PciDeviceStats, PciRequest};

    #[test]
    fn all_hosts_passes() {
        let mut host = host_state("host1", "node1");
        let request = PlacementRequest::default();
        assert!(AllHostsFilter.host_passes(&mut host, &request).unwrap());
    }

    fn compute_filter(clock: Arc<ManualClock>) -> ComputeFilter {
        ComputeFilter::new(&FilterConfig::default(), clock)
    }

    #[test]
    fn compute_passes_live_enabled_service() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let filter = compute_filter(clock.clone());
        let mut host = host_state("host1", "node1");
        host.service.updated_at = Some(epoch());
        let request = PlacementRequest::default();

        clock.advance(TimeDelta::seconds(60));
        assert!(filter.host_passes(&mut host, &request).unwrap());

        clock.advance(TimeDelta::seconds(1));
        assert!(!filter.host_passes(&mut host, &request).unwrap());
    }

    #[test]
    fn compute_fails_disabled_or_silent_service() {
        let clock = Arc::new(ManualClock::new(epoch()));
        let filter = compute_filter(clock);
        let request = PlacementRequest::default();

        let mut disabled = host_state("host1", "node1");
        disabled.service.updated_at = Some(epoch());
        disabled.service.disabled = true;
        assert!(!filter.host_passes(&mut disabled, &request).unwrap());

        let mut silent = host_state("host1", "node1");
        assert!(!filter.host_passes(&mut silent, &request).unwrap());
    }

    #[test]
    fn retry_skips_tried_pairs() {
        let mut request = PlacementRequest::default();
        let mut host = host_state("host1", "node1");
        assert!(RetryFilter.host_passes(&mut host, &request).unwrap());

        request.retry = Some(RetryState {
            num_attempts: 1,
            hosts: vec![("host1".into(), "node1".into())],
        });
        assert!(!RetryFilter.host_passes(&mut host, &request).unwrap());

        let mut other_node = host_state("host1", "node2");
        assert!(RetryFilter.host_passes(&mut other_node, &request).unwrap());
    }

    #[test]
    fn availability_zone_compares_service_zone() {
        let filter = AvailabilityZoneFilter;
        let mut host = host_state("host1", "node1");
        host.service.availability_zone = Some("az1".into());

        let mut request = PlacementRequest::default();
        assert!(filter.host_passes(&mut host, &request).unwrap());

        request.availability_zone = Some("az1".into());
        assert!(filter.host_passes(&mut host, &request).unwrap());

        request.availability_zone = Some("bad".into());
        assert!(!filter.host_passes(&mut host, &request).unwrap());

        let mut zoneless = host_state("host2", "node2");
        assert!(!filter.host_passes(&mut zoneless, &request).unwrap());
    }

    fn metrics_filter() -> MetricsFilter {
        MetricsFilter::new(&FilterConfig {
            metrics: crate::config::MetricsConfig {
                weight_setting: vec!["foo=1".into(), "bar=2".into()],
            },
            ..FilterConfig::default()
        })
    }

    #[test]
    fn metrics_requires_every_weighed_metric() {
        let filter = metrics_filter();
        let mut host = host_state("host1", "node1");
        let request = PlacementRequest::default();
        host.metrics.insert("foo".into(), 1.0);
        assert!(!filter.host_passes(&mut host, &request).unwrap());

        host.metrics.insert("bar".into(), 2.0);
        assert!(filter.host_passes(&mut host, &request).unwrap());
    }

    fn pci_request(count: u32) -> PciRequest {
        let mut spec = BTreeMap::new();
        spec.insert("vendor_id".to_string(), "8086".to_string());
        PciRequest {
            count,
            spec: vec![spec],
            alias_name: None,
        }
    }

    #[test]
    fn pci_passthrough_delegates_to_inventory() {
        let mut tags = BTreeMap::new();
        tags.insert("vendor_id".to_string(), "8086".to_string());
        let mut host = host_state("host1", "node1");
        host.pci_stats = Some(PciDeviceStats {
            pools: vec![PciDevicePool { count: 1, tags }],
        });

        let filter = PciPassthroughFilter;
        let mut request = PlacementRequest::default();
        assert!(filter.host_passes(&mut host, &request).unwrap());

        request.pci_requests = vec![pci_request(1)];
        assert!(filter.host_passes(&mut host, &request).unwrap());

        request.pci_requests = vec![pci_request(2)];
        assert!(!filter.host_passes(&mut host, &request).unwrap());
    }

    #[test]
    fn pci_passthrough_without_inventory_is_an_error() {
        let mut host = host_state("host1", "node1");
        let request = PlacementRequest {
            pci_requests: vec![pci_request(1)],
            ..PlacementRequest::default()
        };
        let filter = PciPassthroughFilter;
        let err = filter.host_passes(&mut host, &request).unwrap_err();
        assert!(matches!(err, FilterError::MissingPciInventory { .. }));
        assert!(err.to_string().contains("host1"));
    }
}
