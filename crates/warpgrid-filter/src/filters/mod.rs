//! Host filters.
//!
//! A filter answers one question about one host: can this request land
//! here? Filters that check oversubscribed capacity also record the limit
//! they checked against on [`HostState::limits`], which is the only part of
//! the host a filter may change.

use warpgrid_state::HostState;

use crate::error::FilterResult;
use crate::request::PlacementRequest;

mod affinity;
mod capacity;
mod host;
mod isolation;
mod numa_topology;
mod trusted;
mod type_affinity;

pub use affinity::{AffinityFilter, AntiAffinityFilter};
pub use capacity::{CoreFilter, DiskFilter, IoOpsFilter, NumInstancesFilter, RamFilter};
pub use host::{
    AllHostsFilter, AvailabilityZoneFilter, ComputeFilter, MetricsFilter, PciPassthroughFilter,
    RetryFilter,
};
pub use isolation::{
    AggregateImagePropertiesIsolation, AggregateMultiTenancyIsolation, IsolatedHostsFilter,
};
pub use numa_topology::NumaTopologyFilter;
pub use trusted::TrustedFilter;
pub use type_affinity::{AggregateTypeAffinityFilter, TypeAffinityFilter};

/// A predicate over (host, request).
///
/// `Ok(false)` rejects the host. `Err` means the pass itself is broken and
/// aborts it.
pub trait HostFilter: Send + Sync {
    /// Name used in configuration and logs.
    fn name(&self) -> &'static str;

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool>;
}
