//! Instance-type placement: one flavor per host, or flavors pinned to
//! aggregates.

use std::sync::Arc;

use tracing::debug;
use warpgrid_state::{HostDirectory, HostState};

use super::HostFilter;
use crate::error::FilterResult;
use crate::request::PlacementRequest;

/// Aggregate metadata key restricting which instance types may land.
pub const INSTANCE_TYPE_METADATA_KEY: &str = "instance_type";

/// Rejects hosts running an instance of a different type.
#[derive(Clone)]
pub struct TypeAffinityFilter {
    directory: Arc<dyn HostDirectory>,
}

impl TypeAffinityFilter {
    pub fn new(directory: Arc<dyn HostDirectory>) -> Self {
        Self { directory }
    }
}

impl HostFilter for TypeAffinityFilter {
    fn name(&self) -> &'static str {
        "TypeAffinityFilter"
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        let wanted = request.instance_type.id;
        let conflicting = self
            .directory
            .instances_on_host(&host.host)?
            .into_iter()
            .find(|i| i.instance_type_id != wanted);

        if let Some(instance) = conflicting {
            debug!(
                host = %host.host,
                instance = %instance.id,
                running_type = instance.instance_type_id,
                wanted,
                "host runs a different instance type"
            );
            return Ok(false);
        }
        Ok(true)
    }
}

/// Hosts in aggregates declaring `instance_type` only accept those types.
///
/// Values may be comma-separated lists.
#[derive(Clone)]
pub struct AggregateTypeAffinityFilter {
    directory: Arc<dyn HostDirectory>,
}

impl AggregateTypeAffinityFilter {
    pub fn new(directory: Arc<dyn HostDirectory>) -> Self {
        Self { directory }
    }
}

impl HostFilter for AggregateTypeAffinityFilter {
    fn name(&self) -> &'static str {
        "AggregateTypeAffinityFilter"
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        let metadata = self
            .directory
            .metadata_for_host(&host.host, Some(INSTANCE_TYPE_METADATA_KEY))?;
        let Some(values) = metadata.get(INSTANCE_TYPE_METADATA_KEY) else {
            return Ok(true);
        };

        let wanted = request.instance_type.name.as_str();
        let passes = values
            .iter()
            .flat_map(|v| v.split(','))
            .any(|name| name.trim() == wanted);
        if !passes {
            debug!(host = %host.host, wanted, "instance type not allowed by aggregate");
        }
        Ok(passes)
    }
}
