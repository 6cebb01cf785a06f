//! Name → constructor table for host filters.
//!
//! Filters are registered explicitly. Configuration picks them by name and
//! the registry builds them with the shared collaborators in [`FilterDeps`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;
use warpgrid_state::HostDirectory;

use crate::attestation::AttestationCache;
use crate::clock::Clock;
use crate::config::FilterConfig;
use crate::error::{FilterError, FilterResult};
use crate::filters::{
    AffinityFilter, AggregateImagePropertiesIsolation, AggregateMultiTenancyIsolation,
    AggregateTypeAffinityFilter, AllHostsFilter, AntiAffinityFilter, AvailabilityZoneFilter,
    ComputeFilter, CoreFilter, DiskFilter, HostFilter, IoOpsFilter, IsolatedHostsFilter,
    MetricsFilter, NumInstancesFilter, NumaTopologyFilter, PciPassthroughFilter, RamFilter,
    RetryFilter, TrustedFilter, TypeAffinityFilter,
};
use crate::pipeline::FilterPipeline;

/// Shared collaborators handed to every filter constructor.
#[derive(Clone)]
pub struct FilterDeps {
    pub config: Arc<FilterConfig>,
    pub directory: Arc<dyn HostDirectory>,
    pub clock: Arc<dyn Clock>,
    /// Required by `TrustedFilter` only.
    pub attestation: Option<Arc<AttestationCache>>,
}

pub type FilterConstructor =
    Box<dyn Fn(&FilterDeps) -> FilterResult<Box<dyn HostFilter>> + Send + Sync>;

pub struct FilterRegistry {
    constructors: BTreeMap<&'static str, FilterConstructor>,
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// A registry with every filter shipped in this crate.
    pub fn with_builtin_filters() -> Self {
        let mut registry = Self::new();

        registry.register("AllHostsFilter", |_| boxed(AllHostsFilter));
        registry.register("ComputeFilter", |deps| {
            boxed(ComputeFilter::new(&deps.config, deps.clock.clone()))
        });
        registry.register("RetryFilter", |_| boxed(RetryFilter));
        registry.register("AvailabilityZoneFilter", |_| boxed(AvailabilityZoneFilter));
        registry.register(
            "MetricsFilter",
            |deps| boxed(MetricsFilter::new(&deps.config)),
        );
        registry.register("PciPassthroughFilter", |_| boxed(PciPassthroughFilter));

        registry.register("CoreFilter", |deps| boxed(CoreFilter::global(&deps.config)));
        registry.register("AggregateCoreFilter", |deps| {
            boxed(CoreFilter::aggregate(&deps.config, deps.directory.clone()))
        });
        registry.register("RamFilter", |deps| boxed(RamFilter::global(&deps.config)));
        registry.register("AggregateRamFilter", |deps| {
            boxed(RamFilter::aggregate(&deps.config, deps.directory.clone()))
        });
        registry.register("DiskFilter", |deps| boxed(DiskFilter::global(&deps.config)));
        registry.register("AggregateDiskFilter", |deps| {
            boxed(DiskFilter::aggregate(&deps.config, deps.directory.clone()))
        });
        registry.register(
            "IoOpsFilter",
            |deps| boxed(IoOpsFilter::global(&deps.config)),
        );
        registry.register("AggregateIoOpsFilter", |deps| {
            boxed(IoOpsFilter::aggregate(&deps.config, deps.directory.clone()))
        });
        registry.register("NumInstancesFilter", |deps| {
            boxed(NumInstancesFilter::global(&deps.config))
        });
        registry.register("AggregateNumInstancesFilter", |deps| {
            boxed(NumInstancesFilter::aggregate(&deps.config, deps.directory.clone()))
        });

        registry.register("IsolatedHostsFilter", |deps| {
            boxed(IsolatedHostsFilter::new(&deps.config))
        });
        registry.register("AggregateMultiTenancyIsolation", |deps| {
            boxed(AggregateMultiTenancyIsolation::new(deps.directory.clone()))
        });
        registry.register("AggregateImagePropertiesIsolation", |deps| {
            boxed(AggregateImagePropertiesIsolation::new(&deps.config, deps.directory.clone()))
        });

        registry.register("ServerGroupAntiAffinityFilter", |_| {
            boxed(AntiAffinityFilter::server_group())
        });
        registry.register(
            "ServerGroupAffinityFilter",
            |_| boxed(AffinityFilter::server_group()),
        );
        registry.register(
            "GroupAntiAffinityFilter",
            |_| boxed(AntiAffinityFilter::legacy()),
        );
        registry.register("GroupAffinityFilter", |_| boxed(AffinityFilter::legacy()));

        registry.register("TypeAffinityFilter", |deps| {
            boxed(TypeAffinityFilter::new(deps.directory.clone()))
        });
        registry.register("AggregateTypeAffinityFilter", |deps| {
            boxed(AggregateTypeAffinityFilter::new(deps.directory.clone()))
        });

        registry.register("TrustedFilter", |deps| {
            let cache = deps
                .attestation
                .clone()
                .ok_or(FilterError::MissingCollaborator {
                    filter: "TrustedFilter",
                    collaborator: "an attestation cache",
                })?;
            boxed(TrustedFilter::new(cache))
        });
        registry.register("NUMATopologyFilter", |deps| {
            boxed(NumaTopologyFilter::new(&deps.config))
        });

        registry
    }

    /// Register (or replace) a filter constructor under `name`.
    pub fn register<F>(&mut self, name: &'static str, constructor: F)
    where
        F: Fn(&FilterDeps) -> FilterResult<Box<dyn HostFilter>> + Send + Sync + 'static,
    {
        self.constructors.insert(name, Box::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.constructors.keys().copied().collect()
    }

    pub fn build(&self, name: &str, deps: &FilterDeps) -> FilterResult<Box<dyn HostFilter>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| FilterError::UnknownFilter(name.to_string()))?;
        constructor(deps)
    }

    /// Builds the filters named in `enabled_filters`, in that order.
    pub fn build_pipeline(&self, deps: &FilterDeps) -> FilterResult<FilterPipeline> {
        let filters = deps
            .config
            .enabled_filters
            .iter()
            .map(|name| self.build(name, deps))
            .collect::<FilterResult<Vec<_>>>()?;
        debug!(filters = ?deps.config.enabled_filters, "filter pipeline built");
        Ok(FilterPipeline::new(filters))
    }
}

fn boxed<F: HostFilter + 'static>(filter: F) -> FilterResult<Box<dyn HostFilter>> {
    Ok(Box::new(filter))
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtin_filters()
    }
}
