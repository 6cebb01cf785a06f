//! warpgrid-filter: host filtering for the WarpGrid scheduler.
//!
//! Given candidate hosts and a placement request, the filter pipeline keeps
//! the hosts that can take the instance. Filters cover oversubscribed
//! capacity (CPU, RAM, disk, I/O, instance count), isolation of images,
//! tenants and image properties, server-group affinity, remote attestation,
//! NUMA fitting, PCI passthrough and a handful of single-purpose checks.
//!
//! # Architecture
//!
//! - [`HostFilter`] is the capability every filter implements.
//! - [`FilterRegistry`] maps configured names to constructors and builds a
//!   [`FilterPipeline`] from [`FilterConfig::enabled_filters`].
//! - Filters read aggregates, compute nodes and instances through
//!   [`warpgrid_state::HostDirectory`], and record the limits they checked
//!   against on [`warpgrid_state::HostState::limits`].
//! - [`AttestationCache`] batches and caches trust lookups against an
//!   [`AttestationService`]; freshness is judged by an injectable [`Clock`].

pub mod attestation;
pub mod clock;
pub mod config;
pub mod error;
pub mod filters;
pub mod numa;
pub mod pipeline;
pub mod ratio;
pub mod registry;
pub mod request;

#[cfg(test)]
mod test_support;

pub use attestation::{
    AttestationCache, AttestationEntry, AttestationRecord, AttestationService, StaticAttestation,
    TrustLevel,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FilterConfig, MetricsConfig, TrustedComputingConfig};
pub use error::{AttestationError, ConfigError, FilterError, FilterResult};
pub use filters::HostFilter;
pub use pipeline::FilterPipeline;
pub use ratio::{MetadataResolver, OverrideSource, OverrideValue};
pub use registry::{FilterConstructor, FilterDeps, FilterRegistry};
pub use request::{
    GroupPolicy, ImageMeta, InstanceType, PlacementRequest, RequestContext, RetryState,
    SchedulerHints, TRUSTED_HOST_SPEC,
};
