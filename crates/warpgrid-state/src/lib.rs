//! warpgrid-state: host inventory for the WarpGrid host filters.
//!
//! Holds the per-host snapshot the filters evaluate ([`HostState`]), the
//! limits they record on it, NUMA and PCI inventory, and the long-lived
//! records the filters query: aggregates, compute nodes and instances.
//!
//! # Architecture
//!
//! Filters never talk to storage directly. They go through the
//! [`HostDirectory`] trait, which [`StateStore`] implements on top of
//! [redb](https://docs.rs/redb). All records are JSON-serialized into
//! redb's `&[u8]` value columns, keyed so related records share a prefix
//! (`{host}:{node}`, `{host}:{instance_id}`).
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across filter threads.

pub mod directory;
pub mod error;
pub mod limits;
pub mod numa;
pub mod pci;
pub mod store;
pub mod tables;
pub mod types;

pub use directory::HostDirectory;
pub use error::{StateError, StateResult};
pub use limits::{Limit, LimitKind, Limits};
pub use numa::{
    HostNumaCell, HostNumaTopology, InstanceNumaCell, InstanceNumaTopology, NumaCellLimit,
    NumaLimitTopology,
};
pub use pci::{PciDevicePool, PciDeviceStats, PciRequest};
pub use store::StateStore;
pub use types::*;
