//! redb table definitions for the host inventory.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).
//! Composite keys follow the pattern `{host}:{child}` so per-host records
//! can be found with a prefix scan.

use redb::TableDefinition;

/// Shape shared by every inventory table.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// A table definition together with its name, which errors report.
#[derive(Clone, Copy)]
pub struct InventoryTable {
    pub name: &'static str,
    pub def: JsonTable,
}

impl InventoryTable {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            def: TableDefinition::new(name),
        }
    }
}

/// Aggregates keyed by `{name}`.
pub const AGGREGATES: InventoryTable = InventoryTable::new("aggregates");

/// Compute nodes keyed by `{host}:{hypervisor_hostname}`.
pub const COMPUTE_NODES: InventoryTable = InventoryTable::new("compute_nodes");

/// Instance records keyed by `{host}:{instance_id}`.
pub const INSTANCES: InventoryTable = InventoryTable::new("instances");
