//! StateStore: redb-backed inventory for the host filters.
//!
//! Provides typed CRUD over aggregates, compute nodes and instance records,
//! and implements [`HostDirectory`] so filters can query it. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::directory::HostDirectory;
use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe inventory store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing and one-shot runs).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [AGGREGATES, COMPUTE_NODES, INSTANCES] {
            txn.open_table(table.def).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Table helpers ──────────────────────────────────────────────

    fn put_json<T: Serialize>(
        &self,
        table: InventoryTable,
        key: &str,
        value: &T,
    ) -> StateResult<()> {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(source) => {
                return Err(StateError::Encode {
                    table: table.name.to_string(),
                    key: key.to_string(),
                    source,
                });
            }
        };
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table.def).map_err(map_err!(Table))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Storage))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        table: InventoryTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table.def).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Storage))? {
            Some(guard) => decode(table, key, guard.value()).map(Some),
            None => Ok(None),
        }
    }

    /// All values whose key starts with `prefix` (empty prefix lists everything).
    fn scan_json<T: DeserializeOwned>(
        &self,
        table: InventoryTable,
        prefix: &str,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table.def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Storage))? {
            let (key, value) = entry.map_err(map_err!(Storage))?;
            if key.value().starts_with(prefix) {
                results.push(decode(table, key.value(), value.value())?);
            }
        }
        Ok(results)
    }

    fn remove(&self, table: InventoryTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(table.def).map_err(map_err!(Table))?;
            existed = t.remove(key).map_err(map_err!(Storage))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Aggregates ─────────────────────────────────────────────────

    /// Insert or replace an aggregate.
    pub fn put_aggregate(&self, aggregate: &Aggregate) -> StateResult<()> {
        let key = aggregate.table_key();
        self.put_json(AGGREGATES, &key, aggregate)?;
        debug!(%key, hosts = aggregate.hosts.len(), "aggregate stored");
        Ok(())
    }

    pub fn get_aggregate(&self, name: &str) -> StateResult<Option<Aggregate>> {
        self.get_json(AGGREGATES, name)
    }

    pub fn list_aggregates(&self) -> StateResult<Vec<Aggregate>> {
        self.scan_json(AGGREGATES, "")
    }

    /// Delete an aggregate. Returns true if it existed.
    pub fn delete_aggregate(&self, name: &str) -> StateResult<bool> {
        let existed = self.remove(AGGREGATES, name)?;
        debug!(%name, existed, "aggregate deleted");
        Ok(existed)
    }

    fn existing_aggregate(&self, name: &str) -> StateResult<Aggregate> {
        match self.get_aggregate(name)? {
            Some(aggregate) => Ok(aggregate),
            None => Err(StateError::AggregateNotFound(name.to_string())),
        }
    }

    /// Add `host` to an existing aggregate.
    pub fn add_host_to_aggregate(&self, name: &str, host: &str) -> StateResult<Aggregate> {
        let aggregate = self.existing_aggregate(name)?.with_host(host);
        self.put_aggregate(&aggregate)?;
        Ok(aggregate)
    }

    /// Remove `host` from an existing aggregate.
    pub fn remove_host_from_aggregate(&self, name: &str, host: &str) -> StateResult<Aggregate> {
        let mut aggregate = self.existing_aggregate(name)?;
        aggregate.hosts.retain(|h| h != host);
        self.put_aggregate(&aggregate)?;
        Ok(aggregate)
    }

    /// Set (or overwrite) one metadata key on an existing aggregate.
    pub fn set_aggregate_metadata(
        &self,
        name: &str,
        key: &str,
        value: &str,
    ) -> StateResult<Aggregate> {
        let aggregate = self.existing_aggregate(name)?.with_metadata(key, value);
        self.put_aggregate(&aggregate)?;
        Ok(aggregate)
    }

    // ── Compute nodes ──────────────────────────────────────────────

    pub fn put_compute_node(&self, node: &ComputeNode) -> StateResult<()> {
        check_host_name(&node.host)?;
        self.put_json(COMPUTE_NODES, &node.table_key(), node)
    }

    pub fn list_compute_nodes(&self) -> StateResult<Vec<ComputeNode>> {
        self.scan_json(COMPUTE_NODES, "")
    }

    pub fn delete_compute_node(&self, host: &str, node: &str) -> StateResult<bool> {
        self.remove(COMPUTE_NODES, &format!("{host}:{node}"))
    }

    // ── Instances ──────────────────────────────────────────────────

    pub fn put_instance(&self, record: &InstanceRecord) -> StateResult<()> {
        check_host_name(&record.host)?;
        self.put_json(INSTANCES, &record.table_key(), record)
    }

    pub fn list_instances_for_host(&self, host: &str) -> StateResult<Vec<InstanceRecord>> {
        self.scan_json(INSTANCES, &format!("{host}:"))
    }

    pub fn delete_instance(&self, host: &str, id: &str) -> StateResult<bool> {
        self.remove(INSTANCES, &format!("{host}:{id}"))
    }
}

fn decode<T: DeserializeOwned>(table: InventoryTable, key: &str, bytes: &[u8]) -> StateResult<T> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Ok(value),
        Err(source) => Err(StateError::Decode {
            table: table.name.to_string(),
            key: key.to_string(),
            source,
        }),
    }
}

/// A `:` in the host part would let one host's prefix scan see another's rows.
fn check_host_name(host: &str) -> StateResult<()> {
    if host.contains(':') {
        return Err(StateError::InvalidHostName(host.to_string()));
    }
    Ok(())
}

impl HostDirectory for StateStore {
    fn aggregates_for_host(&self, host: &str) -> StateResult<Vec<Aggregate>> {
        Ok(self
            .list_aggregates()?
            .into_iter()
            .filter(|a| a.contains_host(host))
            .collect())
    }

    fn aggregate_hosts(&self, name: &str) -> StateResult<Option<Vec<HostName>>> {
        Ok(self.get_aggregate(name)?.map(|a| a.hosts))
    }

    fn compute_nodes(&self) -> StateResult<Vec<ComputeNode>> {
        self.list_compute_nodes()
    }

    fn instances_on_host(&self, host: &str) -> StateResult<Vec<InstanceRecord>> {
        self.list_instances_for_host(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_aggregate(name: &str, hosts: &[&str]) -> Aggregate {
        hosts
            .iter()
            .fold(Aggregate::new(name), |agg, h| agg.with_host(*h))
            .with_metadata("availability_zone", "az-1")
    }

    fn test_instance(host: &str, id: &str, type_id: u64) -> InstanceRecord {
        InstanceRecord {
            id: id.to_string(),
            host: host.to_string(),
            instance_type_id: type_id,
        }
    }

    /// Aggregate on `host1` carrying one metadata entry.
    fn tagged(name: &str, key: &str, value: &str) -> Aggregate {
        test_aggregate(name, &["host1"]).with_metadata(key, value)
    }

    /// In-memory store holding the given aggregates.
    fn store_with(aggregates: &[Aggregate]) -> StateStore {
        let store = StateStore::open_in_memory().unwrap();
        for aggregate in aggregates {
            store.put_aggregate(aggregate).unwrap();
        }
        store
    }

    // ── Aggregate CRUD ─────────────────────────────────────────────

    #[test]
    fn aggregate_put_and_get() {
        let agg = test_aggregate("rack-1", &["host1", "host2"]);
        let store = store_with(&[agg.clone()]);

        assert_eq!(store.get_aggregate("rack-1").unwrap(), Some(agg));
        assert_eq!(store.get_aggregate("rack-2").unwrap(), None);
    }

    #[test]
    fn aggregate_membership_updates() {
        let store = store_with(&[test_aggregate("rack-1", &["host1"])]);

        store.add_host_to_aggregate("rack-1", "host2").unwrap();
        store.add_host_to_aggregate("rack-1", "host2").unwrap();
        assert_eq!(
            store.aggregate_hosts("rack-1").unwrap(),
            Some(vec!["host1".to_string(), "host2".to_string()])
        );

        store.remove_host_from_aggregate("rack-1", "host1").unwrap();
        assert_eq!(
            store.aggregate_hosts("rack-1").unwrap(),
            Some(vec!["host2".to_string()])
        );
    }

    #[test]
    fn membership_change_on_missing_aggregate_fails() {
        let store = store_with(&[]);
        let err = store.add_host_to_aggregate("ghost", "host1").unwrap_err();
        assert!(matches!(err, StateError::AggregateNotFound(_)));
        assert_eq!(err.to_string(), "aggregate not found: ghost");
    }

    #[test]
    fn set_metadata_overwrites_value() {
        let store = store_with(&[test_aggregate("rack-1", &["host1"])]);
        let key = "cpu_allocation_ratio";

        store.set_aggregate_metadata("rack-1", key, "2.0").unwrap();
        store.set_aggregate_metadata("rack-1", key, "3.0").unwrap();

        let agg = store.get_aggregate("rack-1").unwrap().unwrap();
        assert_eq!(agg.metadata[key], "3.0");
    }

    #[test]
    fn aggregate_delete() {
        let store = store_with(&[test_aggregate("rack-1", &["host1"])]);

        assert!(store.delete_aggregate("rack-1").unwrap());
        assert!(!store.delete_aggregate("rack-1").unwrap());
        assert!(store.list_aggregates().unwrap().is_empty());
    }

    // ── Directory queries ──────────────────────────────────────────

    #[test]
    fn aggregates_for_host_filters_membership() {
        let store = store_with(&[
            test_aggregate("a", &["host1"]),
            test_aggregate("b", &["host1", "host2"]),
            test_aggregate("c", &["host2"]),
        ]);

        let names: Vec<String> = store
            .aggregates_for_host("host1")
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn metadata_values_keeps_one_entry_per_aggregate() {
        let store = store_with(&[tagged("a", "ratio", "2"), tagged("b", "ratio", "2")]);

        let values = store.metadata_values("host1", "ratio").unwrap();
        assert_eq!(values, vec!["2", "2"]);
        assert!(store.metadata_values("host2", "ratio").unwrap().is_empty());
    }

    #[test]
    fn metadata_for_host_merges_values() {
        let store = store_with(&[tagged("a", "owner", "t1"), tagged("b", "owner", "t2")]);

        let all = store.metadata_for_host("host1", None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["owner"].len(), 2);
        assert_eq!(all["availability_zone"].len(), 1);

        let only = store.metadata_for_host("host1", Some("owner")).unwrap();
        assert_eq!(only.keys().collect::<Vec<_>>(), vec!["owner"]);
    }

    #[test]
    fn compute_nodes_and_instances() {
        let store = store_with(&[]);
        for (host, node) in [("host1", "node1"), ("host2", "node2")] {
            let node = ComputeNode::new(host, node);
            store.put_compute_node(&node).unwrap();
        }
        for (host, id) in [("host1", "i-1"), ("host1", "i-2"), ("host10", "i-3")] {
            store.put_instance(&test_instance(host, id, 1)).unwrap();
        }

        assert_eq!(store.compute_nodes().unwrap().len(), 2);
        assert_eq!(store.instances_on_host("host1").unwrap().len(), 2);
        assert_eq!(store.instances_on_host("host10").unwrap().len(), 1);

        assert!(store.delete_instance("host1", "i-1").unwrap());
        assert!(store.delete_compute_node("host2", "node2").unwrap());
        assert_eq!(store.instances_on_host("host1").unwrap().len(), 1);
        assert_eq!(store.compute_nodes().unwrap().len(), 1);
    }

    #[test]
    fn host_names_with_key_separator_are_rejected() {
        let store = store_with(&[]);

        let node = ComputeNode::new("rack:host1", "node1");
        let err = store.put_compute_node(&node).unwrap_err();
        assert!(matches!(err, StateError::InvalidHostName(_)));
        assert!(err.to_string().contains("`rack:host1`"));

        let instance = test_instance("rack:host1", "i-1", 1);
        let err = store.put_instance(&instance).unwrap_err();
        assert!(matches!(err, StateError::InvalidHostName(_)));
        assert!(store.instances_on_host("rack").unwrap().is_empty());
    }

    #[test]
    fn corrupt_record_names_table_and_key() {
        let store = store_with(&[]);
        store.put_json(AGGREGATES, "broken", &42u32).unwrap();

        let err = store.get_aggregate("broken").unwrap_err();
        assert_eq!(err.to_string(), "corrupt aggregates record `broken`");
        assert!(matches!(err, StateError::Decode { .. }));
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("inventory.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            let agg = test_aggregate("rack-1", &["host1"]);
            store.put_aggregate(&agg).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        let agg = store.get_aggregate("rack-1").unwrap();
        assert_eq!(agg.map(|a| a.hosts), Some(vec!["host1".to_string()]));
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = store_with(&[]);

        assert!(store.list_aggregates().unwrap().is_empty());
        assert!(store.list_compute_nodes().unwrap().is_empty());
        assert!(store.aggregates_for_host("any").unwrap().is_empty());
        assert!(store.aggregate_hosts("any").unwrap().is_none());
        assert!(!store.delete_instance("any", "nope").unwrap());
        assert!(!store.delete_compute_node("any", "nope").unwrap());
    }
}
