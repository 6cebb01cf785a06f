//! Shared fixtures for unit tests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use warpgrid_state::{Aggregate, HostDirectory, HostState, StateStore};

use crate::attestation::AttestationRecord;
use crate::request::PlacementRequest;

pub fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn host_state(host: &str, node: &str) -> HostState {
    HostState::new(host, node)
}

pub fn directory_with(aggregates: Vec<Aggregate>) -> Arc<dyn HostDirectory> {
    let store = StateStore::open_in_memory().unwrap();
    for aggregate in &aggregates {
        store.put_aggregate(aggregate).unwrap();
    }
    Arc::new(store)
}

pub fn flavor_request(vcpus: u32, memory_mb: u64, root_gb: u64) -> PlacementRequest {
    let mut request = PlacementRequest::default();
    request.instance_type.vcpus = vcpus;
    request.instance_type.memory_mb = memory_mb;
    request.instance_type.root_gb = root_gb;
    request
}

pub fn record(node: &str, level: &str) -> AttestationRecord {
    AttestationRecord {
        host_name: node.to_string(),
        trust_lvl: level.to_string(),
        vtime: "2024-01-01T00:00:00Z".to_string(),
    }
}
