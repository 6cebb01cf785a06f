//! The placement request the filters evaluate hosts against.
//!
//! One request covers one scheduling attempt and is never mutated by a
//! filter pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use warpgrid_state::{InstanceNumaTopology, PciRequest};

/// Extra spec that turns on attestation checks. Its value is compared
/// verbatim, case included, against the label the attestation service
/// reported for the node; unattested nodes report `unknown`.
pub const TRUSTED_HOST_SPEC: &str = "trust:trusted_host";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PlacementRequest {
    pub context: RequestContext,
    pub instance_type: InstanceType,
    pub image: ImageMeta,
    pub availability_zone: Option<String>,
    pub hints: SchedulerHints,
    pub retry: Option<RetryState>,
    pub pci_requests: Vec<PciRequest>,
    pub numa_topology: Option<InstanceNumaTopology>,
}

impl PlacementRequest {
    pub fn extra_spec(&self, key: &str) -> Option<&str> {
        self.instance_type.extra_specs.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RequestContext {
    pub project_id: String,
    pub user_id: String,
    pub is_admin: bool,
}

/// The flavor being booted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct InstanceType {
    pub id: u64,
    pub name: String,
    pub vcpus: u32,
    pub memory_mb: u64,
    pub root_gb: u64,
    pub ephemeral_gb: u64,
    pub swap_mb: u64,
    pub extra_specs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ImageMeta {
    pub id: Option<String>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GroupPolicy {
    Affinity,
    AntiAffinity,
    /// Pre-server-group hints; the `Group*` filters honour these.
    Legacy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SchedulerHints {
    pub group_policy: Option<GroupPolicy>,
    /// Hosts already running members of the group.
    pub group_hosts: Vec<String>,
}

/// Hosts tried by earlier attempts of this request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RetryState {
    pub num_attempts: u32,
    /// `(host, node)` pairs in attempt order.
    pub hosts: Vec<(String, String)>,
}

impl RetryState {
    pub fn tried(&self, host: &str, node: &str) -> bool {
        self.hosts.iter().any(|(h, n)| h == host && n == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_sparse_request() {
        let request: PlacementRequest = serde_json::from_value(serde_json::json!({
            "instance_type": {
                "name": "m1.small",
                "memory_mb": 1024,
                "extra_specs": { "trust:trusted_host": "trusted" }
            },
            "hints": { "group_policy": "anti-affinity", "group_hosts": ["host1"] },
            "retry": { "num_attempts": 1, "hosts": [["host1", "node1"]] }
        }))
        .unwrap();

        assert_eq!(request.instance_type.memory_mb, 1024);
        assert_eq!(request.extra_spec(TRUSTED_HOST_SPEC), Some("trusted"));
        assert_eq!(request.hints.group_policy, Some(GroupPolicy::AntiAffinity));
        assert!(request.availability_zone.is_none());
        assert!(request.pci_requests.is_empty());

        let retry = request.retry.unwrap();
        assert!(retry.tried("host1", "node1"));
        assert!(!retry.tried("host1", "node2"));
    }
}
