//! PCI passthrough inventory and request matching.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A request for `count` devices matching any one of `spec`.
///
/// Each spec entry is a set of tags (`vendor_id`, `product_id`, ...) that a
/// device pool must carry with equal values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PciRequest {
    pub count: u32,
    pub spec: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    pub alias_name: Option<String>,
}

/// Free devices sharing the same tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PciDevicePool {
    pub count: u32,
    pub tags: BTreeMap<String, String>,
}

/// Per-host passthrough inventory, grouped into pools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PciDeviceStats {
    pub pools: Vec<PciDevicePool>,
}

impl PciDeviceStats {
    /// Whether every request can be satisfied at once.
    ///
    /// Requests are served in order from a scratch copy of the pools, so a
    /// device handed to one request is not counted again for the next.
    pub fn supports_requests(&self, requests: &[PciRequest]) -> bool {
        let mut pools = self.pools.clone();
        requests.iter().all(|r| consume(&mut pools, r))
    }

    pub fn free_devices(&self) -> u32 {
        self.pools.iter().map(|p| p.count).sum()
    }
}

fn consume(pools: &mut [PciDevicePool], request: &PciRequest) -> bool {
    let matching: Vec<usize> = pools
        .iter()
        .enumerate()
        .filter(|(_, pool)| pool_matches(pool, &request.spec))
        .map(|(i, _)| i)
        .collect();

    let available: u32 = matching.iter().map(|&i| pools[i].count).sum();
    if available < request.count {
        return false;
    }

    let mut needed = request.count;
    for i in matching {
        if needed == 0 {
            break;
        }
        let take = needed.min(pools[i].count);
        pools[i].count -= take;
        needed -= take;
    }
    true
}

fn pool_matches(pool: &PciDevicePool, specs: &[BTreeMap<String, String>]) -> bool {
    specs
        .iter()
        .any(|spec| spec.iter().all(|(k, v)| pool.tags.get(k) == Some(v)))
}
