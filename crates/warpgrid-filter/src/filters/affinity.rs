//! Server-group placement: keep group members together or apart.
//!
//! Each filter only acts on the policy it was built for; a request with any
//! other policy (or none) passes untouched.

use tracing::debug;
use warpgrid_state::HostState;

use super::HostFilter;
use crate::error::FilterResult;
use crate::request::{GroupPolicy, PlacementRequest};

/// Rejects hosts that already run a member of the group.
#[derive(Debug, Clone, Copy)]
pub struct AntiAffinityFilter {
    name: &'static str,
    policy: GroupPolicy,
}

impl AntiAffinityFilter {
    pub fn server_group() -> Self {
        Self {
            name: "ServerGroupAntiAffinityFilter",
            policy: GroupPolicy::AntiAffinity,
        }
    }

    pub fn legacy() -> Self {
        Self {
            name: "GroupAntiAffinityFilter",
            policy: GroupPolicy::Legacy,
        }
    }
}

impl HostFilter for AntiAffinityFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        if request.hints.group_policy != Some(self.policy) {
            return Ok(true);
        }
        let passes = !request.hints.group_hosts.contains(&host.host);
        debug!(host = %host.host, filter = self.name, passes, "group anti-affinity");
        Ok(passes)
    }
}

/// Keeps new members on hosts already running the group, once it has any.
#[derive(Debug, Clone, Copy)]
pub struct AffinityFilter {
    name: &'static str,
    policy: GroupPolicy,
}

impl AffinityFilter {
    pub fn server_group() -> Self {
        Self {
            name: "ServerGroupAffinityFilter",
            policy: GroupPolicy::Affinity,
        }
    }

    pub fn legacy() -> Self {
        Self {
            name: "GroupAffinityFilter",
            policy: GroupPolicy::Legacy,
        }
    }
}

impl HostFilter for AffinityFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        if request.hints.group_policy != Some(self.policy) {
            return Ok(true);
        }
        let group_hosts = &request.hints.group_hosts;
        let passes = group_hosts.is_empty() || group_hosts.contains(&host.host);
        debug!(host = %host.host, filter = self.name, passes, "group affinity");
        Ok(passes)
    }
}
