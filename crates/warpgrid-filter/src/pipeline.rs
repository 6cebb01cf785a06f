//! Runs an ordered list of filters over a set of candidate hosts.
//!
//! Sequential evaluation is filter-major: each filter sees only the hosts
//! that survived the ones before it. Concurrent evaluation is host-major:
//! every host runs the whole list on its own blocking task. Both produce the
//! same survivors in input order.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info};
use warpgrid_state::HostState;

use crate::error::{FilterError, FilterResult};
use crate::filters::HostFilter;
use crate::request::PlacementRequest;

#[derive(Clone)]
pub struct FilterPipeline {
    filters: Arc<[Box<dyn HostFilter>]>,
}

impl FilterPipeline {
    pub fn new(filters: Vec<Box<dyn HostFilter>>) -> Self {
        Self {
            filters: filters.into(),
        }
    }

    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Hosts passing every filter, in input order. Limits from any previous
    /// pass are dropped first.
    pub fn filter_hosts(
        &self,
        hosts: Vec<HostState>,
        request: &PlacementRequest,
    ) -> FilterResult<Vec<HostState>> {
        let mut hosts = hosts;
        for host in &mut hosts {
            host.begin_pass();
        }

        for filter in self.filters.iter() {
            let mut survivors = Vec::with_capacity(hosts.len());
            for mut host in hosts {
                if filter.host_passes(&mut host, request)? {
                    survivors.push(host);
                }
            }
            hosts = survivors;
            debug!(
                filter = filter.name(),
                remaining = hosts.len(),
                "filter applied"
            );

            if hosts.is_empty() {
                info!(filter = filter.name(), "no hosts left after filter");
                break;
            }
        }
        Ok(hosts)
    }

    /// Evaluates one host against every filter, stopping at the first
    /// rejection. Starts a new pass on `host`.
    pub fn host_passes(
        &self,
        host: &mut HostState,
        request: &PlacementRequest,
    ) -> FilterResult<bool> {
        host.begin_pass();
        passes_all(&self.filters, host, request)
    }

    /// Like [`filter_hosts`](Self::filter_hosts), with each host evaluated on
    /// its own blocking task. The first filter error aborts the pass.
    pub async fn filter_hosts_concurrent(
        &self,
        hosts: Vec<HostState>,
        request: &PlacementRequest,
    ) -> FilterResult<Vec<HostState>> {
        let total = hosts.len();
        let request = Arc::new(request.clone());
        let mut set = JoinSet::new();

        for (index, mut host) in hosts.into_iter().enumerate() {
            let filters = Arc::clone(&self.filters);
            let request = Arc::clone(&request);
            set.spawn_blocking(move || {
                host.begin_pass();
                let passed = passes_all(&filters, &mut host, &request);
                (index, host, passed)
            });
        }

        let mut slots: Vec<Option<HostState>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let (index, host, passed) = joined.map_err(|e| FilterError::Task(e.to_string()))?;
            if passed? {
                slots[index] = Some(host);
            }
        }

        let survivors: Vec<HostState> = slots.into_iter().flatten().collect();
        debug!(
            hosts = total,
            remaining = survivors.len(),
            "concurrent filter pass complete"
        );
        Ok(survivors)
    }
}

fn passes_all(
    filters: &[Box<dyn HostFilter>],
    host: &mut HostState,
    request: &PlacementRequest,
) -> FilterResult<bool> {
    for filter in filters {
        if !filter.host_passes(host, request)? {
            debug!(
                host = %host.host,
                node = %host.nodename,
                filter = filter.name(),
                "host rejected"
            );
            return Ok(false);
        }
    }
    Ok(true)
}
