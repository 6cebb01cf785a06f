use std::sync::Arc;

use tracing::debug;
use warpgrid_state::HostState;

use super::HostFilter;
use crate::attestation::AttestationCache;
use crate::error::FilterResult;
use crate::request::{PlacementRequest, TRUSTED_HOST_SPEC};

/// Only hosts whose attested trust level equals the flavor's
/// `trust:trusted_host` extra spec pass. Flavors without it are unaffected.
#[derive(Debug, Clone)]
pub struct TrustedFilter {
    cache: Arc<AttestationCache>,
}

impl TrustedFilter {
    pub fn new(cache: Arc<AttestationCache>) -> Self {
        Self { cache }
    }
}

impl HostFilter for TrustedFilter {
    fn name(&self) -> &'static str {
        "TrustedFilter"
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        let Some(wanted) = request.extra_spec(TRUSTED_HOST_SPEC) else {
            return Ok(true);
        };

        let level = self.cache.trust_level(&host.nodename)?;
        let passes = level.as_str() == wanted;
        debug!(
            host = %host.host,
            node = %host.nodename,
            trust = %level,
            wanted,
            passes,
            "attestation check"
        );
        Ok(passes)
    }
}
