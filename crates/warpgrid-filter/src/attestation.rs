//! Remote attestation lookups and the trust-level cache.
//!
//! The attestation service is slow, so results are cached per node and
//! reused while fresh. A miss or a stale entry triggers one batched request
//! for every known compute node, and every node in that batch is stamped
//! with the same local fetch time.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warpgrid_state::HostDirectory;

use crate::clock::Clock;
use crate::error::{AttestationError, FilterResult};

/// Attested trust state of a compute node.
///
/// Labels other than the three the service normally reports are kept
/// verbatim in `Other`, so a `trust:trusted_host` value is always compared
/// against the label the service actually returned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrustLevel {
    Trusted,
    Untrusted,
    Unknown,
    Other(String),
}

impl TrustLevel {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Trusted => "trusted",
            Self::Untrusted => "untrusted",
            Self::Unknown => "unknown",
            Self::Other(label) => label,
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "trusted" => Self::Trusted,
            "untrusted" => Self::Untrusted,
            "unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node's result as returned by the attestation service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttestationRecord {
    pub host_name: String,
    pub trust_lvl: String,
    /// Time of attestation, RFC 3339.
    pub vtime: String,
}

/// Client for the remote attestation service.
pub trait AttestationService: Send + Sync {
    /// Attest `hosts` in one call. Records may come back in any order and
    /// hosts the service does not know are simply absent.
    fn attest(&self, hosts: &[String]) -> Result<Vec<AttestationRecord>, AttestationError>;
}

/// Serves a fixed set of records. Counts calls.
#[derive(Debug, Default)]
pub struct StaticAttestation {
    records: Vec<AttestationRecord>,
    calls: AtomicUsize,
}

impl StaticAttestation {
    pub fn new(records: Vec<AttestationRecord>) -> Self {
        Self {
            records,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AttestationService for StaticAttestation {
    fn attest(&self, hosts: &[String]) -> Result<Vec<AttestationRecord>, AttestationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .iter()
            .filter(|r| hosts.contains(&r.host_name))
            .cloned()
            .collect())
    }
}

/// Cached trust state of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationEntry {
    pub trust_lvl: TrustLevel,
    /// Attestation time reported by the service, if the node was found.
    pub vtime: Option<DateTime<Utc>>,
    /// Local time of the fetch that produced this entry.
    pub fetched_at: DateTime<Utc>,
}

impl AttestationEntry {
    fn unattested(fetched_at: DateTime<Utc>) -> Self {
        Self {
            trust_lvl: TrustLevel::Unknown,
            vtime: None,
            fetched_at,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>, auth_timeout: TimeDelta) -> bool {
        now - self.fetched_at < auth_timeout
    }
}

/// Trust-level cache shared by every `TrustedFilter` evaluation.
///
/// The lock is held across a refill, so concurrent readers of a stale entry
/// wait for the in-flight fetch instead of issuing their own. Each refill
/// replaces the whole table, dropping nodes that left the directory.
pub struct AttestationCache {
    service: Arc<dyn AttestationService>,
    directory: Arc<dyn HostDirectory>,
    clock: Arc<dyn Clock>,
    auth_timeout: TimeDelta,
    entries: Mutex<HashMap<String, AttestationEntry>>,
}

impl AttestationCache {
    pub fn new(
        service: Arc<dyn AttestationService>,
        directory: Arc<dyn HostDirectory>,
        clock: Arc<dyn Clock>,
        auth_timeout: TimeDelta,
    ) -> Self {
        Self {
            service,
            directory,
            clock,
            auth_timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Trust level of `node`, refreshing the cache if its entry is missing
    /// or stale.
    pub fn trust_level(&self, node: &str) -> FilterResult<TrustLevel> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let now = self.clock.now();
        let timeout = self.auth_timeout;
        let cached = entries.get(node).filter(|e| e.is_fresh(now, timeout));
        if let Some(entry) = cached {
            return Ok(entry.trust_lvl.clone());
        }

        self.refill(&mut entries, node)?;
        Ok(entries
            .get(node)
            .map(|e| e.trust_lvl.clone())
            .unwrap_or(TrustLevel::Unknown))
    }

    /// Snapshot of the cached entry for `node`.
    pub fn entry(&self, node: &str) -> Option<AttestationEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(node).cloned()
    }

    fn refill(
        &self,
        entries: &mut HashMap<String, AttestationEntry>,
        node: &str,
    ) -> FilterResult<()> {
        let mut nodes: BTreeSet<String> = self
            .directory
            .compute_nodes()?
            .into_iter()
            .map(|n| n.hypervisor_hostname)
            .collect();
        nodes.insert(node.to_string());
        let nodes: Vec<String> = nodes.into_iter().collect();

        let records = self.service.attest(&nodes)?;
        let fetched_at = self.clock.now();

        let mut fresh: HashMap<String, AttestationEntry> = nodes
            .iter()
            .map(|name| (name.clone(), AttestationEntry::unattested(fetched_at)))
            .collect();

        let mut attested = 0usize;
        for record in records {
            let vtime = match DateTime::parse_from_rfc3339(&record.vtime) {
                Ok(t) => t.with_timezone(&Utc),
                Err(e) => {
                    warn!(
                        node = %record.host_name,
                        vtime = %record.vtime,
                        error = %e,
                        "attestation record has unparseable vtime, treating node as unknown"
                    );
                    continue;
                }
            };
            debug!(node = %record.host_name, trust = %record.trust_lvl, "attested");
            fresh.insert(
                record.host_name,
                AttestationEntry {
                    trust_lvl: TrustLevel::from_label(&record.trust_lvl),
                    vtime: Some(vtime),
                    fetched_at,
                },
            );
            attested += 1;
        }

        let evicted = entries.keys().filter(|k| !fresh.contains_key(*k)).count();
        info!(
            requested = nodes.len(),
            attested,
            evicted,
            "refreshed attestation cache"
        );
        *entries = fresh;
        Ok(())
    }
}

impl fmt::Debug for AttestationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttestationCache")
            .field("auth_timeout", &self.auth_timeout)
            .finish_non_exhaustive()
    }
}
