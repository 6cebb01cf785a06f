//! Filter configuration (`filters.toml`).
//!
//! Constructed once at startup and handed to filter constructors behind an
//! `Arc`. Every key has a default, so an empty file is a valid config.

use std::path::Path;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    /// Filter names in evaluation order.
    pub enabled_filters: Vec<String>,

    pub cpu_allocation_ratio: f64,
    pub ram_allocation_ratio: f64,
    pub disk_allocation_ratio: f64,

    pub max_io_ops_per_host: u32,
    pub max_instances_per_host: u32,

    pub isolated_hosts: Vec<String>,
    pub isolated_images: Vec<String>,
    pub restrict_isolated_hosts_to_isolated_images: bool,

    /// Only aggregate keys under this namespace are matched against image
    /// properties. `None` matches every key.
    pub aggregate_image_properties_isolation_namespace: Option<String>,
    pub aggregate_image_properties_isolation_separator: String,

    /// Seconds without a heartbeat before a compute service counts as down.
    pub service_down_time: u64,

    pub trusted_computing: TrustedComputingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrustedComputingConfig {
    /// Seconds an attestation result stays authoritative.
    pub attestation_auth_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// `name=ratio` entries; the filter only needs the names.
    pub weight_setting: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled_filters: [
                "RetryFilter",
                "AvailabilityZoneFilter",
                "RamFilter",
                "ComputeFilter",
                "ServerGroupAntiAffinityFilter",
                "ServerGroupAffinityFilter",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            cpu_allocation_ratio: 16.0,
            ram_allocation_ratio: 1.5,
            disk_allocation_ratio: 1.0,
            max_io_ops_per_host: 8,
            max_instances_per_host: 50,
            isolated_hosts: Vec::new(),
            isolated_images: Vec::new(),
            restrict_isolated_hosts_to_isolated_images: true,
            aggregate_image_properties_isolation_namespace: None,
            aggregate_image_properties_isolation_separator: ".".to_string(),
            service_down_time: 60,
            trusted_computing: TrustedComputingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TrustedComputingConfig {
    fn default() -> Self {
        Self {
            attestation_auth_timeout: 60,
        }
    }
}

impl FilterConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: FilterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, ratio) in [
            ("cpu_allocation_ratio", self.cpu_allocation_ratio),
            ("ram_allocation_ratio", self.ram_allocation_ratio),
            ("disk_allocation_ratio", self.disk_allocation_ratio),
        ] {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: format!("must be a positive number, got {ratio}"),
                });
            }
        }
        if self.enabled_filters.iter().any(|f| f.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                key: "enabled_filters",
                reason: "filter names must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn service_down_time(&self) -> TimeDelta {
        TimeDelta::seconds(self.service_down_time as i64)
    }

    pub fn attestation_auth_timeout(&self) -> TimeDelta {
        TimeDelta::seconds(self.trusted_computing.attestation_auth_timeout as i64)
    }

    /// Metric names from `metrics.weight_setting`. Malformed entries are skipped.
    pub fn metric_names(&self) -> Vec<String> {
        self.metrics
            .weight_setting
            .iter()
            .filter_map(|entry| match weight_name(entry) {
                Some(name) => Some(name.to_string()),
                None => {
                    warn!(%entry, "ignoring malformed metrics weight setting");
                    None
                }
            })
            .collect()
    }
}

/// Metric name of a `name=ratio` weight setting, if the ratio is numeric.
fn weight_name(entry: &str) -> Option<&str> {
    let (name, ratio) = entry.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || ratio.trim().parse::<f64>().is_err() {
        return None;
    }
    Some(name)
}
