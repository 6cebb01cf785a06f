//! Per-host resolution of allocation ratios and per-host maximums.
//!
//! A global default can be overridden by aggregate metadata. When a host
//! sits in several aggregates that set the same key, the smallest parseable
//! value wins; values that fail to parse are dropped with a warning.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;
use warpgrid_state::HostDirectory;

use crate::error::FilterResult;

/// A value type that can be read out of aggregate metadata.
pub trait OverrideValue: Copy + PartialOrd + Display + FromStr {
    /// Whether a parsed value is acceptable as an override.
    fn is_usable(&self) -> bool {
        true
    }
}

impl OverrideValue for f64 {
    fn is_usable(&self) -> bool {
        self.is_finite() && *self >= 0.0
    }
}

impl OverrideValue for u32 {}

/// Where a resolver looks for overrides.
#[derive(Clone)]
pub enum OverrideSource {
    /// Only the configured default is used.
    Global,
    /// Aggregate metadata may override the default.
    Aggregates(Arc<dyn HostDirectory>),
}

impl std::fmt::Debug for OverrideSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => f.write_str("Global"),
            Self::Aggregates(_) => f.write_str("Aggregates"),
        }
    }
}

/// Resolves one metadata key to a typed value for a host.
#[derive(Debug, Clone)]
pub struct MetadataResolver<T> {
    key: &'static str,
    default: T,
    source: OverrideSource,
}

impl<T: OverrideValue> MetadataResolver<T> {
    pub fn global(key: &'static str, default: T) -> Self {
        Self {
            key,
            default,
            source: OverrideSource::Global,
        }
    }

    pub fn aggregate(key: &'static str, default: T, directory: Arc<dyn HostDirectory>) -> Self {
        Self {
            key,
            default,
            source: OverrideSource::Aggregates(directory),
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn resolve(&self, host: &str) -> FilterResult<T> {
        let directory = match &self.source {
            OverrideSource::Global => return Ok(self.default),
            OverrideSource::Aggregates(directory) => directory,
        };

        let values = directory.metadata_values(host, self.key)?;
        let resolved = min_override(host, self.key, &values);
        Ok(resolved.unwrap_or(self.default))
    }
}

/// Smallest parseable value in `raw`, or `None` when nothing parses.
pub fn min_override<T: OverrideValue>(host: &str, key: &str, raw: &[String]) -> Option<T> {
    raw.iter()
        .filter_map(|value| match value.trim().parse::<T>() {
            Ok(parsed) if parsed.is_usable() => Some(parsed),
            _ => {
                warn!(%host, %key, %value, "discarding unparseable aggregate metadata value");
                None
            }
        })
        .fold(None, |min: Option<T>, v| match min {
            Some(m) if m <= v => Some(m),
            _ => Some(v),
        })
}
