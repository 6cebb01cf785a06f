//! Filter engine error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a filter pass or pipeline construction.
///
/// A host that simply does not qualify is not an error; filters return
/// `Ok(false)` for that. These variants mean the pass cannot be trusted.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("host {host} reports no PCI passthrough inventory but the request needs devices")]
    MissingPciInventory { host: String },

    #[error("attestation error: {0}")]
    Attestation(#[from] AttestationError),

    #[error("host directory error: {0}")]
    Directory(#[from] warpgrid_state::StateError),

    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    #[error("filter {filter} requires {collaborator}")]
    MissingCollaborator {
        filter: &'static str,
        collaborator: &'static str,
    },

    #[error("filter task failed: {0}")]
    Task(String),
}

pub type FilterResult<T> = Result<T, FilterError>;

/// Failures talking to the remote attestation service.
#[derive(Debug, Error)]
pub enum AttestationError {
    #[error("attestation request failed: {0}")]
    Request(String),

    #[error("attestation service returned status {0}")]
    Status(u16),

    #[error("malformed attestation response: {0}")]
    Malformed(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
