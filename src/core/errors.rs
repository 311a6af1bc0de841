// src/core/errors.rs

//! Defines the primary error type for the provisioning core.

use crate::core::gr::MemberState;
use crate::core::instance::ErrorLogEntry;
use thiserror::Error;

/// The main error enum, representing all possible failures within the core.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum ReplicoreError {
    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    /// A failure surfaced by the underlying SQL transport. The core propagates
    /// these untouched except where explicitly stated (plugin start wrap).
    #[error("SQL error: {0}")]
    Sql(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "Cannot join instance '{instance}'. Peer instance '{peer}' is no longer a member of the \
         cluster."
    )]
    PeerNotMember { instance: String, peer: String },

    #[error(
        "Cannot join instance '{instance}'. Peer instance '{peer}' state is currently '{state}', \
         but is expected to be 'ONLINE'."
    )]
    PeerNotOnline {
        instance: String,
        peer: String,
        state: MemberState,
    },

    /// `START GROUP_REPLICATION` raised a SQL error. Carries the entries
    /// scraped from the server error log after the captured start timestamp.
    #[error("Group Replication failed to start: {message}")]
    GroupReplicationStartFailed {
        message: String,
        log_entries: Vec<ErrorLogEntry>,
    },

    #[error(
        "Timeout waiting for super_read_only to be unset after call to start Group Replication \
         plugin."
    )]
    ReadyTimeout,

    #[error("Operation not supported on MySQL version {0}")]
    UnsupportedVersion(String),

    #[error("Failed to apply configuration changes: {0}")]
    ConfigApplyFailed(String),

    #[error("Invalid version string '{0}'")]
    InvalidVersion(String),
}
