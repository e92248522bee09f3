// ABOUTME: defines the typed error taxonomy used by the executor, auditor, and confirmation workflow.
// ABOUTME: policy outcomes are data, so nothing here represents an allow/deny verdict.

use std::path::PathBuf;
use std::time::Duration;

use crate::confirmation::PendingConfirmation;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The process never ran, or its pipes could not be drained.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to spawn shell: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed while waiting on command: {0}")]
    Io(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("auditor could not be started: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("auditor failed: {0}")]
    Failed(String),

    #[error("auditor did not answer within {0:?}")]
    Timeout(Duration),

    #[error("auditor returned an unrecognized verdict: {0:?}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfirmationError {
    #[error("a confirmation is already pending for `{}`", .existing.command)]
    Conflict { existing: PendingConfirmation },

    #[error("no pending confirmation")]
    NotFound,

    #[error("the pending confirmation expired")]
    Expired,
}

/// Error channel of the confirmation workflow.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("invalid command: {0}")]
    Validation(String),

    #[error("command refused: {0}")]
    Refused(String),

    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
