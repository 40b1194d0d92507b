//! Error types for policy attachment reconciliation

use crate::core::plan::{ApplyReport, Operation};
use crate::core::principal::PrincipalKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes the identity service uses when the addressed entity is gone.
///
/// `NoSuchIdentity` is what older SDKs surfaced for a deleted managed policy.
const NOT_FOUND_CODES: [&str; 2] = ["NoSuchEntity", "NoSuchIdentity"];

/// Reconciliation result type
pub type Result<T> = std::result::Result<T, AttachmentError>;

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum AttachmentError {
    /// Declaration rejected before any remote call was issued
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A single remote call failed
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    /// One or more principal kinds failed during create, update, or delete
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Declaration or state file is unusable
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// State snapshot (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Declaration file is not valid TOML
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AttachmentError {
    /// The aggregated per-kind failure, if this is one
    pub fn as_aggregate(&self) -> Option<&AggregateError> {
        match self {
            AttachmentError::Aggregate(agg) => Some(agg),
            _ => None,
        }
    }
}

/// Error reported by the remote identity service, carried unchanged
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct RemoteError {
    /// Service error code (e.g. "NoSuchEntity", "Throttling")
    pub code: String,
    /// Human-readable message from the service
    pub message: String,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Shorthand for the service's "entity does not exist" error
    pub fn no_such_entity(message: impl Into<String>) -> Self {
        Self::new(NOT_FOUND_CODES[0], message)
    }

    /// Whether the service reported that the addressed entity does not exist
    pub fn is_not_found(&self) -> bool {
        NOT_FOUND_CODES.contains(&self.code.as_str())
    }
}

/// Per-kind failures of one create/update/delete run
///
/// Each slot holds the first failure seen for that principal kind; kinds that
/// succeeded (or had nothing to do) are `None`. The report lists every call
/// attempted, including the ones that landed before the failure.
#[derive(Debug)]
pub struct AggregateError {
    pub attachment: String,
    pub operation: Operation,
    pub users: Option<RemoteError>,
    pub roles: Option<RemoteError>,
    pub groups: Option<RemoteError>,
    pub report: ApplyReport,
}

impl AggregateError {
    /// Failure recorded for a principal kind
    pub fn error_for(&self, kind: PrincipalKind) -> Option<&RemoteError> {
        match kind {
            PrincipalKind::User => self.users.as_ref(),
            PrincipalKind::Role => self.roles.as_ref(),
            PrincipalKind::Group => self.groups.as_ref(),
        }
    }

    /// Kinds that failed, in processing order
    pub fn failed_kinds(&self) -> Vec<PrincipalKind> {
        PrincipalKind::ALL
            .into_iter()
            .filter(|kind| self.error_for(*kind).is_some())
            .collect()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error {} policy attachment ({}):",
            self.operation.verb(),
            self.attachment
        )?;
        for kind in PrincipalKind::ALL {
            match self.error_for(kind) {
                Some(err) => write!(f, "\n {} - {}", kind.plural(), err)?,
                None => write!(f, "\n {} - none", kind.plural())?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
