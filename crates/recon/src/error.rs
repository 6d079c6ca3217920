use std::fmt;

use crmsync_core::{EntityKind, ExternalId, StoreError, Subject};
use crmsync_io::LoadError;

#[derive(Debug, Clone, PartialEq)]
pub enum ImportError {
    /// A record references a related entity that does not exist locally.
    ReferentialIntegrity {
        subject: Subject,
        record: ExternalId,
        kind: EntityKind,
        missing: ExternalId,
    },
    /// A record lacks a required field or carries an unusable value.
    MalformedRecord {
        subject: Subject,
        record: Option<ExternalId>,
        reason: String,
    },
    /// The bundle could not be loaded.
    Load(LoadError),
    /// The storage collaborator failed.
    Store(StoreError),
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty subsidiary, bad divisor, etc.).
    ConfigValidation(String),
}

impl ImportError {
    pub(crate) fn malformed(subject: Subject, record: &ExternalId, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            subject,
            record: Some(record.clone()),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(
        subject: Subject,
        record: &ExternalId,
        kind: EntityKind,
        missing: &ExternalId,
    ) -> Self {
        Self::ReferentialIntegrity {
            subject,
            record: record.clone(),
            kind,
            missing: missing.clone(),
        }
    }

    /// Referential or malformed-record failure, as opposed to an
    /// environment failure.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::ReferentialIntegrity { .. } | Self::MalformedRecord { .. }
        )
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReferentialIntegrity { subject, record, kind, missing } => write!(
                f,
                "{subject} record {record}: references unknown {kind} {missing}"
            ),
            Self::MalformedRecord { subject, record: Some(record), reason } => {
                write!(f, "{subject} record {record}: {reason}")
            }
            Self::MalformedRecord { subject, record: None, reason } => {
                write!(f, "{subject} record: {reason}")
            }
            Self::Load(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ImportError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<LoadError> for ImportError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::Malformed { subject, record, reason, path } => Self::MalformedRecord {
                subject,
                record: record.and_then(|r| r.parse().ok()),
                reason: format!("{reason} ({})", path.display()),
            },
            other => Self::Load(other),
        }
    }
}
