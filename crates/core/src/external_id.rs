use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Source prefix used by the incwo CRM exports.
pub const INCWO: &str = "incwo";

/// Stable identity assigned by the external CRM, formatted `<source>:<numeric-id>`.
///
/// This is the only key used to match an incoming record against a local
/// entity. Display names never participate in identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalId(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdError(pub String);

impl fmt::Display for ExternalIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid external id: {}", self.0)
    }
}

impl std::error::Error for ExternalIdError {}

impl ExternalId {
    pub fn new(source: &str, id: &str) -> Result<Self, ExternalIdError> {
        let source = source.trim();
        let id = id.trim();
        if source.is_empty() || source.contains(':') {
            return Err(ExternalIdError(format!("bad source '{source}'")));
        }
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ExternalIdError(format!("'{id}' is not a numeric id")));
        }
        Ok(Self(format!("{source}:{id}")))
    }

    /// Build an id in the incwo namespace from the bare numeric id found in exports.
    pub fn incwo(id: &str) -> Result<Self, ExternalIdError> {
        Self::new(INCWO, id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn source(&self) -> &str {
        self.0.split_once(':').map(|(s, _)| s).unwrap_or_default()
    }

    pub fn local_id(&self) -> &str {
        self.0.split_once(':').map(|(_, id)| id).unwrap_or_default()
    }
}

impl FromStr for ExternalId {
    type Err = ExternalIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, id) = s
            .split_once(':')
            .ok_or_else(|| ExternalIdError(format!("'{s}' has no source prefix")))?;
        Self::new(source, id)
    }
}

impl TryFrom<String> for ExternalId {
    type Error = ExternalIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExternalId> for String {
    fn from(id: ExternalId) -> Self {
        id.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
