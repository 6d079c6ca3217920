use std::fmt;
use std::path::PathBuf;

use crmsync_core::Subject;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// File or directory could not be read.
    Io { path: PathBuf, message: String },
    /// File is not well-formed XML, or does not fit the record shape.
    Xml { path: PathBuf, message: String },
    /// Root element is not one of the known subjects.
    UnknownSubject { path: PathBuf, element: String },
    /// A required field is missing or unparsable.
    Malformed {
        path: PathBuf,
        subject: Subject,
        record: Option<String>,
        reason: String,
    },
}

impl LoadError {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Io { path, .. }
            | Self::Xml { path, .. }
            | Self::UnknownSubject { path, .. }
            | Self::Malformed { path, .. } => path,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "cannot read {}: {message}", path.display()),
            Self::Xml { path, message } => write!(f, "{}: invalid XML: {message}", path.display()),
            Self::UnknownSubject { path, element } => {
                write!(f, "{}: unknown record element <{element}>", path.display())
            }
            Self::Malformed { path, subject, record: Some(id), reason } => {
                write!(f, "{}: {subject} record {id}: {reason}", path.display())
            }
            Self::Malformed { path, subject, record: None, reason } => {
                write!(f, "{}: {subject} record: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for LoadError {}
