use serde::Serialize;

use crmsync_core::{ExternalId, Subject};

use crate::upsert::Outcome;

// ---------------------------------------------------------------------------
// Skips
// ---------------------------------------------------------------------------

/// Deliberate no-import decisions. Never errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The proposal's progress maps to LOST.
    LostProposal,
    /// The sheet is not a commercial proposal (invoice, order, ...).
    NotAProposal,
    /// The line belongs to a proposal skipped in this run.
    LostProposalLines,
    /// Mission import is switched off.
    MissionsDisabled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LostProposal => write!(f, "lost proposal"),
            Self::NotAProposal => write!(f, "not a proposal"),
            Self::LostProposalLines => write!(f, "line of a skipped proposal"),
            Self::MissionsDisabled => write!(f, "mission import disabled"),
        }
    }
}

/// What happened to one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Upserted(Outcome),
    Skipped(SkipReason),
}

impl From<Outcome> for RecordOutcome {
    fn from(outcome: Outcome) -> Self {
        Self::Upserted(outcome)
    }
}

// ---------------------------------------------------------------------------
// Per-subject report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skipped {
    pub record: ExternalId,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub record: Option<ExternalId>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectReport {
    pub subject: Subject,
    pub loaded: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: Vec<Skipped>,
    pub failures: Vec<Failure>,
}

impl SubjectReport {
    pub fn new(subject: Subject, loaded: usize) -> Self {
        Self {
            subject,
            loaded,
            created: 0,
            updated: 0,
            unchanged: 0,
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn skip(&mut self, record: ExternalId, reason: SkipReason) {
        self.skipped.push(Skipped { record, reason });
    }

    pub fn fail(&mut self, record: Option<ExternalId>, message: impl Into<String>) {
        self.failures.push(Failure {
            record,
            message: message.into(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMeta {
    pub engine_version: String,
    pub run_at: String,
    /// Bundle root, when the run was driven from a directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    pub subsidiary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub meta: ReportMeta,
    pub subjects: Vec<SubjectReport>,
}

impl ImportReport {
    pub fn new(subsidiary: &str) -> Self {
        Self {
            meta: ReportMeta {
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
                root: None,
                subsidiary: subsidiary.to_string(),
            },
            subjects: Vec::new(),
        }
    }

    pub fn subject(&self, subject: Subject) -> Option<&SubjectReport> {
        self.subjects.iter().find(|s| s.subject == subject)
    }

    pub fn failure_count(&self) -> usize {
        self.subjects.iter().map(|s| s.failures.len()).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape() {
        let mut report = ImportReport::new("t");
        let mut subject = SubjectReport::new(Subject::ProposalSheets, 3);
        subject.count(Outcome::Created);
        subject.count(Outcome::Unchanged);
        subject.skip(ExternalId::incwo("5").unwrap(), SkipReason::LostProposal);
        report.subjects.push(subject);

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["meta"]["subsidiary"], "t");
        assert!(value["meta"].get("root").is_none());
        let sheets = &value["subjects"][0];
        assert_eq!(sheets["subject"], "proposal_sheets");
        assert_eq!(sheets["loaded"], 3);
        assert_eq!(sheets["created"], 1);
        assert_eq!(sheets["unchanged"], 1);
        assert_eq!(sheets["skipped"][0]["record"], "incwo:5");
        assert_eq!(sheets["skipped"][0]["reason"], "lost_proposal");
        assert!(!report.has_failures());
    }
}
