//! Typed external records, one variant per export subject.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::external_id::ExternalId;

/// A subject directory of an export bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Firms,
    Contacts,
    ProposalSheets,
    ProposalLines,
}

impl Subject {
    /// Import order: every subject only references subjects before it.
    pub const ALL: [Subject; 4] = [
        Self::Firms,
        Self::Contacts,
        Self::ProposalSheets,
        Self::ProposalLines,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Firms => "firms",
            Self::Contacts => "contacts",
            Self::ProposalSheets => "proposal_sheets",
            Self::ProposalLines => "proposal_lines",
        }
    }

    /// Root element of one serialized record of this subject.
    pub fn element(&self) -> &'static str {
        match self {
            Self::Firms => "firm",
            Self::Contacts => "contact",
            Self::ProposalSheets => "proposal_sheet",
            Self::ProposalLines => "proposal_line",
        }
    }

    pub fn from_element(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.element() == name)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FirmRecord {
    pub external_id: ExternalId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContactItems {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile_phone: Option<String>,
    pub fax: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactRecord {
    pub external_id: ExternalId,
    pub firm: Option<ExternalId>,
    pub name: String,
    pub job_title: Option<String>,
    pub items: ContactItems,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProposalSheetRecord {
    pub external_id: ExternalId,
    pub firm: Option<ExternalId>,
    pub contact: Option<ExternalId>,
    pub title: String,
    pub description: String,
    pub deal_id: Option<String>,
    /// Raw external progress value, translated by the state table.
    pub progress: String,
    pub sheet_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Section heading, carries no amounts.
    Title,
    Item { quantity: Decimal, unit_price: Decimal },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProposalLineRecord {
    pub external_id: ExternalId,
    pub proposal: ExternalId,
    pub kind: LineKind,
    pub reference: String,
    pub description: String,
    pub unit: Option<String>,
    pub optional: bool,
    pub position: Option<i64>,
}

impl ProposalLineRecord {
    /// quantity × unit price for items. `None` for titles and when the
    /// product does not fit a `Decimal`.
    pub fn amount(&self) -> Option<Decimal> {
        match self.kind {
            LineKind::Title => None,
            LineKind::Item { quantity, unit_price } => quantity.checked_mul(unit_price),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExternalRecord {
    Firm(FirmRecord),
    Contact(ContactRecord),
    ProposalSheet(ProposalSheetRecord),
    ProposalLine(ProposalLineRecord),
}

impl ExternalRecord {
    pub fn subject(&self) -> Subject {
        match self {
            Self::Firm(_) => Subject::Firms,
            Self::Contact(_) => Subject::Contacts,
            Self::ProposalSheet(_) => Subject::ProposalSheets,
            Self::ProposalLine(_) => Subject::ProposalLines,
        }
    }

    pub fn external_id(&self) -> &ExternalId {
        match self {
            Self::Firm(r) => &r.external_id,
            Self::Contact(r) => &r.external_id,
            Self::ProposalSheet(r) => &r.external_id,
            Self::ProposalLine(r) => &r.external_id,
        }
    }
}

/// Loaded records grouped by subject, each in load order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub firms: Vec<FirmRecord>,
    pub contacts: Vec<ContactRecord>,
    pub proposal_sheets: Vec<ProposalSheetRecord>,
    pub proposal_lines: Vec<ProposalLineRecord>,
}

impl RecordBatch {
    pub fn push(&mut self, record: ExternalRecord) {
        match record {
            ExternalRecord::Firm(r) => self.firms.push(r),
            ExternalRecord::Contact(r) => self.contacts.push(r),
            ExternalRecord::ProposalSheet(r) => self.proposal_sheets.push(r),
            ExternalRecord::ProposalLine(r) => self.proposal_lines.push(r),
        }
    }

    pub fn extend(&mut self, other: RecordBatch) {
        self.firms.extend(other.firms);
        self.contacts.extend(other.contacts);
        self.proposal_sheets.extend(other.proposal_sheets);
        self.proposal_lines.extend(other.proposal_lines);
    }

    pub fn count(&self, subject: Subject) -> usize {
        match subject {
            Subject::Firms => self.firms.len(),
            Subject::Contacts => self.contacts.len(),
            Subject::ProposalSheets => self.proposal_sheets.len(),
            Subject::ProposalLines => self.proposal_lines.len(),
        }
    }

    pub fn len(&self) -> usize {
        Subject::ALL.iter().map(|s| self.count(*s)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<ExternalRecord> for RecordBatch {
    fn from_iter<I: IntoIterator<Item = ExternalRecord>>(iter: I) -> Self {
        let mut batch = Self::default();
        for record in iter {
            batch.push(record);
        }
        batch
    }
}
