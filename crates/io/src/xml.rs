// XML record parsing
//
// One export file holds one record. The root element names the subject and
// unknown child elements are ignored.

use std::path::Path;
use std::str::FromStr;

use quick_xml::events::Event;
use quick_xml::Reader;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crmsync_core::{
    ContactItems, ContactRecord, ExternalId, ExternalRecord, FirmRecord, LineKind,
    ProposalLineRecord, ProposalSheetRecord, Subject,
};

use crate::error::LoadError;

/// Proposal sheets of any other type (invoices, orders) are not proposals.
pub const PROPOSAL_SHEET_TYPE: &str = "proposal";

#[derive(Debug, Deserialize)]
struct RawFirm {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawContact {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    firm_id: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    job_title: Option<String>,
    #[serde(default)]
    contact_items: Option<RawContactItems>,
}

#[derive(Debug, Default, Deserialize)]
struct RawContactItems {
    #[serde(rename = "contact_item", default)]
    items: Vec<RawContactItem>,
}

#[derive(Debug, Deserialize)]
struct RawContactItem {
    #[serde(default)]
    type_id: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProposalSheet {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    firm_id: Option<String>,
    #[serde(default)]
    contact_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    progress: Option<String>,
    #[serde(default)]
    sheet_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProposalLine {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    proposal_sheet_id: Option<String>,
    #[serde(default)]
    line_type: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    quantity: Option<String>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    unit_price: Option<String>,
    #[serde(default)]
    is_option: Option<String>,
    #[serde(default)]
    position: Option<String>,
}

/// Parse one serialized record. `origin` is only used for error context.
pub fn parse_record(text: &str, origin: &Path) -> Result<ExternalRecord, LoadError> {
    let element = root_element(text).map_err(|message| LoadError::Xml {
        path: origin.to_path_buf(),
        message,
    })?;
    let subject = Subject::from_element(&element).ok_or_else(|| LoadError::UnknownSubject {
        path: origin.to_path_buf(),
        element: element.clone(),
    })?;

    match subject {
        Subject::Firms => {
            let raw: RawFirm = deserialize(text, origin)?;
            firm(raw, origin).map(ExternalRecord::Firm)
        }
        Subject::Contacts => {
            let raw: RawContact = deserialize(text, origin)?;
            contact(raw, origin).map(ExternalRecord::Contact)
        }
        Subject::ProposalSheets => {
            let raw: RawProposalSheet = deserialize(text, origin)?;
            proposal_sheet(raw, origin).map(ExternalRecord::ProposalSheet)
        }
        Subject::ProposalLines => {
            let raw: RawProposalLine = deserialize(text, origin)?;
            proposal_line(raw, origin).map(ExternalRecord::ProposalLine)
        }
    }
}

fn root_element(text: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).to_string());
            }
            Ok(Event::Eof) => return Err("document has no root element".into()),
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
}

fn deserialize<T: DeserializeOwned>(text: &str, origin: &Path) -> Result<T, LoadError> {
    quick_xml::de::from_str(text).map_err(|e| LoadError::Xml {
        path: origin.to_path_buf(),
        message: e.to_string(),
    })
}

/// Empty elements count as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

struct Fields<'a> {
    subject: Subject,
    origin: &'a Path,
    record: Option<String>,
}

impl<'a> Fields<'a> {
    fn new(subject: Subject, origin: &'a Path) -> Self {
        Self { subject, origin, record: None }
    }

    fn malformed(&self, reason: impl Into<String>) -> LoadError {
        LoadError::Malformed {
            path: self.origin.to_path_buf(),
            subject: self.subject,
            record: self.record.clone(),
            reason: reason.into(),
        }
    }

    /// Reads `<id>` and remembers it for later error messages.
    fn identify(&mut self, raw: Option<String>) -> Result<ExternalId, LoadError> {
        let raw = non_blank(raw).ok_or_else(|| self.malformed("missing <id>"))?;
        let id = ExternalId::incwo(&raw).map_err(|e| self.malformed(e.to_string()))?;
        self.record = Some(id.to_string());
        Ok(id)
    }

    fn required(&self, name: &str, raw: Option<String>) -> Result<String, LoadError> {
        non_blank(raw).ok_or_else(|| self.malformed(format!("missing <{name}>")))
    }

    fn reference(&self, name: &str, raw: Option<String>) -> Result<Option<ExternalId>, LoadError> {
        non_blank(raw)
            .map(|v| {
                ExternalId::incwo(&v).map_err(|e| self.malformed(format!("<{name}>: {e}")))
            })
            .transpose()
    }

    fn decimal(&self, name: &str, raw: Option<String>) -> Result<Decimal, LoadError> {
        let raw = self.required(name, raw)?;
        Decimal::from_str(&raw.replace(',', "."))
            .map_err(|_| self.malformed(format!("<{name}>: '{raw}' is not a number")))
    }

    fn flag(&self, name: &str, raw: Option<String>) -> Result<bool, LoadError> {
        match non_blank(raw).map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("0") | Some("false") | Some("no") => Ok(false),
            Some("1") | Some("true") | Some("yes") => Ok(true),
            Some(other) => Err(self.malformed(format!("<{name}>: '{other}' is not a flag"))),
        }
    }
}

fn firm(raw: RawFirm, origin: &Path) -> Result<FirmRecord, LoadError> {
    let mut fields = Fields::new(Subject::Firms, origin);
    let external_id = fields.identify(raw.id)?;
    let name = fields.required("name", raw.name)?;
    Ok(FirmRecord { external_id, name })
}

fn contact(raw: RawContact, origin: &Path) -> Result<ContactRecord, LoadError> {
    let mut fields = Fields::new(Subject::Contacts, origin);
    let external_id = fields.identify(raw.id)?;
    let firm = fields.reference("firm_id", raw.firm_id)?;

    let name = [non_blank(raw.first_name), non_blank(raw.last_name)]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        return Err(fields.malformed("missing <first_name> and <last_name>"));
    }

    let mut items = ContactItems::default();
    for item in raw.contact_items.unwrap_or_default().items {
        let (Some(type_id), Some(value)) = (non_blank(item.type_id), non_blank(item.value)) else {
            continue;
        };
        let slot = match type_id.as_str() {
            "p_email" => &mut items.email,
            "p_tel" => &mut items.phone,
            "p_mobile" => &mut items.mobile_phone,
            "p_fax" => &mut items.fax,
            _ => continue,
        };
        slot.get_or_insert(value);
    }

    Ok(ContactRecord {
        external_id,
        firm,
        name,
        job_title: non_blank(raw.job_title),
        items,
    })
}

fn proposal_sheet(raw: RawProposalSheet, origin: &Path) -> Result<ProposalSheetRecord, LoadError> {
    let mut fields = Fields::new(Subject::ProposalSheets, origin);
    let external_id = fields.identify(raw.id)?;
    Ok(ProposalSheetRecord {
        firm: fields.reference("firm_id", raw.firm_id)?,
        contact: fields.reference("contact_id", raw.contact_id)?,
        title: fields.required("title", raw.title)?,
        description: raw.subject.unwrap_or_default(),
        deal_id: non_blank(raw.reference),
        progress: fields.required("progress", raw.progress)?,
        sheet_type: non_blank(raw.sheet_type).unwrap_or_else(|| PROPOSAL_SHEET_TYPE.to_string()),
        external_id,
    })
}

fn proposal_line(raw: RawProposalLine, origin: &Path) -> Result<ProposalLineRecord, LoadError> {
    let mut fields = Fields::new(Subject::ProposalLines, origin);
    let external_id = fields.identify(raw.id)?;
    let proposal = fields
        .reference("proposal_sheet_id", raw.proposal_sheet_id)?
        .ok_or_else(|| fields.malformed("missing <proposal_sheet_id>"))?;

    let kind = match non_blank(raw.line_type).as_deref() {
        Some("title") => LineKind::Title,
        None | Some("item") => LineKind::Item {
            quantity: fields.decimal("quantity", raw.quantity)?,
            unit_price: fields.decimal("unit_price", raw.unit_price)?,
        },
        Some(other) => return Err(fields.malformed(format!("unknown <line_type> '{other}'"))),
    };

    let position = non_blank(raw.position)
        .map(|p| {
            p.parse::<i64>()
                .map_err(|_| fields.malformed(format!("<position>: '{p}' is not an integer")))
        })
        .transpose()?;

    Ok(ProposalLineRecord {
        external_id,
        proposal,
        kind,
        reference: non_blank(raw.reference).unwrap_or_default(),
        description: non_blank(raw.description).unwrap_or_default(),
        unit: non_blank(raw.unit),
        optional: fields.flag("is_option", raw.is_option)?,
        position,
    })
}
