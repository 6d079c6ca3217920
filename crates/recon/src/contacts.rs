//! Contact records → contacts, plus the client pinning each one to its firm.

use crmsync_core::{
    Client, ClientKey, Company, Contact, ContactAttrs, ContactRecord, EntityKind, Store, Subject,
    Table,
};

use crate::error::ImportError;
use crate::firms::default_organisation;
use crate::upsert::{ensure, upsert, Outcome};

/// Absent fields become empty strings.
pub fn contact_attrs(record: &ContactRecord) -> ContactAttrs {
    let items = &record.items;
    ContactAttrs {
        name: record.name.clone(),
        function: record.job_title.clone().unwrap_or_default(),
        email: items.email.clone().unwrap_or_default(),
        phone: items.phone.clone().unwrap_or_default(),
        mobile_phone: items.mobile_phone.clone().unwrap_or_default(),
        fax: items.fax.clone().unwrap_or_default(),
    }
}

/// Upsert one contact, matched on external id only: homonyms stay distinct.
///
/// A contact attached to a firm gets a client pinned to it in the firm's
/// default organisation; the firm must already be imported.
pub fn import_contact<S: Store>(
    store: &mut S,
    record: &ContactRecord,
) -> Result<Outcome, ImportError> {
    let company = match &record.firm {
        None => None,
        Some(firm) => Some(Table::<Company>::find_by_key(store, firm)?.ok_or_else(|| {
            ImportError::missing(Subject::Contacts, &record.external_id, EntityKind::Company, firm)
        })?),
    };

    let (contact, outcome) =
        upsert::<Contact, _>(store, record.external_id.clone(), contact_attrs(record))?;

    let Some(company) = company else {
        return Ok(outcome);
    };
    let organisation = default_organisation(store, company.id)?;
    let key = ClientKey {
        organisation: organisation.id,
        contact: Some(contact.id),
    };
    let (_, client) = ensure::<Client, _>(store, key, ())?;

    // A new firm link on a known contact is still a change
    if outcome == Outcome::Unchanged && client == Outcome::Created {
        return Ok(Outcome::Updated);
    }
    Ok(outcome)
}
