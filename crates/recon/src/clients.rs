//! Client resolution for leads.
//!
//! A client is never imported: it is derived from the firm and contact a
//! proposal references.

use std::collections::HashSet;

use crmsync_core::{
    Client, ClientId, ClientKey, Company, Contact, EntityKind, ExternalId, Store, Subject, Table,
};

use crate::error::ImportError;
use crate::firms::default_organisation;
use crate::upsert::ensure;

/// What a record points at: a contact, a firm, or both.
#[derive(Debug, Clone, Copy)]
pub struct ClientRef<'a> {
    pub subject: Subject,
    pub record: &'a ExternalId,
    pub firm: Option<&'a ExternalId>,
    pub contact: Option<&'a ExternalId>,
}

/// Find or create the client a record belongs to.
///
/// 1. A contact reference yields a client pinned to that contact. An
///    existing pinned client is reused, preferring one inside the named
///    firm; otherwise one is created in the firm's default organisation.
/// 2. A firm-only reference yields the organisation-level client of the
///    firm's default organisation.
/// 3. Neither is a malformed record.
pub fn resolve_client<S: Store>(store: &mut S, by: ClientRef<'_>) -> Result<ClientId, ImportError> {
    let company = match by.firm {
        None => None,
        Some(firm) => Some(
            Table::<Company>::find_by_key(store, firm)?
                .ok_or_else(|| ImportError::missing(by.subject, by.record, EntityKind::Company, firm))?,
        ),
    };

    let Some(contact_ref) = by.contact else {
        let Some(company) = company else {
            return Err(ImportError::malformed(
                by.subject,
                by.record,
                "neither <firm_id> nor <contact_id> given",
            ));
        };
        let organisation = default_organisation(store, company.id)?;
        let key = ClientKey {
            organisation: organisation.id,
            contact: None,
        };
        let (client, _) = ensure::<Client, _>(store, key, ())?;
        return Ok(client.id);
    };

    let contact = Table::<Contact>::find_by_key(store, contact_ref)?.ok_or_else(|| {
        ImportError::missing(by.subject, by.record, EntityKind::Contact, contact_ref)
    })?;
    let pinned = store.clients_of_contact(contact.id)?;

    let Some(company) = company else {
        return pinned.first().map(|c| c.id).ok_or_else(|| {
            ImportError::malformed(by.subject, by.record, "contact is not attached to any firm")
        });
    };

    let organisations: HashSet<_> = store
        .organisations_of(company.id)?
        .into_iter()
        .map(|o| o.id)
        .collect();
    if let Some(client) = pinned
        .iter()
        .find(|c| organisations.contains(&c.key.organisation))
    {
        return Ok(client.id);
    }

    let organisation = default_organisation(store, company.id)?;
    let key = ClientKey {
        organisation: organisation.id,
        contact: Some(contact.id),
    };
    let (client, _) = ensure::<Client, _>(store, key, ())?;
    Ok(client.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::import_contact;
    use crate::firms::import_firm;
    use crmsync_core::{ContactItems, ContactRecord, FirmRecord, MemoryStore};

    fn ext(id: &str) -> ExternalId {
        ExternalId::incwo(id).unwrap()
    }

    fn seeded() -> MemoryStore {
        let mut store = MemoryStore::new();
        for (id, name) in [("1", "Acme"), ("2", "Globex")] {
            let firm = FirmRecord {
                external_id: ext(id),
                name: name.into(),
            };
            import_firm(&mut store, &firm).unwrap();
        }
        for (id, firm) in [("12", Some("1")), ("14", None)] {
            let contact = ContactRecord {
                external_id: ext(id),
                firm: firm.map(ext),
                name: format!("Contact {id}"),
                job_title: None,
                items: ContactItems::default(),
            };
            import_contact(&mut store, &contact).unwrap();
        }
        store
    }

    fn by<'a>(record: &'a ExternalId, firm: Option<&'a ExternalId>, contact: Option<&'a ExternalId>) -> ClientRef<'a> {
        ClientRef {
            subject: Subject::ProposalSheets,
            record,
            firm,
            contact,
        }
    }

    #[test]
    fn firm_only_resolves_to_organisation_client() {
        let mut store = seeded();
        let (record, firm) = (ext("3"), ext("1"));
        let id = resolve_client(&mut store, by(&record, Some(&firm), None)).unwrap();
        let client = Table::<Client>::get(&store, id).unwrap().unwrap();
        assert_eq!(client.key.contact, None);

        let again = resolve_client(&mut store, by(&record, Some(&firm), None)).unwrap();
        assert_eq!(again, id);
    }

    #[test]
    fn contact_reuses_its_pinned_client() {
        let mut store = seeded();
        let before = store.count::<Client>();
        let (record, contact) = (ext("4"), ext("12"));
        let id = resolve_client(&mut store, by(&record, None, Some(&contact))).unwrap();
        let client = Table::<Client>::get(&store, id).unwrap().unwrap();
        let pinned = Table::<Contact>::find_by_key(&store, &contact).unwrap().unwrap();
        assert_eq!(client.key.contact, Some(pinned.id));
        assert_eq!(store.count::<Client>(), before);
    }

    #[test]
    fn contact_in_another_firm_gets_a_new_pinned_client() {
        let mut store = seeded();
        let (record, firm, contact) = (ext("4"), ext("2"), ext("12"));
        let id = resolve_client(&mut store, by(&record, Some(&firm), Some(&contact))).unwrap();
        let client = Table::<Client>::get(&store, id).unwrap().unwrap();
        let globex = Table::<Company>::find_by_key(&store, &firm).unwrap().unwrap();
        let orgs = store.organisations_of(globex.id).unwrap();
        assert_eq!(client.key.organisation, orgs[0].id);
        assert!(client.key.contact.is_some());
    }

    #[test]
    fn firmless_contact_without_firm_is_malformed() {
        let mut store = seeded();
        let (record, contact) = (ext("4"), ext("14"));
        let err = resolve_client(&mut store, by(&record, None, Some(&contact))).unwrap_err();
        assert!(err.to_string().contains("not attached to any firm"), "{err}");

        let firm = ext("1");
        assert!(resolve_client(&mut store, by(&record, Some(&firm), Some(&contact))).is_ok());
    }

    #[test]
    fn unresolvable_references() {
        let mut store = seeded();
        let (record, ghost) = (ext("4"), ext("99"));
        let err = resolve_client(&mut store, by(&record, None, Some(&ghost))).unwrap_err();
        assert!(matches!(err, ImportError::ReferentialIntegrity { kind: EntityKind::Contact, .. }));

        let err = resolve_client(&mut store, by(&record, Some(&ghost), None)).unwrap_err();
        assert!(matches!(err, ImportError::ReferentialIntegrity { kind: EntityKind::Company, .. }));

        let err = resolve_client(&mut store, by(&record, None, None)).unwrap_err();
        assert!(matches!(err, ImportError::MalformedRecord { .. }));
    }
}
