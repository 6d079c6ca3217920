//! Storage contract consumed by the reconciliation engine.

use std::fmt;

use crate::entity::{
    Client, ClientId, Company, CompanyId, Contact, ContactId, Entity, EntityKind, Lead, LeadId,
    Mission, Organisation, OrganisationId, Row,
};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// No row with this id.
    NotFound { kind: EntityKind, id: i64 },
    /// A row with this identity key already exists.
    Duplicate { kind: EntityKind, key: String },
    /// Failure reported by the backing database.
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { kind, id } => write!(f, "{kind} #{id} not found"),
            Self::Duplicate { kind, key } => write!(f, "{kind} with key {key} already exists"),
            Self::Backend(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// One entity kind's rows.
pub trait Table<E: Entity> {
    fn get(&self, id: E::Id) -> Result<Option<Row<E>>, StoreError>;

    /// Lookup by identity key (the external id for externally keyed kinds).
    fn find_by_key(&self, key: &E::Key) -> Result<Option<Row<E>>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] if the key is taken.
    fn create(&mut self, key: E::Key, attrs: E::Attrs) -> Result<Row<E>, StoreError>;

    fn update(&mut self, id: E::Id, attrs: E::Attrs) -> Result<Row<E>, StoreError>;

    /// Every row, ordered by id.
    fn all(&self) -> Result<Vec<Row<E>>, StoreError>;
}

/// The persistent domain model: one table per kind plus relationship accessors.
pub trait Store:
    Table<Company>
    + Table<Organisation>
    + Table<Contact>
    + Table<Client>
    + Table<Lead>
    + Table<Mission>
{
    fn organisations_of(&self, company: CompanyId) -> Result<Vec<Row<Organisation>>, StoreError> {
        let rows = Table::<Organisation>::all(self)?;
        Ok(rows.into_iter().filter(|o| o.key.company == company).collect())
    }

    fn clients_of(&self, organisation: OrganisationId) -> Result<Vec<Row<Client>>, StoreError> {
        let rows = Table::<Client>::all(self)?;
        Ok(rows
            .into_iter()
            .filter(|c| c.key.organisation == organisation)
            .collect())
    }

    fn clients_of_contact(&self, contact: ContactId) -> Result<Vec<Row<Client>>, StoreError> {
        let rows = Table::<Client>::all(self)?;
        Ok(rows
            .into_iter()
            .filter(|c| c.key.contact == Some(contact))
            .collect())
    }

    fn missions_of(&self, lead: LeadId) -> Result<Vec<Row<Mission>>, StoreError> {
        Ok(Table::<Mission>::find_by_key(self, &lead)?.into_iter().collect())
    }

    fn leads_of(&self, client: ClientId) -> Result<Vec<Row<Lead>>, StoreError> {
        let rows = Table::<Lead>::all(self)?;
        Ok(rows.into_iter().filter(|l| l.attrs.client == client).collect())
    }

    /// Run `f` as one unit of work: if it fails, none of its writes remain.
    fn atomically<T, Err, F>(&mut self, f: F) -> Result<T, Err>
    where
        Self: Sized,
        Err: From<StoreError>,
        F: FnOnce(&mut Self) -> Result<T, Err>;
}
