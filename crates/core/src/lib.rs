//! `crmsync-core`: domain model shared by the loader, the stores and the
//! reconciliation engine.

pub mod entity;
pub mod external_id;
pub mod memory;
pub mod record;
pub mod store;

pub use entity::{
    Client, ClientId, ClientKey, Company, CompanyAttrs, CompanyId, Contact, ContactAttrs,
    ContactId, Entity, EntityKind, Lead, LeadAttrs, LeadId, LeadState, Mission, MissionAttrs,
    MissionId, Organisation, OrganisationId, OrganisationKey, Row,
};
pub use external_id::{ExternalId, ExternalIdError};
pub use memory::MemoryStore;
pub use record::{
    ContactItems, ContactRecord, ExternalRecord, FirmRecord, LineKind, ProposalLineRecord,
    ProposalSheetRecord, RecordBatch, Subject,
};
pub use store::{Store, StoreError, Table};
