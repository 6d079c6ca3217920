//! Firm records → companies.

use crmsync_core::{
    Company, CompanyAttrs, CompanyId, FirmRecord, Organisation, OrganisationKey, Row, Store,
    StoreError,
};

use crate::error::ImportError;
use crate::upsert::{ensure, upsert, Outcome};

/// Organisation every imported company gets, and the one derived clients live in.
pub const DEFAULT_ORGANISATION: &str = "Default";

/// Upsert one firm. Repeated external ids collapse onto one company, last
/// record wins.
pub fn import_firm<S: Store>(store: &mut S, record: &FirmRecord) -> Result<Outcome, ImportError> {
    let attrs = CompanyAttrs {
        name: record.name.clone(),
    };
    let (company, outcome) = upsert::<Company, _>(store, record.external_id.clone(), attrs)?;
    default_organisation(store, company.id)?;
    Ok(outcome)
}

pub fn default_organisation<S: Store>(
    store: &mut S,
    company: CompanyId,
) -> Result<Row<Organisation>, StoreError> {
    let key = OrganisationKey {
        company,
        name: DEFAULT_ORGANISATION.to_string(),
    };
    let (organisation, _) = ensure::<Organisation, _>(store, key, ())?;
    Ok(organisation)
}
