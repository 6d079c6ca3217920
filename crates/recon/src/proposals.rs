//! Proposal sheets → leads.

use crmsync_core::{Lead, LeadAttrs, ProposalSheetRecord, Store, Subject};
use crmsync_io::xml::PROPOSAL_SHEET_TYPE;

use crate::clients::{resolve_client, ClientRef};
use crate::config::ImportContext;
use crate::error::ImportError;
use crate::report::{RecordOutcome, SkipReason};
use crate::state::{is_skipped, map_state};
use crate::upsert::upsert_with;

/// Upsert the lead for one proposal sheet.
///
/// Lost proposals and non-proposal sheets are skipped without touching
/// storage, even when an earlier run created a lead for them. An existing
/// lead keeps its sales figure: only mission aggregation writes it.
pub fn import_proposal_sheet<S: Store>(
    store: &mut S,
    ctx: &ImportContext,
    record: &ProposalSheetRecord,
) -> Result<RecordOutcome, ImportError> {
    if !record.sheet_type.trim().eq_ignore_ascii_case(PROPOSAL_SHEET_TYPE) {
        return Ok(RecordOutcome::Skipped(SkipReason::NotAProposal));
    }

    let state = map_state(&record.progress).ok_or_else(|| {
        ImportError::malformed(
            Subject::ProposalSheets,
            &record.external_id,
            format!("unknown progress '{}'", record.progress),
        )
    })?;
    if is_skipped(state) {
        return Ok(RecordOutcome::Skipped(SkipReason::LostProposal));
    }

    let client = resolve_client(
        store,
        ClientRef {
            subject: Subject::ProposalSheets,
            record: &record.external_id,
            firm: record.firm.as_ref(),
            contact: record.contact.as_ref(),
        },
    )?;

    let (_, outcome) = upsert_with::<Lead, _, _>(store, record.external_id.clone(), |existing| {
        LeadAttrs {
            name: record.title.clone(),
            description: record.description.clone(),
            state,
            deal_id: record.deal_id.clone(),
            sales: existing.and_then(|lead| lead.attrs.sales),
            client,
            subsidiary: ctx.subsidiary.clone(),
        }
    })?;
    Ok(outcome.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firms::import_firm;
    use crate::upsert::Outcome;
    use crmsync_core::{ExternalId, FirmRecord, LeadState, MemoryStore, Table};
    use rust_decimal::Decimal;

    fn ext(id: &str) -> ExternalId {
        ExternalId::incwo(id).unwrap()
    }

    fn sheet(id: &str, progress: &str) -> ProposalSheetRecord {
        ProposalSheetRecord {
            external_id: ext(id),
            firm: Some(ext("1")),
            contact: None,
            title: "Project Foobar".into(),
            description: "Echo\n  Alpha   Tango".into(),
            deal_id: Some("D1234-56789".into()),
            progress: progress.into(),
            sheet_type: "proposal".into(),
        }
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let firm = FirmRecord {
            external_id: ext("1"),
            name: "Acme".into(),
        };
        import_firm(&mut store, &firm).unwrap();
        store
    }

    #[test]
    fn won_proposal_becomes_lead() {
        let mut store = store();
        let ctx = ImportContext::new("t");
        let outcome = import_proposal_sheet(&mut store, &ctx, &sheet("3", "won")).unwrap();
        assert_eq!(outcome, RecordOutcome::Upserted(Outcome::Created));

        let lead = Table::<Lead>::find_by_key(&store, &ext("3")).unwrap().unwrap();
        assert_eq!(lead.attrs.name, "Project Foobar");
        assert_eq!(lead.attrs.description, "Echo\n  Alpha   Tango");
        assert_eq!(lead.attrs.state, LeadState::Won);
        assert_eq!(lead.attrs.deal_id.as_deref(), Some("D1234-56789"));
        assert_eq!(lead.attrs.subsidiary, "t");
        assert_eq!(lead.attrs.sales, None);
    }

    #[test]
    fn lost_proposal_is_skipped() {
        let mut store = store();
        let ctx = ImportContext::new("t");
        let outcome = import_proposal_sheet(&mut store, &ctx, &sheet("5", "lost")).unwrap();
        assert_eq!(outcome, RecordOutcome::Skipped(SkipReason::LostProposal));
        assert_eq!(store.count::<Lead>(), 0);
    }

    #[test]
    fn lost_proposal_does_not_touch_an_existing_lead() {
        let mut store = store();
        let ctx = ImportContext::new("t");
        import_proposal_sheet(&mut store, &ctx, &sheet("5", "sent")).unwrap();
        import_proposal_sheet(&mut store, &ctx, &sheet("5", "refused")).unwrap();

        let lead = Table::<Lead>::find_by_key(&store, &ext("5")).unwrap().unwrap();
        assert_eq!(lead.attrs.state, LeadState::OfferSent);
        assert_eq!(store.count::<Lead>(), 1);
    }

    #[test]
    fn invoices_are_not_proposals() {
        let mut store = store();
        let ctx = ImportContext::new("t");
        let mut record = sheet("6", "won");
        record.sheet_type = "bill".into();
        let outcome = import_proposal_sheet(&mut store, &ctx, &record).unwrap();
        assert_eq!(outcome, RecordOutcome::Skipped(SkipReason::NotAProposal));
    }

    #[test]
    fn unknown_progress_is_malformed() {
        let mut store = store();
        let ctx = ImportContext::new("t");
        let err = import_proposal_sheet(&mut store, &ctx, &sheet("3", "on_hold")).unwrap_err();
        assert!(matches!(err, ImportError::MalformedRecord { .. }));
        assert!(err.to_string().contains("on_hold"), "{err}");
    }

    #[test]
    fn reimport_keeps_sales() {
        let mut store = store();
        let ctx = ImportContext::new("t");
        import_proposal_sheet(&mut store, &ctx, &sheet("3", "negotiation")).unwrap();

        let lead = Table::<Lead>::find_by_key(&store, &ext("3")).unwrap().unwrap();
        let mut attrs = lead.attrs.clone();
        attrs.sales = Some(Decimal::new(175, 2));
        Table::<Lead>::update(&mut store, lead.id, attrs).unwrap();

        let outcome = import_proposal_sheet(&mut store, &ctx, &sheet("3", "negotiation")).unwrap();
        assert_eq!(outcome, RecordOutcome::Upserted(Outcome::Unchanged));
        let lead = Table::<Lead>::find_by_key(&store, &ext("3")).unwrap().unwrap();
        assert_eq!(lead.attrs.sales, Some(Decimal::new(175, 2)));
    }
}
