use std::collections::HashSet;
use std::path::Path;

use crmsync_core::{
    ContactRecord, ExternalId, FirmRecord, ProposalLineRecord, ProposalSheetRecord, RecordBatch,
    Store, Subject,
};
use crmsync_io::{load_bundle, present_subjects};

use crate::config::ImportContext;
use crate::contacts::import_contact;
use crate::error::ImportError;
use crate::firms::import_firm;
use crate::missions::{group_by_proposal, import_mission};
use crate::proposals::import_proposal_sheet;
use crate::report::{ImportReport, RecordOutcome, SkipReason, SubjectReport};

/// One import run against one store.
///
/// Subjects must be fed in [`Subject::ALL`] order: lines of a proposal
/// skipped by an earlier call are skipped too.
pub struct Importer<'a, S: Store> {
    store: &'a mut S,
    ctx: &'a ImportContext,
    skipped_proposals: HashSet<ExternalId>,
    report: ImportReport,
}

impl<'a, S: Store> Importer<'a, S> {
    pub fn new(store: &'a mut S, ctx: &'a ImportContext) -> Result<Self, ImportError> {
        ctx.validate()?;
        Ok(Self {
            store,
            ctx,
            skipped_proposals: HashSet::new(),
            report: ImportReport::new(&ctx.subsidiary),
        })
    }

    pub fn finish(self) -> ImportReport {
        self.report
    }

    pub fn import_firms(&mut self, records: &[FirmRecord]) -> Result<(), ImportError> {
        let (report, result) = run_subject(
            self.store,
            self.ctx,
            Subject::Firms,
            records.len(),
            records,
            |r| &r.external_id,
            |store, _, record| Ok(import_firm(store, record)?.into()),
        );
        self.report.subjects.push(report);
        result
    }

    pub fn import_contacts(&mut self, records: &[ContactRecord]) -> Result<(), ImportError> {
        let (report, result) = run_subject(
            self.store,
            self.ctx,
            Subject::Contacts,
            records.len(),
            records,
            |r| &r.external_id,
            |store, _, record| Ok(import_contact(store, record)?.into()),
        );
        self.report.subjects.push(report);
        result
    }

    pub fn import_proposal_sheets(
        &mut self,
        records: &[ProposalSheetRecord],
    ) -> Result<(), ImportError> {
        let (report, result) = run_subject(
            self.store,
            self.ctx,
            Subject::ProposalSheets,
            records.len(),
            records,
            |r| &r.external_id,
            import_proposal_sheet,
        );
        self.skipped_proposals
            .extend(report.skipped.iter().map(|s| s.record.clone()));
        self.report.subjects.push(report);
        result
    }

    /// Aggregate lines into missions, one unit of work per proposal.
    pub fn import_proposal_lines(
        &mut self,
        records: &[ProposalLineRecord],
    ) -> Result<(), ImportError> {
        let groups = group_by_proposal(records);

        if !self.ctx.import_missions {
            let mut report = SubjectReport::new(Subject::ProposalLines, records.len());
            for (proposal, _) in groups {
                report.skip(proposal, SkipReason::MissionsDisabled);
            }
            log::warn!(
                "{}: {} record(s) skipped, mission import disabled",
                Subject::ProposalLines,
                records.len()
            );
            self.report.subjects.push(report);
            return Ok(());
        }

        let skipped = &self.skipped_proposals;
        let (report, result) = run_subject(
            self.store,
            self.ctx,
            Subject::ProposalLines,
            records.len(),
            &groups,
            |(proposal, _)| proposal,
            |store, ctx, (proposal, lines)| {
                if skipped.contains(proposal) {
                    return Ok(RecordOutcome::Skipped(SkipReason::LostProposalLines));
                }
                Ok(import_mission(store, ctx, proposal, lines)?.into())
            },
        );
        self.report.subjects.push(report);
        result
    }

    /// Import every non-empty subject of `batch`, in dependency order.
    pub fn import_batch(&mut self, batch: &RecordBatch) -> Result<(), ImportError> {
        let subjects: Vec<_> = Subject::ALL
            .into_iter()
            .filter(|s| batch.count(*s) > 0)
            .collect();
        self.import_subjects(batch, &subjects)
    }

    /// Load the bundle under `root`, then import every subject found there.
    ///
    /// The whole bundle is parsed before the first write.
    pub fn import_dir(&mut self, root: &Path) -> Result<(), ImportError> {
        self.report.meta.root = Some(root.display().to_string());
        let batch = load_bundle(root)?;
        let present = present_subjects(root);
        let subjects: Vec<_> = Subject::ALL
            .into_iter()
            .filter(|s| present.contains(s) || batch.count(*s) > 0)
            .collect();
        log::info!(
            "{}: {} record(s) in {} subject(s)",
            root.display(),
            batch.len(),
            subjects.len()
        );
        self.import_subjects(&batch, &subjects)
    }

    fn import_subjects(
        &mut self,
        batch: &RecordBatch,
        subjects: &[Subject],
    ) -> Result<(), ImportError> {
        for subject in Subject::ALL.into_iter().filter(|s| subjects.contains(s)) {
            match subject {
                Subject::Firms => self.import_firms(&batch.firms)?,
                Subject::Contacts => self.import_contacts(&batch.contacts)?,
                Subject::ProposalSheets => self.import_proposal_sheets(&batch.proposal_sheets)?,
                Subject::ProposalLines => self.import_proposal_lines(&batch.proposal_lines)?,
            }
        }
        Ok(())
    }
}

/// Run every unit of one subject, each inside its own store transaction.
///
/// Data errors abort the subject under `fail_fast`, otherwise they are
/// recorded and the next unit runs. Storage errors always abort.
fn run_subject<S, T, I, F>(
    store: &mut S,
    ctx: &ImportContext,
    subject: Subject,
    loaded: usize,
    units: &[T],
    id_of: I,
    mut step: F,
) -> (SubjectReport, Result<(), ImportError>)
where
    S: Store,
    I: Fn(&T) -> &ExternalId,
    F: FnMut(&mut S, &ImportContext, &T) -> Result<RecordOutcome, ImportError>,
{
    let mut report = SubjectReport::new(subject, loaded);
    let mut result = Ok(());

    for unit in units {
        let id = id_of(unit);
        match store.atomically(|s| step(s, ctx, unit)) {
            Ok(RecordOutcome::Upserted(outcome)) => {
                log::debug!("{subject} {id}: {outcome}");
                report.count(outcome);
            }
            Ok(RecordOutcome::Skipped(reason)) => {
                log::warn!("{subject} {id}: skipped, {reason}");
                report.skip(id.clone(), reason);
            }
            Err(e) => {
                report.fail(Some(id.clone()), e.to_string());
                if ctx.fail_fast || !e.is_data_error() {
                    result = Err(e);
                    break;
                }
                log::warn!("{e}; continuing");
            }
        }
    }

    log::info!(
        "{subject}: {} loaded, {} created, {} updated, {} unchanged, {} skipped, {} failed",
        report.loaded,
        report.created,
        report.updated,
        report.unchanged,
        report.skipped.len(),
        report.failures.len()
    );
    (report, result)
}

/// Import the bundle under `root` in one run.
pub fn import_dir<S: Store>(
    store: &mut S,
    ctx: &ImportContext,
    root: &Path,
) -> Result<ImportReport, ImportError> {
    let mut importer = Importer::new(store, ctx)?;
    importer.import_dir(root)?;
    Ok(importer.finish())
}

/// Import an already loaded batch in one run.
pub fn import_batch<S: Store>(
    store: &mut S,
    ctx: &ImportContext,
    batch: &RecordBatch,
) -> Result<ImportReport, ImportError> {
    let mut importer = Importer::new(store, ctx)?;
    importer.import_batch(batch)?;
    Ok(importer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_core::{ContactItems, Lead, MemoryStore};

    fn ext(id: &str) -> ExternalId {
        ExternalId::incwo(id).unwrap()
    }

    fn firm(id: &str) -> FirmRecord {
        FirmRecord {
            external_id: ext(id),
            name: format!("Firm {id}"),
        }
    }

    fn contact(id: &str, firm: &str) -> ContactRecord {
        ContactRecord {
            external_id: ext(id),
            firm: Some(ext(firm)),
            name: format!("Contact {id}"),
            job_title: None,
            items: ContactItems::default(),
        }
    }

    #[test]
    fn fail_fast_stops_at_first_bad_record() {
        let mut store = MemoryStore::new();
        let ctx = ImportContext::new("t");
        let mut importer = Importer::new(&mut store, &ctx).unwrap();
        importer.import_firms(&[firm("1")]).unwrap();

        let err = importer
            .import_contacts(&[contact("12", "99"), contact("13", "1")])
            .unwrap_err();
        assert!(matches!(err, ImportError::ReferentialIntegrity { .. }));

        let report = importer.finish();
        let contacts = report.subject(Subject::Contacts).unwrap();
        assert_eq!(contacts.failures.len(), 1);
        assert_eq!(contacts.created, 0);
        assert_eq!(store.count::<crmsync_core::Contact>(), 0);
    }

    #[test]
    fn keep_going_records_failures() {
        let mut store = MemoryStore::new();
        let mut ctx = ImportContext::new("t");
        ctx.fail_fast = false;
        let batch = RecordBatch {
            firms: vec![firm("1")],
            contacts: vec![contact("12", "99"), contact("13", "1")],
            ..RecordBatch::default()
        };

        let report = import_batch(&mut store, &ctx, &batch).unwrap();
        let contacts = report.subject(Subject::Contacts).unwrap();
        assert_eq!(contacts.created, 1);
        assert_eq!(contacts.failures[0].record, Some(ext("12")));
        assert!(report.has_failures());
        assert_eq!(store.count::<crmsync_core::Contact>(), 1);
    }

    #[test]
    fn lines_of_lost_proposals_are_skipped() {
        let mut store = MemoryStore::new();
        let mut ctx = ImportContext::new("t");
        ctx.import_missions = true;
        let line = ProposalLineRecord {
            external_id: ext("51"),
            proposal: ext("5"),
            kind: crmsync_core::LineKind::Item {
                quantity: rust_decimal::Decimal::ONE,
                unit_price: rust_decimal::Decimal::ONE_HUNDRED,
            },
            reference: "DEV".into(),
            description: String::new(),
            unit: None,
            optional: false,
            position: None,
        };
        let batch = RecordBatch {
            firms: vec![firm("1")],
            proposal_sheets: vec![ProposalSheetRecord {
                external_id: ext("5"),
                firm: Some(ext("1")),
                contact: None,
                title: "Lost deal".into(),
                description: String::new(),
                deal_id: None,
                progress: "lost".into(),
                sheet_type: "proposal".into(),
            }],
            proposal_lines: vec![line],
            ..RecordBatch::default()
        };

        let report = import_batch(&mut store, &ctx, &batch).unwrap();
        let lines = report.subject(Subject::ProposalLines).unwrap();
        assert_eq!(lines.skipped[0].reason, SkipReason::LostProposalLines);
        assert_eq!(store.count::<Lead>(), 0);
        assert_eq!(store.count::<crmsync_core::Mission>(), 0);
    }

    #[test]
    fn missions_disabled_skips_lines() {
        let mut store = MemoryStore::new();
        let ctx = ImportContext::new("t");
        let line = ProposalLineRecord {
            external_id: ext("31"),
            proposal: ext("3"),
            kind: crmsync_core::LineKind::Title,
            reference: String::new(),
            description: "Build".into(),
            unit: None,
            optional: false,
            position: None,
        };
        let batch = RecordBatch {
            proposal_lines: vec![line],
            ..RecordBatch::default()
        };
        let report = import_batch(&mut store, &ctx, &batch).unwrap();
        let lines = report.subject(Subject::ProposalLines).unwrap();
        assert_eq!(lines.loaded, 1);
        assert_eq!(lines.skipped[0].reason, SkipReason::MissionsDisabled);
        assert!(!report.has_failures());
    }

    #[test]
    fn invalid_context_is_rejected() {
        let mut store = MemoryStore::new();
        let ctx = ImportContext::new("");
        assert!(matches!(
            Importer::new(&mut store, &ctx),
            Err(ImportError::ConfigValidation(_))
        ));
    }
}
