//! Proposal lines → one mission per lead, and the lead's sales figure.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use rust_decimal::Decimal;

use crmsync_core::{
    EntityKind, ExternalId, Lead, LeadAttrs, LineKind, Mission, MissionAttrs, ProposalLineRecord,
    Store, Subject, Table,
};

use crate::config::ImportContext;
use crate::error::ImportError;
use crate::upsert::{upsert, Outcome};

const OPTION_MARKER: &str = " _[option]_";

#[derive(Debug, Clone, PartialEq)]
pub struct MissionTotal {
    /// Non-optional items only, in the sales scale.
    pub sales: Decimal,
    /// Rendered breakdown of every line, options included.
    pub description: String,
}

/// Group lines by the proposal they belong to, in proposal id order.
pub fn group_by_proposal(lines: &[ProposalLineRecord]) -> Vec<(ExternalId, Vec<&ProposalLineRecord>)> {
    let mut groups: BTreeMap<&ExternalId, Vec<&ProposalLineRecord>> = BTreeMap::new();
    for line in lines {
        groups.entry(&line.proposal).or_default().push(line);
    }
    groups
        .into_iter()
        .map(|(proposal, lines)| (proposal.clone(), lines))
        .collect()
}

/// Sum and render one proposal's lines.
///
/// Sums that do not fit a `Decimal` are malformed records: the offending
/// line, or the first line when only the scaled sales overflow.
pub fn aggregate(
    lines: &[&ProposalLineRecord],
    ctx: &ImportContext,
) -> Result<MissionTotal, ImportError> {
    let mut ordered = lines.to_vec();
    ordered.sort_by_key(|l| {
        (
            l.position.unwrap_or(i64::MAX),
            l.external_id.local_id().parse::<u64>().unwrap_or(u64::MAX),
        )
    });

    let symbol = &ctx.currency_symbol;
    let mut mandatory = Decimal::ZERO;
    let mut total = Decimal::ZERO;
    let mut text = String::new();

    for line in ordered {
        match line.kind {
            LineKind::Title => {
                let heading = if line.description.is_empty() {
                    &line.reference
                } else {
                    &line.description
                };
                let _ = writeln!(text, "*{heading}*");
            }
            LineKind::Item { quantity, unit_price } => {
                let overflow = || {
                    ImportError::malformed(
                        Subject::ProposalLines,
                        &line.external_id,
                        format!("amount {quantity} × {unit_price} overflows"),
                    )
                };
                let amount = line.amount().ok_or_else(overflow)?;
                total = total.checked_add(amount).ok_or_else(overflow)?;
                if !line.optional {
                    mandatory = mandatory.checked_add(amount).ok_or_else(overflow)?;
                }

                let marker = if line.optional { OPTION_MARKER } else { "" };
                let quantity = match &line.unit {
                    Some(unit) => format!("{} {unit}", quantity.normalize()),
                    None => quantity.normalize().to_string(),
                };
                let _ = writeln!(
                    text,
                    "- {}{marker}. {}. {quantity} × {} {symbol} = {} {symbol}",
                    line.reference,
                    line.description,
                    unit_price.normalize(),
                    amount.normalize(),
                );
            }
        }
    }
    let _ = write!(text, "Total: {} {symbol}", total.normalize());

    let sales = ctx.sales.scale(mandatory).ok_or_else(|| ImportError::MalformedRecord {
        subject: Subject::ProposalLines,
        record: lines.first().map(|l| l.external_id.clone()),
        reason: format!("sales {mandatory} / {} overflows", ctx.sales.divisor),
    })?;
    Ok(MissionTotal {
        sales,
        description: text,
    })
}

/// Write one proposal's aggregate onto its lead and its mission.
///
/// The lead must exist. Re-running with the same lines is a no-op.
pub fn import_mission<S: Store>(
    store: &mut S,
    ctx: &ImportContext,
    proposal: &ExternalId,
    lines: &[&ProposalLineRecord],
) -> Result<Outcome, ImportError> {
    let Some(lead) = Table::<Lead>::find_by_key(store, proposal)? else {
        let record = lines.first().map(|l| &l.external_id).unwrap_or(proposal);
        return Err(ImportError::missing(
            Subject::ProposalLines,
            record,
            EntityKind::Lead,
            proposal,
        ));
    };

    let total = aggregate(lines, ctx)?;
    let lead_attrs = LeadAttrs {
        sales: Some(total.sales),
        ..lead.attrs.clone()
    };
    let (_, lead_outcome) = upsert::<Lead, _>(store, lead.key.clone(), lead_attrs)?;
    let mission_attrs = MissionAttrs {
        price: total.sales,
        description: total.description,
    };
    let (_, mission_outcome) = upsert::<Mission, _>(store, lead.id, mission_attrs)?;

    Ok(match (lead_outcome, mission_outcome) {
        (_, Outcome::Created) => Outcome::Created,
        (Outcome::Unchanged, Outcome::Unchanged) => Outcome::Unchanged,
        _ => Outcome::Updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firms::import_firm;
    use crate::proposals::import_proposal_sheet;
    use crmsync_core::{FirmRecord, MemoryStore, ProposalSheetRecord};
    use std::str::FromStr;

    fn ext(id: &str) -> ExternalId {
        ExternalId::incwo(id).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(id: &str, reference: &str, qty: &str, price: &str, optional: bool) -> ProposalLineRecord {
        ProposalLineRecord {
            external_id: ext(id),
            proposal: ext("3"),
            kind: LineKind::Item {
                quantity: dec(qty),
                unit_price: dec(price),
            },
            reference: reference.into(),
            description: format!("{reference} work"),
            unit: Some("days".into()),
            optional,
            position: None,
        }
    }

    fn title(id: &str, text: &str, position: i64) -> ProposalLineRecord {
        ProposalLineRecord {
            external_id: ext(id),
            proposal: ext("3"),
            kind: LineKind::Title,
            reference: String::new(),
            description: text.into(),
            unit: None,
            optional: false,
            position: Some(position),
        }
    }

    fn store_with_lead() -> MemoryStore {
        let mut store = MemoryStore::new();
        let firm = FirmRecord {
            external_id: ext("1"),
            name: "Acme".into(),
        };
        import_firm(&mut store, &firm).unwrap();
        let sheet = ProposalSheetRecord {
            external_id: ext("3"),
            firm: Some(ext("1")),
            contact: None,
            title: "Project Foobar".into(),
            description: String::new(),
            deal_id: None,
            progress: "won".into(),
            sheet_type: "proposal".into(),
        };
        import_proposal_sheet(&mut store, &ImportContext::new("t"), &sheet).unwrap();
        store
    }

    #[test]
    fn optional_lines_are_excluded_from_sales() {
        let lines = [
            item("31", "DEV", "3.5", "500", false),
            item("32", "SUP", "2", "450", true),
        ];
        let refs: Vec<_> = lines.iter().collect();
        let total = aggregate(&refs, &ImportContext::new("t")).unwrap();
        assert_eq!(total.sales, dec("1.75"));
        assert!(total.description.contains("SUP _[option]_"), "{}", total.description);
        assert!(total.description.ends_with("Total: 2650 €"), "{}", total.description);
    }

    #[test]
    fn breakdown_follows_positions() {
        let mut first = item("40", "A", "1", "100", false);
        first.position = Some(2);
        let mut second = item("39", "B", "1.50", "10.0", false);
        second.position = Some(3);
        second.unit = None;
        let lines = [second, title("41", "Build", 1), first];
        let refs: Vec<_> = lines.iter().collect();

        let total = aggregate(&refs, &ImportContext::new("t")).unwrap();
        let expected = "*Build*\n\
                        - A. A work. 1 days × 100 € = 100 €\n\
                        - B. B work. 1.5 × 10 € = 15 €\n\
                        Total: 115 €";
        assert_eq!(total.description, expected);
        assert_eq!(total.sales, dec("0.115"));
    }

    #[test]
    fn mission_and_sales_are_upserted_once() {
        let mut store = store_with_lead();
        let ctx = ImportContext::new("t");
        let lines = [
            item("31", "DEV", "3.5", "500", false),
            item("32", "SUP", "2", "450", true),
        ];
        let refs: Vec<_> = lines.iter().collect();

        assert_eq!(import_mission(&mut store, &ctx, &ext("3"), &refs).unwrap(), Outcome::Created);
        assert_eq!(import_mission(&mut store, &ctx, &ext("3"), &refs).unwrap(), Outcome::Unchanged);

        let lead = Table::<Lead>::find_by_key(&store, &ext("3")).unwrap().unwrap();
        assert_eq!(lead.attrs.sales, Some(dec("1.75")));
        let missions = store.missions_of(lead.id).unwrap();
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].attrs.price, dec("1.75"));
        assert_eq!(store.count::<Mission>(), 1);
    }

    #[test]
    fn changed_lines_update_the_mission() {
        let mut store = store_with_lead();
        let ctx = ImportContext::new("t");
        let before = [item("31", "DEV", "3.5", "500", false)];
        let after = [item("31", "DEV", "4", "500", false)];

        import_mission(&mut store, &ctx, &ext("3"), &before.iter().collect::<Vec<_>>()).unwrap();
        let outcome =
            import_mission(&mut store, &ctx, &ext("3"), &after.iter().collect::<Vec<_>>()).unwrap();
        assert_eq!(outcome, Outcome::Updated);
        let lead = Table::<Lead>::find_by_key(&store, &ext("3")).unwrap().unwrap();
        assert_eq!(lead.attrs.sales, Some(dec("2")));
    }

    #[test]
    fn lines_of_an_unknown_proposal_fail() {
        let mut store = MemoryStore::new();
        let lines = [item("31", "DEV", "1", "1", false)];
        let refs: Vec<_> = lines.iter().collect();
        let err = import_mission(&mut store, &ImportContext::new("t"), &ext("3"), &refs).unwrap_err();
        assert_eq!(
            err,
            ImportError::ReferentialIntegrity {
                subject: Subject::ProposalLines,
                record: ext("31"),
                kind: EntityKind::Lead,
                missing: ext("3"),
            }
        );
    }

    #[test]
    fn overflowing_amount_is_a_malformed_line() {
        let mut store = store_with_lead();
        let lines = [
            item("31", "DEV", "1", "500", false),
            item("32", "BIG", "100000000000000000000", "10000000000000", false),
        ];
        let refs: Vec<_> = lines.iter().collect();

        let err = import_mission(&mut store, &ImportContext::new("t"), &ext("3"), &refs).unwrap_err();
        assert!(
            matches!(&err, ImportError::MalformedRecord { record: Some(r), .. } if *r == ext("32")),
            "{err}"
        );
        assert!(err.is_data_error());
        assert_eq!(store.count::<Mission>(), 0);
    }

    #[test]
    fn overflowing_sum_is_a_malformed_line() {
        let max = Decimal::MAX.to_string();
        let lines = [
            item("31", "A", &max, "1", false),
            item("32", "B", &max, "1", true),
        ];
        let refs: Vec<_> = lines.iter().collect();
        let err = aggregate(&refs, &ImportContext::new("t")).unwrap_err();
        assert!(
            matches!(&err, ImportError::MalformedRecord { record: Some(r), .. } if *r == ext("32")),
            "{err}"
        );
    }

    #[test]
    fn overflowing_sales_scale_is_reported() {
        let mut ctx = ImportContext::new("t");
        ctx.sales.divisor = Decimal::new(1, 28);
        let lines = [item("31", "DEV", "1000000000", "1000000", false)];
        let refs: Vec<_> = lines.iter().collect();
        let err = aggregate(&refs, &ctx).unwrap_err();
        assert!(err.to_string().contains("overflows"), "{err}");
    }

    #[test]
    fn grouping_by_proposal() {
        let mut other = item("50", "X", "1", "1", false);
        other.proposal = ext("4");
        let lines = vec![item("31", "A", "1", "1", false), other, item("32", "B", "1", "1", false)];
        let groups = group_by_proposal(&lines);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, ext("3"));
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, ext("4"));
    }
}
