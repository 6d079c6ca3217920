//! External proposal progress → lead state.

use crmsync_core::LeadState;

/// Every recognised external progress value. Lookups are trimmed and
/// case-insensitive.
pub const STATE_TABLE: &[(&str, LeadState)] = &[
    ("qualification", LeadState::Qualif),
    ("qualif", LeadState::Qualif),
    ("to_write", LeadState::WriteOffer),
    ("draft", LeadState::WriteOffer),
    ("sent", LeadState::OfferSent),
    ("negotiation", LeadState::Negociation),
    ("won", LeadState::Won),
    ("accepted", LeadState::Won),
    ("lost", LeadState::Lost),
    ("refused", LeadState::Lost),
    ("abandoned", LeadState::Forgiven),
    ("cancelled", LeadState::Forgiven),
];

pub fn map_state(progress: &str) -> Option<LeadState> {
    let progress = progress.trim();
    STATE_TABLE
        .iter()
        .find(|(external, _)| external.eq_ignore_ascii_case(progress))
        .map(|(_, state)| *state)
}

/// Proposals in this state are never imported.
pub fn is_skipped(state: LeadState) -> bool {
    state == LeadState::Lost
}
