use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::external_id::ExternalId;

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

macro_rules! entity_id {
    ($($name:ident),* $(,)?) => {$(
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    )*};
}

entity_id!(CompanyId, OrganisationId, ContactId, ClientId, LeadId, MissionId);

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Company,
    Organisation,
    Contact,
    Client,
    Lead,
    Mission,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Company => write!(f, "company"),
            Self::Organisation => write!(f, "organisation"),
            Self::Contact => write!(f, "contact"),
            Self::Client => write!(f, "client"),
            Self::Lead => write!(f, "lead"),
            Self::Mission => write!(f, "mission"),
        }
    }
}

/// A persisted entity kind.
///
/// Implemented by uninhabited marker types; a stored entity is a [`Row`]
/// made of the kind's id, identity key and mutable attributes. The key is
/// what reconciliation matches on, the attributes are what an update may
/// change.
pub trait Entity: Clone + fmt::Debug + PartialEq + 'static {
    const KIND: EntityKind;
    type Id: Copy + Eq + Hash + fmt::Debug + fmt::Display + From<i64> + Into<i64>;
    type Key: Clone + Eq + Hash + fmt::Debug;
    type Attrs: Clone + fmt::Debug + PartialEq;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row<E: Entity> {
    pub id: E::Id,
    pub key: E::Key,
    pub attrs: E::Attrs,
}

// ---------------------------------------------------------------------------
// Company / Organisation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Company {}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompanyAttrs {
    pub name: String,
}

impl Entity for Company {
    const KIND: EntityKind = EntityKind::Company;
    type Id = CompanyId;
    type Key = ExternalId;
    type Attrs = CompanyAttrs;
}

/// A department inside a company. Clients are always scoped to one.
#[derive(Debug, Clone, PartialEq)]
pub enum Organisation {}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrganisationKey {
    pub company: CompanyId,
    pub name: String,
}

impl Entity for Organisation {
    const KIND: EntityKind = EntityKind::Organisation;
    type Id = OrganisationId;
    type Key = OrganisationKey;
    type Attrs = ();
}

// ---------------------------------------------------------------------------
// Contact / Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Contact {}

/// Absent export fields are stored as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContactAttrs {
    pub name: String,
    pub function: String,
    pub email: String,
    pub phone: String,
    pub mobile_phone: String,
    pub fax: String,
}

impl Entity for Contact {
    const KIND: EntityKind = EntityKind::Contact;
    type Id = ContactId;
    type Key = ExternalId;
    type Attrs = ContactAttrs;
}

/// The commercial counterpart of a lead: an organisation, optionally pinned
/// to one contact. Never imported directly, always derived.
#[derive(Debug, Clone, PartialEq)]
pub enum Client {}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey {
    pub organisation: OrganisationId,
    pub contact: Option<ContactId>,
}

impl Entity for Client {
    const KIND: EntityKind = EntityKind::Client;
    type Id = ClientId;
    type Key = ClientKey;
    type Attrs = ();
}

// ---------------------------------------------------------------------------
// Lead / Mission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadState {
    Qualif,
    WriteOffer,
    OfferSent,
    Negociation,
    Won,
    Lost,
    Forgiven,
}

impl LeadState {
    pub const ALL: [LeadState; 7] = [
        Self::Qualif,
        Self::WriteOffer,
        Self::OfferSent,
        Self::Negociation,
        Self::Won,
        Self::Lost,
        Self::Forgiven,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qualif => "QUALIF",
            Self::WriteOffer => "WRITE_OFFER",
            Self::OfferSent => "OFFER_SENT",
            Self::Negociation => "NEGOCIATION",
            Self::Won => "WON",
            Self::Lost => "LOST",
            Self::Forgiven => "FORGIVEN",
        }
    }
}

impl fmt::Display for LeadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLeadState(pub String);

impl fmt::Display for UnknownLeadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown lead state '{}'", self.0)
    }
}

impl std::error::Error for UnknownLeadState {}

impl FromStr for LeadState {
    type Err = UnknownLeadState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownLeadState(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lead {}

#[derive(Debug, Clone, PartialEq)]
pub struct LeadAttrs {
    pub name: String,
    /// Copied verbatim from the proposal.
    pub description: String,
    pub state: LeadState,
    pub deal_id: Option<String>,
    /// In thousands of currency units.
    pub sales: Option<Decimal>,
    pub client: ClientId,
    pub subsidiary: String,
}

impl Entity for Lead {
    const KIND: EntityKind = EntityKind::Lead;
    type Id = LeadId;
    type Key = ExternalId;
    type Attrs = LeadAttrs;
}

/// Aggregate of a lead's proposal lines. At most one per lead.
#[derive(Debug, Clone, PartialEq)]
pub enum Mission {}

#[derive(Debug, Clone, PartialEq)]
pub struct MissionAttrs {
    /// Same scale as `LeadAttrs::sales`.
    pub price: Decimal,
    pub description: String,
}

impl Entity for Mission {
    const KIND: EntityKind = EntityKind::Mission;
    type Id = MissionId;
    type Key = LeadId;
    type Attrs = MissionAttrs;
}
