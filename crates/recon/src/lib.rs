//! `crmsync-recon`: import reconciliation engine.
//!
//! Receives loaded external records and upserts them into a [`Store`]:
//! firms, contacts, proposal sheets, then proposal lines. Matching is by
//! external id only, so re-running an import is safe.
//!
//! [`Store`]: crmsync_core::Store

pub mod clients;
pub mod config;
pub mod contacts;
pub mod engine;
pub mod error;
pub mod firms;
pub mod missions;
pub mod proposals;
pub mod report;
pub mod state;
pub mod upsert;

pub use config::{ImportContext, Rounding, SalesConfig};
pub use engine::{import_batch, import_dir, Importer};
pub use error::ImportError;
pub use report::{ImportReport, SkipReason, SubjectReport};
pub use upsert::Outcome;
