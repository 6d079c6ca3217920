//! Update-or-create by identity key, shared by every reconciler.

use serde::Serialize;

use crmsync_core::{Entity, Row, StoreError, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Create the row keyed by `key`, or overwrite its attributes.
pub fn upsert<E, S>(store: &mut S, key: E::Key, attrs: E::Attrs) -> Result<(Row<E>, Outcome), StoreError>
where
    E: Entity,
    S: Table<E> + ?Sized,
{
    upsert_with(store, key, |_| attrs)
}

/// Like [`upsert`], but the new attributes may depend on the existing row
/// (`None` when the key is new). Equal attributes are not written back.
pub fn upsert_with<E, S, F>(store: &mut S, key: E::Key, attrs: F) -> Result<(Row<E>, Outcome), StoreError>
where
    E: Entity,
    S: Table<E> + ?Sized,
    F: FnOnce(Option<&Row<E>>) -> E::Attrs,
{
    match store.find_by_key(&key)? {
        None => {
            let attrs = attrs(None);
            Ok((store.create(key, attrs)?, Outcome::Created))
        }
        Some(existing) => {
            let attrs = attrs(Some(&existing));
            if attrs == existing.attrs {
                Ok((existing, Outcome::Unchanged))
            } else {
                Ok((store.update(existing.id, attrs)?, Outcome::Updated))
            }
        }
    }
}

/// Find the row keyed by `key`, creating it with `attrs` if absent.
/// Existing rows are returned untouched.
pub fn ensure<E, S>(store: &mut S, key: E::Key, attrs: E::Attrs) -> Result<(Row<E>, Outcome), StoreError>
where
    E: Entity,
    S: Table<E> + ?Sized,
{
    match store.find_by_key(&key)? {
        Some(existing) => Ok((existing, Outcome::Unchanged)),
        None => Ok((store.create(key, attrs)?, Outcome::Created)),
    }
}
