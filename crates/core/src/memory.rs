//! In-memory store, used by tests and dry runs.

use std::collections::{BTreeMap, HashMap};

use crate::entity::{Client, Company, Contact, Entity, Lead, Mission, Organisation, Row};
use crate::store::{Store, StoreError, Table};

#[derive(Debug, Clone)]
pub struct MemTable<E: Entity> {
    rows: BTreeMap<i64, Row<E>>,
    index: HashMap<E::Key, i64>,
    next_id: i64,
}

impl<E: Entity> Default for MemTable<E> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<E: Entity> MemTable<E> {
    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    fn get(&self, id: E::Id) -> Option<Row<E>> {
        self.rows.get(&id.into()).cloned()
    }

    fn find(&self, key: &E::Key) -> Option<Row<E>> {
        self.index.get(key).and_then(|raw| self.rows.get(raw)).cloned()
    }

    fn create(&mut self, key: E::Key, attrs: E::Attrs) -> Result<Row<E>, StoreError> {
        if self.index.contains_key(&key) {
            return Err(StoreError::Duplicate {
                kind: E::KIND,
                key: format!("{key:?}"),
            });
        }
        let raw = self.next_id;
        self.next_id += 1;
        let row = Row {
            id: E::Id::from(raw),
            key: key.clone(),
            attrs,
        };
        self.index.insert(key, raw);
        self.rows.insert(raw, row.clone());
        Ok(row)
    }

    fn update(&mut self, id: E::Id, attrs: E::Attrs) -> Result<Row<E>, StoreError> {
        let raw: i64 = id.into();
        let row = self
            .rows
            .get_mut(&raw)
            .ok_or(StoreError::NotFound { kind: E::KIND, id: raw })?;
        row.attrs = attrs;
        Ok(row.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    companies: MemTable<Company>,
    organisations: MemTable<Organisation>,
    contacts: MemTable<Contact>,
    clients: MemTable<Client>,
    leads: MemTable<Lead>,
    missions: MemTable<Mission>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count<E: MemSlot>(&self) -> usize {
        E::slot(self).len()
    }
}

/// Maps an entity kind to its table inside [`MemoryStore`].
pub trait MemSlot: Entity {
    fn slot(store: &MemoryStore) -> &MemTable<Self>;
    fn slot_mut(store: &mut MemoryStore) -> &mut MemTable<Self>;
}

macro_rules! mem_slot {
    ($($entity:ty => $field:ident),* $(,)?) => {$(
        impl MemSlot for $entity {
            fn slot(store: &MemoryStore) -> &MemTable<Self> {
                &store.$field
            }

            fn slot_mut(store: &mut MemoryStore) -> &mut MemTable<Self> {
                &mut store.$field
            }
        }
    )*};
}

mem_slot!(
    Company => companies,
    Organisation => organisations,
    Contact => contacts,
    Client => clients,
    Lead => leads,
    Mission => missions,
);

impl<E: MemSlot> Table<E> for MemoryStore {
    fn get(&self, id: E::Id) -> Result<Option<Row<E>>, StoreError> {
        Ok(E::slot(self).get(id))
    }

    fn find_by_key(&self, key: &E::Key) -> Result<Option<Row<E>>, StoreError> {
        Ok(E::slot(self).find(key))
    }

    fn create(&mut self, key: E::Key, attrs: E::Attrs) -> Result<Row<E>, StoreError> {
        E::slot_mut(self).create(key, attrs)
    }

    fn update(&mut self, id: E::Id, attrs: E::Attrs) -> Result<Row<E>, StoreError> {
        E::slot_mut(self).update(id, attrs)
    }

    fn all(&self) -> Result<Vec<Row<E>>, StoreError> {
        Ok(E::slot(self).rows.values().cloned().collect())
    }
}

impl Store for MemoryStore {
    fn atomically<T, Err, F>(&mut self, f: F) -> Result<T, Err>
    where
        Err: From<StoreError>,
        F: FnOnce(&mut Self) -> Result<T, Err>,
    {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ClientKey, CompanyAttrs, CompanyId, ContactId, OrganisationKey};
    use crate::external_id::ExternalId;

    fn acme(store: &mut MemoryStore) -> Row<Company> {
        Table::<Company>::create(
            store,
            ExternalId::incwo("1").unwrap(),
            CompanyAttrs { name: "Acme".into() },
        )
        .unwrap()
    }

    #[test]
    fn create_then_find_by_key() {
        let mut store = MemoryStore::new();
        let created = acme(&mut store);
        let found = Table::<Company>::find_by_key(&store, &ExternalId::incwo("1").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found, created);
        assert_eq!(store.count::<Company>(), 1);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut store = MemoryStore::new();
        acme(&mut store);
        let err = Table::<Company>::create(
            &mut store,
            ExternalId::incwo("1").unwrap(),
            CompanyAttrs { name: "Other".into() },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { kind: crate::EntityKind::Company, .. }));
    }

    #[test]
    fn update_missing_row_fails() {
        let mut store = MemoryStore::new();
        let err = Table::<Company>::update(&mut store, CompanyId(42), CompanyAttrs::default()).unwrap_err();
        assert_eq!(err, StoreError::NotFound { kind: crate::EntityKind::Company, id: 42 });
    }

    #[test]
    fn relationship_accessors_filter_by_parent() {
        let mut store = MemoryStore::new();
        let company = acme(&mut store);
        let org = Table::<Organisation>::create(
            &mut store,
            OrganisationKey { company: company.id, name: "Default".into() },
            (),
        )
        .unwrap();
        Table::<Client>::create(&mut store, ClientKey { organisation: org.id, contact: None }, ())
            .unwrap();

        assert_eq!(store.organisations_of(company.id).unwrap().len(), 1);
        assert_eq!(store.clients_of(org.id).unwrap().len(), 1);
        assert!(store.clients_of_contact(ContactId(7)).unwrap().is_empty());
    }

    #[test]
    fn failed_unit_of_work_leaves_no_trace() {
        let mut store = MemoryStore::new();
        let result: Result<(), StoreError> = store.atomically(|s| {
            acme(s);
            Err(StoreError::Backend("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.count::<Company>(), 0);

        store
            .atomically(|s| {
                acme(s);
                Ok::<_, StoreError>(())
            })
            .unwrap();
        assert_eq!(store.count::<Company>(), 1);
    }
}
