// SQLite-backed store
//
// One table per entity kind. Every identity key is backed by a UNIQUE
// constraint and decimals are stored as TEXT so they stay exact.

use std::path::Path;

use rusqlite::types::{Type, Value};
use rusqlite::{ffi, params, params_from_iter, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crmsync_core::{
    Client, ClientId, ClientKey, Company, CompanyAttrs, CompanyId, Contact, ContactAttrs,
    ContactId, Entity, ExternalId, Lead, LeadAttrs, LeadId, LeadState, Mission, MissionAttrs,
    Organisation, OrganisationId, OrganisationKey, Row, Store, StoreError, Table,
};

use crate::SCHEMA_VERSION;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS companies (
    id INTEGER PRIMARY KEY,
    external_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS organisations (
    id INTEGER PRIMARY KEY,
    company_id INTEGER NOT NULL REFERENCES companies(id),
    name TEXT NOT NULL,
    UNIQUE (company_id, name)
);

CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY,
    external_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    function TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT '',
    phone TEXT NOT NULL DEFAULT '',
    mobile_phone TEXT NOT NULL DEFAULT '',
    fax TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS clients (
    id INTEGER PRIMARY KEY,
    organisation_id INTEGER NOT NULL REFERENCES organisations(id),
    contact_id INTEGER REFERENCES contacts(id)     -- NULL = organisation-level client
);

-- NULLs are distinct in plain UNIQUE constraints
CREATE UNIQUE INDEX IF NOT EXISTS clients_scope
    ON clients (organisation_id, IFNULL(contact_id, 0));

CREATE TABLE IF NOT EXISTS leads (
    id INTEGER PRIMARY KEY,
    external_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    state TEXT NOT NULL,
    deal_id TEXT,
    sales TEXT,                                    -- thousands of currency units
    client_id INTEGER NOT NULL REFERENCES clients(id),
    subsidiary TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS missions (
    id INTEGER PRIMARY KEY,
    lead_id INTEGER NOT NULL UNIQUE REFERENCES leads(id),
    price TEXT NOT NULL,
    description TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub struct SqliteStore {
    conn: Connection,
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// UNIQUE or PRIMARY KEY only; foreign key and CHECK failures stay backend errors.
fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(backend)?;
        conn.execute_batch(SCHEMA).map_err(backend)?;

        let version: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |row| row.get(0))
            .optional()
            .map_err(backend)?;
        match version {
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES (?1, ?2)",
                    params!["schema_version", SCHEMA_VERSION.to_string()],
                )
                .map_err(backend)?;
            }
            Some(v) => {
                let found: u32 = v.parse().unwrap_or(u32::MAX);
                if found > SCHEMA_VERSION {
                    return Err(StoreError::Backend(format!(
                        "database schema version {v} is newer than supported version {SCHEMA_VERSION}"
                    )));
                }
            }
        }

        Ok(Self { conn })
    }

    pub fn count<E: SqlMapped>(&self) -> Result<usize, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", E::TABLE);
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0)).map_err(backend)?;
        Ok(n as usize)
    }

    fn select_where<E: SqlMapped, P: rusqlite::Params>(
        &self,
        clause: &str,
        params: P,
    ) -> Result<Vec<Row<E>>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {clause} ORDER BY id",
            select_list::<E>(),
            E::TABLE
        );
        let mut stmt = self.conn.prepare(&sql).map_err(backend)?;
        let rows = stmt.query_map(params, read_row::<E>).map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(backend)
    }

    fn select_one<E: SqlMapped, P: rusqlite::Params>(
        &self,
        clause: &str,
        params: P,
    ) -> Result<Option<Row<E>>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {clause}",
            select_list::<E>(),
            E::TABLE
        );
        self.conn
            .query_row(&sql, params, read_row::<E>)
            .optional()
            .map_err(backend)
    }
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// Maps an entity kind onto its table. Selected columns are always
/// `id`, then `KEY_COLUMNS`, then `ATTR_COLUMNS`.
pub trait SqlMapped: Entity {
    const TABLE: &'static str;
    const KEY_COLUMNS: &'static [&'static str];
    const ATTR_COLUMNS: &'static [&'static str];

    fn key_values(key: &Self::Key) -> Vec<Value>;
    fn attr_values(attrs: &Self::Attrs) -> Vec<Value>;
    fn read_key(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<Self::Key>;
    fn read_attrs(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<Self::Attrs>;
}

fn select_list<E: SqlMapped>() -> String {
    std::iter::once("id")
        .chain(E::KEY_COLUMNS.iter().copied())
        .chain(E::ATTR_COLUMNS.iter().copied())
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_row<E: SqlMapped>(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row<E>> {
    let id: i64 = row.get(0)?;
    Ok(Row {
        id: E::Id::from(id),
        key: E::read_key(row, 1)?,
        attrs: E::read_attrs(row, 1 + E::KEY_COLUMNS.len())?,
    })
}

fn conversion<Err>(at: usize, e: Err) -> rusqlite::Error
where
    Err: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(at, Type::Text, Box::new(e))
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn opt_text(s: Option<&str>) -> Value {
    s.map(text).unwrap_or(Value::Null)
}

fn decimal(d: &Decimal) -> Value {
    Value::Text(d.to_string())
}

fn read_external_id(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<ExternalId> {
    let raw: String = row.get(at)?;
    raw.parse().map_err(|e| conversion(at, e))
}

fn read_decimal(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(at)?;
    raw.map(|s| s.parse::<Decimal>().map_err(|e| conversion(at, e)))
        .transpose()
}

impl SqlMapped for Company {
    const TABLE: &'static str = "companies";
    const KEY_COLUMNS: &'static [&'static str] = &["external_id"];
    const ATTR_COLUMNS: &'static [&'static str] = &["name"];

    fn key_values(key: &ExternalId) -> Vec<Value> {
        vec![text(key.as_str())]
    }

    fn attr_values(attrs: &CompanyAttrs) -> Vec<Value> {
        vec![text(&attrs.name)]
    }

    fn read_key(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<ExternalId> {
        read_external_id(row, at)
    }

    fn read_attrs(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<CompanyAttrs> {
        Ok(CompanyAttrs { name: row.get(at)? })
    }
}

impl SqlMapped for Organisation {
    const TABLE: &'static str = "organisations";
    const KEY_COLUMNS: &'static [&'static str] = &["company_id", "name"];
    const ATTR_COLUMNS: &'static [&'static str] = &[];

    fn key_values(key: &OrganisationKey) -> Vec<Value> {
        vec![Value::Integer(key.company.0), text(&key.name)]
    }

    fn attr_values(_: &()) -> Vec<Value> {
        Vec::new()
    }

    fn read_key(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<OrganisationKey> {
        Ok(OrganisationKey {
            company: CompanyId(row.get(at)?),
            name: row.get(at + 1)?,
        })
    }

    fn read_attrs(_: &rusqlite::Row<'_>, _: usize) -> rusqlite::Result<()> {
        Ok(())
    }
}

impl SqlMapped for Contact {
    const TABLE: &'static str = "contacts";
    const KEY_COLUMNS: &'static [&'static str] = &["external_id"];
    const ATTR_COLUMNS: &'static [&'static str] =
        &["name", "function", "email", "phone", "mobile_phone", "fax"];

    fn key_values(key: &ExternalId) -> Vec<Value> {
        vec![text(key.as_str())]
    }

    fn attr_values(attrs: &ContactAttrs) -> Vec<Value> {
        vec![
            text(&attrs.name),
            text(&attrs.function),
            text(&attrs.email),
            text(&attrs.phone),
            text(&attrs.mobile_phone),
            text(&attrs.fax),
        ]
    }

    fn read_key(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<ExternalId> {
        read_external_id(row, at)
    }

    fn read_attrs(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<ContactAttrs> {
        Ok(ContactAttrs {
            name: row.get(at)?,
            function: row.get(at + 1)?,
            email: row.get(at + 2)?,
            phone: row.get(at + 3)?,
            mobile_phone: row.get(at + 4)?,
            fax: row.get(at + 5)?,
        })
    }
}

impl SqlMapped for Client {
    const TABLE: &'static str = "clients";
    const KEY_COLUMNS: &'static [&'static str] = &["organisation_id", "contact_id"];
    const ATTR_COLUMNS: &'static [&'static str] = &[];

    fn key_values(key: &ClientKey) -> Vec<Value> {
        vec![
            Value::Integer(key.organisation.0),
            key.contact.map(|c| Value::Integer(c.0)).unwrap_or(Value::Null),
        ]
    }

    fn attr_values(_: &()) -> Vec<Value> {
        Vec::new()
    }

    fn read_key(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<ClientKey> {
        let contact: Option<i64> = row.get(at + 1)?;
        Ok(ClientKey {
            organisation: OrganisationId(row.get(at)?),
            contact: contact.map(ContactId),
        })
    }

    fn read_attrs(_: &rusqlite::Row<'_>, _: usize) -> rusqlite::Result<()> {
        Ok(())
    }
}

impl SqlMapped for Lead {
    const TABLE: &'static str = "leads";
    const KEY_COLUMNS: &'static [&'static str] = &["external_id"];
    const ATTR_COLUMNS: &'static [&'static str] = &[
        "name",
        "description",
        "state",
        "deal_id",
        "sales",
        "client_id",
        "subsidiary",
    ];

    fn key_values(key: &ExternalId) -> Vec<Value> {
        vec![text(key.as_str())]
    }

    fn attr_values(attrs: &LeadAttrs) -> Vec<Value> {
        vec![
            text(&attrs.name),
            text(&attrs.description),
            text(attrs.state.as_str()),
            opt_text(attrs.deal_id.as_deref()),
            attrs.sales.as_ref().map(decimal).unwrap_or(Value::Null),
            Value::Integer(attrs.client.0),
            text(&attrs.subsidiary),
        ]
    }

    fn read_key(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<ExternalId> {
        read_external_id(row, at)
    }

    fn read_attrs(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<LeadAttrs> {
        let state: String = row.get(at + 2)?;
        Ok(LeadAttrs {
            name: row.get(at)?,
            description: row.get(at + 1)?,
            state: state.parse::<LeadState>().map_err(|e| conversion(at + 2, e))?,
            deal_id: row.get(at + 3)?,
            sales: read_decimal(row, at + 4)?,
            client: ClientId(row.get(at + 5)?),
            subsidiary: row.get(at + 6)?,
        })
    }
}

impl SqlMapped for Mission {
    const TABLE: &'static str = "missions";
    const KEY_COLUMNS: &'static [&'static str] = &["lead_id"];
    const ATTR_COLUMNS: &'static [&'static str] = &["price", "description"];

    fn key_values(key: &LeadId) -> Vec<Value> {
        vec![Value::Integer(key.0)]
    }

    fn attr_values(attrs: &MissionAttrs) -> Vec<Value> {
        vec![decimal(&attrs.price), text(&attrs.description)]
    }

    fn read_key(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<LeadId> {
        Ok(LeadId(row.get(at)?))
    }

    fn read_attrs(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<MissionAttrs> {
        let price = read_decimal(row, at)?.unwrap_or_default();
        Ok(MissionAttrs {
            price,
            description: row.get(at + 1)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Table / Store
// ---------------------------------------------------------------------------

impl<E: SqlMapped> Table<E> for SqliteStore {
    fn get(&self, id: E::Id) -> Result<Option<Row<E>>, StoreError> {
        let raw: i64 = id.into();
        self.select_one("id = ?1", params![raw])
    }

    fn find_by_key(&self, key: &E::Key) -> Result<Option<Row<E>>, StoreError> {
        // IS compares NULL keys too
        let clause = E::KEY_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} IS ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        self.select_one(&clause, params_from_iter(E::key_values(key)))
    }

    fn create(&mut self, key: E::Key, attrs: E::Attrs) -> Result<Row<E>, StoreError> {
        let columns: Vec<&str> = E::KEY_COLUMNS
            .iter()
            .chain(E::ATTR_COLUMNS.iter())
            .copied()
            .collect();
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            E::TABLE,
            columns.join(", ")
        );

        let mut values = E::key_values(&key);
        values.extend(E::attr_values(&attrs));
        self.conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate {
                        kind: E::KIND,
                        key: format!("{key:?}"),
                    }
                } else {
                    backend(e)
                }
            })?;

        Ok(Row {
            id: E::Id::from(self.conn.last_insert_rowid()),
            key,
            attrs,
        })
    }

    fn update(&mut self, id: E::Id, attrs: E::Attrs) -> Result<Row<E>, StoreError> {
        let raw: i64 = id.into();
        let not_found = StoreError::NotFound { kind: E::KIND, id: raw };

        if !E::ATTR_COLUMNS.is_empty() {
            let assignments = E::ATTR_COLUMNS
                .iter()
                .enumerate()
                .map(|(i, column)| format!("{column} = ?{}", i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE {} SET {assignments} WHERE id = ?{}",
                E::TABLE,
                E::ATTR_COLUMNS.len() + 1
            );
            let mut values = E::attr_values(&attrs);
            values.push(Value::Integer(raw));
            let changed = self
                .conn
                .execute(&sql, params_from_iter(values))
                .map_err(backend)?;
            if changed == 0 {
                return Err(not_found);
            }
        }

        Table::<E>::get(self, id)?.ok_or(not_found)
    }

    fn all(&self) -> Result<Vec<Row<E>>, StoreError> {
        self.select_where("1 = 1", params![])
    }
}

impl Store for SqliteStore {
    fn organisations_of(&self, company: CompanyId) -> Result<Vec<Row<Organisation>>, StoreError> {
        self.select_where("company_id = ?1", params![company.0])
    }

    fn clients_of(&self, organisation: OrganisationId) -> Result<Vec<Row<Client>>, StoreError> {
        self.select_where("organisation_id = ?1", params![organisation.0])
    }

    fn clients_of_contact(&self, contact: ContactId) -> Result<Vec<Row<Client>>, StoreError> {
        self.select_where("contact_id = ?1", params![contact.0])
    }

    fn missions_of(&self, lead: LeadId) -> Result<Vec<Row<Mission>>, StoreError> {
        self.select_where("lead_id = ?1", params![lead.0])
    }

    fn leads_of(&self, client: ClientId) -> Result<Vec<Row<Lead>>, StoreError> {
        self.select_where("client_id = ?1", params![client.0])
    }

    fn atomically<T, Err, F>(&mut self, f: F) -> Result<T, Err>
    where
        Self: Sized,
        Err: From<StoreError>,
        F: FnOnce(&mut Self) -> Result<T, Err>,
    {
        self.conn
            .execute_batch("SAVEPOINT unit_of_work")
            .map_err(backend)?;
        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("RELEASE unit_of_work")
                    .map_err(backend)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch("ROLLBACK TO unit_of_work; RELEASE unit_of_work")
                {
                    log::error!("rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ext(id: &str) -> ExternalId {
        ExternalId::incwo(id).unwrap()
    }

    fn seed_client(store: &mut SqliteStore, contact: Option<ContactId>) -> Row<Client> {
        let company = Table::<Company>::create(store, ext("1"), CompanyAttrs { name: "Acme".into() })
            .unwrap();
        let org = Table::<Organisation>::create(
            store,
            OrganisationKey { company: company.id, name: "Default".into() },
            (),
        )
        .unwrap();
        Table::<Client>::create(store, ClientKey { organisation: org.id, contact }, ()).unwrap()
    }

    #[test]
    fn organisation_level_client_is_found_by_null_contact() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let client = seed_client(&mut store, None);
        let found = Table::<Client>::find_by_key(&store, &client.key).unwrap().unwrap();
        assert_eq!(found.id, client.id);
        assert_eq!(found.key.contact, None);

        let err = Table::<Client>::create(&mut store, client.key.clone(), ()).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[test]
    fn foreign_key_failure_is_not_a_duplicate() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let err = Table::<Client>::create(
            &mut store,
            ClientKey { organisation: OrganisationId(999), contact: None },
            (),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)), "{err}");
    }

    #[test]
    fn lead_decimals_stay_exact() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let client = seed_client(&mut store, None);
        let attrs = LeadAttrs {
            name: "Project Foobar".into(),
            description: "Echo Alpha Tango".into(),
            state: LeadState::Won,
            deal_id: Some("D1234-56789".into()),
            sales: Some(Decimal::new(175, 2)),
            client: client.id,
            subsidiary: "t".into(),
        };
        let lead = Table::<Lead>::create(&mut store, ext("3"), attrs.clone()).unwrap();
        let loaded = Table::<Lead>::get(&store, lead.id).unwrap().unwrap();
        assert_eq!(loaded.attrs, attrs);
        assert_eq!(loaded.attrs.sales.unwrap().to_string(), "1.75");
        assert_eq!(store.leads_of(client.id).unwrap().len(), 1);
    }

    #[test]
    fn update_replaces_attributes() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let company = Table::<Company>::create(&mut store, ext("1"), CompanyAttrs { name: "Acme".into() })
            .unwrap();
        let updated = Table::<Company>::update(
            &mut store,
            company.id,
            CompanyAttrs { name: "Acme Corp".into() },
        )
        .unwrap();
        assert_eq!(updated.attrs.name, "Acme Corp");
        assert_eq!(store.count::<Company>().unwrap(), 1);

        let err = Table::<Company>::update(&mut store, CompanyId(99), CompanyAttrs::default())
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound { kind: crmsync_core::EntityKind::Company, id: 99 });
    }

    #[test]
    fn failed_unit_of_work_is_rolled_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let result: Result<(), StoreError> = store.atomically(|s| {
            Table::<Company>::create(s, ext("1"), CompanyAttrs { name: "Acme".into() })?;
            Table::<Company>::create(s, ext("1"), CompanyAttrs { name: "Again".into() })?;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
        assert_eq!(store.count::<Company>().unwrap(), 0);
    }

    #[test]
    fn reopen_keeps_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crm.sqlite");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            seed_client(&mut store, None);
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.count::<Company>().unwrap(), 1);
        assert_eq!(store.count::<Client>().unwrap(), 1);
        let company = Table::<Company>::find_by_key(&store, &ext("1")).unwrap().unwrap();
        assert_eq!(store.organisations_of(company.id).unwrap().len(), 1);
    }
}
