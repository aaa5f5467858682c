// used for persistence
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, params};
use serde_json::Value as Json;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::criteria::{Criteria, FindMode};
use crate::error::{DocmapError, Result};
use crate::field::ID_FIELD;
use crate::identity::{Identity, IdentityGenerator, IdentityHasher};
use crate::settings::PersistenceMode;
use crate::store::Store;
use crate::value::{RawDocument, document_from_json, document_to_json};

impl ToSql for Identity {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.value() as i64))
    }
}
impl FromSql for Identity {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(|i| Identity::new(i as u64))
    }
}

pub type DestroyHook = Box<dyn Fn(&RawDocument) -> Result<()>>;

// ------------- Persistence -------------
// Documents live in a single table, one row per document, with the body kept
// as tagged JSON. Selectors are evaluated in-process in insertion order.
pub struct Persistor {
    db: Connection,
    generator: IdentityGenerator,
    destroy_hooks: HashMap<String, Vec<DestroyHook>, IdentityHasher>,
}

impl Persistor {
    pub fn new(mode: PersistenceMode) -> Result<Persistor> {
        let db = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        // The "STRICT" keyword introduced in 3.37.0 breaks JDBC connections, which makes
        // debugging using an external tool like DBeaver impossible
        db.execute_batch(
            "
            create table if not exists Document (
                Position integer primary key autoincrement,
                Document_Identity integer not null,
                Collection text not null,
                Body text not null,
                constraint unique_Document_Identity unique (
                    Document_Identity
                )
            );-- STRICT;
            ",
        )?;
        let mut persistor = Persistor {
            db,
            generator: IdentityGenerator::new(),
            destroy_hooks: HashMap::default(),
        };
        let restored = persistor.restore_identities()?;
        info!(?mode, restored, "persistor ready");
        Ok(persistor)
    }

    // Stored identities are retained so that generation never reuses one.
    fn restore_identities(&mut self) -> Result<usize> {
        let mut statement = self.db.prepare("select Document_Identity from Document")?;
        let identities = statement
            .query_map([], |row| row.get::<_, Identity>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for identity in &identities {
            self.generator.retain(*identity);
        }
        Ok(identities.len())
    }

    /// Registers a hook run on each document `destroy_matching` removes from
    /// `collection`. A failing hook aborts the destroy before anything is
    /// removed.
    pub fn on_destroy<F>(&mut self, collection: &str, hook: F)
    where
        F: Fn(&RawDocument) -> Result<()> + 'static,
    {
        self.destroy_hooks
            .entry(collection.to_string())
            .or_default()
            .push(Box::new(hook));
    }

    pub fn len(&self, collection: &str) -> Result<usize> {
        let count: i64 = self.db.query_row(
            "select count(*) from Document where Collection = ?",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn collection(&self, collection: &str) -> Result<Vec<RawDocument>> {
        let mut statement = self.db.prepare_cached(
            "
            select Body
                from Document
                where Collection = ?
                order by Position
            ",
        )?;
        let bodies = statement
            .query_map(params![collection], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        bodies.iter().map(|body| parse_body(body)).collect()
    }

    fn matching(&self, collection: &str, criteria: &Criteria) -> Result<Vec<RawDocument>> {
        Ok(self
            .collection(collection)?
            .into_iter()
            .filter(|document| criteria.matches(document))
            .collect())
    }

    fn remove(&mut self, collection: &str, documents: &[RawDocument]) -> Result<usize> {
        let transaction = self.db.unchecked_transaction()?;
        let mut removed = 0;
        {
            let mut statement = transaction.prepare_cached(
                "
                delete from Document
                    where Collection = ?
                    and Document_Identity = ?
                ",
            )?;
            for identity in documents.iter().filter_map(document_identity) {
                removed += statement.execute(params![collection, identity])?;
            }
        }
        transaction.commit()?;
        Ok(removed)
    }
}

fn document_identity(document: &RawDocument) -> Option<Identity> {
    document.get(ID_FIELD).and_then(|value| value.as_identity())
}

fn parse_body(body: &str) -> Result<RawDocument> {
    match serde_json::from_str::<Json>(body)? {
        Json::Object(object) => document_from_json(&object),
        other => Err(DocmapError::DataCorruption {
            message: format!("stored body is not a document: {other}"),
        }),
    }
}

impl Store for Persistor {
    fn generate_identity(&mut self) -> Result<Identity> {
        Ok(self.generator.generate())
    }
    fn find_by_identity(&self, collection: &str, identities: &[Identity]) -> Result<Vec<RawDocument>> {
        let mut statement = self.db.prepare_cached(
            "
            select Body
                from Document
                where Collection = ?
                and Document_Identity = ?
            ",
        )?;
        let mut documents = Vec::new();
        for identity in identities {
            let mut rows = statement.query(params![collection, identity])?;
            if let Some(row) = rows.next()? {
                let body: String = row.get(0)?;
                documents.push(parse_body(&body)?);
            }
        }
        debug!(collection, requested = identities.len(), found = documents.len(), "find by identity");
        Ok(documents)
    }
    fn find_by_selector(&self, collection: &str, criteria: &Criteria, mode: FindMode) -> Result<Vec<RawDocument>> {
        let mut documents = self.matching(collection, criteria)?;
        debug!(collection, %criteria, ?mode, found = documents.len(), "find by selector");
        Ok(match mode {
            FindMode::All => documents,
            FindMode::First => documents.into_iter().take(1).collect(),
            FindMode::Last => documents.pop().into_iter().collect(),
        })
    }
    fn delete_matching(&mut self, collection: &str, criteria: &Criteria) -> Result<usize> {
        let documents = self.matching(collection, criteria)?;
        let removed = self.remove(collection, &documents)?;
        debug!(collection, %criteria, removed, "delete matching");
        Ok(removed)
    }
    fn destroy_matching(&mut self, collection: &str, criteria: &Criteria) -> Result<usize> {
        let documents = self.matching(collection, criteria)?;
        if let Some(hooks) = self.destroy_hooks.get(collection) {
            for document in &documents {
                for hook in hooks {
                    hook(document)?;
                }
            }
        }
        let removed = self.remove(collection, &documents)?;
        debug!(collection, %criteria, removed, "destroy matching");
        Ok(removed)
    }
    fn persist(&mut self, collection: &str, identity: Identity, document: &RawDocument) -> Result<()> {
        let body = serde_json::to_string(&Json::Object(document_to_json(document)))?;
        self.db.execute(
            "
            insert into Document (
                Document_Identity,
                Collection,
                Body
            ) values (?, ?, ?)
            on conflict (Document_Identity) do update
                set Collection = excluded.Collection,
                    Body = excluded.Body
            ",
            params![identity, collection, body],
        )?;
        self.generator.retain(identity);
        debug!(collection, %identity, "persisted");
        Ok(())
    }
}
