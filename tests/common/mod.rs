#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use docmap::criteria::{Criteria, FindMode};
use docmap::datatype::FieldType;
use docmap::field::Field;
use docmap::persist::Persistor;
use docmap::relations::{NestedOptions, RejectIf, RelationOptions};
use docmap::schema::{EntityType, Schema};
use docmap::settings::{self, PersistenceMode, Settings};
use docmap::store::Store;
use docmap::{Identity, RawDocument, Result, Session};

// Store calls made through a CountingStore.
#[derive(Debug, Default)]
pub struct Calls {
    pub generate: Cell<usize>,
    pub find_by_identity: Cell<usize>,
    pub find_by_selector: Cell<usize>,
    pub delete_matching: Cell<usize>,
    pub destroy_matching: Cell<usize>,
    pub persist: Cell<usize>,
}

impl Calls {
    pub fn reads(&self) -> usize {
        self.find_by_identity.get() + self.find_by_selector.get()
    }
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

// Wraps a persistor that several sessions may share.
#[derive(Clone)]
pub struct CountingStore {
    inner: Rc<RefCell<Persistor>>,
    pub calls: Rc<Calls>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(
                Persistor::new(PersistenceMode::InMemory).expect("in-memory persistor"),
            )),
            calls: Rc::new(Calls::default()),
        }
    }
    pub fn persistor(&self) -> Rc<RefCell<Persistor>> {
        Rc::clone(&self.inner)
    }
}

impl Store for CountingStore {
    fn generate_identity(&mut self) -> Result<Identity> {
        bump(&self.calls.generate);
        self.inner.borrow_mut().generate_identity()
    }
    fn find_by_identity(&self, collection: &str, identities: &[Identity]) -> Result<Vec<RawDocument>> {
        bump(&self.calls.find_by_identity);
        self.inner.borrow().find_by_identity(collection, identities)
    }
    fn find_by_selector(&self, collection: &str, criteria: &Criteria, mode: FindMode) -> Result<Vec<RawDocument>> {
        bump(&self.calls.find_by_selector);
        self.inner.borrow().find_by_selector(collection, criteria, mode)
    }
    fn delete_matching(&mut self, collection: &str, criteria: &Criteria) -> Result<usize> {
        bump(&self.calls.delete_matching);
        self.inner.borrow_mut().delete_matching(collection, criteria)
    }
    fn destroy_matching(&mut self, collection: &str, criteria: &Criteria) -> Result<usize> {
        bump(&self.calls.destroy_matching);
        self.inner.borrow_mut().destroy_matching(collection, criteria)
    }
    fn persist(&mut self, collection: &str, identity: Identity, document: &RawDocument) -> Result<()> {
        bump(&self.calls.persist);
        self.inner.borrow_mut().persist(collection, identity, document)
    }
}

// People with preferences (many-to-many), posts (referenced), addresses
// (embedded many) and a passport (embedded one).
pub fn schema() -> Arc<Schema> {
    let mut person = EntityType::new("Person");
    person
        .add_field(Field::new("name", FieldType::String))
        .add_field(Field::new("age", FieldType::Integer))
        .add_field(Field::new("born", FieldType::Date));
    person
        .add_relation(
            "preferences",
            "references_and_referenced_in_many",
            RelationOptions::new().inverse_of("people"),
        )
        .expect("preferences")
        .add_relation("posts", "references_many", RelationOptions::new())
        .expect("posts")
        .add_relation("addresses", "embeds_many", RelationOptions::new())
        .expect("addresses")
        .add_relation("passport", "embeds_one", RelationOptions::new())
        .expect("passport");
    person
        .accepts_nested_attributes_for(
            "addresses",
            NestedOptions {
                allow_destroy: true,
                limit: Some(3),
                reject_if: Some(RejectIf::AllBlank),
                update_only: false,
            },
        )
        .expect("nested addresses")
        .accepts_nested_attributes_for("posts", NestedOptions::default())
        .expect("nested posts")
        .accepts_nested_attributes_for("passport", NestedOptions::default())
        .expect("nested passport");

    let mut preference = EntityType::new("Preference");
    preference.add_field(Field::new("name", FieldType::String));
    preference
        .add_relation(
            "people",
            "references_and_referenced_in_many",
            RelationOptions::new()
                .class_name("Person")
                .inverse_of("preferences")
                .foreign_key("person_ids"),
        )
        .expect("people");

    let mut post = EntityType::new("Post");
    post.add_field(Field::new("title", FieldType::String))
        .add_field(Field::new("published", FieldType::Boolean).with_default(false));
    post.add_relation("person", "references_one", RelationOptions::new())
        .expect("person");

    let mut address = EntityType::new("Address");
    address
        .add_field(Field::new("street", FieldType::String))
        .add_field(Field::new("city", FieldType::String));

    let mut passport = EntityType::new("Passport");
    passport.add_field(Field::new("number", FieldType::String));

    let mut schema = Schema::new();
    for entity_type in [person, preference, post, address, passport] {
        schema.keep(entity_type);
    }
    Arc::new(schema)
}

pub fn session_with(store: &CountingStore, settings: Settings) -> Session {
    settings::init_tracing(&settings);
    Session::with_settings(schema(), Box::new(store.clone()), settings)
}

pub fn session() -> (Session, CountingStore) {
    let store = CountingStore::new();
    (session_with(&store, Settings::default()), store)
}
