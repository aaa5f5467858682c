//! Docmap: a document-object mapper.
//!
//! Docmap binds documents held in a schemaless store (maps of named values,
//! possibly nested) to typed in-memory entities, and keeps the relations
//! between those entities consistent on both sides.
//!
//! * An [`schema::EntityType`] declares [`field::Field`]s (a coercion rule and
//!   an optional default) and relations (`embeds_one`, `embeds_many`,
//!   `references_one`, `references_many`, `references_and_referenced_in_many`).
//! * A [`document::Document`] holds the raw [`Value`]s of one entity in its
//!   [`attributes::Attributes`]; declared fields are cast on every read and
//!   write, and writes are change tracked.
//! * A [`session::Session`] keeps every document it touches in an identity map
//!   and talks to a [`store::Store`]. Relations are reached through proxies
//!   ([`relations::One`], [`relations::Many`]) which load lazily, and use a
//!   [`relations::Binding`] to update foreign keys and inverse relations.
//!
//! ## Persistence
//! The [`persist::Persistor`] is a [`store::Store`] over SQLite, keeping each
//! document as tagged JSON in a single table.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use docmap::datatype::FieldType;
//! use docmap::field::Field;
//! use docmap::persist::Persistor;
//! use docmap::relations::RelationOptions;
//! use docmap::schema::{EntityType, Schema};
//! use docmap::settings::PersistenceMode;
//! use docmap::{doc, Session, Value};
//!
//! let mut person = EntityType::new("Person");
//! person.add_field(Field::new("name", FieldType::String));
//! person
//!     .add_relation("preferences", "references_and_referenced_in_many", RelationOptions::new().inverse_of("people"))
//!     .unwrap();
//! let mut preference = EntityType::new("Preference");
//! preference
//!     .add_relation(
//!         "people",
//!         "references_and_referenced_in_many",
//!         RelationOptions::new().class_name("Person").inverse_of("preferences").foreign_key("person_ids"),
//!     )
//!     .unwrap();
//! let mut schema = Schema::new();
//! schema.keep(person);
//! schema.keep(preference);
//!
//! let store = Persistor::new(PersistenceMode::InMemory).unwrap();
//! let mut session = Session::new(Arc::new(schema), Box::new(store));
//! let alice = session.instantiate("Person", doc! { "name" => "Alice" }).unwrap();
//! let tea = session.instantiate("Preference", doc! {}).unwrap();
//! session.many(alice, "preferences").unwrap().push(tea).unwrap();
//! assert_eq!(
//!     session.document(tea).unwrap().read_raw("person_ids"),
//!     Some(&Value::Array(vec![Value::Identity(alice)]))
//! );
//! ```

pub mod attributes;
pub mod criteria;
pub mod datatype;
pub mod document;
pub mod error;
pub mod field;
pub mod identity;
pub mod persist;
pub mod relations;
pub mod schema;
pub mod session;
pub mod settings;
pub mod store;
pub mod value;

pub use error::{DocmapError, Result};
pub use identity::Identity;
pub use session::Session;
pub use value::{RawDocument, Value};
